//! Core value types, schema model, configuration, and error types shared by
//! the search simulator engine.

pub mod cancellation;
pub mod clock;
pub mod config;
pub mod error;
pub mod schema;
pub mod value;

pub use cancellation::CancellationToken;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, FusionKind, HnswConfig, HybridConfig, SimilarityConfig, SimilarityKind, VectorsConfig};
pub use error::{SearchError, SearchResult};
pub use schema::{Analyzer, Field, FieldFlags, FieldType, IndexSchema};
pub use value::Value;
