//! Re-export of the shared error taxonomy so callers can write
//! `search_sim_core::error::SearchResult` the way the teacher crate exposes
//! its own `error` module, without duplicating the enum here.

pub use search_sim_types::error::{SearchError, SearchResult};
