//! Scoring profile evaluator (spec §4.7): freshness/magnitude/distance/tag
//! functions, profile-level interpolation and aggregation, and the
//! `name-value` scoring-parameter grammar.
//!
//! No teacher file implements anything like this (the mail search engine has
//! no scoring-profile concept); the shapes here are built directly from the
//! spec's function-output/interpolation/aggregation tables, using `chrono`
//! for the freshness duration math the way the teacher uses `chrono`
//! throughout for timestamps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use search_sim_types::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};

use crate::query::ScoringParameter;

/// Interpolation kind applied to a function's normalized `[0,1]` output
/// (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Interpolation {
    #[default]
    Linear,
    Constant,
    Quadratic,
    Logarithmic,
}

impl Interpolation {
    /// Applies this interpolation to a normalized function output `x`,
    /// `x` already clamped to `[0, 1]` by the caller.
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Constant => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Quadratic => x * x,
            Self::Logarithmic => 1.0 - ((1.0 + (1.0 - x) * (std::f64::consts::E - 1.0)).ln()),
        }
    }
}

/// Aggregation kind combining every scoring function's (boosted,
/// interpolated) contribution into a single value (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Aggregation {
    #[default]
    Sum,
    Average,
    Min,
    Max,
    FirstMatching,
}

/// One scoring function within a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringFunction {
    /// The document field this function reads.
    pub field: String,
    /// Multiplier applied to the interpolated (not raw) output.
    pub boost: f64,
    pub kind: FunctionKind,
}

/// The four function kinds, each with its own per-function parameters
/// (spec §4.7 "Function outputs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FunctionKind {
    /// `max(0, 1 - |now - docDate| / duration)`.
    Freshness { duration: String },
    /// `(v - a) / (b - a)`, clamped to `[0,1]` if `constant_boost_beyond_range`.
    Magnitude {
        range: (f64, f64),
        constant_boost_beyond_range: bool,
    },
    /// Haversine distance in km between a named scoring-parameter reference
    /// point and the document's geo-point field, normalized against
    /// `boosting_distance`.
    Distance { reference_param: String, boosting_distance: f64 },
    /// `1.0` if any supplied tag (by a named scoring parameter) matches any
    /// document tag, case-insensitively, else `0.0`.
    Tag { tag_param: String },
}

/// A named bundle of text-field boosts plus an ordered scoring-function
/// list, an interpolation kind, and an aggregation kind (spec §3.1/§4.7).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScoringProfile {
    pub name: String,
    /// Per-field text-query boosts, passed through to the text query parser.
    pub text_weights: HashMap<String, f32>,
    pub functions: Vec<ScoringFunction>,
    pub interpolation: Interpolation,
    pub aggregation: Aggregation,
}

impl ScoringProfile {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Evaluates this profile's multiplier for one document's field values
    /// and the request's scoring parameters (spec §4.7: "a profile produces
    /// a per-document multiplier applied to the combined score").
    ///
    /// # Errors
    /// Propagates [`SearchError::InvalidQuery`] if a function references a
    /// malformed duration string or a missing/malformed scoring parameter.
    pub fn evaluate(
        &self,
        doc_values: &HashMap<String, search_sim_types::Value>,
        parameters: &[ScoringParameter],
        now: DateTime<Utc>,
    ) -> SearchResult<f64> {
        let mut contributions = Vec::with_capacity(self.functions.len());
        for function in &self.functions {
            if let Some(raw) = evaluate_raw(function, doc_values, parameters, now)? {
                let interpolated = self.interpolation.apply(raw.clamp(0.0, 1.0));
                contributions.push((raw, function.boost * interpolated));
            }
        }

        if contributions.is_empty() {
            return Ok(1.0);
        }

        let aggregate = match self.aggregation {
            Aggregation::Sum => contributions.iter().map(|(_, v)| *v).sum(),
            Aggregation::Average => {
                contributions.iter().map(|(_, v)| *v).sum::<f64>() / contributions.len() as f64
            }
            Aggregation::Min => contributions.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min),
            Aggregation::Max => contributions.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max),
            Aggregation::FirstMatching => contributions
                .iter()
                .find(|(raw, _)| *raw > 0.0)
                .map_or(0.0, |(_, v)| *v),
        };

        Ok(1.0 + aggregate)
    }
}

/// Computes one function's raw (pre-interpolation) `[0,1]` output, or `None`
/// if the function does not apply to this document (e.g. the field is
/// absent).
fn evaluate_raw(
    function: &ScoringFunction,
    doc_values: &HashMap<String, search_sim_types::Value>,
    parameters: &[ScoringParameter],
    now: DateTime<Utc>,
) -> SearchResult<Option<f64>> {
    match &function.kind {
        FunctionKind::Freshness { duration } => {
            let Some(doc_date) = doc_values.get(&function.field).and_then(value_as_datetime) else {
                return Ok(None);
            };
            let window = parse_iso8601_duration(duration)?;
            let window_secs = window.num_seconds().max(1) as f64;
            let delta_secs = (now - doc_date).num_seconds().unsigned_abs() as f64;
            Ok(Some((1.0 - delta_secs / window_secs).max(0.0)))
        }
        FunctionKind::Magnitude { range, constant_boost_beyond_range } => {
            let Some(v) = doc_values.get(&function.field).and_then(value_as_f64) else {
                return Ok(None);
            };
            let (a, b) = *range;
            let span = b - a;
            if span == 0.0 {
                return Ok(Some(0.0));
            }
            let normalized = (v - a) / span;
            if *constant_boost_beyond_range {
                Ok(Some(normalized.clamp(0.0, 1.0)))
            } else if (0.0..=1.0).contains(&normalized) {
                Ok(Some(normalized))
            } else {
                Ok(Some(0.0))
            }
        }
        FunctionKind::Distance { reference_param, boosting_distance } => {
            let Some(doc_point) = doc_values.get(&function.field).and_then(value_as_point) else {
                return Ok(None);
            };
            let Some(reference_point) = find_parameter(parameters, reference_param).and_then(parse_point) else {
                return Ok(None);
            };
            let distance_km = haversine_km(reference_point, doc_point);
            Ok(Some((1.0 - distance_km / boosting_distance).max(0.0)))
        }
        FunctionKind::Tag { tag_param } => {
            let Some(doc_tags) = doc_values.get(&function.field).and_then(value_as_string_list) else {
                return Ok(None);
            };
            let Some(supplied) = find_parameter(parameters, tag_param) else {
                return Ok(None);
            };
            let supplied_tags: Vec<String> = supplied.value.split(',').map(|t| t.trim().to_lowercase()).collect();
            let any_match = doc_tags
                .iter()
                .any(|doc_tag| supplied_tags.iter().any(|t| t == &doc_tag.to_lowercase()));
            Ok(Some(if any_match { 1.0 } else { 0.0 }))
        }
    }
}

fn find_parameter<'a>(parameters: &'a [ScoringParameter], name: &str) -> Option<&'a ScoringParameter> {
    parameters.iter().find(|p| p.name == name)
}

fn value_as_datetime(value: &search_sim_types::Value) -> Option<DateTime<Utc>> {
    match value {
        search_sim_types::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_as_f64(value: &search_sim_types::Value) -> Option<f64> {
    match value {
        search_sim_types::Value::Int(i) => Some(*i as f64),
        search_sim_types::Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// A geo-point as (longitude, latitude), matching the two-element array
/// shape [`search_sim_types::Value::coerce`] accepts for `GeoPoint` fields.
fn value_as_point(value: &search_sim_types::Value) -> Option<(f64, f64)> {
    match value {
        search_sim_types::Value::Array(items) if items.len() == 2 => {
            Some((value_as_f64(&items[0])?, value_as_f64(&items[1])?))
        }
        _ => None,
    }
}

fn value_as_string_list(value: &search_sim_types::Value) -> Option<Vec<String>> {
    match value {
        search_sim_types::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| match v {
                    search_sim_types::Value::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        ),
        search_sim_types::Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

/// Parses a `"lon,lat"` scoring-parameter value into a point.
fn parse_point(parameter: &ScoringParameter) -> Option<(f64, f64)> {
    let (lon, lat) = parameter.value.split_once(',')?;
    Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
}

/// Haversine great-circle distance in kilometres between two (lon, lat)
/// points in degrees.
fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (lon1, lat1) = (a.0.to_radians(), a.1.to_radians());
    let (lon2, lat2) = (b.0.to_radians(), b.1.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Parses an ISO-8601 duration (`PnYnMnDTnHnMnS`, every component optional)
/// into a [`chrono::Duration`]. Calendar components are approximated as
/// fixed day counts (`Y` = 365d, `M` = 30d, `W` = 7d) since this evaluator
/// only needs a window width, not calendar-exact arithmetic.
fn parse_iso8601_duration(text: &str) -> SearchResult<chrono::Duration> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'P') {
        return Err(SearchError::InvalidQuery(format!("invalid ISO-8601 duration: '{text}'")));
    }
    let (date_part, time_part) = text[1..].split_once('T').unwrap_or((&text[1..], ""));

    let mut total = chrono::Duration::zero();
    total += total_date_component(date_part, 'Y', 365)?;
    total += total_date_component(date_part, 'W', 7)?;
    total += total_date_component(date_part, 'M', 30)?;
    total += total_date_component(date_part, 'D', 1)?;

    total += total_time_component(time_part, 'H', |n| chrono::Duration::hours(n))?;
    total += total_time_component(time_part, 'M', |n| chrono::Duration::minutes(n))?;
    total += total_time_component(time_part, 'S', |n| chrono::Duration::seconds(n))?;

    if total.is_zero() {
        return Err(SearchError::InvalidQuery(format!("empty ISO-8601 duration: '{text}'")));
    }
    Ok(total)
}

fn total_date_component(part: &str, marker: char, days_per_unit: i64) -> SearchResult<chrono::Duration> {
    let Some(count) = extract_component(part, marker)? else {
        return Ok(chrono::Duration::zero());
    };
    Ok(chrono::Duration::days(count * days_per_unit))
}

fn total_time_component(
    part: &str,
    marker: char,
    build: impl Fn(i64) -> chrono::Duration,
) -> SearchResult<chrono::Duration> {
    let Some(count) = extract_component(part, marker)? else {
        return Ok(chrono::Duration::zero());
    };
    Ok(build(count))
}

fn extract_component(part: &str, marker: char) -> SearchResult<Option<i64>> {
    let Some(marker_pos) = part.find(marker) else {
        return Ok(None);
    };
    let digits_start = part[..marker_pos]
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |p| p + 1);
    let digits = &part[digits_start..marker_pos];
    if digits.is_empty() {
        return Err(SearchError::InvalidQuery(format!("malformed duration component before '{marker}'")));
    }
    digits
        .parse::<i64>()
        .map(Some)
        .map_err(|_| SearchError::InvalidQuery(format!("malformed duration component '{digits}{marker}'")))
}
