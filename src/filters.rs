//! Exact-match filters and validation of the enumerated CLI inputs.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::record::{STATE_FIELD, STATUS_FIELD};

/// Region codes accepted by `--state`.
pub const VALID_STATES: [&str; 8] = ["ACT", "NSW", "NT", "QLD", "SA", "TAS", "VIC", "WA"];

/// Canonical registration status for active business names.
pub const REGISTERED: &str = "Registered";

/// Canonical registration status for cancelled business names.
pub const DEREGISTERED: &str = "Deregistered";

/// Free-text synonyms accepted by `--status`, keyed by lowercase spelling.
const STATUS_CORRECTIONS: [(&str, &str); 11] = [
    ("register", REGISTERED),
    ("registered", REGISTERED),
    ("reg", REGISTERED),
    ("de-register", DEREGISTERED),
    ("deregister", DEREGISTERED),
    ("deregistered", DEREGISTERED),
    ("dereg", DEREGISTERED),
    ("de-reg", DEREGISTERED),
    ("cancel", DEREGISTERED),
    ("cancelled", DEREGISTERED),
    ("canceled", DEREGISTERED),
];

/// Invalid user input, detected before any cache or network activity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid state '{0}'. Valid values are: ACT, NSW, NT, QLD, SA, TAS, VIC, WA")]
    InvalidState(String),

    #[error("Invalid registration status '{0}'. Valid values are: Registered, Deregistered")]
    InvalidStatus(String),

    #[error("Invalid cache expiration: {0}")]
    InvalidTtl(String),
}

/// Exact-match narrowing criteria, iterated in lexicographic field order.
///
/// The ordering is what makes cache keys reproducible across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterSet(BTreeMap<String, String>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the filter set for `--state` / `--status`, validating both.
    pub fn from_flags(state: Option<&str>, status: Option<&str>) -> Result<Self, ValidationError> {
        let mut filters = Self::new();
        if let Some(state) = state.filter(|s| !s.trim().is_empty()) {
            filters.insert(STATE_FIELD, normalize_state(state)?);
        }
        if let Some(status) = status.filter(|s| !s.trim().is_empty()) {
            filters.insert(STATUS_FIELD, correct_status(status)?);
        }
        Ok(filters)
    }

    /// Insert or replace the value for `field`.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Upper-case a state code and check it against [`VALID_STATES`].
pub fn normalize_state(input: &str) -> Result<&'static str, ValidationError> {
    let upper = input.trim().to_uppercase();
    VALID_STATES
        .iter()
        .copied()
        .find(|state| *state == upper)
        .ok_or_else(|| ValidationError::InvalidState(input.to_string()))
}

/// Map a free-text status onto `Registered` or `Deregistered`.
pub fn correct_status(input: &str) -> Result<&'static str, ValidationError> {
    let lower = input.trim().to_lowercase();
    STATUS_CORRECTIONS
        .iter()
        .find(|(synonym, _)| *synonym == lower)
        .map(|(_, canonical)| *canonical)
        .ok_or_else(|| ValidationError::InvalidStatus(input.to_string()))
}
