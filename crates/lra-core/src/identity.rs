//! # Identity Newtypes
//!
//! Identifiers for sagas and their participants. Both are UUID-based and
//! always valid by construction.
//!
//! An LRA travels over the wire as a URI (`{coordinator}/{uuid}`), so
//! [`LraId::parse`] accepts either the bare UUID or any URI whose last path
//! segment is the UUID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// A unique identifier for a long running action (saga).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LraId(Uuid);

impl LraId {
    /// Create a new random LRA identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an LRA identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse an LRA identifier from a bare UUID or an LRA URI.
    ///
    /// Trailing slashes and query strings are ignored, so
    /// `http://coordinator/lra-coordinator/<uuid>/?x=1` resolves to `<uuid>`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let without_query = trimmed.split(['?', '#']).next().unwrap_or_default();
        let segment = without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        Uuid::parse_str(segment)
            .map(Self)
            .map_err(|_| ValidationError::InvalidLraId(raw.to_string()))
    }

    /// Render the externally visible URI of this LRA under `base_url`.
    pub fn uri(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }
}

impl Default for LraId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LraId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A unique identifier for a participant enlisted in an LRA.
///
/// Assigned by the coordinator when the participant joins; it becomes the
/// last segment of the participant's recovery URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Create a new random participant identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a participant identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
