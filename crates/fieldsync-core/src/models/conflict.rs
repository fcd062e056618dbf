//! Sync conflict model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

use super::record::RecordId;

/// A unique identifier for a sync conflict, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID.
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Category of divergence detected during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Data,
    Timing,
    Permission,
}

impl ConflictType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Timing => "timing",
            Self::Permission => "permission",
        }
    }
}

impl FromStr for ConflictType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "data" => Ok(Self::Data),
            "timing" => Ok(Self::Timing),
            "permission" => Ok(Self::Permission),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict type: {other}"
            ))),
        }
    }
}

/// How a conflict is (or should be) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    LocalWins,
    RemoteWins,
    Merge,
    Manual,
}

impl ResolutionStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
            Self::Merge => "merge",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "local_wins" => Ok(Self::LocalWins),
            "remote_wins" => Ok(Self::RemoteWins),
            "merge" => Ok(Self::Merge),
            "manual" => Ok(Self::Manual),
            other => Err(Error::InvalidInput(format!(
                "unknown resolution strategy: {other}"
            ))),
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A divergence between a local record and its remote counterpart.
///
/// Conflicts are never deleted; `resolved_at` is null while still actionable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Unique conflict identifier
    pub id: ConflictId,
    /// Local record involved in the conflict
    pub local_record_id: RecordId,
    /// Competing remote payload at detection time
    pub remote_data: Value,
    /// Category of divergence
    pub conflict_type: ConflictType,
    /// Strategy chosen by the resolver policy
    pub resolution_strategy: ResolutionStrategy,
    /// Detection timestamp (Unix ms)
    pub created_at: i64,
    /// Resolution timestamp (Unix ms), null while unresolved
    pub resolved_at: Option<i64>,
    /// Who resolved the conflict ("auto" or an operator)
    pub resolved_by: Option<String>,
}

impl SyncConflict {
    /// Create a new unresolved conflict.
    #[must_use]
    pub fn new(
        local_record_id: RecordId,
        remote_data: Value,
        conflict_type: ConflictType,
        resolution_strategy: ResolutionStrategy,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            local_record_id,
            remote_data,
            conflict_type,
            resolution_strategy,
            created_at: chrono::Utc::now().timestamp_millis(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    /// Whether the conflict still needs action.
    #[must_use]
    pub const fn is_unresolved(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_conflict_is_unresolved() {
        let conflict = SyncConflict::new(
            RecordId::new(),
            json!({"status": "approved"}),
            ConflictType::Data,
            ResolutionStrategy::Manual,
        );
        assert!(conflict.is_unresolved());
        assert!(conflict.resolved_by.is_none());
    }

    #[test]
    fn test_strategy_parse_round_trip() {
        for strategy in [
            ResolutionStrategy::LocalWins,
            ResolutionStrategy::RemoteWins,
            ResolutionStrategy::Merge,
            ResolutionStrategy::Manual,
        ] {
            assert_eq!(strategy.as_str().parse::<ResolutionStrategy>().unwrap(), strategy);
        }
        assert!("newest_wins".parse::<ResolutionStrategy>().is_err());
    }
}
