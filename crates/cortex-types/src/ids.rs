//! Identifier types.
//!
//! Time-sortable identifiers (`SessionId`, `MemoryId`, `EntityId`,
//! `RelationshipId`, `RunId`, `ChangeId`) wrap a UUIDv7. Content-addressed
//! identifiers (`AnalysisId`, `FindingId`, `FindingsDigest`, `DocumentId`)
//! wrap a SHA-256 hex string produced by [`crate::canonical`] and carry no
//! generator of their own — they are always computed from their inputs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new, time-sortable identifier (UUIDv7).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wraps an existing UUID, e.g. one preserved across a MERGE.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(SessionId, "Time-sortable identifier for a session.");
uuid_id!(MemoryId, "Time-sortable identifier for a memory.");
uuid_id!(EntityId, "Time-sortable identifier for a graph entity.");
uuid_id!(
    RelationshipId,
    "Time-sortable identifier for a graph relationship."
);
uuid_id!(RunId, "Time-sortable identifier for a diagnostics run.");
uuid_id!(ChangeId, "Time-sortable identifier for an evolution change.");

macro_rules! hash_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an already-computed SHA-256 hex digest.
            #[must_use]
            pub fn from_hex(hex: impl Into<String>) -> Self {
                Self(hex.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

hash_id!(
    AnalysisId,
    "Content-addressed identity of a diagnostics analysis."
);
hash_id!(FindingId, "Content-addressed identity of a single finding.");
hash_id!(
    FindingsDigest,
    "SHA-256 fingerprint over a sorted FindingId sequence."
);
hash_id!(
    DocumentId,
    "SHA-256 hex of a repository-relative file path."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_time_sortable_and_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        // UUIDv7 embeds a millisecond timestamp in the high bits, so two ids
        // minted in sequence compare in generation order.
        assert!(a <= b);
    }

    #[test]
    fn hash_ids_round_trip_through_display() {
        let id = AnalysisId::from_hex("deadbeef");
        assert_eq!(id.to_string(), "deadbeef");
        assert_eq!(id.as_str(), "deadbeef");
    }
}
