//! Association kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// Defines the type of association between a source and a target model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    /// One-to-one, key on the target
    HasOne,
    /// Many-to-one, key on the source
    BelongsTo,
    /// One-to-many, key on the target
    HasMany,
    /// Many-to-many through a join model
    BelongsToMany,
}

impl AssociationKind {
    /// Returns true if this association returns a collection
    pub fn is_multi(self) -> bool {
        matches!(self, Self::HasMany | Self::BelongsToMany)
    }

    /// Returns true if this association returns at most one record
    pub fn is_single(self) -> bool {
        !self.is_multi()
    }

    /// Joining along this association can produce more than one row per
    /// parent row
    pub fn is_duplicating(self) -> bool {
        self.is_multi()
    }

    /// Returns true if this association requires a join model
    pub fn requires_through(self) -> bool {
        matches!(self, Self::BelongsToMany)
    }

    /// Returns true if the foreign key lives on the source model
    pub fn key_on_source(self) -> bool {
        matches!(self, Self::BelongsTo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HasOne => "HasOne",
            Self::BelongsTo => "BelongsTo",
            Self::HasMany => "HasMany",
            Self::BelongsToMany => "BelongsToMany",
        }
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
