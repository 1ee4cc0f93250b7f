//! Error types for the association layer
//!
//! Definition-time errors are raised synchronously while associations are
//! declared or includes are resolved. Executor errors are passed through
//! unchanged, with foreign-key violations surfaced as their own variant.

/// Result type alias for association operations
pub type AssociationResult<T> = Result<T, AssociationError>;

/// What an alias collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollidesWith {
    Association,
    Attribute,
}

impl std::fmt::Display for CollidesWith {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollidesWith::Association => write!(f, "association"),
            CollidesWith::Attribute => write!(f, "attribute"),
        }
    }
}

/// Error types for association definition, planning and execution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssociationError {
    /// Duplicate alias on a source model, or an alias shadowing an attribute
    #[error("Association alias '{alias}' collides with an existing {existing} on model {model}")]
    AliasCollision {
        model: String,
        alias: String,
        existing: CollidesWith,
    },

    /// BelongsToMany declared without a resolvable join model
    #[error("{source_model}.belongs_to_many({target}) requires a through model")]
    MissingThrough { source_model: String, target: String },

    /// sourceKey / targetKey naming an attribute the model does not have
    #[error("Unknown attribute '{key}' on model {model} used as association key")]
    UnknownKey { model: String, key: String },

    /// Self-referential many-to-many without an alias
    #[error("'as' must be defined for many-to-many self-associations on model {model}")]
    SelfAssociationAlias { model: String },

    /// Include node that does not resolve to exactly one association
    #[error("Ambiguous include on model {model}: {reason}")]
    AmbiguousInclude { model: String, reason: String },

    /// Referenced model was never defined
    #[error("Model '{0}' is not defined")]
    UnknownModel(String),

    /// Include options that are valid individually but not together
    #[error("Invalid include: {0}")]
    InvalidInclude(String),

    /// Targets handed to a mutating call that cannot be written
    #[error("Invalid association target: {0}")]
    InvalidTarget(String),

    /// Foreign key constraint violated by a mutating statement
    #[error("Foreign key constraint violation: {0}")]
    ForeignKeyConstraint(String),

    /// Any other failure reported by the query executor
    #[error("Executor error: {0}")]
    Executor(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AssociationError {
    /// Returns true for errors raised while declaring associations
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::AliasCollision { .. }
                | Self::MissingThrough { .. }
                | Self::UnknownKey { .. }
                | Self::SelfAssociationAlias { .. }
                | Self::UnknownModel(_)
        )
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for AssociationError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AssociationError::ForeignKeyConstraint(db_err.message().to_string())
            }
            _ => AssociationError::Executor(err.to_string()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for AssociationError {
    fn from(err: serde_json::Error) -> Self {
        AssociationError::Executor(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_collision_message() {
        let err = AssociationError::AliasCollision {
            model: "User".to_string(),
            alias: "name".to_string(),
            existing: CollidesWith::Attribute,
        };
        assert_eq!(
            err.to_string(),
            "Association alias 'name' collides with an existing attribute on model User"
        );
        assert!(err.is_definition_error());

        let err = AssociationError::AliasCollision {
            model: "User".to_string(),
            alias: "Tasks".to_string(),
            existing: CollidesWith::Association,
        };
        assert_eq!(
            err.to_string(),
            "Association alias 'Tasks' collides with an existing association on model User"
        );
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let err: AssociationError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AssociationError::Executor(_)));
        assert!(!err.is_definition_error());
    }
}
