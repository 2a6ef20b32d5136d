use serde::{Deserialize, Serialize};

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Required attribute '{0}' was not set by any configuration layer")]
    UnresolvedAttribute(String),

    #[error("Invalid filter condition on '{argument}': {reason}")]
    InvalidFilterCondition { argument: String, reason: String },

    #[error("Invalid label range '{key}': {reason}")]
    InvalidLabelRange { key: String, reason: String },

    #[error("Cannot substitute '{placeholder}' in '{template}'")]
    Substitution {
        template: String,
        placeholder: String,
    },

    #[error("Unknown card type: {0}")]
    UnknownCardType(String),

    #[error("Source image not found: {0}")]
    MissingSourceImage(String),

    #[error("Renderer did not produce {path}: {reason}")]
    RenderFailure { path: String, reason: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Reason code reported when this error stops a reconciliation.
    pub fn block_reason(&self) -> BlockReason {
        match self {
            Self::NotFound { .. } => BlockReason::EntityNotFound,
            Self::UnresolvedAttribute(_) => BlockReason::UnresolvedAttribute,
            Self::InvalidFilterCondition { .. } | Self::Validation(_) => {
                BlockReason::InvalidConfiguration
            }
            Self::InvalidLabelRange { .. } | Self::Substitution { .. } => {
                BlockReason::SubstitutionError
            }
            Self::UnknownCardType(_) => BlockReason::UnknownCardType,
            Self::MissingSourceImage(_) => BlockReason::MissingSourceImage,
            Self::RenderFailure { .. } => BlockReason::RenderFailure,
            Self::Conflict(_) | Self::Io { .. } | Self::Internal(_) => {
                BlockReason::CollaboratorFailure
            }
        }
    }
}

/// Typed reason code attached to a `blocked` reconciliation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    EntityNotFound,
    UnresolvedAttribute,
    InvalidConfiguration,
    SubstitutionError,
    UnknownCardType,
    MissingSourceImage,
    RenderFailure,
    CollaboratorFailure,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityNotFound => "entity_not_found",
            Self::UnresolvedAttribute => "unresolved_attribute",
            Self::InvalidConfiguration => "invalid_configuration",
            Self::SubstitutionError => "substitution_error",
            Self::UnknownCardType => "unknown_card_type",
            Self::MissingSourceImage => "missing_source_image",
            Self::RenderFailure => "render_failure",
            Self::CollaboratorFailure => "collaborator_failure",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_blocking_error_has_a_reason() {
        assert_eq!(
            CoreError::MissingSourceImage("/src/s1e1.jpg".into()).block_reason(),
            BlockReason::MissingSourceImage
        );
        assert_eq!(
            CoreError::UnresolvedAttribute("font_file".into()).block_reason(),
            BlockReason::UnresolvedAttribute
        );
        assert_eq!(
            CoreError::Substitution {
                template: "{nope}".into(),
                placeholder: "nope".into(),
            }
            .block_reason(),
            BlockReason::SubstitutionError
        );
    }

    #[test]
    fn reason_serializes_snake_case() {
        let json = serde_json::to_string(&BlockReason::RenderFailure).unwrap();
        assert_eq!(json, "\"render_failure\"");
        assert_eq!(BlockReason::RenderFailure.to_string(), "render_failure");
    }

    #[test]
    fn error_messages_name_the_attribute() {
        let err = CoreError::UnresolvedAttribute("card_directory".into());
        assert!(err.to_string().contains("card_directory"));
    }
}
