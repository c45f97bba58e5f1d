//! Pool and reference error types.
//!
//! Resolution failures describe a corrupt document and fail the whole load.
//! Naming failures are raised at mutation time and leave the owner untouched.

use thiserror::Error;

/// Binary pool operation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A reference points at an index with no payload behind it.
    #[error("binary reference {index} does not resolve to a pool entry")]
    ReferenceNotFound { index: u32 },

    /// Two sibling attachments would share a filename.
    #[error("attachment '{filename}' already exists on {owner}")]
    DuplicateAttachmentName { owner: String, filename: String },

    /// Attachment filenames must not be empty.
    #[error("attachment name must not be empty on {owner}")]
    EmptyAttachmentName { owner: String },

    /// No attachment with the given filename exists on the owner.
    #[error("attachment '{filename}' not found on {owner}")]
    AttachmentNotFound { owner: String, filename: String },

    /// The document declares the same pool index twice.
    #[error("pool index {index} is declared more than once")]
    DuplicatePoolIndex { index: u32 },
}

impl PoolError {
    /// Whether this error indicates a corrupt document rather than a rejected edit.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ReferenceNotFound { .. } | Self::DuplicatePoolIndex { .. }
        )
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ReferenceNotFound { .. } => {
                Some("The document is damaged. Try opening a backup copy.")
            }
            Self::DuplicateAttachmentName { .. } => {
                Some("Choose a filename that is not already used by this entry.")
            }
            Self::EmptyAttachmentName { .. } => Some("Give the attachment a filename."),
            Self::AttachmentNotFound { .. } => None,
            Self::DuplicatePoolIndex { .. } => {
                Some("The document is damaged. Try opening a backup copy.")
            }
        }
    }
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
