//! Document mapping error types.
//!
//! Structural errors name the owner path (and filename where there is one) so
//! a fault can be located in the source document. Resolution errors come
//! through [`XmlError::Pool`] and describe the document as a whole.

use kdbx_pool::PoolError;
use thiserror::Error;

use crate::codec::CodecError;

/// Document load/save error.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The XML itself could not be read or written.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// I/O error while writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Well-formedness problem found while building the element tree.
    #[error("malformed XML: {message}")]
    Syntax { message: String },

    /// A required child element is absent.
    #[error("missing <{element}> in {location}")]
    MissingElement {
        element: &'static str,
        location: String,
    },

    /// A required attribute is absent.
    #[error("missing attribute '{attribute}' on <{element}> in {location}")]
    MissingAttribute {
        attribute: &'static str,
        element: &'static str,
        location: String,
    },

    /// An attachment's `Ref` is not a non-negative integer.
    #[error("attachment '{filename}' on {owner} has malformed reference '{value}'")]
    MalformedIndex {
        owner: String,
        filename: String,
        value: String,
    },

    /// A pool payload's `ID` is not a non-negative integer.
    #[error("pool payload has malformed ID '{value}'")]
    MalformedPoolIndex { value: String },

    /// Payload text could not be decoded.
    #[error("invalid payload in {location}: {source}")]
    InvalidPayload {
        location: String,
        #[source]
        source: CodecError,
    },

    /// Inline attachment values were disabled by the load options.
    #[error("attachment '{filename}' on {owner} stores its bytes inline")]
    InlineValueRejected { owner: String, filename: String },

    /// No attachment owner matches the lookup.
    #[error("no entry matches '{query}'")]
    OwnerNotFound { query: String },

    /// More than one owner carries the looked-up label.
    #[error("'{query}' matches {matches} entries")]
    AmbiguousOwner { query: String, matches: usize },

    /// Pool or reference error.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl XmlError {
    /// Whether the error was raised while parsing a single node.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. }
                | Self::MissingElement { .. }
                | Self::MissingAttribute { .. }
                | Self::MalformedIndex { .. }
                | Self::MalformedPoolIndex { .. }
                | Self::InvalidPayload { .. }
                | Self::InlineValueRejected { .. }
        )
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Pool(error) => error.suggestion(),
            Self::InlineValueRejected { .. } => {
                Some("Enable inline values in the load options to read legacy documents.")
            }
            Self::OwnerNotFound { .. } => Some("Check the entry UUID or path."),
            Self::AmbiguousOwner { .. } => Some("Select the entry by its UUID instead."),
            error if error.is_structural() => {
                Some("The document is damaged. Try opening a backup copy.")
            }
            _ => None,
        }
    }
}

/// Result type alias for document mapping operations.
pub type Result<T> = std::result::Result<T, XmlError>;
