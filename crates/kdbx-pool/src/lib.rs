//! Binary attachment pool for KeePass documents.
//!
//! Attachment nodes in a KeePass XML document do not carry their bytes. They
//! name a file and point at an entry of a document-wide pool by index:
//!
//! ```text
//! <Binary>
//!     <Key>bash_profile</Key>
//!     <Value Ref="0" />
//! </Binary>
//! ```
//!
//! The pool may be declared before or after the nodes that use it, so
//! loading happens in two phases:
//!
//! 1. Structural parse registers payloads and pending references with a
//!    [`LoadContext`].
//! 2. [`LoadContext::resolve_all`] validates every index against the complete
//!    pool and produces per-owner [`Attachments`].
//!
//! Saving runs through a [`SaveContext`], which drops orphaned payloads,
//! compacts the pool to `0..n` and moves every reference to its new index.
//!
//! # Example
//!
//! ```
//! use kdbx_pool::{BinaryPayload, LoadContext, OwnerId};
//!
//! let mut context = LoadContext::new();
//! context.register_owner(OwnerId(0), "Root/Server");
//! context.register_pending(OwnerId(0), "bash_profile", 0);
//! context
//!     .register_payload(0, BinaryPayload::new(b"export EDITOR=vi".to_vec()))
//!     .unwrap();
//!
//! let resolved = context.resolve_all().unwrap();
//! let profile = resolved.owners[&OwnerId(0)].get("bash_profile").unwrap();
//! assert_eq!(profile.bytes(&resolved.pool).unwrap(), b"export EDITOR=vi");
//! ```

mod attachments;
mod context;
mod error;
mod payload;
mod pool;
mod reference;
mod resolver;

pub use attachments::{Attachments, OwnerId};
pub use context::{LoadContext, Resolved, SaveContext};
pub use error::{PoolError, Result};
pub use payload::{BinaryPayload, Fingerprint};
pub use pool::{BinaryPool, IndexRemap};
pub use reference::AttachmentReference;
pub use resolver::{PendingReference, PendingSource, SavePlan};
