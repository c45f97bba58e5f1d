//! KeePass XML document mapping with pooled binary attachments.
//!
//! [`Document::parse`] reads a KeePass XML document, registers the
//! `<Meta><Binaries>` pool and every entry's `<Binary>` nodes with a
//! [`kdbx_pool::LoadContext`], and resolves them once the whole document has
//! been read. [`Document::to_xml`] compacts the pool and writes it back.
//!
//! KDBX 4 containers keep the pool outside the XML. Load those with
//! [`Document::parse_with_pool`] and save with
//! [`PayloadLocation::External`]; the compacted payloads come back in
//! [`SavedDocument::payloads`].
//!
//! # Example
//!
//! ```
//! use kdbx_xml::{Document, LoadOptions, SaveOptions};
//!
//! let xml = br#"<KeePassFile>
//!     <Meta><Binaries><Binary ID="0">SGVsbG8=</Binary></Binaries></Meta>
//!     <Root><Group><Name>General</Name>
//!         <Entry>
//!             <UUID>AAAAAAAAAAAAAAAAAAAAAA==</UUID>
//!             <String><Key>Title</Key><Value>Server</Value></String>
//!             <Binary><Key>hello.txt</Key><Value Ref="0" /></Binary>
//!         </Entry>
//!     </Group></Root>
//! </KeePassFile>"#;
//!
//! let mut document = Document::parse(xml, &LoadOptions::default()).unwrap();
//! let server = document.find_by_label("Root/General/Server").unwrap();
//! assert_eq!(document.attachment_bytes(server, "hello.txt").unwrap(), b"Hello");
//!
//! let saved = document.to_xml(&SaveOptions::default()).unwrap();
//! assert_eq!(saved.payloads.len(), 1);
//! ```

pub mod codec;
mod document;
mod element;
mod error;
mod mapping;
mod options;

pub use codec::CodecError;
pub use document::{AttachmentListing, AttachmentOwner, Document, SavedDocument};
pub use element::{XmlElement, XmlNode, parse_document, write_document};
pub use error::{Result, XmlError};
pub use mapping::{BinaryRefNode, BinaryValue, ElementMapping, PayloadNode};
pub use options::{LoadOptions, PayloadLocation, SaveOptions};

pub use kdbx_pool::{BinaryPayload, BinaryPool, Fingerprint, OwnerId, PoolError};
