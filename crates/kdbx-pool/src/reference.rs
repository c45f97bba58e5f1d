//! Named, non-owning references into the binary pool.

use crate::error::{PoolError, Result};
use crate::payload::BinaryPayload;
use crate::pool::{BinaryPool, IndexRemap};

/// One named attachment: a filename plus the pool index of its bytes.
///
/// The reference never owns payload bytes. Reading them always goes through
/// the pool, which stays the single source of truth for payload identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentReference {
    filename: String,
    pool_index: u32,
}

impl AttachmentReference {
    pub(crate) fn new(filename: String, pool_index: u32) -> Self {
        Self {
            filename,
            pool_index,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn pool_index(&self) -> u32 {
        self.pool_index
    }

    pub fn payload<'pool>(&self, pool: &'pool BinaryPool) -> Result<&'pool BinaryPayload> {
        pool.get(self.pool_index)
    }

    /// Resolved bytes of this attachment.
    pub fn bytes<'pool>(&self, pool: &'pool BinaryPool) -> Result<&'pool [u8]> {
        self.payload(pool).map(BinaryPayload::bytes)
    }

    pub(crate) fn set_filename(&mut self, filename: String) {
        self.filename = filename;
    }

    /// Follow a compaction. An index the remap does not know is stale.
    pub(crate) fn apply_remap(&mut self, remap: &IndexRemap) -> Result<()> {
        self.pool_index = remap
            .get(self.pool_index)
            .ok_or(PoolError::ReferenceNotFound {
                index: self.pool_index,
            })?;
        Ok(())
    }
}
