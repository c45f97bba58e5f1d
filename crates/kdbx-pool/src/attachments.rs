//! Per-owner attachment collections.
//!
//! Filenames are unique among the attachments of one owner (an entry, or one
//! history snapshot of an entry). Order is the owner's field order and is
//! preserved through saves.

use std::fmt;

use crate::error::{PoolError, Result};
use crate::payload::BinaryPayload;
use crate::pool::{BinaryPool, IndexRemap};
use crate::reference::AttachmentReference;

/// Identifies one attachment owner within a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub usize);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner #{}", self.0)
    }
}

/// The ordered attachments of one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachments {
    owner: String,
    items: Vec<AttachmentReference>,
}

impl Attachments {
    /// Create an empty collection. `owner` labels the owner in error messages.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            items: Vec::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Add a new attachment, pooling its bytes immediately.
    pub fn add(
        &mut self,
        filename: impl Into<String>,
        payload: BinaryPayload,
        pool: &mut BinaryPool,
    ) -> Result<&AttachmentReference> {
        let filename = filename.into();
        self.check_name(&filename, None)?;
        let index = pool.put(payload);
        Ok(self.push(filename, index))
    }

    /// Link a filename to a payload that is already pooled.
    pub fn attach(
        &mut self,
        filename: impl Into<String>,
        pool_index: u32,
        pool: &BinaryPool,
    ) -> Result<&AttachmentReference> {
        let filename = filename.into();
        self.check_name(&filename, None)?;
        if !pool.contains(pool_index) {
            return Err(PoolError::ReferenceNotFound { index: pool_index });
        }
        Ok(self.push(filename, pool_index))
    }

    pub fn rename(&mut self, from: &str, to: impl Into<String>) -> Result<()> {
        let to = to.into();
        let position = self.position(from)?;
        self.check_name(&to, Some(position))?;
        self.items[position].set_filename(to);
        Ok(())
    }

    /// Remove an attachment. Its payload stays pooled until orphans are collected.
    pub fn remove(&mut self, filename: &str) -> Result<AttachmentReference> {
        let position = self.position(filename)?;
        Ok(self.items.remove(position))
    }

    pub fn get(&self, filename: &str) -> Option<&AttachmentReference> {
        self.items.iter().find(|item| item.filename() == filename)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttachmentReference> {
        self.items.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(AttachmentReference::filename)
    }

    /// Pool indices referenced by this owner.
    pub fn live_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.items.iter().map(AttachmentReference::pool_index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn apply_remap(&mut self, remap: &IndexRemap) -> Result<()> {
        for item in &mut self.items {
            item.apply_remap(remap)?;
        }
        Ok(())
    }

    fn push(&mut self, filename: String, pool_index: u32) -> &AttachmentReference {
        self.items
            .push(AttachmentReference::new(filename, pool_index));
        &self.items[self.items.len() - 1]
    }

    fn position(&self, filename: &str) -> Result<usize> {
        self.items
            .iter()
            .position(|item| item.filename() == filename)
            .ok_or_else(|| PoolError::AttachmentNotFound {
                owner: self.owner.clone(),
                filename: filename.to_string(),
            })
    }

    /// `skip` is the position being renamed, which may keep its own name.
    fn check_name(&self, filename: &str, skip: Option<usize>) -> Result<()> {
        if filename.is_empty() {
            return Err(PoolError::EmptyAttachmentName {
                owner: self.owner.clone(),
            });
        }
        let taken = self
            .items
            .iter()
            .enumerate()
            .any(|(position, item)| Some(position) != skip && item.filename() == filename);
        if taken {
            return Err(PoolError::DuplicateAttachmentName {
                owner: self.owner.clone(),
                filename: filename.to_string(),
            });
        }
        Ok(())
    }
}
