//! Per-operation mapping contexts.
//!
//! A [`LoadContext`] lives for exactly one document load. Node mappings feed
//! it payload declarations and pending references in whatever order the
//! document presents them; [`LoadContext::resolve_all`] consumes it once the
//! structural parse is complete. Because resolution takes the context by
//! value, resolving twice or registering after resolution does not compile.
//!
//! A [`SaveContext`] borrows a document's pool and owners for one save pass.

use std::collections::BTreeMap;

use tracing::debug;

use crate::attachments::{Attachments, OwnerId};
use crate::error::Result;
use crate::payload::BinaryPayload;
use crate::pool::BinaryPool;
use crate::resolver::{self, PendingReference, PendingSource, SavePlan};

/// Load-time state: the pool being populated and the pending-reference table.
#[derive(Debug, Default)]
pub struct LoadContext {
    pool: BinaryPool,
    pending: Vec<PendingReference>,
    owners: BTreeMap<OwnerId, Attachments>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a pool the container already decoded (KDBX 4 inner header).
    pub fn with_pool(pool: BinaryPool) -> Self {
        Self {
            pool,
            ..Self::default()
        }
    }

    /// Declare an owner so it is present after resolution even without attachments.
    pub fn register_owner(&mut self, owner: OwnerId, label: impl Into<String>) {
        self.owners
            .entry(owner)
            .or_insert_with(|| Attachments::new(label));
    }

    /// Record a payload node declared by the document.
    pub fn register_payload(&mut self, index: u32, payload: BinaryPayload) -> Result<()> {
        debug!(index, len = payload.len(), "registered pool payload");
        self.pool.insert_at(index, payload)
    }

    /// Record an attachment node that names its payload by raw index.
    pub fn register_pending(
        &mut self,
        owner: OwnerId,
        filename: impl Into<String>,
        raw_index: u32,
    ) {
        self.pending.push(PendingReference::new(
            owner,
            filename.into(),
            PendingSource::Index(raw_index),
        ));
    }

    /// Record an attachment node that carries its bytes inline.
    ///
    /// The bytes are pooled during resolution, after every declared index is known.
    pub fn register_inline(
        &mut self,
        owner: OwnerId,
        filename: impl Into<String>,
        payload: BinaryPayload,
    ) {
        self.pending.push(PendingReference::new(
            owner,
            filename.into(),
            PendingSource::Inline(payload),
        ));
    }

    pub fn pending(&self) -> &[PendingReference] {
        &self.pending
    }

    pub fn pool(&self) -> &BinaryPool {
        &self.pool
    }

    /// Bind every pending reference and hand the pool over to the caller.
    pub fn resolve_all(self) -> Result<Resolved> {
        let Self {
            mut pool,
            pending,
            mut owners,
        } = self;
        resolver::resolve_pending(&mut pool, pending, &mut owners)?;
        Ok(Resolved { pool, owners })
    }
}

/// Result of a completed load: the document's pool and each owner's attachments.
#[derive(Debug)]
pub struct Resolved {
    pub pool: BinaryPool,
    pub owners: BTreeMap<OwnerId, Attachments>,
}

/// Save-time state for one pass over a document.
#[derive(Debug)]
pub struct SaveContext<'doc> {
    pool: &'doc mut BinaryPool,
    owners: Vec<&'doc mut Attachments>,
}

impl<'doc> SaveContext<'doc> {
    pub fn new(
        pool: &'doc mut BinaryPool,
        owners: impl IntoIterator<Item = &'doc mut Attachments>,
    ) -> Self {
        Self {
            pool,
            owners: owners.into_iter().collect(),
        }
    }

    /// Drop orphans, compact the pool and remap every owner's references.
    pub fn prepare(mut self) -> Result<SavePlan> {
        resolver::prepare_save(self.pool, &mut self.owners)
    }
}
