//! Pool resolution: binding pending references on load, compacting on save.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, error, info};

use crate::attachments::{Attachments, OwnerId};
use crate::error::Result;
use crate::payload::BinaryPayload;
use crate::pool::{BinaryPool, IndexRemap};

/// Where a pending reference gets its bytes from.
#[derive(Debug, Clone)]
pub enum PendingSource {
    /// A raw pool index read from the document.
    Index(u32),
    /// Bytes stored inline on the reference node itself.
    Inline(BinaryPayload),
}

/// An attachment seen during structural parse, not yet bound to the pool.
#[derive(Debug, Clone)]
pub struct PendingReference {
    owner: OwnerId,
    filename: String,
    source: PendingSource,
}

impl PendingReference {
    pub(crate) fn new(owner: OwnerId, filename: String, source: PendingSource) -> Self {
        Self {
            owner,
            filename,
            source,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn source(&self) -> &PendingSource {
        &self.source
    }
}

/// Bind pending references against a fully populated pool.
///
/// Every raw index is validated before any inline payload is pooled, so an
/// inline payload can never satisfy a dangling index by accident.
pub(crate) fn resolve_pending(
    pool: &mut BinaryPool,
    pending: Vec<PendingReference>,
    owners: &mut BTreeMap<OwnerId, Attachments>,
) -> Result<usize> {
    for reference in &pending {
        if let PendingSource::Index(index) = reference.source
            && let Err(err) = pool.get(index)
        {
            error!(
                owner = %reference.owner,
                filename = %reference.filename,
                index,
                "dangling binary reference"
            );
            return Err(err);
        }
    }

    let resolved = pending.len();
    for reference in pending {
        let index = match reference.source {
            PendingSource::Index(index) => index,
            PendingSource::Inline(payload) => pool.put(payload),
        };
        let attachments = owners
            .entry(reference.owner)
            .or_insert_with(|| Attachments::new(reference.owner.to_string()));
        attachments.attach(reference.filename, index, pool)?;
    }
    debug!(resolved, payloads = pool.len(), "resolved binary references");
    Ok(resolved)
}

/// Outcome of the save step: the pool's final payload order and how indices moved.
#[derive(Debug, Clone)]
pub struct SavePlan {
    payloads: Vec<(u32, BinaryPayload)>,
    remap: IndexRemap,
    orphans_removed: usize,
}

impl SavePlan {
    /// Payloads in post-compaction order with their final indices.
    pub fn payloads(&self) -> &[(u32, BinaryPayload)] {
        &self.payloads
    }

    pub fn into_payloads(self) -> Vec<BinaryPayload> {
        self.payloads
            .into_iter()
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn remap(&self) -> &IndexRemap {
        &self.remap
    }

    pub fn orphans_removed(&self) -> usize {
        self.orphans_removed
    }
}

/// Drop orphaned payloads, compact the pool and move every reference along.
pub(crate) fn prepare_save(
    pool: &mut BinaryPool,
    owners: &mut [&mut Attachments],
) -> Result<SavePlan> {
    let live: BTreeSet<u32> = owners
        .iter()
        .flat_map(|attachments| attachments.live_indices())
        .collect();
    for &index in &live {
        pool.get(index)?;
    }

    let orphans_removed = pool.remove_unreferenced(&live);
    let remap = pool.compact();
    for attachments in owners.iter_mut() {
        attachments.apply_remap(&remap)?;
    }

    let payloads: Vec<(u32, BinaryPayload)> = pool
        .iter()
        .map(|(index, payload)| (index, payload.clone()))
        .collect();
    info!(
        payloads = payloads.len(),
        orphans_removed,
        renumbered = !remap.is_identity(),
        "prepared binary pool for save"
    );
    Ok(SavePlan {
        payloads,
        remap,
        orphans_removed,
    })
}
