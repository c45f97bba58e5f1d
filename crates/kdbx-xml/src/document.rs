//! KeePass XML documents with pooled attachments.
//!
//! Loading strips attachment nodes and the `<Meta><Binaries>` pool out of the
//! element tree and resolves them through a [`LoadContext`]. The remaining
//! elements keep their order, attributes and text; comments, processing
//! instructions and the DOCTYPE are dropped and CDATA sections come back as
//! escaped text. Saving compacts the pool and writes the attachment nodes back
//! at the position they were read from.

use std::collections::BTreeSet;

use kdbx_pool::{
    AttachmentReference, Attachments, BinaryPayload, BinaryPool, Fingerprint, LoadContext,
    OwnerId, PoolError, Resolved, SaveContext,
};
use tracing::{debug, info, info_span};

use crate::element::{XmlElement, XmlNode, parse_document, write_document};
use crate::error::{Result, XmlError};
use crate::mapping::{BinaryRefNode, BinaryValue, ElementMapping, PayloadNode};
use crate::options::{LoadOptions, PayloadLocation, SaveOptions};

const POOL_LOCATION: &str = "Meta/Binaries";

/// An entry (or one history snapshot of an entry) that owns attachments.
#[derive(Debug, Clone)]
pub struct AttachmentOwner {
    id: OwnerId,
    label: String,
    uuid: Option<String>,
    history: bool,
    /// Child positions from the document root to the entry element.
    element_path: Vec<usize>,
    /// Position among the entry's children where attachment nodes go.
    slot: usize,
    attachments: Attachments,
}

impl AttachmentOwner {
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Group path and entry title, e.g. `Root/General/Server`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn is_history(&self) -> bool {
        self.history
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }
}

/// One row of [`Document::list_attachments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentListing {
    pub owner: OwnerId,
    pub owner_label: String,
    pub history: bool,
    pub filename: String,
    pub pool_index: u32,
    pub size: usize,
    pub fingerprint: Fingerprint,
}

/// Output of a save.
#[derive(Debug, Clone)]
pub struct SavedDocument {
    pub xml: Vec<u8>,
    /// Payloads in final index order. Containers that keep the pool outside
    /// the XML write these themselves.
    pub payloads: Vec<BinaryPayload>,
}

/// A loaded KeePass XML document.
#[derive(Debug)]
pub struct Document {
    tree: XmlElement,
    owners: Vec<AttachmentOwner>,
    pool: BinaryPool,
    /// Position of `<Binaries>` within `<Meta>` when the source had one.
    binaries_slot: Option<usize>,
}

impl Document {
    /// Load a document that keeps its pool in `<Meta><Binaries>`.
    pub fn parse(xml: &[u8], options: &LoadOptions) -> Result<Self> {
        Self::load(xml, LoadContext::new(), options)
    }

    /// Load a document whose pool was decoded by the container (KDBX 4).
    pub fn parse_with_pool(xml: &[u8], pool: BinaryPool, options: &LoadOptions) -> Result<Self> {
        Self::load(xml, LoadContext::with_pool(pool), options)
    }

    fn load(xml: &[u8], mut context: LoadContext, options: &LoadOptions) -> Result<Self> {
        let span = info_span!("load_document");
        let _guard = span.enter();

        let mut tree = parse_document(xml)?;
        let binaries_slot = read_pool(&mut tree, &mut context)?;

        let mut owners = Vec::new();
        if let Some(position) = tree.position_of("Root")
            && let Some(XmlNode::Element(root)) = tree.children.get_mut(position)
        {
            let mut walker = OwnerWalker {
                context: &mut context,
                owners: &mut owners,
                options,
            };
            walker.walk_children(root, &mut vec![position], "Root")?;
        }

        let Resolved {
            pool,
            owners: mut resolved,
        } = context.resolve_all()?;
        for owner in &mut owners {
            if let Some(attachments) = resolved.remove(&owner.id) {
                owner.attachments = attachments;
            }
        }

        let document = Self {
            tree,
            owners,
            pool,
            binaries_slot,
        };
        info!(
            owners = document.owners.len(),
            attachments = document.attachment_count(),
            payloads = document.pool.len(),
            "loaded document"
        );
        Ok(document)
    }

    /// Compact the pool and serialize the document.
    pub fn to_xml(&mut self, options: &SaveOptions) -> Result<SavedDocument> {
        let span = info_span!("save_document");
        let _guard = span.enter();

        let plan = SaveContext::new(
            &mut self.pool,
            self.owners.iter_mut().map(|owner| &mut owner.attachments),
        )
        .prepare()?;

        let mut tree = self.tree.clone();
        // Deepest paths first, so an insertion never shifts a path still to be visited.
        let mut order: Vec<&AttachmentOwner> = self.owners.iter().collect();
        order.sort_by(|a, b| b.element_path.cmp(&a.element_path));
        for owner in order {
            let entry = tree.descend_mut(&owner.element_path).ok_or_else(|| {
                XmlError::MissingElement {
                    element: "Entry",
                    location: owner.label.clone(),
                }
            })?;
            let nodes = owner
                .attachments
                .iter()
                .map(|reference| {
                    BinaryRefNode::from_reference(reference)
                        .to_element()
                        .map(XmlNode::Element)
                })
                .collect::<Result<Vec<_>>>()?;
            let slot = owner.slot.min(entry.children.len());
            entry.children.splice(slot..slot, nodes);
        }

        if options.payload_location == PayloadLocation::Meta {
            write_pool(
                &mut tree,
                plan.payloads(),
                options.compress_payloads,
                self.binaries_slot,
            )?;
        }

        let xml = write_document(&tree)?;
        info!(
            bytes = xml.len(),
            payloads = plan.payloads().len(),
            orphans_removed = plan.orphans_removed(),
            "saved document"
        );
        Ok(SavedDocument {
            xml,
            payloads: plan.into_payloads(),
        })
    }

    pub fn pool(&self) -> &BinaryPool {
        &self.pool
    }

    /// The element tree with attachment nodes and the pool stripped out.
    pub fn tree(&self) -> &XmlElement {
        &self.tree
    }

    pub fn owners(&self) -> impl Iterator<Item = &AttachmentOwner> {
        self.owners.iter()
    }

    pub fn owner(&self, id: OwnerId) -> Result<&AttachmentOwner> {
        self.owners
            .get(id.0)
            .ok_or_else(|| XmlError::OwnerNotFound {
                query: id.to_string(),
            })
    }

    /// Current (non-history) entry with the given UUID text.
    pub fn find_entry(&self, uuid: &str) -> Result<OwnerId> {
        self.owners
            .iter()
            .find(|owner| !owner.history && owner.uuid() == Some(uuid))
            .map(AttachmentOwner::id)
            .ok_or_else(|| XmlError::OwnerNotFound {
                query: uuid.to_string(),
            })
    }

    /// Owner with the given label, e.g. `Root/General/Server`.
    ///
    /// Sibling entries may share a title, so a label that names more than one
    /// owner is an error rather than a guess.
    pub fn find_by_label(&self, label: &str) -> Result<OwnerId> {
        let mut matching = self.owners.iter().filter(|owner| owner.label == label);
        let first = matching.next().ok_or_else(|| XmlError::OwnerNotFound {
            query: label.to_string(),
        })?;
        let others = matching.count();
        if others > 0 {
            return Err(XmlError::AmbiguousOwner {
                query: label.to_string(),
                matches: others + 1,
            });
        }
        Ok(first.id)
    }

    /// Attach new bytes to an owner. Identical content shares a pool entry.
    pub fn add_attachment(
        &mut self,
        owner: OwnerId,
        filename: &str,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<u32> {
        let entry = owner_entry(&mut self.owners, owner)?;
        let reference = entry
            .attachments
            .add(filename, BinaryPayload::new(bytes), &mut self.pool)?;
        debug!(owner = %entry.label, filename, index = reference.pool_index(), "added attachment");
        Ok(reference.pool_index())
    }

    /// Detach a file. Its payload stays pooled until the next save or
    /// [`collect_orphans`](Self::collect_orphans).
    pub fn remove_attachment(
        &mut self,
        owner: OwnerId,
        filename: &str,
    ) -> Result<AttachmentReference> {
        let entry = owner_entry(&mut self.owners, owner)?;
        let removed = entry.attachments.remove(filename)?;
        debug!(owner = %entry.label, filename, "removed attachment");
        Ok(removed)
    }

    pub fn rename_attachment(&mut self, owner: OwnerId, from: &str, to: &str) -> Result<()> {
        let entry = owner_entry(&mut self.owners, owner)?;
        entry.attachments.rename(from, to)?;
        debug!(owner = %entry.label, from, to, "renamed attachment");
        Ok(())
    }

    pub fn attachment_bytes(&self, owner: OwnerId, filename: &str) -> Result<&[u8]> {
        let entry = self.owner(owner)?;
        let reference = entry.attachments.get(filename).ok_or_else(|| {
            PoolError::AttachmentNotFound {
                owner: entry.label.clone(),
                filename: filename.to_string(),
            }
        })?;
        Ok(reference.bytes(&self.pool)?)
    }

    /// Every attachment of every owner, in document order.
    pub fn list_attachments(&self) -> Result<Vec<AttachmentListing>> {
        let mut rows = Vec::new();
        for owner in &self.owners {
            for reference in owner.attachments.iter() {
                let payload = reference.payload(&self.pool)?;
                rows.push(AttachmentListing {
                    owner: owner.id,
                    owner_label: owner.label.clone(),
                    history: owner.history,
                    filename: reference.filename().to_string(),
                    pool_index: reference.pool_index(),
                    size: payload.len(),
                    fingerprint: payload.fingerprint(),
                });
            }
        }
        Ok(rows)
    }

    pub fn attachment_count(&self) -> usize {
        self.owners.iter().map(|owner| owner.attachments.len()).sum()
    }

    /// Drop payloads no attachment refers to. Returns the number dropped.
    pub fn collect_orphans(&mut self) -> usize {
        let live: BTreeSet<u32> = self
            .owners
            .iter()
            .flat_map(|owner| owner.attachments.live_indices())
            .collect();
        self.pool.remove_unreferenced(&live)
    }
}

fn owner_entry(owners: &mut [AttachmentOwner], id: OwnerId) -> Result<&mut AttachmentOwner> {
    owners.get_mut(id.0).ok_or_else(|| XmlError::OwnerNotFound {
        query: id.to_string(),
    })
}

/// Register every `<Meta><Binaries>` payload and remove the pool from the tree.
fn read_pool(tree: &mut XmlElement, context: &mut LoadContext) -> Result<Option<usize>> {
    let Some(meta) = tree.child_mut("Meta") else {
        return Ok(None);
    };
    let (slot, containers) = meta.take_children("Binaries");
    let mut declared = 0usize;
    for binaries in &containers {
        for element in binaries.children_named(PayloadNode::ELEMENT) {
            let node = PayloadNode::from_element(element, POOL_LOCATION)?;
            context.register_payload(node.index, node.payload)?;
            declared += 1;
        }
    }
    debug!(declared, "read pool payloads");
    Ok(slot)
}

fn write_pool(
    tree: &mut XmlElement,
    payloads: &[(u32, BinaryPayload)],
    compressed: bool,
    slot: Option<usize>,
) -> Result<()> {
    if payloads.is_empty() && slot.is_none() {
        return Ok(());
    }
    let mut binaries = XmlElement::new("Binaries");
    for (index, payload) in payloads {
        let node = PayloadNode {
            index: *index,
            compressed,
            payload: payload.clone(),
        };
        binaries.children.push(XmlNode::Element(node.to_element()?));
    }

    if tree.position_of("Meta").is_none() {
        tree.children
            .insert(0, XmlNode::Element(XmlElement::new("Meta")));
    }
    if let Some(meta) = tree.child_mut("Meta") {
        let position = slot
            .unwrap_or(meta.children.len())
            .min(meta.children.len());
        meta.children.insert(position, XmlNode::Element(binaries));
    }
    Ok(())
}

struct OwnerWalker<'a> {
    context: &'a mut LoadContext,
    owners: &'a mut Vec<AttachmentOwner>,
    options: &'a LoadOptions,
}

impl OwnerWalker<'_> {
    fn walk_children(
        &mut self,
        parent: &mut XmlElement,
        path: &mut Vec<usize>,
        label: &str,
    ) -> Result<()> {
        for (position, node) in parent.children.iter_mut().enumerate() {
            let XmlNode::Element(element) = node else {
                continue;
            };
            path.push(position);
            match element.name.as_str() {
                "Group" => {
                    let name = element.child_text("Name").unwrap_or_default();
                    self.walk_children(element, path, &format!("{label}/{name}"))?;
                }
                "Entry" => {
                    let entry_label = format!("{label}/{}", entry_name(element));
                    self.read_entry(element, path, entry_label, false)?;
                }
                _ => {}
            }
            path.pop();
        }
        Ok(())
    }

    fn read_entry(
        &mut self,
        entry: &mut XmlElement,
        path: &mut Vec<usize>,
        label: String,
        history: bool,
    ) -> Result<()> {
        let id = OwnerId(self.owners.len());
        let (first, nodes) = entry.take_children(BinaryRefNode::ELEMENT);
        let slot = first.unwrap_or_else(|| default_slot(entry));

        self.context.register_owner(id, label.as_str());
        for element in &nodes {
            let node = BinaryRefNode::from_element(element, &label)?;
            debug!(owner = %label, filename = %node.filename, "read attachment node");
            match node.value {
                BinaryValue::Ref(index) => self.context.register_pending(id, node.filename, index),
                BinaryValue::Inline(payload) if self.options.accept_inline_values => {
                    self.context.register_inline(id, node.filename, payload);
                }
                BinaryValue::Inline(_) => {
                    return Err(XmlError::InlineValueRejected {
                        owner: label,
                        filename: node.filename,
                    });
                }
            }
        }

        self.owners.push(AttachmentOwner {
            id,
            label: label.clone(),
            uuid: entry.child_text("UUID"),
            history,
            element_path: path.clone(),
            slot,
            attachments: Attachments::new(label.as_str()),
        });

        if let Some(position) = entry.position_of("History")
            && let Some(XmlNode::Element(snapshots)) = entry.children.get_mut(position)
        {
            path.push(position);
            let mut generation = 0usize;
            for (child, node) in snapshots.children.iter_mut().enumerate() {
                let XmlNode::Element(snapshot) = node else {
                    continue;
                };
                if snapshot.name != "Entry" {
                    continue;
                }
                path.push(child);
                self.read_entry(snapshot, path, format!("{label}/History[{generation}]"), true)?;
                path.pop();
                generation += 1;
            }
            path.pop();
        }
        Ok(())
    }
}

/// Entry title, falling back to its UUID.
fn entry_name(entry: &XmlElement) -> String {
    entry
        .children_named("String")
        .find(|field| field.child_text("Key").as_deref() == Some("Title"))
        .and_then(|field| field.child_text("Value"))
        .filter(|title| !title.is_empty())
        .or_else(|| entry.child_text("UUID"))
        .unwrap_or_default()
}

/// Where attachments go on an entry that has none yet: after the last
/// `String` field, otherwise before `AutoType`/`History`, otherwise last.
fn default_slot(entry: &XmlElement) -> usize {
    let last_string = entry
        .children
        .iter()
        .rposition(|node| matches!(node, XmlNode::Element(element) if element.name == "String"));
    match last_string {
        Some(position) => position + 1,
        None => ["AutoType", "History"]
            .iter()
            .filter_map(|name| entry.position_of(name))
            .min()
            .unwrap_or(entry.children.len()),
    }
}
