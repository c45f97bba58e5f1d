//! Command implementations. Each loads a document, applies one change and
//! writes the result back.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use kdbx_pool::OwnerId;
use kdbx_xml::{AttachmentListing, Document, LoadOptions, SaveOptions, XmlError};
use tempfile::NamedTempFile;
use tracing::{info, info_span};

/// Outcome of [`run_compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSummary {
    pub payloads_before: usize,
    pub payloads_after: usize,
    pub orphans_removed: usize,
}

pub fn load_document(path: &Path, options: &LoadOptions) -> Result<Document> {
    let xml = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Document::parse(&xml, options)
        .map_err(with_suggestion)
        .with_context(|| format!("load {}", path.display()))
}

/// Serialize `document` and replace `path` in one step.
pub fn save_document(document: &mut Document, path: &Path, options: &SaveOptions) -> Result<()> {
    let saved = document
        .to_xml(options)
        .map_err(with_suggestion)
        .context("serialize document")?;

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(directory)
        .with_context(|| format!("create temporary file in {}", directory.display()))?;
    file.write_all(&saved.xml).context("write document")?;
    file.flush().context("flush document")?;
    file.persist(path)
        .with_context(|| format!("replace {}", path.display()))?;
    info!(path = %path.display(), bytes = saved.xml.len(), "wrote document");
    Ok(())
}

/// Find an entry by UUID, falling back to its label (`Root/Group/Title`).
pub fn select_owner(document: &Document, selector: &str) -> Result<OwnerId> {
    if let Ok(owner) = document.find_entry(selector) {
        return Ok(owner);
    }
    document
        .find_by_label(selector)
        .map_err(|error| match error {
            XmlError::OwnerNotFound { .. } => anyhow!(
                "no entry matches '{selector}' (use a UUID or a path like Root/Group/Title)"
            ),
            other => with_suggestion(other),
        })
}

pub fn run_list(input: &Path) -> Result<Vec<AttachmentListing>> {
    let document = load_document(input, &LoadOptions::default())?;
    document.list_attachments().map_err(with_suggestion)
}

/// Write one attachment's bytes to `output`. Returns the number of bytes written.
pub fn run_extract(input: &Path, selector: &str, name: &str, output: &Path) -> Result<usize> {
    let span = info_span!("extract", file = name);
    let _guard = span.enter();

    let document = load_document(input, &LoadOptions::default())?;
    let owner = select_owner(&document, selector)?;
    let bytes = document
        .attachment_bytes(owner, name)
        .map_err(with_suggestion)?;
    fs::write(output, bytes).with_context(|| format!("write {}", output.display()))?;
    info!(output = %output.display(), bytes = bytes.len(), "extracted attachment");
    Ok(bytes.len())
}

/// Attach the contents of `source`. Returns the pool index the content was stored under.
pub fn run_add(
    input: &Path,
    selector: &str,
    source: &Path,
    name: Option<&str>,
    output: &Path,
    options: &SaveOptions,
) -> Result<u32> {
    let name = match name {
        Some(name) => name.to_string(),
        None => source
            .file_name()
            .map(|file_name| file_name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("{} has no file name; pass --name", source.display()))?,
    };
    let span = info_span!("add", file = %name);
    let _guard = span.enter();

    let bytes = fs::read(source).with_context(|| format!("read {}", source.display()))?;
    let mut document = load_document(input, &LoadOptions::default())?;
    let owner = select_owner(&document, selector)?;
    let index = document
        .add_attachment(owner, &name, bytes)
        .map_err(with_suggestion)?;
    save_document(&mut document, output, options)?;
    Ok(index)
}

pub fn run_remove(
    input: &Path,
    selector: &str,
    name: &str,
    output: &Path,
    options: &SaveOptions,
) -> Result<()> {
    let mut document = load_document(input, &LoadOptions::default())?;
    let owner = select_owner(&document, selector)?;
    document
        .remove_attachment(owner, name)
        .map_err(with_suggestion)?;
    save_document(&mut document, output, options)
}

pub fn run_rename(
    input: &Path,
    selector: &str,
    from: &str,
    to: &str,
    output: &Path,
    options: &SaveOptions,
) -> Result<()> {
    let mut document = load_document(input, &LoadOptions::default())?;
    let owner = select_owner(&document, selector)?;
    document
        .rename_attachment(owner, from, to)
        .map_err(with_suggestion)?;
    save_document(&mut document, output, options)
}

/// Drop orphaned payloads and renumber the pool.
pub fn run_compact(input: &Path, output: &Path, options: &SaveOptions) -> Result<CompactSummary> {
    let mut document = load_document(input, &LoadOptions::default())?;
    let payloads_before = document.pool().len();
    let orphans_removed = document.collect_orphans();
    save_document(&mut document, output, options)?;
    Ok(CompactSummary {
        payloads_before,
        payloads_after: document.pool().len(),
        orphans_removed,
    })
}

/// Fold the library's hint into the message shown to the user.
fn with_suggestion(error: XmlError) -> anyhow::Error {
    match error.suggestion() {
        Some(hint) => anyhow!("{error} ({hint})"),
        None => anyhow::Error::new(error),
    }
}
