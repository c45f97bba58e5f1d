//! Document-level tests: load a KeePass XML file, edit attachments, save and reload.

use std::collections::BTreeMap;
use std::path::Path;

use kdbx_xml::{
    BinaryPool, Document, LoadOptions, OwnerId, PayloadLocation, PoolError, SaveOptions,
    XmlElement, XmlError, parse_document,
};
use proptest::prelude::*;

const SERVER_UUID: &str = "c2VydmVyLWVudHJ5LTAwMQ==";

fn fixture_path() -> &'static Path {
    Path::new(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/data/attachments.xml"
    ))
}

fn fixture() -> Vec<u8> {
    std::fs::read(fixture_path()).expect("read fixture")
}

fn load(xml: &[u8]) -> Document {
    Document::parse(xml, &LoadOptions::default()).expect("load document")
}

type Snapshot = BTreeMap<(String, String), Vec<u8>>;

/// `(owner label, filename) -> bytes` for every attachment in the document.
fn snapshot(document: &Document) -> Snapshot {
    let mut out = Snapshot::new();
    for row in document.list_attachments().unwrap() {
        let bytes = document
            .attachment_bytes(row.owner, &row.filename)
            .unwrap()
            .to_vec();
        out.insert((row.owner_label, row.filename), bytes);
    }
    out
}

/// `(Key, Ref)` of every attachment node, in document order.
fn attachment_refs(element: &XmlElement, out: &mut Vec<(String, String)>) {
    for child in element.elements() {
        if child.name == "Binary"
            && let Some(key) = child.child_text("Key")
        {
            let reference = child
                .child("Value")
                .and_then(|value| value.attribute("Ref"))
                .unwrap_or_default();
            out.push((key, reference.to_string()));
        } else {
            attachment_refs(child, out);
        }
    }
}

fn refs_of(xml: &[u8]) -> Vec<(String, String)> {
    let tree = parse_document(xml).unwrap();
    let mut out = Vec::new();
    attachment_refs(&tree, &mut out);
    out
}

fn pool_ids(xml: &[u8]) -> Vec<String> {
    let tree = parse_document(xml).unwrap();
    tree.child("Meta")
        .and_then(|meta| meta.child("Binaries"))
        .map(|binaries| {
            binaries
                .elements()
                .filter_map(|binary| binary.attribute("ID").map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn child_names(element: &XmlElement) -> Vec<&str> {
    element.elements().map(|child| child.name.as_str()).collect()
}

#[test]
fn test_fixture_exists() {
    let path = fixture_path();
    assert!(path.exists(), "Test file not found: {}", path.display());
}

#[test]
fn test_load_owners_and_labels() {
    let document = load(&fixture());
    let labels: Vec<(&str, bool)> = document
        .owners()
        .map(|owner| (owner.label(), owner.is_history()))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("Root/Personal/Server", false),
            ("Root/Personal/Server/History[0]", true),
            ("Root/Personal/Notes/Greeting", false),
            ("Root/Personal/Notes/Empty", false),
        ]
    );
    assert_eq!(document.attachment_count(), 4);
    assert_eq!(document.pool().len(), 3);
    assert_eq!(document.find_entry(SERVER_UUID).unwrap(), OwnerId(0));
}

#[test]
fn test_load_resolves_bytes() {
    let document = load(&fixture());
    let server = document.find_by_label("Root/Personal/Server").unwrap();
    assert_eq!(
        document.attachment_bytes(server, "bash_profile").unwrap(),
        b"export EDITOR=vim\n"
    );
    assert_eq!(
        document.attachment_bytes(server, "id_ed25519.pub").unwrap(),
        b"ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 admin@server\n"
    );

    // The history snapshot shares the current entry's payload.
    let history = document
        .find_by_label("Root/Personal/Server/History[0]")
        .unwrap();
    assert_eq!(
        document.attachment_bytes(history, "bash_profile").unwrap(),
        b"export EDITOR=vim\n"
    );

    let greeting = document.find_by_label("Root/Personal/Notes/Greeting").unwrap();
    assert_eq!(
        document.attachment_bytes(greeting, "hello.txt").unwrap(),
        b"Hello, World!"
    );
}

#[test]
fn test_save_compacts_gapped_pool() {
    let mut document = load(&fixture());
    let saved = document.to_xml(&SaveOptions::default()).unwrap();

    // Declared as 7, 0, 5; renumbered in declaration order.
    assert_eq!(pool_ids(&saved.xml), vec!["0", "1", "2"]);
    assert_eq!(
        refs_of(&saved.xml),
        vec![
            ("bash_profile".to_string(), "0".to_string()),
            ("id_ed25519.pub".to_string(), "1".to_string()),
            ("bash_profile".to_string(), "0".to_string()),
            ("hello.txt".to_string(), "2".to_string()),
        ]
    );
    assert_eq!(saved.payloads.len(), 3);
    assert_eq!(saved.payloads[2].bytes(), b"Hello, World!");
}

#[test]
fn test_round_trip_preserves_attachments() {
    let mut document = load(&fixture());
    let before = snapshot(&document);

    let saved = document.to_xml(&SaveOptions::default()).unwrap();
    let reloaded = load(&saved.xml);
    assert_eq!(snapshot(&reloaded), before);

    // A second save of an already compact document is stable.
    let mut reloaded = reloaded;
    let again = reloaded.to_xml(&SaveOptions::default()).unwrap();
    assert_eq!(refs_of(&again.xml), refs_of(&saved.xml));
}

#[test]
fn test_save_keeps_element_order() {
    let mut document = load(&fixture());
    let saved = document.to_xml(&SaveOptions::default()).unwrap();
    let tree = parse_document(&saved.xml).unwrap();

    let meta = tree.child("Meta").unwrap();
    assert_eq!(
        child_names(meta),
        vec!["Generator", "DatabaseName", "Binaries", "CustomData"]
    );

    let group = tree.child("Root").unwrap().child("Group").unwrap();
    let server = group.child("Entry").unwrap();
    assert_eq!(
        child_names(server),
        vec!["UUID", "String", "String", "Binary", "Binary", "AutoType", "History"]
    );
    let snapshot = server.child("History").unwrap().child("Entry").unwrap();
    assert_eq!(child_names(snapshot), vec!["UUID", "String", "Binary"]);
}

#[test]
fn test_new_attachment_lands_after_strings() {
    let mut document = load(&fixture());
    let empty = document.find_by_label("Root/Personal/Notes/Empty").unwrap();
    document
        .add_attachment(empty, "todo.txt", b"water plants".to_vec())
        .unwrap();

    let saved = document.to_xml(&SaveOptions::default()).unwrap();
    let tree = parse_document(&saved.xml).unwrap();
    let notes = tree
        .child("Root")
        .and_then(|root| root.child("Group"))
        .and_then(|group| group.child("Group"))
        .unwrap();
    let entry = notes.children_named("Entry").nth(1).unwrap();
    assert_eq!(child_names(entry), vec!["UUID", "String", "Binary", "AutoType"]);

    let reloaded = load(&saved.xml);
    let empty = reloaded.find_by_label("Root/Personal/Notes/Empty").unwrap();
    assert_eq!(
        reloaded.attachment_bytes(empty, "todo.txt").unwrap(),
        b"water plants"
    );
}

#[test]
fn test_add_deduplicates_content() {
    let mut document = load(&fixture());
    let empty = document.find_by_label("Root/Personal/Notes/Empty").unwrap();
    let index = document
        .add_attachment(empty, "copy.txt", b"Hello, World!".to_vec())
        .unwrap();
    assert_eq!(index, 5);
    assert_eq!(document.pool().len(), 3);

    // New content goes past the highest declared index.
    let fresh = document
        .add_attachment(empty, "fresh.txt", b"new".to_vec())
        .unwrap();
    assert_eq!(fresh, 8);
}

#[test]
fn test_duplicate_names_are_rejected() {
    let mut document = load(&fixture());
    let server = document.find_entry(SERVER_UUID).unwrap();

    let error = document
        .add_attachment(server, "bash_profile", b"other".to_vec())
        .unwrap_err();
    assert!(matches!(
        error,
        XmlError::Pool(PoolError::DuplicateAttachmentName { .. })
    ));

    let error = document
        .rename_attachment(server, "id_ed25519.pub", "bash_profile")
        .unwrap_err();
    assert!(matches!(
        error,
        XmlError::Pool(PoolError::DuplicateAttachmentName { .. })
    ));

    // Same name on a different owner is fine.
    let empty = document.find_by_label("Root/Personal/Notes/Empty").unwrap();
    document
        .add_attachment(empty, "bash_profile", b"other".to_vec())
        .unwrap();
}

#[test]
fn test_rename_keeps_payload() {
    let mut document = load(&fixture());
    let server = document.find_entry(SERVER_UUID).unwrap();
    document
        .rename_attachment(server, "id_ed25519.pub", "authorized_keys")
        .unwrap();

    let saved = document.to_xml(&SaveOptions::default()).unwrap();
    let reloaded = load(&saved.xml);
    let server = reloaded.find_entry(SERVER_UUID).unwrap();
    assert!(reloaded.attachment_bytes(server, "id_ed25519.pub").is_err());
    assert_eq!(
        reloaded.attachment_bytes(server, "authorized_keys").unwrap(),
        b"ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 admin@server\n"
    );
}

#[test]
fn test_remove_drops_orphan_on_save() {
    let mut document = load(&fixture());
    let greeting = document.find_by_label("Root/Personal/Notes/Greeting").unwrap();
    let removed = document.remove_attachment(greeting, "hello.txt").unwrap();
    assert_eq!(removed.pool_index(), 5);
    // Still pooled until save.
    assert_eq!(document.pool().len(), 3);

    let saved = document.to_xml(&SaveOptions::default()).unwrap();
    assert_eq!(saved.payloads.len(), 2);
    assert_eq!(pool_ids(&saved.xml), vec!["0", "1"]);
    assert_eq!(load(&saved.xml).attachment_count(), 3);
}

#[test]
fn test_shared_payload_survives_partial_removal() {
    let mut document = load(&fixture());
    let server = document.find_entry(SERVER_UUID).unwrap();
    document.remove_attachment(server, "bash_profile").unwrap();
    assert_eq!(document.collect_orphans(), 0);

    let saved = document.to_xml(&SaveOptions::default()).unwrap();
    let reloaded = load(&saved.xml);
    let history = reloaded
        .find_by_label("Root/Personal/Server/History[0]")
        .unwrap();
    assert_eq!(
        reloaded.attachment_bytes(history, "bash_profile").unwrap(),
        b"export EDITOR=vim\n"
    );
}

#[test]
fn test_collect_orphans() {
    let mut document = load(&fixture());
    let greeting = document.find_by_label("Root/Personal/Notes/Greeting").unwrap();
    document.remove_attachment(greeting, "hello.txt").unwrap();
    assert_eq!(document.collect_orphans(), 1);
    assert_eq!(document.pool().len(), 2);
    assert!(!document.pool().contains(5));
}

#[test]
fn test_dangling_reference_fails_load() {
    let xml = String::from_utf8(fixture())
        .unwrap()
        .replace(r#"<Value Ref="5" />"#, r#"<Value Ref="99" />"#);
    let error = Document::parse(xml.as_bytes(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(
        error,
        XmlError::Pool(PoolError::ReferenceNotFound { index: 99 })
    ));
    assert!(!error.is_structural());
}

#[test]
fn test_malformed_reference_names_owner() {
    let xml = String::from_utf8(fixture())
        .unwrap()
        .replace(r#"<Value Ref="5" />"#, r#"<Value Ref="five" />"#);
    match Document::parse(xml.as_bytes(), &LoadOptions::default()).unwrap_err() {
        XmlError::MalformedIndex {
            owner,
            filename,
            value,
        } => {
            assert_eq!(owner, "Root/Personal/Notes/Greeting");
            assert_eq!(filename, "hello.txt");
            assert_eq!(value, "five");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_duplicate_pool_id_fails_load() {
    let xml = String::from_utf8(fixture())
        .unwrap()
        .replace(r#"<Binary ID="5">"#, r#"<Binary ID="0">"#);
    let error = Document::parse(xml.as_bytes(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(
        error,
        XmlError::Pool(PoolError::DuplicatePoolIndex { index: 0 })
    ));
}

#[test]
fn test_duplicate_filename_in_source_fails_load() {
    let xml = br#"<KeePassFile>
        <Meta><Binaries><Binary ID="0">SGVsbG8sIFdvcmxkIQ==</Binary></Binaries></Meta>
        <Root><Group><Name>G</Name><Entry>
            <UUID>dXVpZA==</UUID>
            <Binary><Key>a.txt</Key><Value Ref="0" /></Binary>
            <Binary><Key>a.txt</Key><Value Ref="0" /></Binary>
        </Entry></Group></Root>
    </KeePassFile>"#;
    let error = Document::parse(xml, &LoadOptions::default()).unwrap_err();
    assert!(matches!(
        error,
        XmlError::Pool(PoolError::DuplicateAttachmentName { .. })
    ));
}

#[test]
fn test_pool_declared_after_references() {
    let xml = br#"<KeePassFile>
        <Root><Group><Name>G</Name><Entry>
            <UUID>dXVpZA==</UUID>
            <Binary><Key>hello.txt</Key><Value Ref="3" /></Binary>
        </Entry></Group></Root>
        <Meta><Binaries><Binary ID="3">SGVsbG8sIFdvcmxkIQ==</Binary></Binaries></Meta>
    </KeePassFile>"#;
    let document = load(xml);
    let entry = document.find_entry("dXVpZA==").unwrap();
    assert_eq!(
        document.attachment_bytes(entry, "hello.txt").unwrap(),
        b"Hello, World!"
    );
}

const INLINE_XML: &[u8] = br#"<KeePassFile>
    <Meta><Binaries><Binary ID="0">SGVsbG8sIFdvcmxkIQ==</Binary></Binaries></Meta>
    <Root><Group><Name>G</Name><Entry>
        <UUID>dXVpZA==</UUID>
        <Binary><Key>hello.txt</Key><Value Ref="0" /></Binary>
        <Binary><Key>note.txt</Key><Value>bGVnYWN5IG5vdGU=</Value></Binary>
        <Binary><Key>copy.txt</Key><Value>SGVsbG8sIFdvcmxkIQ==</Value></Binary>
    </Entry></Group></Root>
</KeePassFile>"#;

#[test]
fn test_inline_values_are_pooled() {
    let mut document = load(INLINE_XML);
    let entry = document.find_entry("dXVpZA==").unwrap();
    assert_eq!(
        document.attachment_bytes(entry, "note.txt").unwrap(),
        b"legacy note"
    );
    // Identical inline content joins the declared payload.
    assert_eq!(document.pool().len(), 2);

    let saved = document.to_xml(&SaveOptions::default()).unwrap();
    assert_eq!(
        refs_of(&saved.xml),
        vec![
            ("hello.txt".to_string(), "0".to_string()),
            ("note.txt".to_string(), "1".to_string()),
            ("copy.txt".to_string(), "0".to_string()),
        ]
    );
}

#[test]
fn test_inline_values_can_be_rejected() {
    let options = LoadOptions::default().with_inline_values(false);
    let error = Document::parse(INLINE_XML, &options).unwrap_err();
    assert!(matches!(error, XmlError::InlineValueRejected { .. }));
    assert!(error.is_structural());
}

#[test]
fn test_external_pool_round_trip() {
    let mut document = load(&fixture());
    let before = snapshot(&document);
    let options = SaveOptions::default().with_payload_location(PayloadLocation::External);
    let saved = document.to_xml(&options).unwrap();

    let tree = parse_document(&saved.xml).unwrap();
    assert!(tree.child("Meta").unwrap().child("Binaries").is_none());
    assert_eq!(saved.payloads.len(), 3);

    let pool = BinaryPool::from_payloads(saved.payloads);
    let reloaded = Document::parse_with_pool(&saved.xml, pool, &LoadOptions::default()).unwrap();
    assert_eq!(snapshot(&reloaded), before);
}

#[test]
fn test_external_pool_missing_payload() {
    let mut document = load(&fixture());
    let options = SaveOptions::default().with_payload_location(PayloadLocation::External);
    let saved = document.to_xml(&options).unwrap();

    let mut payloads = saved.payloads;
    payloads.pop();
    let pool = BinaryPool::from_payloads(payloads);
    let error = Document::parse_with_pool(&saved.xml, pool, &LoadOptions::default()).unwrap_err();
    assert!(matches!(
        error,
        XmlError::Pool(PoolError::ReferenceNotFound { index: 2 })
    ));
}

#[test]
fn test_uncompressed_save() {
    let mut document = load(&fixture());
    let saved = document
        .to_xml(&SaveOptions::default().with_compression(false))
        .unwrap();
    let tree = parse_document(&saved.xml).unwrap();
    let binaries = tree.child("Meta").unwrap().child("Binaries").unwrap();
    assert!(
        binaries
            .elements()
            .all(|binary| binary.attribute("Compressed").is_none())
    );
    assert_eq!(
        binaries.elements().nth(2).unwrap().text(),
        "SGVsbG8sIFdvcmxkIQ=="
    );
}

const TWIN_TITLES: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<KeePassFile>
	<Meta>
		<Binaries>
			<Binary ID="0">eA==</Binary>
		</Binaries>
	</Meta>
	<Root>
		<Group>
			<Name>G</Name>
			<Entry>
				<UUID>dHdpbi1vbmU=</UUID>
				<String><Key>Title</Key><Value>T</Value></String>
				<Binary><Key>x</Key><Value Ref="0" /></Binary>
			</Entry>
			<Entry>
				<UUID>dHdpbi10d28=</UUID>
				<String><Key>Title</Key><Value>T</Value></String>
				<Binary><Key>x</Key><Value Ref="0" /></Binary>
			</Entry>
		</Group>
	</Root>
</KeePassFile>
"#;

#[test]
fn test_shared_label_is_ambiguous() {
    let document = load(TWIN_TITLES.as_bytes());
    match document.find_by_label("Root/G/T").unwrap_err() {
        XmlError::AmbiguousOwner { query, matches } => {
            assert_eq!(query, "Root/G/T");
            assert_eq!(matches, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Each entry is still reachable through its UUID.
    let first = document.find_entry("dHdpbi1vbmU=").unwrap();
    let second = document.find_entry("dHdpbi10d28=").unwrap();
    assert_ne!(first, second);
    assert_eq!(document.owner(second).unwrap().label(), "Root/G/T");
}

#[test]
fn test_unknown_owner() {
    let mut document = load(&fixture());
    assert!(matches!(
        document.find_entry("bm90LWEtcmVhbC11dWlk").unwrap_err(),
        XmlError::OwnerNotFound { .. }
    ));
    assert!(matches!(
        document
            .add_attachment(OwnerId(42), "x", b"x".to_vec())
            .unwrap_err(),
        XmlError::OwnerNotFound { .. }
    ));
}

proptest! {
    #[test]
    fn prop_added_attachments_survive_save(
        contents in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..6),
        compress in any::<bool>(),
    ) {
        let mut document = load(&fixture());
        let empty = document.find_by_label("Root/Personal/Notes/Empty").unwrap();
        for (position, bytes) in contents.iter().enumerate() {
            document
                .add_attachment(empty, &format!("file{position}.bin"), bytes.clone())
                .unwrap();
        }
        let before = snapshot(&document);

        let saved = document
            .to_xml(&SaveOptions::default().with_compression(compress))
            .unwrap();
        let reloaded = load(&saved.xml);
        prop_assert_eq!(snapshot(&reloaded), before);

        let ids = pool_ids(&saved.xml);
        let expected: Vec<String> = (0..ids.len()).map(|index| index.to_string()).collect();
        prop_assert_eq!(ids, expected);
    }
}
