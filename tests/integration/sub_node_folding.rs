use super::test_utils::{content, info, saved_fs};
use vault_tx::repository::{MemorySession, Node, Session};
use vault_tx::{InfoKind, InputSource, Transaction, VaultFileSystem, VaultFs};

const DOC_WITH_RESOURCE: &str = r#"<jcr:root xmlns:jcr="http://www.jcp.org/jcr/1.0" jcr:primaryType="nt:unstructured">
    <b jcr:primaryType="nt:resource"/>
</jcr:root>"#;

const DOC_WITH_ORDERING_ENTRY: &str = r#"<jcr:root xmlns:jcr="http://www.jcp.org/jcr/1.0" jcr:primaryType="nt:unstructured">
    <b/>
</jcr:root>"#;

#[test]
fn declared_binary_is_merged_into_new_aggregate() {
    let mut fs = VaultFs::new(MemorySession::new());
    let mut tx = Transaction::new(&mut fs);
    tx.record_add("/a/.content.xml", InputSource::from_bytes(DOC_WITH_RESOURCE))
        .unwrap();
    tx.record_add("/a/b.binary", InputSource::from_bytes(vec![1u8, 2]))
        .unwrap();
    assert_eq!(tx.declared_nodes(), 2);

    let infos = tx.commit().unwrap();
    // one aggregate, imported in a single pass
    assert_eq!(tx.passes(), 1);
    assert_eq!(
        infos,
        vec![
            info(InfoKind::Added, "/a/.content.xml"),
            info(InfoKind::Added, "/a/b.binary"),
        ]
    );

    let b = fs.session().node("/a/b").unwrap();
    assert_eq!(b.primary_type, "nt:resource");
    assert_eq!(content(&fs, "/a/b").unwrap(), vec![1u8, 2]);
    let binary = fs.file("/a/b.binary").unwrap();
    assert_eq!(binary.aggregate.as_deref(), Some("/a"));
}

#[test]
fn ordering_entries_do_not_absorb_changes() {
    let mut fs = VaultFs::new(MemorySession::new());
    let mut tx = Transaction::new(&mut fs);
    tx.record_add(
        "/a/.content.xml",
        InputSource::from_bytes(DOC_WITH_ORDERING_ENTRY),
    )
    .unwrap();
    tx.record_make_directory("/a/b").unwrap();

    let infos = tx.commit().unwrap();
    // the directory needs the aggregate from the first pass
    assert_eq!(tx.passes(), 2);
    assert!(infos.contains(&info(InfoKind::Added, "/a/b")));
    assert!(fs.session().node("/a/b").is_some());
}

#[test]
fn declared_directory_is_dropped() {
    let mut fs = VaultFs::new(MemorySession::new());
    let mut tx = Transaction::new(&mut fs);
    tx.record_add("/a/.content.xml", InputSource::from_bytes(DOC_WITH_RESOURCE))
        .unwrap();
    tx.record_make_directory("/a/b").unwrap();

    let infos = tx.commit().unwrap();
    assert_eq!(tx.passes(), 1);
    assert_eq!(infos, vec![info(InfoKind::Added, "/a/.content.xml")]);
    assert_eq!(fs.session().node("/a/b").unwrap().primary_type, "nt:resource");
}

#[test]
fn modified_document_absorbs_new_binary() {
    let mut fs = saved_fs(&[("/a", Node::new("nt:unstructured").with_property("x", "y"))]);
    let doc = fs.file("/a/.content.xml").unwrap();

    let mut tx = Transaction::new(&mut fs);
    tx.record_modify(&doc, InputSource::from_bytes(DOC_WITH_RESOURCE))
        .unwrap();
    tx.record_add("/a/b.binary", InputSource::from_bytes("payload"))
        .unwrap();
    let infos = tx.commit().unwrap();

    assert_eq!(tx.passes(), 1);
    assert!(infos.contains(&info(InfoKind::Modified, "/a/.content.xml")));
    assert!(infos.contains(&info(InfoKind::Added, "/a/b.binary")));
    assert_eq!(content(&fs, "/a/b").unwrap(), b"payload");
}
