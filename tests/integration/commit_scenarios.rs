use super::test_utils::{content, info, saved_fs, PAGE_DOC};
use vault_tx::repository::{MemorySession, Node, NodeShape, Session};
use vault_tx::{InfoKind, InputSource, Transaction, TransactionError, VaultFileSystem, VaultFs};

#[test]
fn mkdir_then_add_takes_two_passes() {
    let mut fs = VaultFs::new(MemorySession::new());
    let mut tx = Transaction::new(&mut fs);
    tx.record_make_directory("/x").unwrap();
    tx.record_add("/x/y.txt", InputSource::from_bytes("hello"))
        .unwrap();
    assert_eq!(tx.len(), 2);

    let infos = tx.commit().unwrap();
    assert_eq!(
        infos,
        vec![info(InfoKind::Added, "/x"), info(InfoKind::Added, "/x/y.txt")]
    );
    assert_eq!(tx.passes(), 2);
    assert!(tx.is_empty());

    assert_eq!(fs.session().node("/x").unwrap().shape(), NodeShape::Folder);
    assert_eq!(content(&fs, "/x/y.txt").unwrap(), b"hello");
    assert!(!fs.session().has_pending_changes());
    assert!(fs.file("/x/y.txt").is_some());
}

#[test]
fn recording_order_does_not_matter() {
    let mut fs = VaultFs::new(MemorySession::new());
    let mut tx = Transaction::new(&mut fs);
    tx.record_add("/x/y.txt", InputSource::from_bytes("hello"))
        .unwrap();
    tx.record_make_directory("/x").unwrap();

    let infos = tx.commit().unwrap();
    assert_eq!(infos.len(), 2);
    assert!(infos.iter().all(|i| i.kind == InfoKind::Added));
    assert_eq!(content(&fs, "/x/y.txt").unwrap(), b"hello");
}

#[test]
fn unresolvable_add_aborts_everything() {
    let mut fs = saved_fs(&[("/a", Node::folder())]);
    let mut tx = Transaction::new(&mut fs);
    tx.record_add("/a/ok.txt", InputSource::from_bytes("ok"))
        .unwrap();
    tx.record_add("/a/b/c.txt", InputSource::from_bytes("lost"))
        .unwrap();

    let err = tx.commit().unwrap_err();
    match err {
        TransactionError::Aborted { errors } => {
            assert_eq!(errors, vec![info(InfoKind::Error, "/a/b/c.txt")]);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(tx.is_empty());
    // one productive pass, one lenient retry, one strict retry
    assert_eq!(tx.passes(), 3);

    // the file resolved in the first pass was rolled back
    assert!(fs.session().node("/a/ok.txt").is_none());
    assert!(fs.session().node("/a").is_some());
    assert!(!fs.session().has_pending_changes());
    assert!(fs.file("/a/ok.txt").is_none());
}

#[test]
fn new_typed_aggregate_from_metadata_document() {
    let mut fs = saved_fs(&[("/content", Node::folder())]);
    let mut tx = Transaction::new(&mut fs);
    tx.record_add("/content/home/.content.xml", InputSource::from_bytes(PAGE_DOC))
        .unwrap();

    let infos = tx.commit().unwrap();
    assert_eq!(infos, vec![info(InfoKind::Added, "/content/home/.content.xml")]);
    assert_eq!(tx.passes(), 1);

    let home = fs.session().node("/content/home").unwrap();
    assert_eq!(home.primary_type, "cq:Page");
    let jcr_content = fs.session().node("/content/home/jcr:content").unwrap();
    assert_eq!(jcr_content.properties.get("title").map(String::as_str), Some("Home"));

    let doc = fs.file("/content/home/.content.xml").unwrap();
    assert_eq!(doc.aggregate.as_deref(), Some("/content/home"));
}

#[test]
fn add_into_covered_node_walks_up() {
    let mut fs = saved_fs(&[
        ("/content", Node::folder()),
        ("/content/home", Node::new("cq:Page")),
        ("/content/home/jcr:content", Node::new("nt:unstructured")),
    ]);
    assert!(fs.file("/content/home/_jcr_content").is_none());

    let mut tx = Transaction::new(&mut fs);
    tx.record_add(
        "/content/home/_jcr_content/notes.txt",
        InputSource::from_bytes("n"),
    )
    .unwrap();
    let infos = tx.commit().unwrap();

    assert_eq!(
        infos,
        vec![info(InfoKind::Added, "/content/home/_jcr_content/notes.txt")]
    );
    assert_eq!(
        content(&fs, "/content/home/jcr:content/notes.txt").unwrap(),
        b"n"
    );
}

#[test]
fn cnd_and_docview_files_are_classified() {
    let mut fs = saved_fs(&[("/apps", Node::folder())]);
    let mut tx = Transaction::new(&mut fs);
    tx.record_add("/apps/types.cnd", InputSource::from_bytes("[my:type]"))
        .unwrap();
    tx.record_add(
        "/apps/settings.xml",
        InputSource::from_bytes(r#"<jcr:root xmlns:jcr="http://www.jcp.org/jcr/1.0" jcr:primaryType="nt:unstructured" mode="on"/>"#),
    )
    .unwrap();
    tx.record_add("/apps/pom.xml", InputSource::from_bytes("<project/>"))
        .unwrap();
    tx.commit().unwrap();

    let session = fs.session();
    assert_eq!(session.node("/apps/types").unwrap().shape(), NodeShape::TypeDefinition);
    assert_eq!(
        session.node("/apps/settings").unwrap().properties.get("mode").map(String::as_str),
        Some("on")
    );
    assert_eq!(session.node("/apps/pom.xml").unwrap().shape(), NodeShape::File);
    assert!(fs.file("/apps/types.cnd").is_some());
}

#[test]
fn same_path_added_twice_keeps_last_content() {
    let mut fs = saved_fs(&[("/a", Node::folder())]);
    let mut tx = Transaction::new(&mut fs);
    tx.record_add("/a/x.txt", InputSource::from_bytes("first"))
        .unwrap();
    tx.record_add("/a/x.txt", InputSource::from_bytes("second"))
        .unwrap();

    let infos = tx.commit().unwrap();
    assert_eq!(infos, vec![info(InfoKind::Added, "/a/x.txt")]);
    assert_eq!(content(&fs, "/a/x.txt").unwrap(), b"second");
}

#[test]
fn mkdir_of_existing_directory_is_a_no_op() {
    let mut fs = saved_fs(&[("/a", Node::folder())]);
    let mut tx = Transaction::new(&mut fs);
    tx.record_make_directory("/a").unwrap();

    let infos = tx.commit().unwrap();
    assert!(infos.is_empty());
    assert_eq!(fs.session().node("/a").unwrap().shape(), NodeShape::Folder);
}

#[test]
fn mkdir_over_existing_file_aborts() {
    let mut fs = saved_fs(&[("/a", Node::folder()), ("/a/b.txt", Node::file("x"))]);
    let mut tx = Transaction::new(&mut fs);
    tx.record_make_directory("/a/b.txt").unwrap();

    let err = tx.commit().unwrap_err();
    match err {
        TransactionError::Aborted { errors } => {
            assert_eq!(errors, vec![info(InfoKind::Error, "/a/b.txt")]);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(tx.passes(), 2);
    assert_eq!(fs.session().node("/a/b.txt").unwrap().shape(), NodeShape::File);
    assert_eq!(content(&fs, "/a/b.txt").unwrap(), b"x");
}

#[test]
fn mkdir_over_node_type_file_aborts() {
    let mut fs = saved_fs(&[
        ("/apps", Node::folder()),
        ("/apps/types", Node::type_definition("[my:type]")),
    ]);
    assert!(fs.file("/apps/types.cnd").is_some());

    let mut tx = Transaction::new(&mut fs);
    tx.record_make_directory("/apps/types").unwrap();
    assert!(matches!(tx.commit(), Err(TransactionError::Aborted { .. })));
    assert_eq!(
        fs.session().node("/apps/types").unwrap().shape(),
        NodeShape::TypeDefinition
    );
}

#[test]
fn spooled_sources_are_released_after_commit() {
    let mut fs = saved_fs(&[("/a", Node::folder())]);
    let source = InputSource::spool(std::io::Cursor::new(vec![42u8; 4096])).unwrap();
    let spool = source.spool_path().unwrap().to_path_buf();
    assert!(spool.exists());

    let mut tx = Transaction::new(&mut fs);
    tx.record_add("/a/blob.bin", source).unwrap();
    tx.commit().unwrap();
    drop(tx);

    assert!(!spool.exists());
    assert_eq!(content(&fs, "/a/blob.bin").unwrap().len(), 4096);
}

#[test]
fn versionable_nodes_are_checked_in() {
    let doc = r#"<jcr:root xmlns:jcr="http://www.jcp.org/jcr/1.0" jcr:primaryType="cq:Page" jcr:mixinTypes="[mix:versionable]"/>"#;
    let mut fs = VaultFs::new(MemorySession::new());
    let mut tx = Transaction::new(&mut fs);
    tx.record_add("/page/.content.xml", InputSource::from_bytes(doc))
        .unwrap();
    tx.commit().unwrap();

    let page = fs.session().node("/page").unwrap();
    assert!(page.is_versionable());
    assert!(!page.is_checked_out());
}
