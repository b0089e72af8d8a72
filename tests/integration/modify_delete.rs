use super::test_utils::{content, info, saved_fs, PAGE_DOC};
use vault_tx::repository::{Node, NodeShape, Session};
use vault_tx::{InfoKind, InputSource, StorageError, Transaction, TransactionError, VaultFileSystem};

fn page_fs() -> vault_tx::VaultFs<vault_tx::repository::MemorySession> {
    saved_fs(&[
        ("/content", Node::folder()),
        ("/content/home", Node::new("cq:Page")),
        (
            "/content/home/jcr:content",
            Node::new("nt:unstructured").with_property("title", "Old"),
        ),
        ("/content/home/image.png", Node::file(vec![1u8, 2, 3])),
    ])
}

#[test]
fn modify_plain_file() {
    let mut fs = saved_fs(&[("/a", Node::folder()), ("/a/b.txt", Node::file("old"))]);
    let file = fs.file("/a/b.txt").unwrap();

    let mut tx = Transaction::new(&mut fs);
    tx.record_modify(&file, InputSource::from_bytes("new"))
        .unwrap();
    let infos = tx.commit().unwrap();

    assert_eq!(infos, vec![info(InfoKind::Modified, "/a/b.txt")]);
    assert_eq!(content(&fs, "/a/b.txt").unwrap(), b"new");
}

#[test]
fn modify_metadata_document_updates_whole_aggregate() {
    let mut fs = page_fs();
    let doc = fs.file("/content/home/.content.xml").unwrap();

    let mut tx = Transaction::new(&mut fs);
    tx.record_modify(&doc, InputSource::from_bytes(PAGE_DOC))
        .unwrap();
    let infos = tx.commit().unwrap();

    assert!(infos.contains(&info(InfoKind::Modified, "/content/home/.content.xml")));
    assert!(infos.iter().all(|i| i.kind == InfoKind::Modified));
    let jcr_content = fs.session().node("/content/home/jcr:content").unwrap();
    assert_eq!(jcr_content.properties.get("title").map(String::as_str), Some("Home"));
    // plain files below the page are separate aggregates and stay
    assert!(fs.session().node("/content/home/image.png").is_some());
}

#[test]
fn deleting_last_artifact_removes_aggregate() {
    let mut fs = page_fs();
    let image = fs.file("/content/home/image.png").unwrap();

    let mut tx = Transaction::new(&mut fs);
    tx.record_delete(Some(&image)).unwrap();
    let infos = tx.commit().unwrap();

    assert_eq!(
        infos,
        vec![
            info(InfoKind::Modified, "/content/home/.content.xml"),
            info(InfoKind::Deleted, "/content/home/image.png"),
        ]
    );
    assert!(fs.session().node("/content/home/image.png").is_none());
    assert!(fs.file("/content/home/image.png").is_none());
}

#[test]
fn deleting_a_folder_removes_its_subtree() {
    let mut fs = saved_fs(&[
        ("/a", Node::folder()),
        ("/a/b", Node::folder()),
        ("/a/b/c.txt", Node::file("c")),
    ]);
    let dir = fs.file("/a/b").unwrap();

    let mut tx = Transaction::new(&mut fs);
    tx.record_delete(Some(&dir)).unwrap();
    let infos = tx.commit().unwrap();

    assert_eq!(infos, vec![info(InfoKind::Deleted, "/a/b")]);
    assert!(fs.session().node("/a/b/c.txt").is_none());
    assert!(fs.session().node("/a").is_some());
}

#[test]
fn deleting_metadata_document_keeps_a_folder() {
    let mut fs = page_fs();
    let doc = fs.file("/content/home/.content.xml").unwrap();

    let mut tx = Transaction::new(&mut fs);
    tx.record_delete(Some(&doc)).unwrap();
    let infos = tx.commit().unwrap();

    assert!(infos.contains(&info(InfoKind::Deleted, "/content/home/.content.xml")));
    assert_eq!(
        fs.session().node("/content/home").unwrap().shape(),
        NodeShape::Folder
    );
}

#[test]
fn deleting_a_binary_clears_its_content() {
    let mut fs = saved_fs(&[
        ("/content", Node::folder()),
        ("/content/home", Node::new("cq:Page")),
        (
            "/content/home/logo",
            Node::new("nt:unstructured").with_content(vec![7u8]),
        ),
    ]);
    let binary = fs.file("/content/home/logo.binary").unwrap();

    let mut tx = Transaction::new(&mut fs);
    tx.record_delete(Some(&binary)).unwrap();
    let infos = tx.commit().unwrap();

    assert!(infos.contains(&info(InfoKind::Deleted, "/content/home/logo.binary")));
    assert!(content(&fs, "/content/home/logo").is_none());
    assert!(fs.session().node("/content/home").is_some());
}

#[test]
fn invalid_arguments_leave_ledger_untouched() {
    let mut fs = saved_fs(&[("/a", Node::folder())]);
    let dir = fs.file("/a").unwrap();

    let mut tx = Transaction::new(&mut fs);
    assert!(matches!(
        tx.record_delete(None),
        Err(TransactionError::InvalidArgument(_))
    ));
    assert!(matches!(
        tx.record_modify(&dir, InputSource::from_bytes("x")),
        Err(TransactionError::InvalidArgument(_))
    ));
    assert!(matches!(
        tx.record_make_directory("/"),
        Err(TransactionError::InvalidArgument(_))
    ));
    assert!(tx.is_empty());
}

#[test]
fn failed_import_rolls_back_and_stops() {
    let mut fs = saved_fs(&[
        ("/a", Node::folder()),
        ("/a/b", Node::folder()),
        ("/a/b/c.txt", Node::file("old")),
        ("/a/d.txt", Node::file("kept")),
    ]);
    let dir = fs.file("/a/b");
    let file = fs.file("/a/b/c.txt").unwrap();

    let mut tx = Transaction::new(&mut fs);
    tx.record_delete(dir.as_ref()).unwrap();
    tx.record_modify(&file, InputSource::from_bytes("new"))
        .unwrap();
    tx.record_add("/a/missing/e.txt", InputSource::from_bytes("e"))
        .unwrap();

    let err = tx.commit().unwrap_err();
    assert!(matches!(
        err,
        TransactionError::Storage(StorageError::NodeNotFound(ref p)) if p == "/a/b/c.txt"
    ));
    // the failing flush ends the commit; no lenient or strict retries follow
    assert_eq!(tx.passes(), 1);
    assert!(tx.is_empty());

    assert!(!fs.session().has_pending_changes());
    assert_eq!(fs.session().node("/a/b").unwrap().shape(), NodeShape::Folder);
    assert_eq!(content(&fs, "/a/b/c.txt").unwrap(), b"old");
    assert!(fs.file("/a/b/c.txt").is_some());
}
