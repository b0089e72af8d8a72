use tempfile::TempDir;
use vault_tx::repository::{MemorySession, Node, Session, SledNodeStore};
use vault_tx::{InputSource, Transaction, VaultFileSystem, VaultFs};

#[test]
fn committed_changes_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store");

    {
        let store = SledNodeStore::new(&store_path).unwrap();
        let mut fs = VaultFs::new(MemorySession::open(store).unwrap());
        let mut tx = Transaction::new(&mut fs);
        tx.record_make_directory("/docs").unwrap();
        tx.record_add("/docs/readme.txt", InputSource::from_bytes("persisted"))
            .unwrap();
        tx.commit().unwrap();
    }

    let store = SledNodeStore::new(&store_path).unwrap();
    let fs = VaultFs::new(MemorySession::open(store).unwrap());
    assert!(fs.file("/docs").is_some());
    assert_eq!(
        fs.session().node("/docs/readme.txt").unwrap(),
        &Node::file("persisted")
    );
}

#[test]
fn aborted_changes_never_reach_the_store() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("store");

    {
        let store = SledNodeStore::new(&store_path).unwrap();
        let mut fs = VaultFs::new(MemorySession::open(store).unwrap());
        let mut tx = Transaction::new(&mut fs);
        tx.record_add("/kept.txt", InputSource::from_bytes("k"))
            .unwrap();
        tx.record_add("/missing/dir/x.txt", InputSource::from_bytes("x"))
            .unwrap();
        assert!(tx.commit().is_err());
    }

    let store = SledNodeStore::new(&store_path).unwrap();
    let session = MemorySession::open(store).unwrap();
    assert!(session.node("/kept.txt").is_none());
    assert!(session.node("/").is_some());
}
