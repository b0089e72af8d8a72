//! Property-based tests for commit convergence

use proptest::prelude::*;
use vault_tx::repository::{MemorySession, Session};
use vault_tx::{InfoKind, InputSource, Transaction, VaultFs};

/// Directory chain `/d0/d1/...` of the given depth plus one file at the bottom
fn chain(depth: usize) -> (Vec<String>, String) {
    let mut dirs = Vec::new();
    let mut current = String::new();
    for i in 0..depth {
        current = format!("{}/d{}", current, i);
        dirs.push(current.clone());
    }
    let file = format!("{}/leaf.txt", current);
    (dirs, file)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every change lands and commit needs at most one pass per level
    #[test]
    fn nested_changes_converge_in_any_order(
        (depth, order) in (1usize..6).prop_flat_map(|depth| {
            (Just(depth), Just((0..=depth).collect::<Vec<usize>>()).prop_shuffle())
        })
    ) {
        let (dirs, file) = chain(depth);
        let mut fs = VaultFs::new(MemorySession::new());
        let mut tx = Transaction::new(&mut fs);
        for index in &order {
            if *index == depth {
                tx.record_add(&file, InputSource::from_bytes("leaf")).unwrap();
            } else {
                tx.record_make_directory(&dirs[*index]).unwrap();
            }
        }

        let infos = tx.commit().unwrap();
        prop_assert!(tx.passes() <= depth + 2);
        prop_assert_eq!(infos.len(), depth + 1);
        prop_assert!(infos.iter().all(|i| i.kind == InfoKind::Added));
        prop_assert!(fs.session().node(&file).is_some());
    }

    /// A missing ancestor always aborts and leaves the repository untouched
    #[test]
    fn missing_ancestor_aborts(depth in 2usize..6) {
        let (dirs, file) = chain(depth);
        let mut fs = VaultFs::new(MemorySession::new());
        let mut tx = Transaction::new(&mut fs);
        // skip the top-level directory
        for dir in dirs.iter().skip(1) {
            tx.record_make_directory(dir).unwrap();
        }
        tx.record_add(&file, InputSource::from_bytes("leaf")).unwrap();

        let err = tx.commit().unwrap_err();
        match err {
            vault_tx::TransactionError::Aborted { errors } => {
                prop_assert_eq!(errors.len(), depth);
            }
            other => prop_assert!(false, "unexpected error {:?}", other),
        }
        prop_assert!(fs.session().node(&dirs[1]).is_none());
        prop_assert!(!fs.session().has_pending_changes());
    }
}
