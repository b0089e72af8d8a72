use super::test_utils::{content, saved_fs};
use vault_tx::config::{FilterConfig, FilterRootConfig, FilterRuleConfig, TransactionConfig};
use vault_tx::filter::{PathFilterSet, WorkspaceFilter};
use vault_tx::repository::Node;
use vault_tx::{InputSource, Transaction};

#[test]
fn writes_outside_filter_are_reported_but_applied() {
    let mut fs = saved_fs(&[("/apps", Node::folder()), ("/etc", Node::folder())]);
    let filter = WorkspaceFilter::new().with_set(PathFilterSet::new("/apps").unwrap());

    let mut tx = Transaction::new(&mut fs).with_filter(filter);
    tx.record_add("/apps/inside.txt", InputSource::from_bytes("in"))
        .unwrap();
    tx.record_add("/etc/outside.txt", InputSource::from_bytes("out"))
        .unwrap();
    let infos = tx.commit().unwrap();

    assert_eq!(infos.len(), 2);
    assert_eq!(tx.filter_warnings(), ["/etc/outside.txt".to_string()]);
    assert_eq!(content(&fs, "/etc/outside.txt").unwrap(), b"out");
}

#[test]
fn transaction_from_config() {
    let config = TransactionConfig {
        verbose: true,
        filter: FilterConfig {
            roots: vec![FilterRootConfig {
                root: "/apps".to_string(),
                rules: vec![FilterRuleConfig::exclude("/apps/tmp(/.*)?")],
            }],
        },
    };
    let mut fs = saved_fs(&[("/apps", Node::folder()), ("/apps/tmp", Node::folder())]);

    let mut tx = Transaction::with_config(&mut fs, &config).unwrap();
    tx.record_add("/apps/tmp/scratch.txt", InputSource::from_bytes("s"))
        .unwrap();
    tx.record_add("/apps/kept.txt", InputSource::from_bytes("k"))
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(tx.filter_warnings(), ["/apps/tmp/scratch.txt".to_string()]);
}

#[test]
fn invalid_filter_pattern_is_rejected() {
    let config = TransactionConfig {
        verbose: false,
        filter: FilterConfig {
            roots: vec![FilterRootConfig {
                root: "/apps".to_string(),
                rules: vec![FilterRuleConfig::include("(")],
            }],
        },
    };
    let mut fs = saved_fs(&[]);
    assert!(Transaction::with_config(&mut fs, &config).is_err());
}
