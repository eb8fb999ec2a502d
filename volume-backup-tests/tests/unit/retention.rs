//! Unit tests for retention selection and the pruner

use chrono::{Duration, Utc};
use test_utils::{MockStorage, StorageCall};
use volume_backup::storage::{is_expired, select_expired, RemoteEntry, RetentionPruner};

#[test]
fn test_boundary_is_kept() {
    let now = Utc::now();
    assert!(!is_expired(now - Duration::days(7), now, 7));
    assert!(is_expired(now - Duration::days(7) - Duration::seconds(1), now, 7));
}

#[test]
fn test_only_archives_are_selected() {
    let now = Utc::now();
    let old = now - Duration::days(30);
    let entries = vec![
        RemoteEntry {
            name: "backup_20240101_000000.tar.gz".to_string(),
            modified: old,
        },
        RemoteEntry {
            name: "backup_20240101_000000.tar.gz.gpg".to_string(),
            modified: old,
        },
        RemoteEntry {
            name: "README.md".to_string(),
            modified: old,
        },
        RemoteEntry {
            name: ".backup_20240102_000000.tar.gz.part".to_string(),
            modified: old,
        },
    ];

    let selected: Vec<String> = select_expired(&entries, now, 7)
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(
        selected,
        vec![
            "backup_20240101_000000.tar.gz".to_string(),
            "backup_20240101_000000.tar.gz.gpg".to_string(),
        ]
    );
}

#[test]
fn test_pruner_deletes_expired_objects() {
    let storage = MockStorage::new()
        .with_object("backup_20240101_000000.tar.gz", b"a", 9)
        .with_object("backup_20240105_000000.tar.gz", b"b", 5)
        .with_object("backup_20240109_000000.tar.gz", b"c", 1);

    assert!(RetentionPruner::new(7).run(&storage));
    assert_eq!(storage.object_names().len(), 2);
    assert_eq!(storage.calls(), vec![StorageCall::Prune { days: 7 }]);
}

#[test]
fn test_pruner_reports_failure() {
    let storage = MockStorage::new().with_failing_prune();
    assert!(!RetentionPruner::new(7).run(&storage));
}

#[test]
fn test_unsupported_prune_is_not_a_failure() {
    let storage = MockStorage::new()
        .with_object("backup_20240101_000000.tar.gz", b"a", 90)
        .without_prune_support();

    assert!(RetentionPruner::new(7).run(&storage));
    assert_eq!(storage.object_names().len(), 1);
}
