//! Test fixtures and sample data
//!
//! Provides pre-built data trees, archives and notification outcomes.

use chrono::{Local, TimeZone};
use std::fs;
use std::path::{Path, PathBuf};
use volume_backup::managers::notification::{JobKind, NotificationOutcome};
use volume_backup::utils::archive;

/// Name of the artifact used by the restore scenarios
pub const RESTORE_FIXTURE_NAME: &str = "backup_20231219_022941.tar.gz";

/// Files written by [`sample_tree`], relative path and content
pub const SAMPLE_FILES: &[(&str, &str)] = &[
    ("index.html", "<h1>volume</h1>"),
    ("config/app.yml", "port: 8080\n"),
    ("config/nested/secret.key", "k3y"),
    ("logs/empty.log", ""),
];

/// Write the sample tree below `root`
pub fn sample_tree(root: &Path) {
    for (relative, content) in SAMPLE_FILES {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create fixture directory");
        }
        fs::write(&path, content).expect("Failed to write fixture file");
    }
}

/// Assert that `root` holds every sample file with its content
pub fn assert_sample_tree(root: &Path) {
    for (relative, content) in SAMPLE_FILES {
        let path = root.join(relative);
        let actual = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("Missing restored file {}: {}", path.display(), e));
        assert_eq!(&actual, content, "Content mismatch for {}", relative);
    }
}

/// Build `<dir>/<name>` as a folder-mode archive of the sample tree
pub fn sample_archive(dir: &Path, name: &str) -> PathBuf {
    let source = dir.join(".fixture-source");
    sample_tree(&source);
    fs::create_dir_all(dir).expect("Failed to create archive directory");

    let output = dir.join(name);
    archive::compress_folder(&source, &output).expect("Failed to build fixture archive");
    fs::remove_dir_all(&source).expect("Failed to remove fixture source");
    output
}

/// A finished backup outcome, successful unless `error` is given
pub fn sample_outcome(error: Option<&str>) -> NotificationOutcome {
    let started_at = Local
        .with_ymd_and_hms(2023, 12, 19, 2, 29, 41)
        .single()
        .expect("valid fixture timestamp");
    NotificationOutcome {
        job: JobKind::Backup,
        file: "backup_20231219_022941.tar.gz.gpg".to_string(),
        size: 5 * 1024 * 1024 + 512 * 1024,
        backend: "s3".to_string(),
        location: "s3://backups/volumes/backup_20231219_022941.tar.gz.gpg".to_string(),
        started_at,
        finished_at: started_at + chrono::Duration::seconds(83),
        error: error.map(str::to_string),
        reference: Some("prod-volume".to_string()),
    }
}
