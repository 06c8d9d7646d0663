//! Tests for transactional mask-file editing

use assert_matches::assert_matches;
use depprune_config::Settings;
use depprune_package::planner::MaskFile;
use depprune_package::transaction::{FileTransaction, MaskEditor};
use depprune_package::{MaskAction, TransactionError};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A mask file with its backup path in a fresh directory
fn mask_file(content: Option<&str>) -> (TempDir, PathBuf, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("package.use.mask");
    let backup = temp_dir.path().join("~package.use.mask");
    if let Some(content) = content {
        fs::write(&path, content).unwrap();
    }
    (temp_dir, path, backup)
}

/// Settings whose profile lives in a fresh directory
fn temp_settings() -> (TempDir, Settings) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let settings = Settings::default()
        .with_source_root(temp_dir.path())
        .with_profile_dir("profile");
    fs::create_dir_all(settings.profile_path()).unwrap();
    (temp_dir, settings)
}

mod file_transaction {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_concurrent_modification_is_detected() {
        let original = "# USE masks\nmedia-libs/mesa llvm\n";
        let (_temp_dir, path, backup) = mask_file(Some(original));

        let mut txn = FileTransaction::begin(&path, &backup, MaskFile::UseMask).unwrap();
        assert!(txn.stage("net-fs/samba cups"));

        // Another process edits the file between backup and write
        let external = "# USE masks\nmedia-libs/mesa llvm\nsys-apps/dbus X\n";
        fs::write(&path, external).unwrap();

        let err = txn.commit().unwrap_err();
        assert_matches!(err, TransactionError::ConcurrentModification { .. });
        assert_eq!(fs::read_to_string(&path).unwrap(), external);
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);
        assert!(err.to_string().contains("left unchanged"));
    }

    #[test]
    fn test_file_created_concurrently_is_detected() {
        let (_temp_dir, path, backup) = mask_file(None);

        let mut txn = FileTransaction::begin(&path, &backup, MaskFile::UseMask).unwrap();
        txn.stage("net-fs/samba cups");
        fs::write(&path, "sys-apps/dbus X\n").unwrap();

        assert_matches!(
            txn.commit(),
            Err(TransactionError::ConcurrentModification { .. })
        );
        assert_eq!(fs::read_to_string(&path).unwrap(), "sys-apps/dbus X\n");
    }

    #[test]
    fn test_commit_is_idempotent() {
        let (_temp_dir, path, backup) = mask_file(Some("media-libs/mesa llvm\n"));

        for _ in 0..2 {
            let mut txn = FileTransaction::begin(&path, &backup, MaskFile::UseMask).unwrap();
            txn.stage("net-fs/samba cups");
            txn.commit().unwrap();
        }

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "media-libs/mesa llvm\nnet-fs/samba cups\n"
        );
    }

    #[test]
    fn test_flag_listed_on_existing_line_is_not_duplicated() {
        let (_temp_dir, path, backup) = mask_file(Some("net-fs/samba ads cups\n"));

        let mut txn = FileTransaction::begin(&path, &backup, MaskFile::UseMask).unwrap();
        assert!(!txn.stage("net-fs/samba cups"));
        assert!(txn.stage("net-fs/samba ldap"));
        txn.commit().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "net-fs/samba ads cups\nnet-fs/samba ldap\n"
        );
    }

    #[test]
    fn test_failed_restore_keeps_backup() {
        let original = "media-libs/mesa llvm\n";
        let (_temp_dir, path, backup) = mask_file(Some(original));

        let mut txn = FileTransaction::begin(&path, &backup, MaskFile::UseMask).unwrap();
        txn.stage("net-fs/samba cups");

        // The file can neither be re-read nor restored once it is a directory
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let err = txn.commit().unwrap_err();
        assert_matches!(
            &err,
            TransactionError::CommitFailed { path: p, backup: Some(b), .. } if *p == path && *b == backup
        );
        assert!(err.to_string().contains("backup at"));
        assert!(path.is_dir());
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_are_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp_dir, path, backup) = mask_file(Some(""));
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let mut txn = FileTransaction::begin(&path, &backup, MaskFile::UseMask).unwrap();
        txn.stage("net-fs/samba cups");
        txn.commit().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}

mod mask_editor {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_routes_actions_to_their_files() {
        let (_temp_dir, settings) = temp_settings();
        fs::write(settings.package_mask_path(), "# masks\n").unwrap();

        let actions = vec![
            MaskAction::package_mask("net-print/cups-filters"),
            MaskAction::use_mask("net-fs/samba", "cups"),
            MaskAction::package_mask("net-print/cups"),
        ];
        let outcome = MaskEditor::new(&settings).apply(&actions).unwrap();

        assert_eq!(outcome.applied.len(), 3);
        assert_eq!(
            fs::read_to_string(settings.package_mask_path()).unwrap(),
            "# masks\nnet-print/cups-filters\nnet-print/cups\n"
        );
        assert_eq!(
            fs::read_to_string(settings.use_mask_path()).unwrap(),
            "net-fs/samba cups\n"
        );
    }

    #[test]
    fn test_untouched_file_is_not_created() {
        let (_temp_dir, settings) = temp_settings();

        MaskEditor::new(&settings)
            .apply(&[MaskAction::use_mask("net-fs/samba", "cups")])
            .unwrap();

        assert!(settings.use_mask_path().exists());
        assert!(!settings.package_mask_path().exists());
    }

    #[test]
    fn test_rerun_with_everything_present_writes_nothing() {
        let (_temp_dir, settings) = temp_settings();
        let package_mask = settings.package_mask_path();
        fs::write(&package_mask, "net-print/cups\n").unwrap();
        let before = fs::metadata(&package_mask).unwrap().modified().unwrap();

        let actions = vec![MaskAction::package_mask("net-print/cups")];
        let outcome = MaskEditor::new(&settings).apply(&actions).unwrap();

        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.already_present, actions);
        assert_eq!(fs::read_to_string(&package_mask).unwrap(), "net-print/cups\n");
        assert_eq!(fs::metadata(&package_mask).unwrap().modified().unwrap(), before);
        assert!(!settings.backup_path(&package_mask).exists());
    }

    #[test]
    fn test_second_file_failure_reports_partial_application() {
        let (_temp_dir, settings) = temp_settings();
        let package_mask = settings.package_mask_path();
        fs::write(&package_mask, "dev-libs/old\n").unwrap();
        // A leftover backup blocks the package mask transaction
        fs::write(settings.backup_path(&package_mask), "dev-libs/old\n").unwrap();

        let actions = vec![
            MaskAction::use_mask("net-fs/samba", "cups"),
            MaskAction::package_mask("net-print/cups"),
        ];
        let err = MaskEditor::new(&settings).apply(&actions).unwrap_err();

        assert_matches!(
            &err,
            TransactionError::PartiallyApplied { committed, .. } if *committed == settings.use_mask_path()
        );
        assert_eq!(
            fs::read_to_string(settings.use_mask_path()).unwrap(),
            "net-fs/samba cups\n"
        );
        assert_eq!(fs::read_to_string(&package_mask).unwrap(), "dev-libs/old\n");
    }

    #[test]
    fn test_first_file_failure_is_not_partial() {
        let (_temp_dir, settings) = temp_settings();
        let use_mask = settings.use_mask_path();
        fs::write(settings.backup_path(&use_mask), "").unwrap();

        let actions = vec![
            MaskAction::use_mask("net-fs/samba", "cups"),
            MaskAction::package_mask("net-print/cups"),
        ];
        let err = MaskEditor::new(&settings).apply(&actions).unwrap_err();

        assert_matches!(err, TransactionError::CommitFailed { .. });
        assert!(!settings.package_mask_path().exists());
    }
}
