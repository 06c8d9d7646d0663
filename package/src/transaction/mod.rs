//! Transactional mask-file editing
//!
//! Each mask file is edited under its own [`FileTransaction`]:
//!
//! 1. `begin`: read the file, fingerprint it, copy it to a sibling backup
//! 2. `stage`: append lines in memory, skipping ones already present
//! 3. `commit`: re-read and compare the fingerprint, write atomically, then
//!    delete the backup
//!
//! A fingerprint mismatch aborts with the backup left in place. A failed
//! write restores the original from the backup.

use crate::error::TransactionError;
use crate::planner::{MaskAction, MaskFile};
use depprune_config::Settings;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Hex SHA-256 of file content
pub fn checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Current fingerprint of a file, `None` when it does not exist
fn fingerprint(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(checksum(&bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether `content` already holds an entry equivalent to `line`
///
/// Package masks match on the whole trimmed line. USE masks match when a
/// line for the same atom already lists the flag.
fn has_equivalent(kind: MaskFile, content: &str, line: &str) -> bool {
    let entries = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    match kind {
        MaskFile::PackageMask => {
            let line = line.trim();
            entries.into_iter().any(|l| l == line)
        }
        MaskFile::UseMask => {
            let mut wanted = line.split_whitespace();
            let (Some(atom), Some(flag)) = (wanted.next(), wanted.next()) else {
                return false;
            };
            entries.into_iter().any(|l| {
                let mut parts = l.split_whitespace();
                parts.next() == Some(atom) && parts.any(|f| f == flag)
            })
        }
    }
}

/// Guarded edit of one mask file
#[derive(Debug)]
pub struct FileTransaction {
    path: PathBuf,
    backup: PathBuf,
    kind: MaskFile,
    /// Fingerprint at `begin`; `None` if the file did not exist
    original: Option<String>,
    content: String,
    additions: Vec<String>,
}

impl FileTransaction {
    /// Snapshot `path` and write its backup
    ///
    /// A leftover backup from an earlier interrupted run is never
    /// overwritten; it must be reconciled by hand first.
    pub fn begin(
        path: impl Into<PathBuf>,
        backup: impl Into<PathBuf>,
        kind: MaskFile,
    ) -> Result<Self, TransactionError> {
        let path = path.into();
        let backup = backup.into();
        let failed = |cause: String, backup: Option<PathBuf>| TransactionError::CommitFailed {
            path: path.clone(),
            backup,
            cause,
        };

        if backup.exists() {
            return Err(failed(
                "a backup from an earlier run already exists".to_string(),
                Some(backup.clone()),
            ));
        }

        let (original, content) = match fs::read(&path) {
            Ok(bytes) => {
                let content = String::from_utf8(bytes.clone())
                    .map_err(|e| failed(format!("not valid UTF-8: {}", e), None))?;
                (Some(checksum(&bytes)), content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (None, String::new()),
            Err(e) => return Err(failed(format!("cannot read: {}", e), None)),
        };

        fs::write(&backup, content.as_bytes())
            .map_err(|e| failed(format!("cannot write backup: {}", e), None))?;
        debug!("Backed up {} to {}", path.display(), backup.display());

        Ok(Self {
            path,
            backup,
            kind,
            original,
            content,
            additions: Vec::new(),
        })
    }

    /// Append a line unless an equivalent entry exists; returns whether it was added
    pub fn stage(&mut self, line: &str) -> bool {
        if has_equivalent(self.kind, &self.content, line) {
            debug!("{} already has {:?}", self.path.display(), line);
            return false;
        }
        if !self.content.is_empty() && !self.content.ends_with('\n') {
            self.content.push('\n');
        }
        self.content.push_str(line.trim());
        self.content.push('\n');
        self.additions.push(line.trim().to_string());
        true
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Lines staged so far
    pub fn additions(&self) -> &[String] {
        &self.additions
    }

    /// Write the staged content if the file is unchanged since `begin`
    ///
    /// Returns whether the file was written.
    pub fn commit(self) -> Result<bool, TransactionError> {
        if self.additions.is_empty() {
            self.discard_backup();
            return Ok(false);
        }

        let live = match fingerprint(&self.path) {
            Ok(live) => live,
            Err(e) => return Err(self.restore(format!("cannot re-read: {}", e))),
        };
        if live != self.original {
            warn!("{} changed during the commit", self.path.display());
            return Err(TransactionError::ConcurrentModification {
                path: self.path,
                backup: self.backup,
            });
        }

        if let Err(e) = self.write() {
            return Err(self.restore(e.to_string()));
        }

        info!(
            "Added {} line(s) to {}",
            self.additions.len(),
            self.path.display()
        );
        self.discard_backup();
        Ok(true)
    }

    /// Drop the transaction without writing
    pub fn abort(self) {
        self.discard_backup();
    }

    fn write(&self) -> std::io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(self.content.as_bytes())?;
        tmp.as_file().sync_all()?;
        if let Ok(meta) = fs::metadata(&self.path) {
            fs::set_permissions(tmp.path(), meta.permissions())?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Put the original back; the backup is kept unless that succeeds
    fn restore(self, cause: String) -> TransactionError {
        let restored = match self.original {
            Some(_) => fs::copy(&self.backup, &self.path).map(|_| ()),
            None => match fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        };

        match restored {
            Ok(()) => {
                self.discard_backup();
                TransactionError::CommitFailed {
                    path: self.path,
                    backup: None,
                    cause,
                }
            }
            Err(e) => {
                warn!("Restoring {} failed: {}", self.path.display(), e);
                TransactionError::CommitFailed {
                    path: self.path,
                    backup: Some(self.backup),
                    cause,
                }
            }
        }
    }

    fn discard_backup(&self) {
        if let Err(e) = fs::remove_file(&self.backup) {
            warn!("Could not remove backup {}: {}", self.backup.display(), e);
        }
    }
}

/// What one editor run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditOutcome {
    /// Actions whose line was written
    pub applied: Vec<MaskAction>,
    /// Actions whose line was already present
    pub already_present: Vec<MaskAction>,
}

/// Applies plan actions to the package mask and USE mask files
///
/// The USE mask file is committed first. There is no rollback across the
/// pair: if the second file fails, the first stays committed and the error
/// says so.
pub struct MaskEditor<'a> {
    settings: &'a Settings,
}

impl<'a> MaskEditor<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    pub fn apply(&self, actions: &[MaskAction]) -> Result<EditOutcome, TransactionError> {
        let mut outcome = EditOutcome::default();
        let mut committed: Option<PathBuf> = None;

        for (kind, path) in [
            (MaskFile::UseMask, self.settings.use_mask_path()),
            (MaskFile::PackageMask, self.settings.package_mask_path()),
        ] {
            let batch: Vec<&MaskAction> = actions.iter().filter(|a| a.file() == kind).collect();
            if batch.is_empty() {
                continue;
            }

            match self.apply_file(kind, &path, &batch, &mut outcome) {
                Ok(true) => committed = Some(path),
                Ok(false) => {}
                Err(failed) => {
                    return Err(match committed {
                        Some(committed) => TransactionError::PartiallyApplied {
                            committed,
                            failed: Box::new(failed),
                        },
                        None => failed,
                    })
                }
            }
        }

        Ok(outcome)
    }

    fn apply_file(
        &self,
        kind: MaskFile,
        path: &Path,
        batch: &[&MaskAction],
        outcome: &mut EditOutcome,
    ) -> Result<bool, TransactionError> {
        let mut txn = FileTransaction::begin(path, self.settings.backup_path(path), kind)?;

        let mut applied = Vec::new();
        let mut present = Vec::new();
        for action in batch {
            if txn.stage(&action.line()) {
                applied.push((*action).clone());
            } else {
                present.push((*action).clone());
            }
        }

        if applied.is_empty() {
            debug!("Nothing to add to {}", path.display());
            txn.abort();
            outcome.already_present.extend(present);
            return Ok(false);
        }

        let written = txn.commit()?;
        outcome.applied.extend(applied);
        outcome.already_present.extend(present);
        Ok(written)
    }
}
