//! Atomic publish of the discovery file.
//!
//! Strategy:
//!   1. Write to `<name>.tmp` next to the canonical file
//!   2. flush + fsync the temp file
//!   3. rename `<name>.tmp` → `<name>` (atomic on POSIX)
//!   4. fsync the directory so the rename itself survives a crash
//!
//! The canonical path is only ever mutated by step 3. If anything fails
//! before that, readers keep seeing the previous snapshot.

use std::ffi::OsString;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::RefreshError;

/// Owns the canonical path and its sibling temp path.
#[derive(Debug, Clone)]
pub struct Publisher {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl Publisher {
    pub fn new(path: PathBuf) -> Self {
        let mut tmp_name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("target_groups.json"));
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        Self { path, tmp_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Replace the canonical file with `content`, all or nothing.
    pub fn publish(&self, content: &[u8]) -> Result<(), RefreshError> {
        self.write_tmp(content)?;
        self.commit()
    }

    /// Steps 1-2: durable temp file. Leaves the canonical file untouched.
    pub(crate) fn write_tmp(&self, content: &[u8]) -> Result<(), RefreshError> {
        let result = (|| -> Result<(), RefreshError> {
            let file = fs::File::create(&self.tmp_path)
                .map_err(|e| RefreshError::io("create", &self.tmp_path, e))?;
            let mut writer = BufWriter::new(file);
            writer
                .write_all(content)
                .map_err(|e| RefreshError::io("write", &self.tmp_path, e))?;
            let file = writer
                .into_inner()
                .map_err(|e| RefreshError::io("flush", &self.tmp_path, e.into_error()))?;
            file.sync_all()
                .map_err(|e| RefreshError::io("fsync", &self.tmp_path, e))
        })();

        if result.is_err() {
            self.cleanup_tmp();
        }
        result
    }

    /// Steps 3-4: swap the temp file in.
    pub(crate) fn commit(&self) -> Result<(), RefreshError> {
        if let Err(e) = fs::rename(&self.tmp_path, &self.path) {
            self.cleanup_tmp();
            return Err(RefreshError::io("rename", &self.path, e));
        }

        // The new snapshot is already visible; a failed directory sync only
        // weakens durability across power loss.
        if let Err(e) = sync_parent_dir(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to fsync output directory");
        }
        Ok(())
    }

    fn cleanup_tmp(&self) {
        match fs::remove_file(&self.tmp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                tmp_path = %self.tmp_path.display(),
                error = %e,
                "Failed to clean up temp file"
            ),
        }
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
