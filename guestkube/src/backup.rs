use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Utc;
use tracing::{debug, info};

const BACKUP_PREFIX: &str = "config-bak-";

/// Snapshots of the host kubeconfig, named `config-bak-<unix timestamp>`.
/// Nothing here ever deletes one.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub timestamp: i64,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Copies `target` aside if it is an existing regular file.
    pub fn snapshot(&self, target: &Path) -> anyhow::Result<Option<PathBuf>> {
        match fs::metadata(target) {
            Ok(meta) if !meta.is_dir() => {}
            Ok(_) => {
                debug!(target = %target.display(), "not a file, nothing to back up");
                return Ok(None);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(target = %target.display(), "nothing to back up");
                return Ok(None);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("error inspecting {}", target.display()))
            }
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("error creating {}", self.dir.display()))?;
        let backup = self.next_path()?;
        fs::copy(target, &backup).with_context(|| {
            format!(
                "error copying {} to {}",
                target.display(),
                backup.display()
            )
        })?;
        info!(backup = %backup.display(), "backed up kubeconfig");
        Ok(Some(backup))
    }

    /// Oldest first.
    pub fn list(&self) -> anyhow::Result<Vec<Backup>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("error listing {}", self.dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            let timestamp = name
                .to_str()
                .and_then(|name| name.strip_prefix(BACKUP_PREFIX))
                .and_then(|ts| ts.parse::<i64>().ok());
            if let Some(timestamp) = timestamp {
                backups.push(Backup {
                    path: entry.path(),
                    timestamp,
                });
            }
        }
        backups.sort_by_key(|backup| backup.timestamp);
        Ok(backups)
    }

    fn next_path(&self) -> anyhow::Result<PathBuf> {
        let now = Utc::now().timestamp();
        let after_latest = self
            .list()?
            .last()
            .map_or(now, |latest| latest.timestamp + 1);
        let mut timestamp = now.max(after_latest);
        loop {
            let path = self.dir.join(format!("{BACKUP_PREFIX}{timestamp}"));
            if !path.exists() {
                return Ok(path);
            }
            timestamp += 1;
        }
    }
}
