use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use fs2::FileExt;
use tracing::debug;

use crate::Profile;

/// Scratch file the guest config is staged and merged in.
pub const SCRATCH_FILE: &str = "colima-temp";
const STATE_FILE: &str = "state.yaml";
const LOCK_FILE: &str = ".kubeconfig.lock";

/// Host side layout of `~/.kube` for one profile.
#[derive(Debug, Clone)]
pub struct KubeDir {
    root: PathBuf,
    profile_dir: PathBuf,
}

impl KubeDir {
    pub fn new(home: impl AsRef<Path>, profile: &Profile) -> Self {
        let root = home.as_ref().join(".kube");
        let profile_dir = root.join(format!(".{profile}"));
        Self { root, profile_dir }
    }

    pub fn from_home(home: Option<&Path>, profile: &Profile) -> anyhow::Result<Self> {
        match home {
            Some(home) if !home.as_os_str().is_empty() => Ok(Self::new(home, profile)),
            _ => bail!("error retrieving home directory on host"),
        }
    }

    pub fn from_env(profile: &Profile) -> anyhow::Result<Self> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self::from_home(home.as_deref(), profile)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The shared kubeconfig every profile merges into.
    pub fn config(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    pub fn scratch(&self) -> PathBuf {
        self.profile_dir.join(SCRATCH_FILE)
    }

    pub fn state_file(&self) -> PathBuf {
        self.profile_dir.join(STATE_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Blocks until no other process holds the host kubeconfig lock.
    pub fn lock(&self) -> anyhow::Result<ConfigLock> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("error creating {}", self.root.display()))?;
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("error opening lock {}", path.display()))?;
        debug!(lock = %path.display(), "waiting for kubeconfig lock");
        FileExt::lock_exclusive(&file)
            .with_context(|| format!("error locking {}", path.display()))?;
        Ok(ConfigLock { file })
    }
}

/// Advisory lock over the host kubeconfig, released on drop.
#[derive(Debug)]
pub struct ConfigLock {
    file: File,
}

impl Drop for ConfigLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
