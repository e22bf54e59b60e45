//! Persisted per-guest settings and the idempotency flag kept in them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::{debug, warn};

pub const KUBECONFIG_KEY: &str = "kubeconfig";

pub trait StateStore {
    /// `None` when the key is absent or the store cannot be read.
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => {
                Err(err).with_context(|| format!("error reading state {}", self.path.display()))
            }
        }
    }

    fn load(&self) -> anyhow::Result<BTreeMap<String, String>> {
        Ok(decode(&self.read()?)?)
    }
}

fn decode(text: &str) -> Result<BTreeMap<String, String>, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_yaml::from_str(text)
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(mut values) => values.remove(key),
            Err(err) => {
                warn!(path = %self.path.display(), "ignoring unreadable state: {err:#}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut values = decode(&self.read()?).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), "discarding corrupt state: {err}");
            BTreeMap::new()
        });
        values.insert(key.to_owned(), value.to_owned());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("error creating {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(&values)?;
        fs::write(&self.path, yaml)
            .with_context(|| format!("error saving state to {}", self.path.display()))
    }
}

/// Accepts the spellings of `strconv.ParseBool`-style flags.
fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[derive(Clone, Copy)]
pub struct Gate<'a> {
    store: &'a dyn StateStore,
}

impl<'a> Gate<'a> {
    pub fn new(store: &'a dyn StateStore) -> Self {
        Self { store }
    }

    /// Anything other than an explicit true value means not provisioned.
    pub fn is_provisioned(&self) -> bool {
        let value = self.store.get(KUBECONFIG_KEY);
        let provisioned = value.as_deref().and_then(parse_flag).unwrap_or(false);
        debug!(?value, provisioned, "checked kubeconfig flag");
        provisioned
    }

    pub fn mark_provisioned(&self) -> anyhow::Result<()> {
        self.store.set(KUBECONFIG_KEY, "true")
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        self.store.set(KUBECONFIG_KEY, "false")
    }
}
