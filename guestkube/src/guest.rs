use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context as _};

use crate::command;

/// Where the guest's Kubernetes distribution writes its admin kubeconfig.
pub const GUEST_KUBECONFIG: &str = "/etc/rancher/k3s/k3s.yaml";

/// Access to files inside the guest.
pub trait Guest {
    fn read_file(&self, path: &Path) -> anyhow::Result<String>;
}

/// Reaches the guest through a host command prefix such as `colima ssh --`.
#[derive(Debug, Clone)]
pub struct ShellGuest {
    program: String,
    args: Vec<String>,
}

impl ShellGuest {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits a prefix on whitespace. No shell quoting is understood.
    pub fn parse(prefix: &str) -> anyhow::Result<Self> {
        let mut words = prefix.split_whitespace();
        let Some(program) = words.next() else {
            bail!("guest shell command is empty");
        };
        Ok(Self::new(program, words))
    }
}

impl Guest for ShellGuest {
    fn read_file(&self, path: &Path) -> anyhow::Result<String> {
        command::output(
            Command::new(&self.program)
                .args(&self.args)
                .arg("cat")
                .arg(path),
        )
    }
}

/// The guest filesystem is visible on the host, e.g. through a mount.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalGuest;

impl Guest for LocalGuest {
    fn read_file(&self, path: &Path) -> anyhow::Result<String> {
        fs::read_to_string(path).with_context(|| format!("error reading {}", path.display()))
    }
}
