use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context as _};
use tracing::{debug, info};

use crate::clean::{read_config, write_config, KubeConfig, Section};
use crate::command;

pub trait KubeTool {
    /// Raw (credentials included) merge of `sources`. Later sources win
    /// entries with the same name; missing files are skipped.
    fn view_merged(&self, sources: &[&Path]) -> anyhow::Result<String>;

    /// Makes `context` current in `kubeconfig`. May talk to the terminal.
    fn use_context(&self, kubeconfig: &Path, context: &str) -> anyhow::Result<()>;

    fn unset(&self, kubeconfig: &Path, property: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct Kubectl {
    program: PathBuf,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl Kubectl {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn config_cmd(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("config");
        cmd
    }
}

impl KubeTool for Kubectl {
    fn view_merged(&self, sources: &[&Path]) -> anyhow::Result<String> {
        // kubectl keeps the first definition of a name, so list the winners first
        let kubeconfig = env::join_paths(sources.iter().rev())
            .context("error composing KUBECONFIG")?;
        debug!(?kubeconfig, "merging kubeconfig files");
        command::output(
            self.config_cmd()
                .env("KUBECONFIG", kubeconfig)
                .args(["view", "--raw"]),
        )
    }

    fn use_context(&self, kubeconfig: &Path, context: &str) -> anyhow::Result<()> {
        command::interactive(
            self.config_cmd()
                .arg("--kubeconfig")
                .arg(kubeconfig)
                .args(["use-context", context]),
        )
    }

    fn unset(&self, kubeconfig: &Path, property: &str) -> anyhow::Result<()> {
        command::output(
            self.config_cmd()
                .arg("--kubeconfig")
                .arg(kubeconfig)
                .args(["unset", property]),
        )
        .map(drop)
    }
}

/// Edits kubeconfig files in-process with the same contracts as [`Kubectl`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTool;

impl KubeTool for NativeTool {
    fn view_merged(&self, sources: &[&Path]) -> anyhow::Result<String> {
        let mut merged = KubeConfig::default();
        for source in sources {
            merged.merge(read_config(source)?);
        }
        merged.to_yaml()
    }

    fn use_context(&self, kubeconfig: &Path, context: &str) -> anyhow::Result<()> {
        let mut kc = read_config(kubeconfig)?;
        if !kc.contains(Section::Contexts, context) {
            bail!("no context exists with the name: {context:?}");
        }
        kc.current_context = context.to_owned();
        write_config(&kc, kubeconfig)?;
        info!(%context, kubeconfig = %kubeconfig.display(), "switched context");
        Ok(())
    }

    fn unset(&self, kubeconfig: &Path, property: &str) -> anyhow::Result<()> {
        let (section, name) = Section::parse_property(property)?;
        if !kubeconfig.exists() {
            return Ok(());
        }
        let mut kc = read_config(kubeconfig)?;
        if kc.unset(section, name) {
            write_config(&kc, kubeconfig)?;
        }
        Ok(())
    }
}
