//! Adding a guest's cluster to the host kubeconfig and taking it out again.

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tracing::info;

use crate::backup::BackupManager;
use crate::chain::Chain;
use crate::clean::Section;
use crate::guest::{Guest, GUEST_KUBECONFIG};
use crate::merge::Merger;
use crate::state::{Gate, StateStore};
use crate::tool::KubeTool;
use crate::{KubeDir, Profile};

const PROVISION_STAGE: &str = "updating kubeconfig";
const TEARDOWN_STAGE: &str = "reverting kubeconfig";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    EnsuringHostDir,
    ReadingGuestConfig,
    MergingOnHost,
    BackingUpAndSwapping,
    SwitchingContext,
    MarkingProvisioned,
}

impl ProvisionStep {
    pub const ALL: [ProvisionStep; 6] = [
        ProvisionStep::EnsuringHostDir,
        ProvisionStep::ReadingGuestConfig,
        ProvisionStep::MergingOnHost,
        ProvisionStep::BackingUpAndSwapping,
        ProvisionStep::SwitchingContext,
        ProvisionStep::MarkingProvisioned,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProvisionStep::EnsuringHostDir => "ensuring host kube directory",
            ProvisionStep::ReadingGuestConfig => "reading guest kubeconfig",
            ProvisionStep::MergingOnHost => "merging kubeconfig on host",
            ProvisionStep::BackingUpAndSwapping => "backing up and replacing kubeconfig",
            ProvisionStep::SwitchingContext => "switching context",
            ProvisionStep::MarkingProvisioned => "saving provisioned state",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The flag was already set; nothing was touched.
    AlreadyProvisioned,
    Provisioned { backup: Option<PathBuf> },
}

pub struct Provisioner<'a> {
    profile: &'a Profile,
    home: Option<PathBuf>,
    guest: &'a dyn Guest,
    tool: &'a dyn KubeTool,
    state: &'a dyn StateStore,
    guest_kubeconfig: PathBuf,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        profile: &'a Profile,
        guest: &'a dyn Guest,
        tool: &'a dyn KubeTool,
        state: &'a dyn StateStore,
    ) -> Self {
        Self {
            profile,
            home: std::env::var_os("HOME").map(PathBuf::from),
            guest,
            tool,
            state,
            guest_kubeconfig: PathBuf::from(GUEST_KUBECONFIG),
        }
    }

    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn with_guest_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.guest_kubeconfig = path.into();
        self
    }

    pub fn profile(&self) -> &Profile {
        self.profile
    }

    pub fn gate(&self) -> Gate<'a> {
        Gate::new(self.state)
    }

    pub fn kube_dir(&self) -> anyhow::Result<KubeDir> {
        KubeDir::from_home(self.home.as_deref(), self.profile)
    }

    /// Merges the guest's cluster into the host kubeconfig and makes it the
    /// current context, unless that already happened for this guest.
    pub fn provision(&self) -> anyhow::Result<Outcome> {
        let gate = self.gate();
        if gate.is_provisioned() {
            info!(profile = %self.profile, "kubeconfig already provisioned");
            return Ok(Outcome::AlreadyProvisioned);
        }

        let dirs = self.kube_dir()?;
        let merger = Merger::new(self.profile, &dirs, self.tool);
        let lock = RefCell::new(None);
        let backup = RefCell::new(None);

        let mut chain = Chain::new();
        chain.stage(PROVISION_STAGE);

        chain.add(ProvisionStep::EnsuringHostDir.label(), || {
            let dir = dirs.profile_dir();
            fs::create_dir_all(dir).with_context(|| format!("error creating {}", dir.display()))?;
            *lock.borrow_mut() = Some(dirs.lock()?);
            Ok(())
        });

        chain.add(ProvisionStep::ReadingGuestConfig.label(), || {
            merger.stage_guest(self.guest, &self.guest_kubeconfig)
        });

        chain.add(ProvisionStep::MergingOnHost.label(), || merger.merge_with_host());

        chain.add(ProvisionStep::BackingUpAndSwapping.label(), || {
            let target = dirs.config();
            *backup.borrow_mut() = BackupManager::new(dirs.profile_dir())
                .snapshot(&target)
                .context("error backing up kubeconfig")?;
            swap(&dirs.scratch(), &target).context("error updating kubeconfig")
        });

        chain.add(ProvisionStep::SwitchingContext.label(), || {
            self.tool.use_context(&dirs.config(), self.profile.name())
        });

        chain.add(ProvisionStep::MarkingProvisioned.label(), || gate.mark_provisioned());

        chain.exec()?;
        drop(lock);

        info!(profile = %self.profile, "kubeconfig provisioned");
        Ok(Outcome::Provisioned {
            backup: backup.into_inner(),
        })
    }

    /// Appends the steps removing this profile's entries from the host
    /// kubeconfig to `chain`. Running them is up to the caller.
    pub fn teardown(&self, chain: &mut Chain<'a>) {
        chain.stage(TEARDOWN_STAGE);

        for section in [Section::Users, Section::Contexts, Section::Clusters] {
            let property = section.property(self.profile.name());
            let profile = self.profile;
            let home = self.home.clone();
            let tool = self.tool;
            chain.add(format!("unsetting {property}"), move || {
                let dirs = KubeDir::from_home(home.as_deref(), profile)?;
                let _lock = dirs.lock()?;
                tool.unset(&dirs.config(), &property)
            });
        }

        let gate = self.gate();
        chain.add("clearing provisioned state", move || gate.clear());
    }
}

fn swap(scratch: &Path, target: &Path) -> anyhow::Result<()> {
    fs::copy(scratch, target)
        .with_context(|| format!("error copying {} to {}", scratch.display(), target.display()))?;
    Ok(())
}
