pub mod backup;
pub mod chain;
pub mod clean;
mod command;
pub mod direct;
pub mod guest;
pub mod merge;
pub mod paths;
pub mod profile;
pub mod provision;
pub mod state;
pub mod tool;

pub use backup::BackupManager;
pub use chain::{Chain, StepFailed};
pub use clean::*;
pub use guest::{Guest, LocalGuest, ShellGuest, GUEST_KUBECONFIG};
pub use paths::KubeDir;
pub use profile::Profile;
pub use provision::{Outcome, ProvisionStep, Provisioner};
pub use state::{FileStore, Gate, MemoryStore, StateStore};
pub use tool::{KubeTool, Kubectl, NativeTool};
