use std::fs;
use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::Confirm;
use similar::{ChangeTag, TextDiff};
use tabular::{row, Table};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guestkube::{
    read_config, BackupManager, Chain, FileStore, Guest, KubeDir, KubeTool, Kubectl, LocalGuest,
    NativeTool, Outcome, Profile, Provisioner, Section, ShellGuest, GUEST_KUBECONFIG,
};

/// Keep a guest cluster's context in the host kubeconfig
#[derive(Parser, Debug)]
#[command(name = "guestkube", version, about, long_about = None)]
struct Cli {
    /// Guest instance name; `default` maps to the `colima` profile
    #[arg(long, short, env = "GUESTKUBE_PROFILE", default_value = "default", global = true)]
    profile: String,

    /// Command prefix that runs a command inside the guest, e.g. "colima ssh --".
    /// Without it the guest kubeconfig is read from the local filesystem.
    #[arg(long, env = "GUESTKUBE_GUEST_SHELL", global = true)]
    guest_shell: Option<String>,

    /// Kubeconfig written by the guest's Kubernetes distribution
    #[arg(long, default_value = GUEST_KUBECONFIG, global = true)]
    guest_kubeconfig: PathBuf,

    /// Where the provisioned flag is kept [default: ~/.kube/.<profile>/state.yaml]
    #[arg(long, env = "GUESTKUBE_STATE_FILE", global = true)]
    state_file: Option<PathBuf>,

    /// kubectl binary used for merging and editing
    #[arg(long, env = "GUESTKUBE_KUBECTL", default_value = "kubectl", global = true)]
    kubectl: PathBuf,

    /// Merge and edit kubeconfig files in-process instead of calling kubectl
    #[arg(long, global = true)]
    native: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add the guest's cluster to ~/.kube/config and switch to it
    Provision {
        /// Print the changes made to ~/.kube/config
        #[arg(long)]
        diff: bool,
    },
    /// Remove the guest's cluster, context and user from ~/.kube/config
    Teardown {
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
        /// Attempt every removal even if one fails
        #[arg(long)]
        keep_going: bool,
    },
    /// Show the profile's entries in ~/.kube/config
    Status,
    /// List kubeconfig backups taken for the profile
    Backups,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_env("GUESTKUBE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let profile = Profile::from_instance(&cli.profile)?;
    let dirs = KubeDir::from_env(&profile)?;
    debug!(%profile, kube_dir = %dirs.root().display(), "resolved profile");

    let guest: Box<dyn Guest> = match &cli.guest_shell {
        Some(prefix) => Box::new(ShellGuest::parse(prefix)?),
        None => Box::new(LocalGuest),
    };
    let tool: Box<dyn KubeTool> = if cli.native {
        Box::new(NativeTool)
    } else {
        Box::new(Kubectl::new(&cli.kubectl))
    };
    let state = FileStore::new(cli.state_file.clone().unwrap_or_else(|| dirs.state_file()));

    let provisioner = Provisioner::new(&profile, guest.as_ref(), tool.as_ref(), &state)
        .with_guest_kubeconfig(&cli.guest_kubeconfig);

    match cli.command {
        Command::Provision { diff } => provision(&provisioner, &dirs, diff),
        Command::Teardown { yes, keep_going } => teardown(&provisioner, yes, keep_going),
        Command::Status => status(&provisioner, &dirs),
        Command::Backups => backups(&dirs),
    }
}

fn provision(provisioner: &Provisioner, dirs: &KubeDir, diff: bool) -> anyhow::Result<()> {
    let before = fs::read_to_string(dirs.config()).unwrap_or_default();

    match provisioner.provision()? {
        Outcome::AlreadyProvisioned => {
            println!(
                "kubeconfig already provisioned for {}",
                style(provisioner.profile()).bold()
            );
            return Ok(());
        }
        Outcome::Provisioned { backup } => {
            println!(
                "{} context {}",
                style("added").green(),
                style(provisioner.profile()).bold()
            );
            if let Some(backup) = backup {
                println!("previous kubeconfig saved to {}", backup.display());
            }
        }
    }

    if diff {
        let after = fs::read_to_string(dirs.config())
            .with_context(|| format!("reading {}", dirs.config().display()))?;
        print_diff(&before, &after);
    }

    Ok(())
}

fn print_diff(before: &str, after: &str) {
    let diff = TextDiff::from_lines(before, after);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => print!("{}", style(format!("-{change}")).red()),
            ChangeTag::Insert => print!("{}", style(format!("+{change}")).green()),
            ChangeTag::Equal => print!(" {change}"),
        }
    }
}

fn teardown(provisioner: &Provisioner, yes: bool, keep_going: bool) -> anyhow::Result<()> {
    let profile = provisioner.profile();
    if !yes
        && !Confirm::new()
            .with_prompt(format!("Remove {profile} from kubeconfig?"))
            .wait_for_newline(true)
            .interact()?
    {
        return Ok(());
    }

    let mut chain = Chain::new();
    provisioner.teardown(&mut chain);
    if keep_going {
        chain.exec_all()?;
    } else {
        chain.exec()?;
    }

    println!("{} context {}", style("removed").red(), style(profile).bold());
    Ok(())
}

fn status(provisioner: &Provisioner, dirs: &KubeDir) -> anyhow::Result<()> {
    let kc = read_config(&dirs.config())?;
    let profile = provisioner.profile();

    let provisioned = if provisioner.gate().is_provisioned() {
        style("provisioned").green()
    } else {
        style("not provisioned").yellow()
    };
    println!("Profile: {} ({provisioned})", style(profile).bold());
    println!("Kubeconfig: {}", dirs.config().display());
    println!("Current context: {}\n", kc.current_context);

    let mut table = Table::new("{:<} {:<} {:<}");
    for section in Section::ALL {
        let present = if kc.contains(section, profile.name()) {
            style("present").green()
        } else {
            style("missing").red()
        };
        table.add_row(row!(section, section.property(profile.name()), present));
    }
    print!("{table}");

    let others: Vec<_> = kc
        .names(Section::Contexts)
        .into_iter()
        .filter(|name| *name != profile.name())
        .collect();
    if !others.is_empty() {
        println!("\nOther contexts:");
        let mut table = Table::new("{:<} {:<} {:<}");
        for name in others {
            let ctx = &kc.contexts[name];
            table.add_row(row!(
                name,
                format!("🖥  {}", ctx.cluster),
                format!("🧑 {}", ctx.user)
            ));
        }
        print!("{table}");
    }

    Ok(())
}

fn backups(dirs: &KubeDir) -> anyhow::Result<()> {
    let backups = BackupManager::new(dirs.profile_dir()).list()?;
    if backups.is_empty() {
        println!("No backups in {}", dirs.profile_dir().display());
        return Ok(());
    }

    let mut table = Table::new("{:<} {:<}");
    for backup in backups {
        let taken = Local
            .timestamp_opt(backup.timestamp, 0)
            .single()
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| backup.timestamp.to_string());
        table.add_row(row!(taken, backup.path.display()));
    }
    print!("{table}");
    Ok(())
}
