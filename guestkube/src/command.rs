//! Running host processes and turning non-zero exits into errors.

use std::process::{Command, Stdio};

use anyhow::{bail, Context as _};
use tracing::debug;

fn describe(cmd: &Command) -> String {
    let mut words = vec![cmd.get_program().to_string_lossy().into_owned()];
    words.extend(cmd.get_args().map(|arg| arg.to_string_lossy().into_owned()));
    words.join(" ")
}

/// Runs `cmd` to completion and returns its stdout.
pub(crate) fn output(cmd: &mut Command) -> anyhow::Result<String> {
    let line = describe(cmd);
    debug!(command = %line, "running");
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("error running `{line}`"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("`{line}` failed ({}): {}", output.status, stderr.trim());
    }
    String::from_utf8(output.stdout).with_context(|| format!("`{line}` printed invalid UTF-8"))
}

/// Runs `cmd` attached to the current terminal.
pub(crate) fn interactive(cmd: &mut Command) -> anyhow::Result<()> {
    let line = describe(cmd);
    debug!(command = %line, "running interactively");
    let status = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("error running `{line}`"))?;
    if !status.success() {
        bail!("`{line}` failed ({status})");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::process::Command;

    use super::{interactive, output};

    #[test]
    fn test_output() {
        let out = output(Command::new("echo").arg("hello")).expect("echo");
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn test_failure_carries_stderr() {
        let err = output(Command::new("sh").args(["-c", "echo broken >&2; exit 3"])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("broken"), "{msg}");
        assert!(msg.starts_with("`sh -c"), "{msg}");
    }

    #[test]
    fn test_interactive_status() {
        assert!(interactive(&mut Command::new("true")).is_ok());
        assert!(interactive(&mut Command::new("false")).is_err());
    }
}
