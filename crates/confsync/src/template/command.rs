//! Shell execution for check and reload commands.

use std::process::Stdio;

use tokio::process::Command as TokioCommand;

/// Outcome of a finished shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    /// Stdout followed by stderr, lossily decoded and trimmed.
    pub output: String,
}

/// Runs `command` through `/bin/sh -c` and waits for it.
pub async fn run_shell(command: &str) -> std::io::Result<CommandOutput> {
    log::debug!("Running {}", command);

    let output = TokioCommand::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let combined = combined.trim().to_string();

    if !combined.is_empty() {
        log::debug!("{}", combined);
    }

    Ok(CommandOutput {
        success: output.status.success(),
        status: output.status.code(),
        output: combined,
    })
}
