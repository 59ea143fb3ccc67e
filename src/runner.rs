//! Process-launch collaborator.
//!
//! Every external command goes through [`CommandRunner`] so the lifecycle
//! logic can be exercised against a recording double instead of a real
//! hypervisor.

use std::process::Stdio;

use crate::error::B2dError;

#[allow(async_fn_in_trait)] // trait is internal-only
pub trait CommandRunner {
    /// Run to completion capturing stdout. A nonzero exit is an error.
    async fn output(&self, program: &str, args: &[String]) -> Result<String, B2dError>;

    /// Run to completion with inherited stdio. A nonzero exit is an error.
    async fn run(&self, program: &str, args: &[String]) -> Result<(), B2dError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn output(&self, program: &str, args: &[String]) -> Result<String, B2dError> {
        tracing::debug!(command = %command_line(program, args), "query");
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| B2dError::ToolLaunch {
                program: program.to_string(),
                source: e,
            })?;

        if !output.status.success() {
            tracing::debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "query failed"
            );
            return Err(B2dError::CommandFailed {
                command: command_line(program, args),
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<(), B2dError> {
        tracing::debug!(command = %command_line(program, args), "run");
        let status = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| B2dError::ToolLaunch {
                program: program.to_string(),
                source: e,
            })?;

        if !status.success() {
            return Err(B2dError::CommandFailed {
                command: command_line(program, args),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

pub fn command_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}
