//! Shared vocabulary for VM lifecycle state.
//!
//! `LifecycleState` is observed, never owned: every call to [`query_state`]
//! re-invokes the hypervisor tool and nothing is cached between calls.

use std::fmt;

use crate::runner::CommandRunner;
use crate::vbox::VBoxManage;

/// Normalized lifecycle state of a single machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The hypervisor tool has no machine with this name.
    Unregistered,
    Running,
    Paused,
    /// Execution state saved to disk.
    Saved,
    Poweroff,
    /// The machine process died without a clean shutdown.
    Aborted,
    /// The tool could not be queried or answered with something unrecognized.
    /// Callers must treat this as "cannot safely act".
    Unknown,
}

impl LifecycleState {
    /// States from which a power-on is legal.
    pub fn can_power_on(self) -> bool {
        matches!(
            self,
            LifecycleState::Saved | LifecycleState::Poweroff | LifecycleState::Aborted
        )
    }

    /// States from which the machine may be unregistered and deleted.
    pub fn can_delete(self) -> bool {
        matches!(self, LifecycleState::Poweroff | LifecycleState::Aborted)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unregistered => "not registered",
            LifecycleState::Running => "running",
            LifecycleState::Paused => "paused",
            LifecycleState::Saved => "saved",
            LifecycleState::Poweroff => "powered off",
            LifecycleState::Aborted => "aborted",
            LifecycleState::Unknown => "in an unknown state",
        };
        f.write_str(s)
    }
}

/// Map a raw `VMState` token to a state. Total: anything unrecognized is `Unknown`.
pub fn parse_vm_state(token: &str) -> LifecycleState {
    match token {
        "running" => LifecycleState::Running,
        "paused" => LifecycleState::Paused,
        "saved" => LifecycleState::Saved,
        "poweroff" => LifecycleState::Poweroff,
        "aborted" => LifecycleState::Aborted,
        _ => LifecycleState::Unknown,
    }
}

/// Extract the value of the `VMState="..."` line from machine-readable info.
pub fn extract_vm_state(info: &str) -> Option<&str> {
    info.lines()
        .filter_map(|line| line.trim_end().strip_prefix("VMState="))
        .find_map(|value| value.strip_prefix('"')?.strip_suffix('"'))
}

/// Whether `name` appears as a quoted token at the start of a `list vms` line.
///
/// Each line looks like `"boot2docker-vm" {0b7c...}`. Matching is exact and
/// case-sensitive on the text between the quotes.
pub fn is_listed(list_output: &str, name: &str) -> bool {
    list_output.lines().any(|line| {
        line.strip_prefix('"')
            .and_then(|rest| rest.split_once('"'))
            .is_some_and(|(listed, _)| listed == name)
    })
}

/// Reconstruct the current state of `name` from the hypervisor tool.
///
/// The registry listing is consulted first and short-circuits to
/// `Unregistered`, since the detailed info query fails loudly for unknown
/// names. Any failure to run either query degrades to `Unknown`.
pub async fn query_state<R: CommandRunner>(vbox: &VBoxManage<R>, name: &str) -> LifecycleState {
    let listing = match vbox.list_vms().await {
        Ok(out) => out,
        Err(e) => {
            tracing::debug!(error = %e, "listing machines failed");
            return LifecycleState::Unknown;
        }
    };

    if !is_listed(&listing, name) {
        return LifecycleState::Unregistered;
    }

    match vbox.show_vm_info(name).await {
        Ok(info) => extract_vm_state(&info)
            .map(parse_vm_state)
            .unwrap_or(LifecycleState::Unknown),
        Err(e) => {
            tracing::debug!(name, error = %e, "machine info query failed");
            LifecycleState::Unknown
        }
    }
}
