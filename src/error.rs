use miette::Diagnostic;
use thiserror::Error;

use crate::vm_state::LifecycleState;

#[derive(Debug, Error, Diagnostic)]
pub enum B2dError {
    #[error("invalid value for {var}: {message}")]
    #[diagnostic(help("unset {var} to use the default"))]
    Config { var: String, message: String },

    #[error("{name} does not exist")]
    #[diagnostic(help("run `b2d init` first"))]
    NotRegistered { name: String },

    #[error("{name} already exists")]
    AlreadyRegistered { name: String },

    #[error("{name} is {state}, it must be {expected} first")]
    InvalidState {
        name: String,
        state: LifecycleState,
        expected: &'static str,
    },

    #[error("state of {name} could not be determined")]
    #[diagnostic(help("check that the hypervisor tool is installed and `b2d info` works"))]
    AmbiguousState { name: String },

    #[error("{var}={port} on localhost is occupied")]
    #[diagnostic(help("set {var} to a free port"))]
    PortOccupied { var: &'static str, port: u16 },

    #[error("failed to launch {program}")]
    ToolLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("download failed: {message}")]
    Download {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gave up waiting for {what} after {secs}s")]
    WaitTimeout { what: String, secs: u64 },

    #[error("interrupted while waiting for {what}")]
    Cancelled { what: String },

    #[error("{name} is not running (currently {state})")]
    #[diagnostic(help("run `b2d up` first"))]
    NotRunning { name: String, state: LifecycleState },
}
