//! Host-specific defaults, isolated behind one capability provider.
//!
//! The implementation is chosen once by [`host_platform`]; nothing else in
//! the crate branches on the host OS.

use std::path::PathBuf;

/// Login used for SSH sessions into the guest.
pub const GUEST_LOGIN: &str = "docker@localhost";

pub trait Platform: std::fmt::Debug {
    /// Hypervisor tool used when `BOOT2DOCKER_VBM` is unset.
    fn default_tool(&self) -> String;

    /// SSH client used when `BOOT2DOCKER_SSH` is unset.
    fn default_ssh(&self) -> String;

    /// Arguments for an interactive session to the guest on `port`.
    fn ssh_args(&self, port: u16) -> Vec<String>;
}

/// OpenSSH with host-key checking disabled (the guest key changes on every boot).
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixPlatform;

impl Platform for UnixPlatform {
    fn default_tool(&self) -> String {
        "VBoxManage".into()
    }

    fn default_ssh(&self) -> String {
        "ssh".into()
    }

    fn ssh_args(&self, port: u16) -> Vec<String> {
        vec![
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-o".into(),
            "UserKnownHostsFile=/dev/null".into(),
            "-p".into(),
            port.to_string(),
            GUEST_LOGIN.into(),
        ]
    }
}

/// PuTTY and the VirtualBox install directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsPlatform;

impl Platform for WindowsPlatform {
    fn default_tool(&self) -> String {
        find_or_fallback("VBoxManage.exe", "VBOX_INSTALL_PATH", "")
    }

    fn default_ssh(&self) -> String {
        find_or_fallback("putty.exe", "ProgramFiles(x86)", "PuTTY")
    }

    // PuTTY cannot skip host key checking.
    fn ssh_args(&self, port: u16) -> Vec<String> {
        vec![
            "-ssh".into(),
            "-P".into(),
            port.to_string(),
            GUEST_LOGIN.into(),
        ]
    }
}

/// `exe` if it is on the search path, else `$base_var/subdir/exe`.
fn find_or_fallback(exe: &str, base_var: &str, subdir: &str) -> String {
    if on_path(exe) {
        return exe.to_string();
    }
    let base = std::env::var_os(base_var).map(PathBuf::from).unwrap_or_default();
    base.join(subdir).join(exe).display().to_string()
}

fn on_path(exe: &str) -> bool {
    std::env::var_os("PATH")
        .is_some_and(|paths| std::env::split_paths(&paths).any(|dir| dir.join(exe).is_file()))
}

/// The provider for the host this binary was built for.
pub fn host_platform() -> Box<dyn Platform> {
    if cfg!(windows) {
        Box::new(WindowsPlatform)
    } else {
        Box::new(UnixPlatform)
    }
}
