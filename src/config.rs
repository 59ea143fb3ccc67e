//! Process configuration, read once from `BOOT2DOCKER_*` environment variables.
//!
//! `Config` is immutable after construction and passed explicitly to the
//! controller. Malformed numeric values are fatal.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::B2dError;
use crate::paths;
use crate::platform::Platform;
use crate::wait::WaitPolicy;

pub const DEFAULT_VM: &str = "boot2docker-vm";
pub const DEFAULT_DISK_SIZE_MB: u32 = 20000;
pub const DEFAULT_MEMORY_MB: u32 = 1000;
pub const DEFAULT_SSH_HOST_PORT: u16 = 2022;
pub const DEFAULT_DOCKER_PORT: u16 = 4243;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_RELEASES_URL: &str =
    "https://api.github.com/repos/boot2docker/boot2docker/releases";
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://github.com/boot2docker/boot2docker/releases/download/{tag}/boot2docker.iso";

#[derive(Debug, Clone)]
pub struct Config {
    /// Hypervisor tool (`VBoxManage`).
    pub vbm: String,
    /// SSH client.
    pub ssh: String,
    /// Default machine name when none is given on the command line.
    pub vm: String,
    pub dir: PathBuf,
    pub iso: PathBuf,
    pub disk: PathBuf,
    pub disk_size_mb: u32,
    pub memory_mb: u32,
    pub ssh_host_port: u16,
    pub docker_port: u16,
    pub poll_interval: Duration,
    /// `None` waits forever.
    pub max_wait: Option<Duration>,
    pub releases_url: String,
    /// Contains a `{tag}` placeholder.
    pub download_url: String,
    /// Current `DOCKER_HOST`, used to decide whether to print the export hint.
    pub docker_host: Option<String>,
}

impl Config {
    /// Read from the process environment.
    pub fn from_env(platform: &dyn Platform) -> Result<Self, B2dError> {
        Self::from_lookup(|key| std::env::var(key).ok(), platform)
    }

    /// Read through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F, platform: &dyn Platform) -> Result<Self, B2dError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let dir = get("BOOT2DOCKER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(paths::default_dir);
        let iso = get("BOOT2DOCKER_ISO")
            .map(PathBuf::from)
            .unwrap_or_else(|| paths::iso_path(&dir));
        let disk = get("BOOT2DOCKER_DISK")
            .map(PathBuf::from)
            .unwrap_or_else(|| paths::disk_path(&dir));

        let disk_size_mb = parse_positive(
            "BOOT2DOCKER_DISKSIZE",
            get("BOOT2DOCKER_DISKSIZE"),
            DEFAULT_DISK_SIZE_MB,
        )?;
        let memory_mb = parse_positive(
            "BOOT2DOCKER_MEMORY",
            get("BOOT2DOCKER_MEMORY"),
            DEFAULT_MEMORY_MB,
        )?;
        let ssh_host_port = parse_port(
            "BOOT2DOCKER_SSH_HOST_PORT",
            get("BOOT2DOCKER_SSH_HOST_PORT"),
            DEFAULT_SSH_HOST_PORT,
        )?;
        let docker_port = parse_port(
            "BOOT2DOCKER_DOCKER_PORT",
            get("BOOT2DOCKER_DOCKER_PORT"),
            DEFAULT_DOCKER_PORT,
        )?;

        let poll_ms: u64 = parse_positive(
            "BOOT2DOCKER_POLL_INTERVAL_MS",
            get("BOOT2DOCKER_POLL_INTERVAL_MS"),
            DEFAULT_POLL_INTERVAL_MS,
        )?;
        let max_wait_secs: u64 = parse_number(
            "BOOT2DOCKER_MAX_WAIT_SECS",
            get("BOOT2DOCKER_MAX_WAIT_SECS"),
            0,
        )?;

        let download_url =
            get("BOOT2DOCKER_DOWNLOAD_URL").unwrap_or_else(|| DEFAULT_DOWNLOAD_URL.into());
        if !download_url.contains("{tag}") {
            return Err(B2dError::Config {
                var: "BOOT2DOCKER_DOWNLOAD_URL".into(),
                message: "must contain a {tag} placeholder".into(),
            });
        }

        Ok(Self {
            vbm: get("BOOT2DOCKER_VBM").unwrap_or_else(|| platform.default_tool()),
            ssh: get("BOOT2DOCKER_SSH")
                .or_else(|| get("BOOT2DOCKER_DOCKER_SSH"))
                .unwrap_or_else(|| platform.default_ssh()),
            vm: get("BOOT2DOCKER_VM").unwrap_or_else(|| DEFAULT_VM.into()),
            dir,
            iso,
            disk,
            disk_size_mb,
            memory_mb,
            ssh_host_port,
            docker_port,
            poll_interval: Duration::from_millis(poll_ms),
            max_wait: (max_wait_secs > 0).then(|| Duration::from_secs(max_wait_secs)),
            releases_url: get("BOOT2DOCKER_RELEASES_URL")
                .unwrap_or_else(|| DEFAULT_RELEASES_URL.into()),
            download_url,
            docker_host: get("DOCKER_HOST"),
        })
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            interval: self.poll_interval,
            max_wait: self.max_wait,
        }
    }

    /// `DOCKER_HOST` value that reaches the guest's forwarded API port.
    pub fn expected_docker_host(&self) -> String {
        format!("tcp://localhost:{}", self.docker_port)
    }

    /// Size of the backing disk in bytes.
    pub fn disk_size_bytes(&self) -> u64 {
        u64::from(self.disk_size_mb) * 1024 * 1024
    }
}

fn parse_number<T>(var: &str, value: Option<String>, default: T) -> Result<T, B2dError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| B2dError::Config {
            var: var.into(),
            message: format!("'{raw}' is not a valid number ({e})"),
        }),
    }
}

fn parse_positive<T>(var: &str, value: Option<String>, default: T) -> Result<T, B2dError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let n = parse_number(var, value, default)?;
    if n <= T::default() {
        return Err(B2dError::Config {
            var: var.into(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(n)
}

fn parse_port(var: &str, value: Option<String>, default: u16) -> Result<u16, B2dError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.trim().parse::<u32>() {
        Ok(port @ 1..=65535) => Ok(port as u16),
        Ok(_) => Err(B2dError::Config {
            var: var.into(),
            message: format!("port {raw} is outside 1-65535"),
        }),
        Err(_) => Err(B2dError::Config {
            var: var.into(),
            message: format!("'{raw}' is not a valid port"),
        }),
    }
}
