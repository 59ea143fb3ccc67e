//! Typed wrapper over the `VBoxManage` command surface.
//!
//! Each method issues exactly one external command. Read-only queries capture
//! stdout; everything else inherits stdio so the tool's own progress output
//! reaches the operator.

use std::path::Path;

use crate::error::B2dError;
use crate::runner::CommandRunner;

/// Name of the storage controller the ISO and disk are attached to.
pub const STORAGE_CONTROLLER: &str = "SATA";
/// Guest port the SSH forward targets.
pub const GUEST_SSH_PORT: u16 = 22;
/// Guest port the Docker API forward targets.
pub const GUEST_DOCKER_PORT: u16 = 4243;

pub struct VBoxManage<R> {
    tool: String,
    runner: R,
}

impl<R: CommandRunner> VBoxManage<R> {
    pub fn new(runner: R) -> Self {
        Self {
            tool: "VBoxManage".into(),
            runner,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn query(&self, args: &[&str]) -> Result<String, B2dError> {
        self.runner.output(&self.tool, &owned(args)).await
    }

    async fn exec(&self, args: &[&str]) -> Result<(), B2dError> {
        self.runner.run(&self.tool, &owned(args)).await
    }

    // ── Queries ──────────────────────────────────────────

    pub async fn list_vms(&self) -> Result<String, B2dError> {
        self.query(&["list", "vms"]).await
    }

    pub async fn show_vm_info(&self, name: &str) -> Result<String, B2dError> {
        self.query(&["showvminfo", name, "--machinereadable"]).await
    }

    // ── Creation ─────────────────────────────────────────

    pub async fn create_vm(&self, name: &str) -> Result<(), B2dError> {
        self.exec(&["createvm", "--name", name, "--register"]).await
    }

    #[rustfmt::skip]
    pub async fn configure_hardware(
        &self,
        name: &str,
        cpus: usize,
        memory_mb: u32,
    ) -> Result<(), B2dError> {
        let cpus = cpus.to_string();
        let memory = memory_mb.to_string();
        self.exec(&[
            "modifyvm", name,
            "--ostype", "Linux26_64",
            "--cpus", &cpus,
            "--memory", &memory,
            "--rtcuseutc", "on",
            "--acpi", "on",
            "--ioapic", "on",
            "--hpet", "on",
            "--hwvirtex", "on",
            "--vtxvpid", "on",
            "--largepages", "on",
            "--nestedpaging", "on",
            "--firmware", "bios",
            "--bioslogofadein", "off",
            "--bioslogofadeout", "off",
            "--bioslogodisplaytime", "0",
            "--biosbootmenu", "disabled",
            "--boot1", "dvd",
        ])
        .await
    }

    #[rustfmt::skip]
    pub async fn configure_nat(&self, name: &str) -> Result<(), B2dError> {
        self.exec(&[
            "modifyvm", name,
            "--nic1", "nat",
            "--nictype1", "virtio",
            "--cableconnected1", "on",
        ])
        .await
    }

    pub async fn forward_ports(
        &self,
        name: &str,
        ssh_host_port: u16,
        docker_host_port: u16,
    ) -> Result<(), B2dError> {
        let ssh = format!("ssh,tcp,127.0.0.1,{ssh_host_port},,{GUEST_SSH_PORT}");
        let docker = format!("docker,tcp,127.0.0.1,{docker_host_port},,{GUEST_DOCKER_PORT}");
        self.exec(&["modifyvm", name, "--natpf1", &ssh, "--natpf1", &docker])
            .await
    }

    #[rustfmt::skip]
    pub async fn add_storage_controller(&self, name: &str) -> Result<(), B2dError> {
        self.exec(&[
            "storagectl", name,
            "--name", STORAGE_CONTROLLER,
            "--add", "sata",
            "--hostiocache", "on",
        ])
        .await
    }

    pub async fn attach_dvd(&self, name: &str, iso: &Path) -> Result<(), B2dError> {
        self.attach(name, "0", "dvddrive", iso).await
    }

    pub async fn attach_hdd(&self, name: &str, disk: &Path) -> Result<(), B2dError> {
        self.attach(name, "1", "hdd", disk).await
    }

    #[rustfmt::skip]
    async fn attach(
        &self,
        name: &str,
        port: &str,
        kind: &str,
        medium: &Path,
    ) -> Result<(), B2dError> {
        let medium = medium.display().to_string();
        self.exec(&[
            "storageattach", name,
            "--storagectl", STORAGE_CONTROLLER,
            "--port", port,
            "--device", "0",
            "--type", kind,
            "--medium", &medium,
        ])
        .await
    }

    pub async fn convert_from_raw(&self, raw: &Path, disk: &Path) -> Result<(), B2dError> {
        let raw = raw.display().to_string();
        let disk = disk.display().to_string();
        self.exec(&["convertfromraw", &raw, &disk, "--format", "VMDK"])
            .await
    }

    // ── Power control ────────────────────────────────────

    pub async fn start(&self, name: &str) -> Result<(), B2dError> {
        self.exec(&["startvm", name, "--type", "headless"]).await
    }

    pub async fn pause(&self, name: &str) -> Result<(), B2dError> {
        self.control(name, "pause").await
    }

    pub async fn resume(&self, name: &str) -> Result<(), B2dError> {
        self.control(name, "resume").await
    }

    pub async fn save_state(&self, name: &str) -> Result<(), B2dError> {
        self.control(name, "savestate").await
    }

    pub async fn acpi_power_button(&self, name: &str) -> Result<(), B2dError> {
        self.control(name, "acpipowerbutton").await
    }

    pub async fn power_off(&self, name: &str) -> Result<(), B2dError> {
        self.control(name, "poweroff").await
    }

    pub async fn reset(&self, name: &str) -> Result<(), B2dError> {
        self.control(name, "reset").await
    }

    async fn control(&self, name: &str, action: &str) -> Result<(), B2dError> {
        self.exec(&["controlvm", name, action]).await
    }

    pub async fn unregister_and_delete(&self, name: &str) -> Result<(), B2dError> {
        self.exec(&["unregistervm", "--delete", name]).await
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}
