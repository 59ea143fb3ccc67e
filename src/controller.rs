//! Lifecycle controller: validates each requested transition against the
//! observed state and issues the hypervisor commands that implement it.
//!
//! State is re-queried on every call. Verbs whose precondition fails report
//! the current state and issue no mutating command. `Unregistered` is a hard
//! failure for everything except `init`, `status` and `download`; `Unknown`
//! is never acted on.

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::disk;
use crate::download::IsoSource;
use crate::error::B2dError;
use crate::platform::Platform;
use crate::probe::PortProbe;
use crate::runner::CommandRunner;
use crate::vbox::VBoxManage;
use crate::verb::Verb;
use crate::vm_state::{LifecycleState, query_state};
use crate::wait::wait_until;

pub struct Controller<R, P, S> {
    config: Config,
    vbox: VBoxManage<R>,
    probe: P,
    iso_source: S,
    platform: Box<dyn Platform>,
    cancel: CancellationToken,
}

impl<R, P, S> Controller<R, P, S>
where
    R: CommandRunner,
    P: PortProbe,
    S: IsoSource,
{
    pub fn new(
        config: Config,
        runner: R,
        probe: P,
        iso_source: S,
        platform: Box<dyn Platform>,
        cancel: CancellationToken,
    ) -> Self {
        let vbox = VBoxManage::new(runner).with_tool(config.vbm.clone());
        Self {
            config,
            vbox,
            probe,
            iso_source,
            platform,
            cancel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Dispatch a resolved verb against machine `name`.
    ///
    /// `status` returns [`B2dError::NotRunning`] after printing when the
    /// machine is not running, so callers can map it to an exit code.
    pub async fn run(&self, verb: Verb, name: &str) -> Result<(), B2dError> {
        tracing::debug!(verb = %verb, name, "dispatch");
        match verb {
            Verb::Init => self.init(name).await,
            Verb::Start => self.start(name).await,
            Verb::Save => self.save(name).await,
            Verb::Pause => self.pause(name).await,
            Verb::Stop => self.stop(name).await,
            Verb::Poweroff => self.poweroff(name).await,
            Verb::Reset => self.reset(name).await,
            Verb::Restart => self.restart(name).await,
            Verb::Delete => self.delete(name).await,
            Verb::Status => match self.status(name).await {
                LifecycleState::Running => Ok(()),
                state => Err(B2dError::NotRunning {
                    name: name.into(),
                    state,
                }),
            },
            Verb::Info => self.info(name).await,
            Verb::Ssh => self.ssh(name).await,
            Verb::Download => self.download().await,
        }
    }

    pub async fn state(&self, name: &str) -> LifecycleState {
        query_state(&self.vbox, name).await
    }

    /// Current state, rejecting the two states no verb can act on.
    async fn registered_state(&self, name: &str) -> Result<LifecycleState, B2dError> {
        match self.state(name).await {
            LifecycleState::Unregistered => Err(B2dError::NotRegistered { name: name.into() }),
            LifecycleState::Unknown => Err(B2dError::AmbiguousState { name: name.into() }),
            state => Ok(state),
        }
    }

    // ── init ─────────────────────────────────────────────

    pub async fn init(&self, name: &str) -> Result<(), B2dError> {
        match self.state(name).await {
            LifecycleState::Unregistered => {}
            LifecycleState::Unknown => return Err(B2dError::AmbiguousState { name: name.into() }),
            _ => return Err(B2dError::AlreadyRegistered { name: name.into() }),
        }

        self.ensure_port_free("BOOT2DOCKER_DOCKER_PORT", self.config.docker_port)
            .await?;
        self.ensure_port_free("BOOT2DOCKER_SSH_HOST_PORT", self.config.ssh_host_port)
            .await?;

        tracing::info!(name, "creating VM");
        self.vbox.create_vm(name).await?;

        if let Err(e) = self.configure(name).await {
            tracing::warn!(name, error = %e, "init failed, removing partially created VM");
            if let Err(cleanup) = self.vbox.unregister_and_delete(name).await {
                tracing::warn!(name, error = %cleanup, "rollback failed");
            }
            return Err(e);
        }

        tracing::info!(name, "done");
        println!("You can now type `b2d up` and wait for the VM to start.");
        Ok(())
    }

    async fn ensure_port_free(&self, var: &'static str, port: u16) -> Result<(), B2dError> {
        if self.probe.is_listening(port).await {
            return Err(B2dError::PortOccupied { var, port });
        }
        Ok(())
    }

    /// Everything after machine creation. Any failure here triggers rollback,
    /// including an interrupt observed between steps.
    async fn configure(&self, name: &str) -> Result<(), B2dError> {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        self.ensure_not_cancelled(name)?;
        tracing::info!(name, cpus, memory_mb = self.config.memory_mb, "configuring hardware");
        self.vbox
            .configure_hardware(name, cpus, self.config.memory_mb)
            .await?;

        self.ensure_not_cancelled(name)?;
        tracing::info!(name, "setting up networking");
        self.vbox.configure_nat(name).await?;
        self.vbox
            .forward_ports(name, self.config.ssh_host_port, self.config.docker_port)
            .await?;

        if !self.config.iso.exists() {
            self.download().await?;
        }

        self.ensure_not_cancelled(name)?;
        if !self.config.disk.exists() {
            disk::provision_disk(&self.vbox, &self.config.disk, self.config.disk_size_bytes())
                .await?;
        }

        self.ensure_not_cancelled(name)?;
        tracing::info!(name, "attaching disks");
        self.vbox.add_storage_controller(name).await?;
        self.vbox.attach_dvd(name, &self.config.iso).await?;
        self.vbox.attach_hdd(name, &self.config.disk).await?;
        Ok(())
    }

    fn ensure_not_cancelled(&self, name: &str) -> Result<(), B2dError> {
        if self.cancel.is_cancelled() {
            return Err(B2dError::Cancelled {
                what: format!("creation of {name}"),
            });
        }
        Ok(())
    }

    // ── power on ─────────────────────────────────────────

    /// Power on or resume, then block until the guest's SSH forward answers.
    pub async fn start(&self, name: &str) -> Result<(), B2dError> {
        match self.registered_state(name).await? {
            LifecycleState::Running => {
                tracing::info!(name, "already running");
                return Ok(());
            }
            LifecycleState::Paused => {
                tracing::info!(name, "resuming");
                self.vbox.resume(name).await?;
            }
            state if state.can_power_on() => {
                tracing::info!(name, from = %state, "starting");
                self.vbox.start(name).await?;
            }
            state => {
                tracing::info!(name, %state, "cannot start");
                return Ok(());
            }
        }

        self.wait_reachable().await?;
        tracing::info!(name, "started");

        let expected = self.config.expected_docker_host();
        if self.config.docker_host.as_deref() != Some(expected.as_str()) {
            println!();
            println!("To connect the docker client to the Docker daemon, please set:");
            println!("export DOCKER_HOST={expected}");
            println!();
        }
        Ok(())
    }

    async fn wait_reachable(&self) -> Result<(), B2dError> {
        let port = self.config.ssh_host_port;
        let probe = &self.probe;
        wait_until(
            &self.config.wait_policy(),
            &self.cancel,
            &format!("SSH on port {port}"),
            move || probe.is_listening(port),
        )
        .await
    }

    // ── running-only transitions ─────────────────────────

    /// `Ok(true)` when running, `Ok(false)` (reported) otherwise.
    async fn require_running(&self, name: &str, verb: &str) -> Result<bool, B2dError> {
        let state = self.registered_state(name).await?;
        if state == LifecycleState::Running {
            Ok(true)
        } else {
            tracing::info!(name, %state, "not running, nothing to {verb}");
            Ok(false)
        }
    }

    pub async fn save(&self, name: &str) -> Result<(), B2dError> {
        if self.require_running(name, "save").await? {
            tracing::info!(name, "saving state");
            self.vbox.save_state(name).await?;
        }
        Ok(())
    }

    pub async fn pause(&self, name: &str) -> Result<(), B2dError> {
        if self.require_running(name, "pause").await? {
            tracing::info!(name, "pausing");
            self.vbox.pause(name).await?;
        }
        Ok(())
    }

    /// ACPI shutdown, then block until the machine leaves `Running`.
    pub async fn stop(&self, name: &str) -> Result<(), B2dError> {
        if !self.require_running(name, "stop").await? {
            return Ok(());
        }

        tracing::info!(name, "shutting down");
        self.vbox.acpi_power_button(name).await?;

        let vbox = &self.vbox;
        wait_until(
            &self.config.wait_policy(),
            &self.cancel,
            &format!("{name} to shut down"),
            move || async move { query_state(vbox, name).await != LifecycleState::Running },
        )
        .await?;
        tracing::info!(name, "stopped");
        Ok(())
    }

    /// Hard power-off. The guest gets no chance to flush its disks.
    pub async fn poweroff(&self, name: &str) -> Result<(), B2dError> {
        if self.require_running(name, "power off").await? {
            tracing::warn!(name, "forcing power off");
            self.vbox.power_off(name).await?;
        }
        Ok(())
    }

    /// Hard reset. Same caveat as [`Self::poweroff`].
    pub async fn reset(&self, name: &str) -> Result<(), B2dError> {
        if self.require_running(name, "reset").await? {
            tracing::warn!(name, "forcing reset");
            self.vbox.reset(name).await?;
        }
        Ok(())
    }

    pub async fn restart(&self, name: &str) -> Result<(), B2dError> {
        if self.registered_state(name).await? == LifecycleState::Running {
            self.stop(name).await?;
        }
        self.start(name).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), B2dError> {
        let state = self.registered_state(name).await?;
        if !state.can_delete() {
            return Err(B2dError::InvalidState {
                name: name.into(),
                state,
                expected: "stopped",
            });
        }
        tracing::info!(name, "deleting");
        self.vbox.unregister_and_delete(name).await
    }

    // ── read-only and session verbs ──────────────────────

    /// Print the state line and return the state.
    pub async fn status(&self, name: &str) -> LifecycleState {
        let state = self.state(name).await;
        let styled = console::style(state);
        match state {
            LifecycleState::Unregistered => println!("{name} does not exist."),
            LifecycleState::Running => println!("{name} is {}.", styled.green()),
            LifecycleState::Paused | LifecycleState::Saved => {
                println!("{name} is {}.", styled.yellow())
            }
            _ => println!("{name} is {}.", styled.red()),
        }
        state
    }

    pub async fn info(&self, name: &str) -> Result<(), B2dError> {
        if self.state(name).await == LifecycleState::Unregistered {
            return Err(B2dError::NotRegistered { name: name.into() });
        }
        let info = self.vbox.show_vm_info(name).await?;
        print!("{info}");
        Ok(())
    }

    /// Interactive session to the guest. Only legal while running.
    pub async fn ssh(&self, name: &str) -> Result<(), B2dError> {
        let state = self.registered_state(name).await?;
        if state != LifecycleState::Running {
            return Err(B2dError::NotRunning {
                name: name.into(),
                state,
            });
        }
        let args = self.platform.ssh_args(self.config.ssh_host_port);
        self.vbox.runner().run(&self.config.ssh, &args).await
    }

    /// Fetch the latest boot ISO to the configured path.
    pub async fn download(&self) -> Result<(), B2dError> {
        tracing::info!(path = %self.config.iso.display(), "downloading boot ISO");
        let tag = self
            .iso_source
            .fetch_latest(&self.config.iso, &self.cancel)
            .await?;
        tracing::info!(%tag, "downloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::testing::config_in;
    use crate::download::testing::FakeIsoSource;
    use crate::platform::UnixPlatform;
    use crate::probe::testing::FakeProbe;
    use crate::runner::testing::RecordingRunner;

    const VM: &str = "vm";
    const SSH_PORT: u16 = 2022;
    const DOCKER_PORT: u16 = 4243;

    struct Harness {
        controller: Controller<RecordingRunner, FakeProbe, FakeIsoSource>,
        probe: FakeProbe,
        iso: FakeIsoSource,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn runner(&self) -> &RecordingRunner {
            self.controller.vbox.runner()
        }

        fn mutations(&self) -> Vec<String> {
            self.runner().mutations()
        }
    }

    fn harness(runner: RecordingRunner) -> Harness {
        harness_with(runner, &[])
    }

    fn harness_with(runner: RecordingRunner, overrides: &[(&str, &str)]) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut vars = vec![("BOOT2DOCKER_DISKSIZE", "1")];
        vars.extend_from_slice(overrides);
        let config = config_in(dir.path(), &vars);
        let probe = FakeProbe::new();
        let iso = FakeIsoSource::default();
        let controller = Controller::new(
            config,
            runner,
            probe.clone(),
            iso.clone(),
            Box::new(UnixPlatform),
            CancellationToken::new(),
        );
        Harness {
            controller,
            probe,
            iso,
            _dir: dir,
        }
    }

    fn in_state(token: &str) -> RecordingRunner {
        RecordingRunner::new().with_listing(&[VM]).with_state(token)
    }

    // ── preconditions ──

    #[tokio::test]
    async fn running_only_verbs_are_noops_elsewhere() {
        for verb in [Verb::Save, Verb::Pause, Verb::Stop, Verb::Poweroff, Verb::Reset] {
            for token in ["paused", "saved", "poweroff", "aborted"] {
                let h = harness(in_state(token));
                h.controller.run(verb, VM).await.unwrap();
                assert!(h.mutations().is_empty(), "{verb} from {token}: {:?}", h.mutations());
            }
        }
    }

    #[tokio::test]
    async fn unregistered_is_a_hard_failure() {
        for verb in [
            Verb::Start,
            Verb::Save,
            Verb::Pause,
            Verb::Stop,
            Verb::Poweroff,
            Verb::Reset,
            Verb::Restart,
            Verb::Delete,
            Verb::Info,
            Verb::Ssh,
        ] {
            let h = harness(RecordingRunner::new());
            let err = h.controller.run(verb, VM).await.unwrap_err();
            assert!(matches!(err, B2dError::NotRegistered { .. }), "{verb}: {err:?}");
            assert!(h.mutations().is_empty(), "{verb}");
        }
    }

    #[tokio::test]
    async fn unknown_state_is_never_acted_on() {
        for verb in [
            Verb::Init,
            Verb::Start,
            Verb::Save,
            Verb::Pause,
            Verb::Stop,
            Verb::Poweroff,
            Verb::Reset,
            Verb::Restart,
            Verb::Delete,
            Verb::Ssh,
        ] {
            let h = harness(in_state("gurumeditation"));
            let err = h.controller.run(verb, VM).await.unwrap_err();
            assert!(matches!(err, B2dError::AmbiguousState { .. }), "{verb}: {err:?}");
            assert!(h.mutations().is_empty(), "{verb}");
        }

        // The raw dump stays available for diagnosing the odd state.
        let h = harness(in_state("gurumeditation"));
        h.controller.run(Verb::Info, VM).await.unwrap();
        assert!(h.mutations().is_empty());
    }

    #[tokio::test]
    async fn running_only_verbs_issue_one_command_when_running() {
        let cases = [
            (Verb::Save, "controlvm vm savestate"),
            (Verb::Pause, "controlvm vm pause"),
            (Verb::Poweroff, "controlvm vm poweroff"),
            (Verb::Reset, "controlvm vm reset"),
            (Verb::Stop, "controlvm vm acpipowerbutton"),
        ];
        for (verb, expected) in cases {
            let h = harness(in_state("running"));
            h.controller.run(verb, VM).await.unwrap();
            assert_eq!(h.mutations(), vec![expected], "{verb}");
        }
    }

    // ── start ──

    #[tokio::test]
    async fn start_powers_on_from_stopped_states() {
        for token in ["poweroff", "saved", "aborted"] {
            let h = harness(in_state(token));
            h.probe.open(SSH_PORT);
            h.controller.start(VM).await.unwrap();
            assert_eq!(h.mutations(), vec!["startvm vm --type headless"], "{token}");
        }
    }

    #[tokio::test]
    async fn start_resumes_paused() {
        let h = harness(in_state("paused"));
        h.probe.open(SSH_PORT);
        h.controller.run(Verb::Start, VM).await.unwrap();
        assert_eq!(h.mutations(), vec!["controlvm vm resume"]);
    }

    #[tokio::test]
    async fn start_when_running_does_nothing() {
        let h = harness(in_state("running"));
        h.controller.start(VM).await.unwrap();
        assert!(h.mutations().is_empty());
        assert!(h.probe.probed().is_empty());
    }

    #[tokio::test]
    async fn start_blocks_until_ssh_port_answers() {
        let h = harness(in_state("poweroff"));
        h.probe.open_after(SSH_PORT, 3);
        h.controller.start(VM).await.unwrap();
        assert_eq!(h.probe.probed(), vec![SSH_PORT; 4]);
    }

    #[tokio::test]
    async fn bounded_wait_gives_up() {
        let h = harness_with(in_state("poweroff"), &[("BOOT2DOCKER_MAX_WAIT_SECS", "1")]);
        let err = h.controller.start(VM).await.unwrap_err();
        assert!(matches!(err, B2dError::WaitTimeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn cancelled_wait_returns_without_cleanup() {
        let h = harness(in_state("poweroff"));
        h.controller.cancel.cancel();
        let err = h.controller.start(VM).await.unwrap_err();
        assert!(matches!(err, B2dError::Cancelled { .. }), "{err:?}");
        assert_eq!(h.mutations(), vec!["startvm vm --type headless"]);
    }

    // ── restart ──

    #[tokio::test]
    async fn restart_from_running_stops_then_starts() {
        let h = harness(in_state("running"));
        h.probe.open(SSH_PORT);
        h.controller.run(Verb::Restart, VM).await.unwrap();
        assert_eq!(
            h.mutations(),
            vec!["controlvm vm acpipowerbutton", "startvm vm --type headless"]
        );
    }

    #[tokio::test]
    async fn restart_from_stopped_only_starts() {
        let h = harness(in_state("poweroff"));
        h.probe.open(SSH_PORT);
        h.controller.run(Verb::Restart, VM).await.unwrap();
        assert_eq!(h.mutations(), vec!["startvm vm --type headless"]);
    }

    // ── delete ──

    #[tokio::test]
    async fn delete_requires_stopped() {
        for token in ["running", "paused", "saved"] {
            let h = harness(in_state(token));
            let err = h.controller.delete(VM).await.unwrap_err();
            assert!(matches!(err, B2dError::InvalidState { .. }), "{token}: {err:?}");
            assert!(h.mutations().is_empty(), "{token}");
        }
    }

    #[tokio::test]
    async fn delete_from_poweroff_or_aborted() {
        for token in ["poweroff", "aborted"] {
            let h = harness(in_state(token));
            h.controller.delete(VM).await.unwrap();
            assert_eq!(h.mutations(), vec!["unregistervm --delete vm"], "{token}");
            assert_eq!(h.controller.state(VM).await, LifecycleState::Unregistered);
        }
    }

    // ── init ──

    #[tokio::test]
    async fn init_rejects_occupied_ports_before_creating() {
        for port in [SSH_PORT, DOCKER_PORT] {
            let h = harness(RecordingRunner::new());
            h.probe.open(port);
            let err = h.controller.init(VM).await.unwrap_err();
            assert!(
                matches!(err, B2dError::PortOccupied { port: p, .. } if p == port),
                "{err:?}"
            );
            assert!(h.mutations().is_empty());
        }
    }

    #[tokio::test]
    async fn init_probes_both_ports() {
        let h = harness(RecordingRunner::new());
        h.controller.init(VM).await.unwrap();
        assert_eq!(h.probe.probed(), vec![DOCKER_PORT, SSH_PORT]);
    }

    #[tokio::test]
    async fn init_rejects_existing_machine() {
        for token in ["running", "paused", "saved", "poweroff", "aborted"] {
            let h = harness(in_state(token));
            let err = h.controller.init(VM).await.unwrap_err();
            assert!(matches!(err, B2dError::AlreadyRegistered { .. }), "{token}: {err:?}");
            assert!(h.mutations().is_empty(), "{token}");
            assert!(h.probe.probed().is_empty(), "{token}");
            assert_eq!(h.iso.fetches(), 0, "{token}");
        }
    }

    #[tokio::test]
    async fn interrupted_init_rolls_back() {
        let h = harness(RecordingRunner::new());
        h.controller.cancel.cancel();
        let err = h.controller.init(VM).await.unwrap_err();
        assert!(matches!(err, B2dError::Cancelled { .. }), "{err:?}");
        assert_eq!(
            h.mutations(),
            vec!["createvm --name vm --register", "unregistervm --delete vm"]
        );
        assert_eq!(h.controller.state(VM).await, LifecycleState::Unregistered);
    }

    #[tokio::test]
    async fn interrupted_download_writes_nothing() {
        let h = harness(RecordingRunner::new());
        h.controller.cancel.cancel();
        let err = h.controller.run(Verb::Download, VM).await.unwrap_err();
        assert!(matches!(err, B2dError::Cancelled { .. }), "{err:?}");
        assert!(!h.controller.config().iso.exists());
    }

    #[tokio::test]
    async fn init_provisions_missing_media_in_order() {
        let h = harness(RecordingRunner::new());
        h.controller.init(VM).await.unwrap();

        let config = h.controller.config();
        let m = h.mutations();
        assert_eq!(m[0], "createvm --name vm --register");
        assert!(m[1].starts_with("modifyvm vm --ostype Linux26_64 --cpus "), "{}", m[1]);
        assert!(m[1].contains("--memory 1000"));
        assert_eq!(m[2], "modifyvm vm --nic1 nat --nictype1 virtio --cableconnected1 on");
        assert!(m[3].starts_with("modifyvm vm --natpf1 ssh,tcp,127.0.0.1,2022,,22"));
        assert!(m[4].starts_with("convertfromraw "));
        assert!(m[4].ends_with(&format!("{} --format VMDK", config.disk.display())));
        assert_eq!(m[5], "storagectl vm --name SATA --add sata --hostiocache on");
        assert!(m[6].ends_with(&format!("--type dvddrive --medium {}", config.iso.display())));
        assert!(m[7].ends_with(&format!("--type hdd --medium {}", config.disk.display())));
        assert_eq!(m.len(), 8);
        assert_eq!(h.iso.fetches(), 1);
    }

    #[tokio::test]
    async fn init_reuses_existing_media() {
        let h = harness(RecordingRunner::new());
        let config = h.controller.config();
        std::fs::write(&config.iso, b"iso").unwrap();
        std::fs::write(&config.disk, b"disk").unwrap();

        h.controller.init(VM).await.unwrap();

        assert_eq!(h.iso.fetches(), 0);
        assert!(!h.mutations().iter().any(|m| m.starts_with("convertfromraw")));
        assert_eq!(h.mutations().len(), 7);
    }

    #[tokio::test]
    async fn init_rolls_back_on_configuration_failure() {
        let h = harness(RecordingRunner::new().failing_on("modifyvm"));
        let err = h.controller.init(VM).await.unwrap_err();
        assert!(matches!(err, B2dError::CommandFailed { .. }), "{err:?}");
        assert_eq!(
            h.mutations(),
            vec![
                "createvm --name vm --register".to_string(),
                h.mutations()[1].clone(),
                "unregistervm --delete vm".to_string(),
            ]
        );
        assert!(h.mutations()[1].starts_with("modifyvm vm --ostype"));
        assert_eq!(h.controller.state(VM).await, LifecycleState::Unregistered);
    }

    // ── ssh / status ──

    #[tokio::test]
    async fn ssh_unless_running_fails_without_spawning() {
        for token in ["paused", "saved", "poweroff", "aborted"] {
            let h = harness(in_state(token));
            let err = h.controller.run(Verb::Ssh, VM).await.unwrap_err();
            assert!(matches!(err, B2dError::NotRunning { .. }), "{token}: {err:?}");
            assert!(err.to_string().contains("not running"), "{token}");
            assert!(!h.runner().programs().iter().any(|p| p == "ssh"), "{token}");
            assert!(h.mutations().is_empty(), "{token}");
        }
    }

    #[tokio::test]
    async fn ssh_while_running_spawns_client_on_host_port() {
        let h = harness(in_state("running"));
        h.controller.ssh(VM).await.unwrap();
        let last = h.runner().invocations().pop().unwrap();
        assert_eq!(last.program, "ssh");
        assert_eq!(last.args.last().map(String::as_str), Some("docker@localhost"));
        assert!(last.args.windows(2).any(|w| w == ["-p", "2022"]));
    }

    #[tokio::test]
    async fn status_fails_unless_running() {
        let h = harness(in_state("running"));
        h.controller.run(Verb::Status, VM).await.unwrap();

        for runner in [in_state("paused"), RecordingRunner::new()] {
            let h = harness(runner);
            let err = h.controller.run(Verb::Status, VM).await.unwrap_err();
            assert!(matches!(err, B2dError::NotRunning { .. }), "{err:?}");
            assert!(h.mutations().is_empty());
        }
    }

    #[tokio::test]
    async fn download_ignores_state() {
        let h = harness(RecordingRunner::new());
        h.controller.run(Verb::Download, VM).await.unwrap();
        assert_eq!(h.iso.fetches(), 1);
        assert!(h.controller.config().iso.exists());
        assert!(h.runner().issued().is_empty());
    }

    // ── full lifecycle ──

    #[tokio::test]
    async fn full_lifecycle_one_command_per_verb() {
        let h = harness(RecordingRunner::new());
        assert_eq!(h.controller.state(VM).await, LifecycleState::Unregistered);

        h.controller.run(Verb::Init, VM).await.unwrap();
        assert_eq!(h.controller.state(VM).await, LifecycleState::Poweroff);

        h.probe.open(SSH_PORT);
        h.runner().clear();
        h.controller.run(Verb::Start, VM).await.unwrap();
        assert_eq!(h.mutations(), vec!["startvm vm --type headless"]);
        assert_eq!(h.controller.state(VM).await, LifecycleState::Running);

        h.runner().clear();
        h.controller.run(Verb::Stop, VM).await.unwrap();
        assert_eq!(h.mutations(), vec!["controlvm vm acpipowerbutton"]);
        assert_eq!(h.controller.state(VM).await, LifecycleState::Poweroff);

        h.probe.close(SSH_PORT);
        h.runner().clear();
        h.controller.run(Verb::Delete, VM).await.unwrap();
        assert_eq!(h.mutations(), vec!["unregistervm --delete vm"]);
        assert_eq!(h.controller.state(VM).await, LifecycleState::Unregistered);
    }

    #[tokio::test]
    async fn stop_polls_until_state_changes() {
        let h = harness(in_state("running").slow_shutdown());
        let runner = h.runner();
        let stop = h.controller.stop(VM);
        let flip = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            runner.set_state("poweroff");
        };
        let (result, ()) = tokio::join!(stop, flip);
        result.unwrap();

        assert_eq!(h.mutations(), vec!["controlvm vm acpipowerbutton"]);
        let infos = runner
            .issued()
            .iter()
            .filter(|c| c.starts_with("showvminfo"))
            .count();
        assert!(infos >= 3, "{infos} state queries");
    }
}
