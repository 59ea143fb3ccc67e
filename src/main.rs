use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use b2d::cli::Cli;
use b2d::config::Config;
use b2d::controller::Controller;
use b2d::download::GithubReleases;
use b2d::error::B2dError;
use b2d::platform;
use b2d::probe::TcpProbe;
use b2d::runner::SystemRunner;
use b2d::verb::Verb;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::ValueValidation => {
            let _ = e.print();
            eprintln!("\n{}", Cli::command().render_usage());
            std::process::exit(2);
        }
        Err(e) => e.exit(),
    };

    let filter = if cli.verbose {
        EnvFilter::new("b2d=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("b2d=info"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let platform = platform::host_platform();
    let config = Config::from_env(platform.as_ref())?;
    let name = cli.machine.clone().unwrap_or_else(|| config.vm.clone());

    // First Ctrl+C interrupts a pending wait or download and rolls back an
    // unfinished init. A second one aborts outright.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
            tracing::warn!("interrupted, press Ctrl+C again to abort");
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let source = GithubReleases::new(&config.releases_url, &config.download_url)?;
    let controller = Controller::new(config, SystemRunner, TcpProbe, source, platform, cancel);

    match controller.run(cli.verb, &name).await {
        // The state line is already printed; only the exit code is left.
        Err(B2dError::NotRunning { .. }) if cli.verb == Verb::Status => std::process::exit(1),
        result => result.map_err(Into::into),
    }
}
