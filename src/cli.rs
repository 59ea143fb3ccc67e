use clap::Parser;

use crate::verb::Verb;

#[derive(Parser, Debug)]
#[command(
    name = "b2d",
    version,
    about = "Manage the boot2docker virtual machine through VirtualBox",
    after_help = "Verbs: init, start|up|boot|resume, save|suspend, pause, stop|halt|down, \
                  poweroff, reset, restart, delete|destroy, status, info, ssh, download"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Operation to perform
    #[arg(value_name = "VERB")]
    pub verb: Verb,

    /// Machine name (defaults to $BOOT2DOCKER_VM)
    #[arg(value_name = "MACHINE")]
    pub machine: Option<String>,
}
