use crate::demo::{run_demo, DemoArgs};
use crate::inbox::{run_inbox, InboxArgs};
use clap::{Parser, Subcommand};
use tenant_connect::config::AppConfig;
use tenant_connect::error::AppError;
use tenant_connect::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "tenant-connect",
    about = "Inspect connection inboxes and walk through the group consensus engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a viewer's categorized inbox from a JSON fixture
    Inbox(InboxArgs),
    /// Run the request lifecycle and group consensus walkthrough
    Demo(DemoArgs),
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Command::Inbox(args) => run_inbox(args, &config),
        Command::Demo(args) => run_demo(args, &config).await,
    }
}
