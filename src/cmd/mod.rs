//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`init`], [`validate`], or [`health`].
//! Each handler lives in its own submodule.

pub mod health;
pub mod init;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::HostgateError;

pub async fn dispatch(cli: Cli) -> Result<(), HostgateError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Init(ref args)) => init::execute(args),
        Some(Commands::Validate(ref args)) => validate::execute(args),
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  hostgate v{version}: host-based HTTP reverse proxy\n\n  \
         No command provided. To get started:\n\n    \
         hostgate init                    Generate a starter mapping document\n    \
         hostgate run                     Start the gateway (auto-detects ./hostgate.yaml)\n    \
         hostgate run -c mappings.yaml    Start with a specific document\n    \
         hostgate --help                  See all commands and options\n"
    );
}
