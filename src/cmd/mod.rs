//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`routes`]. Each
//! handler lives in its own submodule.

pub mod routes;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::GatehouseError;

pub async fn dispatch(cli: Cli) -> Result<(), GatehouseError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args),
        Some(Commands::Routes(ref args)) => routes::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  gatehouse v{version}: API gateway routing core\n\n  \
         No command provided. To get started:\n\n    \
         gatehouse run                     Start the gateway (auto-detects ./gatehouse.yaml)\n    \
         gatehouse run -c apis.yaml        Start with a specific config file\n    \
         gatehouse validate apis.yaml      Check a config file\n    \
         gatehouse --help                  See all commands and options\n"
    );
}
