//! Command routing

use crate::cli::args::Commands;
use crate::cli::commands;
use anyhow::Result;

/// Route a parsed command to its implementation
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            path,
            parallelism,
            restore,
            print,
        } => {
            commands::run(commands::RunOptions {
                config,
                path,
                parallelism,
                restore,
                print,
            })
            .await
        }
        Commands::Scan { path, config } => commands::scan(path, config).await,
        Commands::InspectCheckpoint { file, json } => commands::inspect_checkpoint(file, json).await,
    }
}
