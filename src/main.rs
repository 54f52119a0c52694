use clap::Parser;
use tracing::{debug, error, trace};
use tributary::cli::{execute_command, Cli};
use tributary::error::ConnectorError;
use tributary::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    debug!("tributary started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = execute_command(cli.command).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        let code = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<ConnectorError>())
            .map_or(1, ConnectorError::exit_code);
        std::process::exit(code);
    }
}
