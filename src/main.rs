//! request-sessions demo server entry point.

use std::process::ExitCode;

use request_sessions::{api, cli, config::Config, logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::try_init_with_level(Some(config.log_filter())).ok();
    info!("request-sessions v{}", env!("CARGO_PKG_VERSION"));

    let server_config = match config.to_server_config() {
        Ok(server_config) => server_config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = api::serve(server_config).await {
        error!("server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
