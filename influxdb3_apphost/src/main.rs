//! Entrypoint of the influxdb3_apphost binary
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr,
    clippy::future_not_send
)]

use dotenvy::dotenv;
use trogging::{
    TroggingGuard,
    cli::LoggingConfigBuilderExt,
    tracing_subscriber::{Registry, prelude::*},
};

mod commands {
    pub(crate) mod check;
    pub(crate) mod manifest;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "influxdb3_apphost",
    about = "Declare InfluxDB containers for local orchestration and check the clients that use them",
    long_about = r#"Declare InfluxDB containers for local orchestration and check the clients that use them

Examples:
    # Print the manifest of an InfluxDB container with a persistent data volume
    influxdb3_apphost manifest --name influx --data-volume

    # Publish the container on a fixed port with a known token
    influxdb3_apphost manifest --name influx --port 18086 --token my-token

    # Check the InfluxDB configured as ConnectionStrings__influx
    ConnectionStrings__influx='http://localhost:18086?token=my-token' influxdb3_apphost check -n influx

    # Check with debug logging
    LOG_FILTER=debug influxdb3_apphost check -n influx
"#
)]
struct Config {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Declare an InfluxDB container and print its deployment manifest
    Manifest(commands::manifest::Config),

    /// Register an InfluxDB client from configuration and run its health check
    Check(commands::check::Config),
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tokio_runtime.block_on(async move {
        fn handle_init_logs(r: Result<TroggingGuard, trogging::Error>) -> TroggingGuard {
            match r {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("Initializing logs failed: {e}");
                    std::process::exit(ReturnCode::Failure as _);
                }
            }
        }

        match config.command {
            None => println!("command required, -h/--help for help"),
            Some(Command::Manifest(config)) => {
                let _tracing_guard = handle_init_logs(init_logs(&config.logging_config));
                if let Err(e) = commands::manifest::command(config) {
                    eprintln!("Manifest command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Some(Command::Check(config)) => {
                let _tracing_guard = handle_init_logs(init_logs(&config.logging_config));
                if let Err(e) = commands::check::command(config).await {
                    eprintln!("Check command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing env file is not an error
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}

/// Logs go to stdout by default, which also carries the manifest, so only warnings are shown
/// unless asked for with `-v` or `LOG_FILTER`
fn init_logs(config: &trogging::cli::LoggingConfig) -> Result<TroggingGuard, trogging::Error> {
    let log_layer = trogging::Builder::new()
        .with_default_log_filter("warn")
        .with_logging_config(config)
        .build()?;

    let subscriber = Registry::default().with(log_layer);
    trogging::install_global(subscriber)
}
