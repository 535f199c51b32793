#![expect(clippy::print_stderr, reason = "Fatal errors are reported here")]

//! Application layer and composition root wiring.

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing::error;

pub mod commands;
pub mod daemon;

use crate::app::commands::Cli;
use crate::app::daemon::start_server;
use crate::common::ServerError;
use crate::common::telemetry;
use crate::infra::daemon::ConfigError;
use crate::infra::daemon::ServerConfig;

const PROGRAM_NAME: &str = "talk-recording";
/// Level used while the configuration file is being read.
const BOOTSTRAP_LOG_LEVEL: &str = "info";

/// Exit codes following sysexits.h.
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const UNAVAILABLE: i32 = 69;
    pub const OSERR: i32 = 71;
    pub const CONFIG: i32 = 78;
}

pub struct Application;

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self) -> Result<i32> {
        let exit_code = match self.execute() {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => self.handle_error(e),
        };
        Ok(exit_code)
    }

    fn execute(&self) -> Result<()> {
        let cli = Cli::parse();
        let bootstrap_level = if cli.verbose {
            "debug"
        } else {
            BOOTSTRAP_LOG_LEVEL
        };
        let telemetry = telemetry::init_tracing(bootstrap_level);
        let config = ServerConfig::load(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?;
        if !cli.verbose {
            telemetry.apply_level(config.log_level());
        }
        debug!(
            config = %cli.config.display(),
            configured_level = config.log_level(),
            verbose = cli.verbose,
            "Configuration loaded"
        );

        start_server(config).context("recording server failed")
    }

    fn handle_error(&self, e: anyhow::Error) -> i32 {
        error!(error = %format!("{e:#}"), "Exiting");
        eprintln!("{PROGRAM_NAME}: Error: {e:#}");
        exit_code_for(&e)
    }
}

fn exit_code_for(e: &anyhow::Error) -> i32 {
    if find_error::<ConfigError>(e).is_some() {
        return exit_codes::CONFIG;
    }
    match find_error::<ServerError>(e) {
        Some(ServerError::ApiStart(_)) => exit_codes::UNAVAILABLE,
        Some(ServerError::SignalSetup(_) | ServerError::NotifierSetup(_)) => exit_codes::OSERR,
        None => exit_codes::GENERAL_ERROR,
    }
}

fn find_error<T: std::error::Error + 'static>(e: &anyhow::Error) -> Option<&T> {
    e.chain().find_map(|cause| cause.downcast_ref::<T>())
}
