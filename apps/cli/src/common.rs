//! Pieces shared by `keepsync` and `keepsync-auth`.

use clap::Args;
use colored::Colorize;
use keepsync_core::config::{default_config_dir, Paths};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration directory
    #[arg(long, env = "KEEPSYNC_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl CommonArgs {
    pub fn paths(&self) -> Paths {
        Paths::new(self.config_dir.clone().unwrap_or_else(default_config_dir))
    }
}

/// Initialize logging. `RUST_LOG` wins over `-v`.
pub fn init_logging(bin_target: &str, verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,{}={},keepsync_core={}",
            bin_target, log_level, log_level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Print the error chain and map it to the process exit code.
pub fn report(err: anyhow::Error) -> ExitCode {
    eprintln!("{} {:#}", "✗".red().bold(), err);
    let code = err
        .downcast_ref::<keepsync_core::Error>()
        .map(keepsync_core::Error::exit_code)
        .or_else(|| {
            err.downcast_ref::<keepsync_core::CryptoError>()
                .map(|_| 4)
        })
        .unwrap_or(1);
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
