//! keepsync - Export recently created notes to JSON and CSV
//!
//! Each run resumes the cached session (or logs in again), syncs the local
//! mirror, writes the notes created since the last run, then advances the
//! watermark.
//!
//! Usage:
//!   keepsync                 - Incremental export
//!   keepsync -p              - Also keep timestamped copies
//!   keepsync -n <id> [-r]    - Export one note (and clear its body)
//!   keepsync --no-key        - Token in a file, password prompted

mod common;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use common::CommonArgs;
use keepsync_core::pipeline::{self, Credentials, RunOptions, RunSummary};
use keepsync_core::secrets::TOKEN_SERVICE;
use keepsync_core::session::PasswordPrompt;
use keepsync_core::{Error, HttpNoteService, SecretBackend, SessionManager, Vars};
use std::process::ExitCode;

/// keepsync - Export recently created notes
#[derive(Parser, Debug)]
#[command(name = "keepsync")]
#[command(about = "Export recently created notes to JSON and CSV", long_about = None)]
struct Cli {
    /// Export only this note, ignoring the incremental filter
    #[arg(short = 'n', long, value_name = "ID")]
    note_id: Option<String>,

    /// Clear the note's body after exporting it
    #[arg(short, long, requires = "note_id")]
    reset: bool,

    /// Also write timestamped copies of the exports
    #[arg(short, long)]
    preserve_history: bool,

    /// Keep the session token in a file instead of the OS keyring
    #[arg(long)]
    no_key: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    common::init_logging("keepsync", cli.common.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => common::report(err),
    }
}

fn run(cli: Cli) -> Result<()> {
    println!("{}", "📒 keepsync export".bold().cyan());
    println!();

    let paths = cli.common.paths();
    println!("Config: {}", paths.config_dir.display().to_string().dimmed());

    let vars = Vars::load(&paths.vars())?;

    let backend = if cli.no_key {
        SecretBackend::File(paths.token_store())
    } else {
        SecretBackend::Keyring
    };
    let prompt: Option<PasswordPrompt> = if cli.no_key {
        Some(Box::new(prompt_password))
    } else {
        None
    };
    let credentials = Credentials::resolve(&paths, &vars, &backend, prompt)
        .context("Cannot resolve credentials")?;

    let service = HttpNoteService::new(&vars.api_base);
    let mut session = SessionManager::new(service, backend.open(TOKEN_SERVICE), paths.mirror_state());
    let options = RunOptions {
        note_id: cli.note_id,
        reset: cli.reset,
        preserve_history: cli.preserve_history,
    };

    let summary = pipeline::run(&mut session, &paths, &vars, &credentials, &options, Utc::now())?;
    print_summary(&summary);
    Ok(())
}

fn prompt_password(email: &str) -> keepsync_core::Result<String> {
    rpassword::prompt_password(format!("Password for {}: ", email)).map_err(|e| {
        tracing::debug!("Password prompt failed: {}", e);
        Error::PasswordUnavailable(email.to_string())
    })
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "{} {} notes exported",
        "✓".green().bold(),
        summary.export.notes.to_string().green()
    );
    for path in &summary.export.canonical {
        println!("  {}", path.display());
    }
    if !summary.export.history.is_empty() {
        println!("  {} history copies:", summary.export.history.len());
        for path in &summary.export.history {
            println!("    {}", path.display().to_string().dimmed());
        }
    }
    if let Some(id) = &summary.reset_note {
        println!("  Cleared note {}", id.yellow());
    }
    println!(
        "  Next run starts from {}",
        summary.watermark.to_rfc3339().dimmed()
    );
}
