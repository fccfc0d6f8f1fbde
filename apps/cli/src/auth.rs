//! keepsync-auth - One-time credential setup
//!
//! Modes:
//!   keepsync-auth              - Email to auth.toml, password to the OS keyring
//!   keepsync-auth --no-key     - Log in now, keep the session token in a file
//!   keepsync-auth --encrypt    - Email and password encrypted with a passphrase key

mod common;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use common::CommonArgs;
use keepsync_core::config::{EmailEntry, EncryptedRef, DEFAULT_API_BASE};
use keepsync_core::crypto::{derive_key_new, Encryptor, KdfParams};
use keepsync_core::secrets::{FileSecretStore, KeyringSecretStore, AUTH_SERVICE, TOKEN_SERVICE};
use keepsync_core::{AuthConfig, HttpNoteService, NoteService, Paths, SecretStore, Vars};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// keepsync-auth - Store credentials for keepsync
#[derive(Parser, Debug)]
#[command(name = "keepsync-auth")]
#[command(about = "Store credentials for keepsync", long_about = None)]
struct Cli {
    /// Log in now and keep the session token in a file (no keyring)
    #[arg(long, conflicts_with = "encrypt")]
    no_key: bool,

    /// Encrypt email and password with a passphrase-derived key
    #[arg(long)]
    encrypt: bool,

    /// Derive the key with Argon2id instead of PBKDF2
    #[arg(long, requires = "encrypt")]
    argon2: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    common::init_logging("keepsync_auth", cli.common.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => common::report(err),
    }
}

fn run(cli: Cli) -> Result<()> {
    println!("{}", "🔐 keepsync Authentication".bold().cyan());
    println!();

    let paths = cli.common.paths();
    let email = prompt_line("Email: ")?;
    if email.is_empty() {
        bail!("Email must not be empty");
    }
    let password = prompt_secret("Password: ")?;
    if password.is_empty() {
        bail!("Password must not be empty");
    }

    if cli.no_key {
        store_token(&paths, &email, &password)?;
    } else if cli.encrypt {
        let params = if cli.argon2 {
            KdfParams::argon2id()
        } else {
            KdfParams::default()
        };
        store_encrypted(&paths, &email, &password, params)?;
    } else {
        store_in_keyring(&paths, &email, &password)?;
    }

    println!();
    println!("{}", "✓ Credentials saved".green().bold());
    Ok(())
}

/// Default mode: plain email in auth.toml, password in the keyring.
fn store_in_keyring(paths: &Paths, email: &str, password: &str) -> Result<()> {
    KeyringSecretStore::new(AUTH_SERVICE)
        .set(email, password)
        .context("Cannot store password in the OS keyring (try --no-key or --encrypt)")?;
    AuthConfig {
        email: EmailEntry::Plain(email.to_string()),
        password: None,
        key_file: None,
    }
    .save(&paths.auth())?;

    info!("Password stored in keyring service {}", AUTH_SERVICE);
    println!("  Email:    {}", paths.auth().display().to_string().dimmed());
    println!("  Password: {}", "OS keyring".dimmed());
    Ok(())
}

/// `--no-key`: full login now, token into the file store.
fn store_token(paths: &Paths, email: &str, password: &str) -> Result<()> {
    let api_base = match Vars::load(&paths.vars()) {
        Ok(vars) => vars.api_base,
        Err(e) => {
            warn!("{}; using {}", e, DEFAULT_API_BASE);
            DEFAULT_API_BASE.to_string()
        }
    };

    println!("Logging in to {}...", api_base);
    let mut service = HttpNoteService::new(&api_base);
    let token_file = login_and_store_token(&mut service, paths, email, password)?;

    println!("  Email: {}", paths.auth().display().to_string().dimmed());
    println!("  Token: {}", token_file.display().to_string().dimmed());
    Ok(())
}

/// Log in, then record the account in auth.toml and its token in the file
/// store. Returns the token file.
fn login_and_store_token<S: NoteService>(
    service: &mut S,
    paths: &Paths,
    email: &str,
    password: &str,
) -> Result<PathBuf> {
    let token = Zeroizing::new(
        service
            .login(email, password, None)
            .map_err(|e| keepsync_core::Error::RemoteLogin(e.to_string()))?,
    );

    let mut store = FileSecretStore::new(paths.token_store(), TOKEN_SERVICE);
    store.set(email, &token)?;
    AuthConfig {
        email: EmailEntry::Plain(email.to_string()),
        password: None,
        key_file: None,
    }
    .save(&paths.auth())?;

    info!("Session token written to {}", store.path().display());
    Ok(store.path().to_path_buf())
}

/// `--encrypt`: key file plus one blob each for email and password.
fn store_encrypted(paths: &Paths, email: &str, password: &str, params: KdfParams) -> Result<()> {
    let passphrase = prompt_secret("Passphrase: ")?;
    let confirm = prompt_secret("Confirm passphrase: ")?;
    if *passphrase != *confirm {
        bail!("Passphrases do not match");
    }
    if passphrase.is_empty() {
        bail!("Passphrase must not be empty");
    }

    println!("Deriving key...");
    let derived = derive_key_new(&passphrase, params)?;

    let email_blob = paths.email_blob();
    let password_blob = paths.password_blob();
    let key_file = paths.key_file();

    // Key first: it refuses to land on either blob path.
    derived
        .key
        .write_key_file(&key_file, &[email_blob.as_path(), password_blob.as_path()])?;
    Encryptor::encrypt(&derived, email.as_bytes())?.write_file(&email_blob)?;
    Encryptor::encrypt(&derived, password.as_bytes())?.write_file(&password_blob)?;

    AuthConfig {
        email: EmailEntry::Encrypted(EncryptedRef {
            encrypted: email_blob.clone(),
        }),
        password: Some(EncryptedRef {
            encrypted: password_blob.clone(),
        }),
        key_file: Some(key_file.clone()),
    }
    .save(&paths.auth())?;

    info!("Encrypted credentials written");
    println!("  Email:    {}", email_blob.display().to_string().dimmed());
    println!("  Password: {}", password_blob.display().to_string().dimmed());
    println!("  Key:      {}", key_file.display().to_string().dimmed());
    println!(
        "{}",
        "  Keep the key file away from backups of the encrypted files.".yellow()
    );
    Ok(())
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Cannot read from stdin")?;
    Ok(line.trim().to_string())
}

fn prompt_secret(label: &str) -> Result<Zeroizing<String>> {
    let secret = rpassword::prompt_password(label).context("Cannot read hidden input")?;
    Ok(Zeroizing::new(secret))
}
