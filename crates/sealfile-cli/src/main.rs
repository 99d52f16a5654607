//! sealfile: encrypt and decrypt files with a symmetric keyfile
//!
//! Commands:
//!   generate <KEYFILE>            - create a new random keyfile
//!   encrypt <KEYFILE> <SRC> <DST> - seal SRC into a container at DST
//!   decrypt <KEYFILE> <SRC> <DST> - recover plaintext from a container
//!
//! All path validation lives here; the library assumes a keyfile that
//! exists (or must not, for generate), a regular source file, and an
//! absent destination. Every failure prints one line to stderr and
//! exits non-zero.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sealfile",
    version,
    about = "Authenticated file encryption with a symmetric keyfile"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new random keyfile
    Generate {
        /// Path for the new keyfile (must not exist yet)
        keyfile: PathBuf,
    },

    /// Encrypt a file into a self-describing container
    Encrypt {
        /// Keyfile holding the 32-byte symmetric key
        keyfile: PathBuf,
        /// Plaintext file to encrypt
        source: PathBuf,
        /// Destination container (must not exist yet)
        dest: PathBuf,
    },

    /// Decrypt a container, verifying integrity and completeness
    Decrypt {
        /// Keyfile holding the 32-byte symmetric key
        keyfile: PathBuf,
        /// Container to decrypt
        source: PathBuf,
        /// Destination plaintext file (must not exist yet)
        dest: PathBuf,
    },
}

fn main() -> ExitCode {
    init_logging();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Generate { keyfile } => cmd_generate(&keyfile),
        Commands::Encrypt {
            keyfile,
            source,
            dest,
        } => cmd_encrypt(&keyfile, &source, &dest),
        Commands::Decrypt {
            keyfile,
            source,
            dest,
        } => cmd_decrypt(&keyfile, &source, &dest),
    }
}

fn cmd_generate(keyfile: &Path) -> Result<()> {
    if keyfile.exists() {
        bail!("keyfile exists: {}", keyfile.display());
    }
    println!("generating key...");
    sealfile::generate_key_file(keyfile)
        .with_context(|| format!("writing keyfile: {}", keyfile.display()))?;
    println!("done: keyfile written to disk");
    Ok(())
}

fn cmd_encrypt(keyfile: &Path, source: &Path, dest: &Path) -> Result<()> {
    require_regular(keyfile, "keyfile")?;
    require_regular(source, "source file")?;
    require_absent(dest)?;

    println!("encrypting file...");
    sealfile::encrypt_file(keyfile, source, dest)
        .with_context(|| format!("encrypting {}", source.display()))?;
    println!("done: ciphertext written to disk");
    Ok(())
}

fn cmd_decrypt(keyfile: &Path, source: &Path, dest: &Path) -> Result<()> {
    require_regular(keyfile, "keyfile")?;
    require_regular(source, "source file")?;
    require_absent(dest)?;

    println!("decrypting file...");
    sealfile::decrypt_file(keyfile, source, dest)
        .with_context(|| format!("decrypting {}", source.display()))?;
    println!("done: plaintext written to disk");
    Ok(())
}

fn require_regular(path: &Path, what: &str) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("{what} does not exist: {}", path.display()))?;
    if !meta.is_file() {
        bail!("{what} is not a regular file: {}", path.display());
    }
    Ok(())
}

fn require_absent(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("destination file exists: {}", path.display());
    }
    Ok(())
}
