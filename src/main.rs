use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use credstore::{
    CorruptPolicy, Credential, CredentialStore, ON_CORRUPT_VAR, STORE_FILE_VAR, StoreConfig, mask,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

mod input;

/// Characters of a password left visible when output is masked.
const MASK_KEEP: usize = 2;

#[derive(Debug, Parser)]
#[command(name = "credstore")]
#[command(
    version,
    about = "Encrypted local store for generated test account credentials.",
    long_about = "Encrypted local store for generated test account credentials.\n\n\
                  The key material is read from SECRET_KEY (environment or .env file): \
                  64 hex characters, base64 of 32 bytes, or any passphrase."
)]
struct Cli {
    /// Path to the credential store file
    #[arg(long, global = true, value_name = "PATH", env = STORE_FILE_VAR)]
    store: Option<PathBuf>,

    /// What to do with an unreadable store file: fail or reset
    #[arg(long, global = true, value_name = "POLICY", env = ON_CORRUPT_VAR)]
    on_corrupt: Option<CorruptPolicy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Saves (or replaces) the password for a username
    #[command(arg_required_else_help = true)]
    Save {
        username: String,
        /// Password to store; read from stdin or prompted when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Prints the most recently saved credential
    Latest {
        /// Only consider usernames starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Print the password instead of a masked form
        #[arg(long, default_value_t = false)]
        show: bool,
    },

    /// Prints the credential saved for a username
    #[command(arg_required_else_help = true)]
    Get {
        username: String,
        /// Print the password instead of a masked form
        #[arg(long, default_value_t = false)]
        show: bool,
    },

    /// Lists saved usernames and when they were saved
    List,

    /// Removes the credential for a username
    #[command(arg_required_else_help = true)]
    Delete { username: String },

    /// Removes all credentials
    Clear,

    /// Prints the resolved store file path
    Path,
}

fn open_store(cli: &Cli) -> Result<CredentialStore> {
    let mut config = StoreConfig::from_env().context("invalid store configuration")?;
    if let Some(path) = &cli.store {
        config = config.with_path(path.clone());
    }
    if let Some(policy) = cli.on_corrupt {
        config = config.with_corrupt_policy(policy);
    }
    Ok(CredentialStore::new(config))
}

fn print_credential(cred: &Credential, show: bool) {
    if show {
        println!("{}\t{}", cred.username, cred.password.as_str());
    } else {
        println!("{}\t{}", cred.username, mask(&cred.password, MASK_KEEP));
    }
}

fn main() -> Result<()> {
    // .env is optional; real environment variables take precedence
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("credstore=warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = open_store(&cli)?;

    match &cli.command {
        Commands::Save { username, password } => {
            let password = match password {
                Some(pw) if pw.is_empty() => bail!("password cannot be empty"),
                Some(pw) => Zeroizing::new(pw.clone()),
                None => input::read_password(username)?,
            };
            store.save(username, &password)?;
            println!("saved credential for '{username}'");
        }
        Commands::Latest { prefix, show } => {
            let cred = match prefix {
                Some(prefix) => store.load_latest_by_prefix(prefix)?,
                None => store.load_latest()?,
            };
            print_credential(&cred, *show);
        }
        Commands::Get { username, show } => {
            let cred = store.load_by_username(username)?;
            print_credential(&cred, *show);
        }
        Commands::List => {
            let entries = store.list()?;

            if entries.is_empty() {
                println!("No credentials stored.");
                return Ok(());
            }

            let user_width = entries
                .iter()
                .map(|e| e.username.chars().count())
                .chain(std::iter::once("Username".len()))
                .max()
                .unwrap_or_default();

            println!("{:<user_width$}  Created", "Username");
            println!("{:-<user_width$}  {:-<7}", "", "");

            for e in entries {
                println!("{:<user_width$}  {}", e.username, e.created_at.to_rfc3339());
            }
        }
        Commands::Delete { username } => {
            if store.delete_by_username(username)? {
                println!("removed credential for '{username}'");
            } else {
                println!("no credential for '{username}'");
            }
        }
        Commands::Clear => {
            store.clear()?;
            println!("credential store cleared");
        }
        Commands::Path => {
            println!("{}", store.path().display());
        }
    }

    Ok(())
}
