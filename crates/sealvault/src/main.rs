//! sealvault - Secrets you can commit
//!
//! Seals secrets to a public key so the encrypted files can live in
//! version control. Only machines holding the private key can read them.
//!
//! Commands:
//! - generate-keys: Create the keypair (--override to rotate)
//! - set <NAME> [VALUE]: Seal a secret (prompts if no value)
//! - get <NAME>: Reveal a secret
//! - list: List secret names (--reveal to decrypt them)
//! - remove <NAME>: Delete a secret
//! - key: Show the public key

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sealvault::{DotenvVault, Environment, Listing, Outcome, SealedVault, Store, Vault};
use sealvault_core::{Config, Paths};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sealvault")]
#[command(about = "Secrets sealed to a public key - commit the ciphertext, deploy the key")]
#[command(version)]
#[command(after_help = r#"SECRET NAMING:
    Names are made of letters, digits and underscores:
    - DATABASE_URL       Database credentials
    - STRIPE_API_KEY     Payment provider key

FILES:
    <dir>/<base>.encrypt.public.php    public key, safe to commit
    <dir>/<base>.decrypt.private.php   private key, never commit
    <dir>/<base>.list.php              secret names
    <dir>/<base>.<NAME>.<hash>.php     one sealed secret

DEPLOYMENT:
    Put the private key in $SEALVAULT_DECRYPTION_KEY instead of the
    private key file on machines that only need to read secrets."#)]
struct Cli {
    /// Secrets directory (overrides the config file)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Config file (default: ~/.config/sealvault/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dotenv file used by --local (overrides the config file)
    #[arg(long, global = true)]
    dotenv: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the keypair used to seal and reveal secrets
    GenerateKeys {
        /// Replace existing keys (existing secrets become unreadable)
        #[arg(short = 'r', long = "override")]
        overwrite: bool,
    },

    /// Seal a secret (prompts securely if value not provided)
    Set {
        /// Secret name (e.g., DATABASE_URL)
        name: String,
        /// Secret value (omit for secure hidden prompt)
        value: Option<String>,
        /// Write to the local plaintext dotenv file instead
        #[arg(short = 'l', long)]
        local: bool,
    },

    /// Reveal and print a secret value
    Get {
        /// Don't print trailing newline (useful for piping)
        #[arg(short = 'n')]
        no_newline: bool,
        /// Secret name
        name: String,
    },

    /// List stored secret names
    List {
        /// Decrypt and show the values
        #[arg(short = 'r', long)]
        reveal: bool,
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Remove a secret permanently
    Remove {
        /// Secret name to remove
        name: String,
        /// Remove from the local plaintext dotenv file instead
        #[arg(short = 'l', long)]
        local: bool,
    },

    /// Show the public key
    Key,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(|| Paths::new().config_file());
    let mut config = Config::load(&config_path)?;
    if let Some(dotenv) = cli.dotenv.clone() {
        config.dotenv_file = dotenv;
    }
    let secrets_dir = cli.dir.clone().unwrap_or_else(|| config.secrets_dir.clone());

    match cli.command {
        Some(Commands::GenerateKeys { overwrite }) => {
            cmd_generate_keys(&mut sealed_vault(&config, secrets_dir), overwrite)
        }
        Some(Commands::Set { name, value, local }) => {
            let mut vault = select_vault(&config, secrets_dir, local);
            cmd_set(vault.as_mut(), &name, value)
        }
        Some(Commands::Get { no_newline, name }) => {
            cmd_get(&mut sealed_vault(&config, secrets_dir), &name, no_newline)
        }
        Some(Commands::List { reveal, json }) => {
            cmd_list(&mut sealed_vault(&config, secrets_dir), reveal, json)
        }
        Some(Commands::Remove { name, local }) => {
            let mut vault = select_vault(&config, secrets_dir, local);
            cmd_remove(vault.as_mut(), &name)
        }
        Some(Commands::Key) => cmd_key(&mut sealed_vault(&config, secrets_dir)),
        None => {
            // Default to listing secrets
            cmd_list(&mut sealed_vault(&config, secrets_dir), false, false)
        }
    }
}

/// Build the sealed vault, taking the private key from the environment when set
fn sealed_vault(config: &Config, secrets_dir: PathBuf) -> SealedVault {
    let store = Store::new(secrets_dir);
    match std::env::var(&config.decryption_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            tracing::debug!(var = %config.decryption_key_env, "using decryption key from environment");
            SealedVault::with_decryption_key(store, key.trim())
        }
        _ => SealedVault::new(store),
    }
}

fn select_vault(config: &Config, secrets_dir: PathBuf, local: bool) -> Box<dyn Vault> {
    if local {
        let mut env = Environment::from_process();
        if let Ok(file_env) = Environment::load_dotenv(&config.dotenv_file) {
            env.merge(file_env);
        }
        Box::new(DotenvVault::new(config.dotenv_file.clone(), env))
    } else {
        Box::new(sealed_vault(config, secrets_dir))
    }
}

/// Print the status message of an operation
fn report<T>(outcome: &Outcome<T>, success: bool) {
    if let Some(message) = outcome.message() {
        if success {
            println!("success: {}", message);
        } else {
            println!("warning: {}", message);
        }
    }
}

/// Generate the keypair
fn cmd_generate_keys(vault: &mut SealedVault, overwrite: bool) -> Result<()> {
    println!("info: Generating sealing keys...");
    let outcome = vault.generate_keys(overwrite)?;
    report(&outcome, outcome.value);

    if outcome.value {
        let pubkey = vault.encryption_key()?;
        println!();
        println!("Public key (commit it):");
        println!("  {}", String::from_utf8_lossy(&pubkey));
        println!();
        println!("Never commit the decrypt.private file.");
    }

    Ok(())
}

/// Seal a secret
fn cmd_set(vault: &mut dyn Vault, name: &str, value: Option<String>) -> Result<()> {
    // Get value - prompt if not provided
    let secret_value = match value {
        Some(v) => v,
        None => {
            // Prompt for hidden input
            let password = rpassword::prompt_password(format!("Value of \"{}\": ", name))
                .context("Failed to read secret value")?;

            if password.is_empty() {
                bail!("Empty value not allowed");
            }

            password
        }
    };

    let outcome = vault.seal(name, secret_value.as_bytes())?;
    if !outcome.value {
        bail!("{}", outcome.message.unwrap_or_else(|| format!("Secret \"{}\" not sealed", name)));
    }
    report(&outcome, true);

    Ok(())
}

/// Reveal a secret
fn cmd_get(vault: &mut SealedVault, name: &str, no_newline: bool) -> Result<()> {
    let outcome = vault.reveal(name)?;
    let Some(value) = outcome.value else {
        bail!("{}", outcome.message.unwrap_or_else(|| format!("Secret \"{}\" not found", name)));
    };

    let value = String::from_utf8_lossy(&value);
    if no_newline {
        print!("{}", value);
    } else {
        println!("{}", value);
    }

    Ok(())
}

/// List all secrets
fn cmd_list(vault: &mut SealedVault, reveal: bool, json: bool) -> Result<()> {
    let outcome = vault.listing(reveal)?;
    let listing = &outcome.value;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing_json(listing))?);
        return Ok(());
    }

    if listing.is_empty() {
        println!("No secrets stored. Add one with: sealvault set <NAME>");
        return Ok(());
    }

    println!("Stored Secrets");
    println!();

    for (name, value) in listing.iter() {
        match value {
            Some(value) if reveal => println!("  {} = {}", name, String::from_utf8_lossy(value)),
            None if reveal => println!("  {} (cannot be revealed)", name),
            _ => println!("  {}", name),
        }
    }

    if reveal {
        if let Some(message) = outcome.message() {
            eprintln!();
            eprintln!("{}", message);
        }
    }

    Ok(())
}

/// One object per secret, in listing order
fn listing_json(listing: &Listing) -> serde_json::Value {
    listing
        .iter()
        .map(|(name, value)| {
            serde_json::json!({
                "name": name,
                "value": value.map(|v| String::from_utf8_lossy(v).into_owned()),
            })
        })
        .collect()
}

/// Remove a secret
fn cmd_remove(vault: &mut dyn Vault, name: &str) -> Result<()> {
    let outcome = vault.remove(name)?;
    if !outcome.value {
        bail!("{}", outcome.message.unwrap_or_else(|| format!("Secret \"{}\" not removed", name)));
    }
    report(&outcome, true);
    Ok(())
}

/// Show public key
fn cmd_key(vault: &mut SealedVault) -> Result<()> {
    let pubkey = vault.encryption_key()?;
    println!("{}", String::from_utf8_lossy(&pubkey));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from(["sealvault", "generate-keys"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::GenerateKeys { overwrite: false })));

        let cli = Cli::try_parse_from(["sealvault", "generate-keys", "--override"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::GenerateKeys { overwrite: true })));

        let cli = Cli::try_parse_from(["sealvault", "set", "API_KEY", "value"]).unwrap();
        if let Some(Commands::Set { name, value, local }) = cli.command {
            assert_eq!(name, "API_KEY");
            assert_eq!(value, Some("value".to_string()));
            assert!(!local);
        } else {
            panic!("Expected Set command");
        }

        let cli = Cli::try_parse_from(["sealvault", "get", "-n", "API_KEY"]).unwrap();
        if let Some(Commands::Get { name, no_newline }) = cli.command {
            assert_eq!(name, "API_KEY");
            assert!(no_newline);
        } else {
            panic!("Expected Get command");
        }
    }

    #[test]
    fn test_cli_global_dir() {
        let cli = Cli::try_parse_from(["sealvault", "list", "--reveal", "--dir", "config/secrets"]).unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("config/secrets")));
        assert!(matches!(cli.command, Some(Commands::List { reveal: true, json: false })));
    }

    #[test]
    fn test_cli_remove_local() {
        let cli =
            Cli::try_parse_from(["sealvault", "remove", "--local", "API_KEY", "--dotenv", ".env"]).unwrap();
        assert_eq!(cli.dotenv, Some(PathBuf::from(".env")));
        if let Some(Commands::Remove { name, local }) = cli.command {
            assert_eq!(name, "API_KEY");
            assert!(local);
        } else {
            panic!("Expected Remove command");
        }
    }

    #[test]
    fn test_listing_json() {
        let listing: Listing = [("B", Some(b"2".to_vec())), ("A", None)].into_iter().collect();
        let json = listing_json(&listing);
        assert_eq!(
            json,
            serde_json::json!([{"name": "A", "value": null}, {"name": "B", "value": "2"}])
        );
    }

    #[test]
    fn test_listing_json_keeps_natural_order() {
        let listing: Listing = [("db10", None), ("db2", None), ("db1", None)].into_iter().collect();
        let names: Vec<String> = listing_json(&listing)
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["db1", "db2", "db10"]);
    }
}
