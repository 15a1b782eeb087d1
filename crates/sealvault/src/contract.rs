//! The contract shared by every vault, plus the helpers they share

use std::path::Path;

use crate::error::{Result, SecretsError};
use crate::listing::Listing;
use crate::outcome::Outcome;

/// A named-secret vault.
///
/// Structural problems (bad names, unwritable directories) come back as
/// errors. Expected outcomes (missing secret, wrong key, no keys needed)
/// come back as a negative value with a message in the [`Outcome`]; the
/// same message is kept in [`Vault::last_message`] until the next call.
pub trait Vault {
    /// Create the keypair. `overwrite` replaces keys that already exist.
    fn generate_keys(&mut self, overwrite: bool) -> Result<Outcome<bool>>;

    /// Store `value` under `name`; `false` when the vault cannot take it
    fn seal(&mut self, name: &str, value: &[u8]) -> Result<Outcome<bool>>;

    fn reveal(&mut self, name: &str) -> Result<Outcome<Option<Vec<u8>>>>;

    fn remove(&mut self, name: &str) -> Result<Outcome<bool>>;

    /// All known names; values are filled in only when `reveal` is set
    fn listing(&mut self, reveal: bool) -> Result<Outcome<Listing>>;

    fn last_message(&self) -> Option<&str>;
}

/// Whether `name` is made of ASCII word characters only
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Validate a secret name
pub fn validate_name(name: &str) -> Result<()> {
    if !is_valid_name(name) {
        return Err(SecretsError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Render `path` relative to the working directory when it lives below it
pub fn pretty_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .filter(|relative| !relative.as_os_str().is_empty())
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
