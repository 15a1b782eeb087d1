//! Vault - Secrets sealed to a public key
//!
//! Each secret is sealed to the vault's public key and stored as a separate
//! file by the [`Store`]. Anyone can add secrets; only a holder of the
//! private key can reveal them. A vault is in one of three states:
//!
//! - no keys at all (nothing supplied, nothing on disk)
//! - decrypt only (private key supplied or loaded, public key derived)
//! - sealed (both keys generated and persisted)

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::cipher::{default_backend, SealingBackend};
use crate::contract::{pretty_path, validate_name, Vault};
use crate::error::{Result, SecretsError};
use crate::listing::Listing;
use crate::outcome::Outcome;
use crate::store::Store;

/// The sealed-box vault
pub struct SealedVault {
    store: Store,
    backend: Box<dyn SealingBackend>,
    /// Public key, once loaded, derived or generated
    encryption_key: Option<Vec<u8>>,
    /// Private key; empty until supplied or loaded
    decryption_key: Vec<u8>,
    /// The private key came from the caller, so keys are not ours to generate
    key_supplied: bool,
    last_message: Option<String>,
}

impl SealedVault {
    /// Create a vault over `store` that manages its own keys
    pub fn new(store: Store) -> Self {
        Self {
            store,
            backend: default_backend(),
            encryption_key: None,
            decryption_key: Vec::new(),
            key_supplied: false,
            last_message: None,
        }
    }

    /// Create a vault over `dir` using the standard file names
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(Store::new(dir))
    }

    /// Create a vault that decrypts with a private key deployed outside the
    /// store. An empty key is the same as no key.
    pub fn with_decryption_key(store: Store, decryption_key: impl Into<Vec<u8>>) -> Self {
        let decryption_key = decryption_key.into();
        let key_supplied = !decryption_key.is_empty();
        Self {
            decryption_key,
            key_supplied,
            ..Self::new(store)
        }
    }

    /// Swap the sealing backend
    pub fn with_backend(mut self, backend: Box<dyn SealingBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The public key secrets are sealed to, loading keys if needed
    pub fn encryption_key(&mut self) -> Result<Vec<u8>> {
        self.load_keys()?;
        match &self.encryption_key {
            Some(key) => Ok(key.clone()),
            None => self.backend.public_key(&self.decryption_key),
        }
    }

    /// Generate a fresh keypair and persist both halves.
    ///
    /// Returns `false` (with a message) when keys already exist and
    /// `overwrite` is not set, when the private key was supplied by the
    /// caller, or when no sealing backend is available.
    pub fn generate_keys(&mut self, overwrite: bool) -> Result<Outcome<bool>> {
        self.last_message = None;

        if !self.backend.is_available() {
            return Ok(self.report(
                false,
                "Cannot generate keys, no sealing backend is available in this build.",
            ));
        }

        if self.key_supplied && self.encryption_key.is_none() {
            return Ok(self.report(
                false,
                "Cannot generate keys when a decryption key has been provided while instantiating the vault.",
            ));
        }

        // Only an empty store may be generated into; unreadable key files fail the call
        match self.load_keys() {
            Ok(()) => {}
            Err(SecretsError::EncryptionKeyMissing(dir)) => {
                debug!(dir = %dir.display(), "no keys yet");
            }
            Err(e) => return Err(e),
        }

        // A private key without its public half on disk: write the public key back
        if !self.decryption_key.is_empty() && !self.store.has_encryption_key() {
            if let Some(key) = &self.encryption_key {
                self.store.save_encryption_key(key)?;
                info!(location = %self.store.location().display(), "restored missing public key");
            }
        }

        if !overwrite && self.encryption_key.is_some() {
            return Ok(self.report(
                false,
                format!(
                    "Sealing keys already exist at \"{}*.{{public,private}}\" and won't be overridden.",
                    pretty_path(&self.store.location())
                ),
            ));
        }

        let pair = self.backend.generate_keypair()?;
        self.store.save_encryption_key(&pair.public)?;
        self.store.save_decryption_key(&pair.private)?;
        self.encryption_key = Some(pair.public);
        self.decryption_key = pair.private;

        info!(location = %self.store.location().display(), "generated sealing keys");
        Ok(self.report(
            true,
            format!(
                "Sealing keys have been generated at \"{}*.public/private.php\".",
                pretty_path(&self.store.location())
            ),
        ))
    }

    /// Seal `value` under the public key and add `name` to the listing.
    ///
    /// The ciphertext is written before the listing, so an interrupted
    /// seal never lists a name without its file.
    pub fn seal(&mut self, name: &str, value: &[u8]) -> Result<Outcome<bool>> {
        self.last_message = None;
        validate_name(name)?;

        if !self.backend.is_available() {
            warn!(name, "cannot seal, no sealing backend");
            return Ok(self.report(
                false,
                format!(
                    "Secret \"{}\" cannot be sealed as no sealing backend is available in this build.",
                    name
                ),
            ));
        }

        let public = self.encryption_key()?;
        let sealed = self.backend.seal(value, &public)?;
        self.store.save_value(name, &sealed)?;

        let mut listing = self.store.load_listing()?.unwrap_or_default();
        listing.insert(name, None);
        self.store.update_listing(&listing)?;

        info!(name, "sealed secret");
        Ok(self.report(
            true,
            format!(
                "Secret \"{}\" encrypted in \"{}\"; you can commit it.",
                name,
                self.pretty_dir()
            ),
        ))
    }

    /// Decrypt the secret called `name`
    pub fn reveal(&mut self, name: &str) -> Result<Outcome<Option<Vec<u8>>>> {
        self.last_message = None;
        validate_name(name)?;

        if !self.store.value_exists(name)? {
            return Ok(self.report(
                None,
                format!("Secret \"{}\" not found in \"{}\".", name, self.pretty_dir()),
            ));
        }

        if !self.backend.is_available() {
            warn!(name, "cannot reveal, no sealing backend");
            return Ok(self.report(
                None,
                format!(
                    "Secret \"{}\" cannot be revealed as no sealing backend is available in this build.",
                    name
                ),
            ));
        }

        self.load_keys()?;

        if self.decryption_key.is_empty() {
            return Ok(self.report(
                None,
                format!(
                    "Secret \"{}\" cannot be revealed as no decryption key was found in \"{}\".",
                    name,
                    self.pretty_dir()
                ),
            ));
        }

        let sealed = self.store.load_value(name)?;
        match self.backend.open(&sealed, &self.decryption_key)? {
            Some(value) => {
                debug!(name, "revealed secret");
                Ok(self.report(
                    Some(value),
                    format!("Secret \"{}\" revealed.", name),
                ))
            }
            None => {
                warn!(name, "secret does not open with this key");
                Ok(self.report(
                    None,
                    format!(
                        "Secret \"{}\" cannot be revealed as the wrong decryption key was provided for \"{}\".",
                        name,
                        self.pretty_dir()
                    ),
                ))
            }
        }
    }

    /// Remove the secret called `name` from the listing, then delete its file
    pub fn remove(&mut self, name: &str) -> Result<Outcome<bool>> {
        self.last_message = None;
        validate_name(name)?;

        if !self.store.value_exists(name)? {
            return Ok(self.report(
                false,
                format!("Secret \"{}\" not found in \"{}\".", name, self.pretty_dir()),
            ));
        }

        let mut listing = self.store.load_listing()?.unwrap_or_default();
        listing.remove(name);
        self.store.update_listing(&listing)?;

        let removed = self.store.remove_value(name)?;
        info!(name, removed, "removed secret");
        Ok(self.report(
            removed,
            format!("Secret \"{}\" removed from \"{}\".", name, self.pretty_dir()),
        ))
    }

    /// List the secret names. With `reveal`, every value is decrypted; a
    /// name that fails to reveal is kept with no value and its reason is
    /// included in the message.
    pub fn listing(&mut self, reveal: bool) -> Result<Outcome<Listing>> {
        self.last_message = None;

        let Some(listing) = self.store.load_listing()? else {
            return Ok(self.report(
                Listing::new(),
                format!("No secrets found in \"{}\".", self.pretty_dir()),
            ));
        };

        if !reveal {
            let count = listing.len();
            return Ok(self.report(
                listing,
                format!("{} secret(s) listed in \"{}\".", count, self.pretty_dir()),
            ));
        }

        let names: Vec<String> = listing.names().map(str::to_string).collect();
        let mut revealed = Listing::new();
        let mut failures = Vec::new();
        for name in names {
            let outcome = self.reveal(&name)?;
            if outcome.value.is_none() {
                failures.extend(outcome.message);
            }
            revealed.insert(name, outcome.value);
        }

        let message = if failures.is_empty() {
            format!("{} secret(s) revealed from \"{}\".", revealed.len(), self.pretty_dir())
        } else {
            failures.join("\n")
        };
        Ok(self.report(revealed, message))
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Make sure a public key is known, loading keys from the store if needed
    fn load_keys(&mut self) -> Result<()> {
        if !self.backend.is_available() {
            return Err(SecretsError::CryptoUnavailable);
        }

        if self.encryption_key.is_some() || !self.decryption_key.is_empty() {
            return Ok(());
        }

        if let Some(key) = self.store.load_decryption_key()? {
            self.decryption_key = key;
        }

        if let Some(key) = self.store.load_encryption_key()? {
            self.encryption_key = Some(key);
        } else if !self.decryption_key.is_empty() {
            // Derived in memory only; generate_keys writes it back
            self.encryption_key = Some(self.backend.public_key(&self.decryption_key)?);
        } else {
            return Err(SecretsError::EncryptionKeyMissing(self.store.dir().to_path_buf()));
        }

        debug!(
            location = %self.store.location().display(),
            can_decrypt = !self.decryption_key.is_empty(),
            "loaded keys"
        );
        Ok(())
    }

    fn pretty_dir(&self) -> String {
        pretty_path(self.store.dir())
    }

    fn report<T>(&mut self, value: T, message: impl Into<String>) -> Outcome<T> {
        let message = message.into();
        self.last_message = Some(message.clone());
        Outcome::new(value, message)
    }
}

impl Vault for SealedVault {
    fn generate_keys(&mut self, overwrite: bool) -> Result<Outcome<bool>> {
        SealedVault::generate_keys(self, overwrite)
    }

    fn seal(&mut self, name: &str, value: &[u8]) -> Result<Outcome<bool>> {
        SealedVault::seal(self, name, value)
    }

    fn reveal(&mut self, name: &str) -> Result<Outcome<Option<Vec<u8>>>> {
        SealedVault::reveal(self, name)
    }

    fn remove(&mut self, name: &str) -> Result<Outcome<bool>> {
        SealedVault::remove(self, name)
    }

    fn listing(&mut self, reveal: bool) -> Result<Outcome<Listing>> {
        SealedVault::listing(self, reveal)
    }

    fn last_message(&self) -> Option<&str> {
        SealedVault::last_message(self)
    }
}
