//! sealvault - Secrets that can live in version control
//!
//! "Commit the ciphertext, deploy the key."
//!
//! Each secret is sealed to a public key and written to its own file in
//! the secrets directory. Only a holder of the matching private key can
//! open it again. A plaintext listing of the secret names sits next to
//! the ciphertexts so tools can enumerate them without a key.
//!
//! A dotenv-backed vault implements the same contract for local,
//! unencrypted overrides.

pub mod cipher;
pub mod codec;
pub mod contract;
pub mod dotenv;
pub mod error;
pub mod listing;
pub mod outcome;
pub mod store;
pub mod vault;

pub use cipher::{default_backend, KeyPair, SealingBackend};
pub use contract::{pretty_path, validate_name, Vault};
pub use dotenv::{DotenvVault, Environment};
pub use error::{Result, SecretsError};
pub use listing::Listing;
pub use outcome::Outcome;
pub use store::Store;
pub use vault::SealedVault;
