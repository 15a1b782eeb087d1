//! Sealing backends
//!
//! A sealed box encrypts to a public key without a sender identity; only
//! the private key can open it. The vault talks to the primitive through
//! [`SealingBackend`] so a build without it degrades to soft failures
//! instead of refusing to run.
//!
//! The default backend uses age (X25519 + ChaCha20-Poly1305). Keys are
//! stored as their canonical age strings: `age1...` for the public key and
//! `AGE-SECRET-KEY-1...` for the private one.

use crate::error::{Result, SecretsError};

/// A freshly generated keypair
pub struct KeyPair {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

/// The sealed-box primitive
pub trait SealingBackend {
    /// Whether the primitive can be used at all
    fn is_available(&self) -> bool;

    fn generate_keypair(&self) -> Result<KeyPair>;

    /// Derive the public key that belongs to `private`
    fn public_key(&self, private: &[u8]) -> Result<Vec<u8>>;

    fn seal(&self, plaintext: &[u8], public: &[u8]) -> Result<Vec<u8>>;

    /// Open a sealed box. `Ok(None)` means the ciphertext does not
    /// authenticate under this key (tampered, or sealed to another key).
    fn open(&self, ciphertext: &[u8], private: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// The backend compiled into this build
pub fn default_backend() -> Box<dyn SealingBackend> {
    #[cfg(feature = "age")]
    {
        Box::new(AgeBackend)
    }
    #[cfg(not(feature = "age"))]
    {
        Box::new(Unavailable)
    }
}

/// Stand-in used when no sealing primitive is available
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

impl SealingBackend for Unavailable {
    fn is_available(&self) -> bool {
        false
    }

    fn generate_keypair(&self) -> Result<KeyPair> {
        Err(SecretsError::CryptoUnavailable)
    }

    fn public_key(&self, _private: &[u8]) -> Result<Vec<u8>> {
        Err(SecretsError::CryptoUnavailable)
    }

    fn seal(&self, _plaintext: &[u8], _public: &[u8]) -> Result<Vec<u8>> {
        Err(SecretsError::CryptoUnavailable)
    }

    fn open(&self, _ciphertext: &[u8], _private: &[u8]) -> Result<Option<Vec<u8>>> {
        Err(SecretsError::CryptoUnavailable)
    }
}

#[cfg(feature = "age")]
pub use self::age_backend::AgeBackend;

#[cfg(feature = "age")]
mod age_backend {
    use std::io::{Read, Write};

    use age::secrecy::ExposeSecret;

    use super::{KeyPair, SealingBackend};
    use crate::error::{Result, SecretsError};

    /// Sealed boxes built on age X25519 recipients
    #[derive(Debug, Default, Clone, Copy)]
    pub struct AgeBackend;

    impl AgeBackend {
        fn identity(private: &[u8]) -> Result<age::x25519::Identity> {
            let text = std::str::from_utf8(private)
                .map_err(|_| SecretsError::Crypto("private key is not UTF-8".to_string()))?;
            text.trim()
                .parse::<age::x25519::Identity>()
                .map_err(|e| SecretsError::Crypto(format!("Failed to parse identity: {}", e)))
        }

        fn recipient(public: &[u8]) -> Result<age::x25519::Recipient> {
            let text = std::str::from_utf8(public)
                .map_err(|_| SecretsError::Crypto("public key is not UTF-8".to_string()))?;
            text.trim()
                .parse::<age::x25519::Recipient>()
                .map_err(|e| SecretsError::Crypto(format!("Failed to parse recipient: {}", e)))
        }
    }

    impl SealingBackend for AgeBackend {
        fn is_available(&self) -> bool {
            true
        }

        fn generate_keypair(&self) -> Result<KeyPair> {
            let identity = age::x25519::Identity::generate();
            Ok(KeyPair {
                public: identity.to_public().to_string().into_bytes(),
                private: identity.to_string().expose_secret().as_bytes().to_vec(),
            })
        }

        fn public_key(&self, private: &[u8]) -> Result<Vec<u8>> {
            let identity = Self::identity(private)?;
            Ok(identity.to_public().to_string().into_bytes())
        }

        fn seal(&self, plaintext: &[u8], public: &[u8]) -> Result<Vec<u8>> {
            let recipient = Self::recipient(public)?;

            let encryptor = age::Encryptor::with_recipients(vec![Box::new(recipient)])
                .ok_or_else(|| SecretsError::Crypto("no recipient to seal to".to_string()))?;

            let mut sealed = vec![];
            let mut writer = encryptor
                .wrap_output(&mut sealed)
                .map_err(|e| SecretsError::Crypto(e.to_string()))?;

            writer
                .write_all(plaintext)
                .map_err(|e| SecretsError::Crypto(e.to_string()))?;

            writer
                .finish()
                .map_err(|e| SecretsError::Crypto(e.to_string()))?;

            Ok(sealed)
        }

        fn open(&self, ciphertext: &[u8], private: &[u8]) -> Result<Option<Vec<u8>>> {
            let identity = Self::identity(private)?;

            let decryptor = match age::Decryptor::new(ciphertext) {
                Ok(age::Decryptor::Recipients(d)) => d,
                Ok(_) | Err(_) => return Ok(None),
            };

            let mut reader = match decryptor.decrypt(std::iter::once(&identity as &dyn age::Identity)) {
                Ok(reader) => reader,
                Err(_) => return Ok(None),
            };

            let mut opened = vec![];
            if reader.read_to_end(&mut opened).is_err() {
                return Ok(None);
            }

            Ok(Some(opened))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_refuses_everything() {
        let backend = Unavailable;
        assert!(!backend.is_available());
        assert!(matches!(backend.generate_keypair(), Err(SecretsError::CryptoUnavailable)));
        assert!(matches!(backend.seal(b"x", b"k"), Err(SecretsError::CryptoUnavailable)));
        assert!(matches!(backend.open(b"x", b"k"), Err(SecretsError::CryptoUnavailable)));
    }

    #[cfg(feature = "age")]
    mod age_backend_tests {
        use super::super::*;

        #[test]
        fn test_keypair_format() {
            let pair = AgeBackend.generate_keypair().unwrap();
            assert!(pair.public.starts_with(b"age1"));
            assert!(pair.private.starts_with(b"AGE-SECRET-KEY-1"));
            assert_eq!(AgeBackend.public_key(&pair.private).unwrap(), pair.public);
        }

        #[test]
        fn test_seal_open() {
            let pair = AgeBackend.generate_keypair().unwrap();
            let sealed = AgeBackend.seal(b"plain\ntext", &pair.public).unwrap();
            assert_ne!(sealed, b"plain\ntext");

            let opened = AgeBackend.open(&sealed, &pair.private).unwrap();
            assert_eq!(opened.as_deref(), Some(&b"plain\ntext"[..]));
        }

        #[test]
        fn test_wrong_key_does_not_open() {
            let pair = AgeBackend.generate_keypair().unwrap();
            let other = AgeBackend.generate_keypair().unwrap();
            let sealed = AgeBackend.seal(b"value", &pair.public).unwrap();

            assert_eq!(AgeBackend.open(&sealed, &other.private).unwrap(), None);
        }

        #[test]
        fn test_tampered_ciphertext_does_not_open() {
            let pair = AgeBackend.generate_keypair().unwrap();
            let mut sealed = AgeBackend.seal(b"value", &pair.public).unwrap();
            let last = sealed.len() - 1;
            sealed[last] ^= 0x01;

            assert_eq!(AgeBackend.open(&sealed, &pair.private).unwrap(), None);
            assert_eq!(AgeBackend.open(b"not age at all", &pair.private).unwrap(), None);
        }

        #[test]
        fn test_malformed_keys_are_errors() {
            assert!(matches!(AgeBackend.public_key(b"nope"), Err(SecretsError::Crypto(_))));
            assert!(matches!(AgeBackend.seal(b"v", b"nope"), Err(SecretsError::Crypto(_))));
        }
    }
}
