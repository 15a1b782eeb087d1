//! Store - raw persistence for a secrets directory
//!
//! Maps keys, values and the listing to files and reads/writes them. No
//! cryptography happens here. Every file name is prefixed with the
//! directory's own name, so stores sharing a parent never collide:
//!
//! ```text
//! config/secrets/secrets.encrypt.public.php
//! config/secrets/secrets.decrypt.private.php
//! config/secrets/secrets.list.php
//! config/secrets/secrets.token.94a08d.php
//! ```

use fs2::FileExt;
use md5::{Digest, Md5};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::codec;
use crate::contract::validate_name;
use crate::error::{Result, SecretsError};
use crate::listing::Listing;

const FILE_EXTENSION: &str = ".php";
const ENCRYPT_PUBLIC_LABEL: &str = "encrypt.public";
const DECRYPT_PRIVATE_LABEL: &str = "decrypt.private";
const LIST_LABEL: &str = "list";

/// File-level persistence for one secrets directory
#[derive(Debug, Clone)]
pub struct Store {
    /// Directory holding every file of the store
    dir: PathBuf,
    /// Base name of `dir`, prefixed to every file name
    stem: String,
    encrypt_label: String,
    decrypt_label: String,
    list_label: String,
}

impl Store {
    /// Create a store over `dir`. Nothing is touched on disk until the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_labels(dir, ENCRYPT_PUBLIC_LABEL, DECRYPT_PRIVATE_LABEL, LIST_LABEL)
    }

    /// Create a store with custom labels for the key and listing files
    pub fn with_labels(
        dir: impl Into<PathBuf>,
        encrypt_label: &str,
        decrypt_label: &str,
        list_label: &str,
    ) -> Self {
        let dir = dir.into();
        let stem = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            dir,
            stem,
            encrypt_label: encrypt_label.to_string(),
            decrypt_label: decrypt_label.to_string(),
            list_label: list_label.to_string(),
        }
    }

    /// The directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location prefix shared by all files, e.g. `config/secrets/secrets.`
    pub fn location(&self) -> PathBuf {
        self.dir.join(format!("{}.", self.stem))
    }

    pub fn has_encryption_key(&self) -> bool {
        self.path_for(&self.encrypt_label).exists()
    }

    pub fn has_decryption_key(&self) -> bool {
        self.path_for(&self.decrypt_label).exists()
    }

    pub fn load_encryption_key(&self) -> Result<Option<Vec<u8>>> {
        self.load_optional(&self.path_for(&self.encrypt_label))
    }

    pub fn load_decryption_key(&self) -> Result<Option<Vec<u8>>> {
        self.load_optional(&self.path_for(&self.decrypt_label))
    }

    pub fn save_encryption_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(SecretsError::InvalidInput("key"));
        }
        self.save_encoded(&self.path_for(&self.encrypt_label), key, Access::Shared)
    }

    pub fn save_decryption_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(SecretsError::InvalidInput("key"));
        }
        self.save_encoded(&self.path_for(&self.decrypt_label), key, Access::OwnerOnly)
    }

    /// Check if a value file exists for `name`
    pub fn value_exists(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        Ok(self.value_path(name).exists())
    }

    pub fn save_value(&self, name: &str, value: &[u8]) -> Result<()> {
        validate_name(name)?;
        if value.is_empty() {
            return Err(SecretsError::InvalidInput("value"));
        }
        self.save_encoded(&self.value_path(name), value, Access::Shared)
    }

    pub fn load_value(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        let path = self.value_path(name);
        let contents = fs::read_to_string(&path).map_err(SecretsError::io(&path))?;
        codec::decode_value(&contents).map_err(|reason| SecretsError::corrupt(&path, reason))
    }

    /// Delete the value file for `name`.
    ///
    /// Returns `true` when the file is gone afterwards, whether it was
    /// deleted now or never existed.
    pub fn remove_value(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let path = self.value_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed value file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove value file");
                Ok(!path.exists())
            }
        }
    }

    /// Read the listing file, `None` when there is none yet
    pub fn load_listing(&self) -> Result<Option<Listing>> {
        let path = self.path_for(&self.list_label);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(SecretsError::io(&path))?;
        codec::decode_listing(&contents)
            .map(Some)
            .map_err(|reason| SecretsError::corrupt(&path, reason))
    }

    /// Overwrite the listing file. Only names are written, never values.
    pub fn update_listing(&self, listing: &Listing) -> Result<()> {
        let path = self.path_for(&self.list_label);
        self.write_locked(&path, &codec::encode_listing(listing), Access::Shared)
    }

    fn path_for(&self, label: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}{}", self.stem, label, FILE_EXTENSION))
    }

    /// Value files carry a short hash of the name after it
    fn value_path(&self, name: &str) -> PathBuf {
        self.path_for(&format!("{}.{}", name, name_hash(name)))
    }

    fn load_optional(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path).map_err(SecretsError::io(path))?;
        codec::decode_value(&contents)
            .map(Some)
            .map_err(|reason| SecretsError::corrupt(path, reason))
    }

    fn save_encoded(&self, path: &Path, data: &[u8], access: Access) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let written_at = chrono::Utc::now().to_rfc2822();
        self.write_locked(path, &codec::encode_value(&file_name, &written_at, data), access)
    }

    /// Replace the contents of `path` while holding an exclusive lock on it
    ///
    /// Owner-only files are created with mode 0600, and an existing one is
    /// tightened before its new contents are written.
    fn write_locked(&self, path: &Path, contents: &str, access: Access) -> Result<()> {
        self.ensure_dir()?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(false);
        if access == Access::OwnerOnly {
            owner_only_on_create(&mut options);
        }
        let mut file = options.open(path).map_err(SecretsError::io(path))?;

        FileExt::lock_exclusive(&file).map_err(SecretsError::io(path))?;

        let result = (|| -> std::io::Result<()> {
            if access == Access::OwnerOnly {
                restrict_permissions(&file)?;
            }
            file.set_len(0)?;
            file.write_all(contents.as_bytes())?;
            file.flush()
        })();

        let _ = FileExt::unlock(&file);
        result.map_err(SecretsError::io(path))?;

        debug!(path = %path.display(), bytes = contents.len(), "wrote secrets file");
        Ok(())
    }

    /// Create the directory on first write
    fn ensure_dir(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() || self.dir.is_dir() {
            return Ok(());
        }
        if let Err(e) = fs::create_dir_all(&self.dir) {
            if !self.dir.is_dir() {
                warn!(dir = %self.dir.display(), error = %e, "cannot create secrets directory");
                return Err(SecretsError::StorageUnavailable(self.dir.clone()));
            }
        }
        debug!(dir = %self.dir.display(), "created secrets directory");
        Ok(())
    }
}

/// First six hex digits of the MD5 of the name
fn name_hash(name: &str) -> String {
    let digest = format!("{:x}", Md5::digest(name.as_bytes()));
    digest[..6].to_string()
}

/// Who may read a file written by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Shared,
    OwnerOnly,
}

#[cfg(unix)]
fn owner_only_on_create(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn owner_only_on_create(_options: &mut OpenOptions) {}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path().join("test"));
        (store, temp_dir)
    }

    #[test]
    fn test_name_hash_matches_md5() {
        // md5("testKey") = 24afda34e3f74e54b61a8e4cbe921650
        assert_eq!(name_hash("testKey"), "24afda");
        // md5("foo") = acbd18db4cc2f85cedef654fccc4a4d8
        assert_eq!(name_hash("foo"), "acbd18");
    }

    #[test]
    fn test_file_layout() {
        let (store, temp_dir) = temp_store();
        store.save_encryption_key(b"pub").unwrap();
        store.save_decryption_key(b"priv").unwrap();
        store.save_value("foo", b"sealed").unwrap();
        store.update_listing(&Listing::new()).unwrap();

        let dir = temp_dir.path().join("test");
        assert!(dir.join("test.encrypt.public.php").is_file());
        assert!(dir.join("test.decrypt.private.php").is_file());
        assert!(dir.join("test.list.php").is_file());
        assert!(dir.join("test.foo.acbd18.php").is_file());
    }

    #[test]
    fn test_trailing_separator_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let with_slash = format!("{}/test/", temp_dir.path().display());
        let store = Store::new(with_slash);
        store.save_encryption_key(b"a").unwrap();

        assert!(temp_dir.path().join("test").join("test.encrypt.public.php").is_file());
    }

    #[test]
    fn test_has_encryption_key() {
        let (store, _temp_dir) = temp_store();
        assert!(!store.has_encryption_key());
        store.save_encryption_key(b"a").unwrap();
        assert!(store.has_encryption_key());
    }

    #[test]
    fn test_has_decryption_key() {
        let (store, _temp_dir) = temp_store();
        assert!(!store.has_decryption_key());
        store.save_decryption_key(b"a").unwrap();
        assert!(store.has_decryption_key());
    }

    #[test]
    fn test_store_and_load_keys() {
        let (store, _temp_dir) = temp_store();
        assert_eq!(store.load_encryption_key().unwrap(), None);
        assert_eq!(store.load_decryption_key().unwrap(), None);

        store.save_encryption_key(b"test123").unwrap();
        store.save_decryption_key(b"test456").unwrap();

        assert_eq!(store.load_encryption_key().unwrap(), Some(b"test123".to_vec()));
        assert_eq!(store.load_decryption_key().unwrap(), Some(b"test456".to_vec()));
    }

    #[cfg(unix)]
    #[test]
    fn test_decryption_key_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (store, temp_dir) = temp_store();
        store.save_decryption_key(b"a").unwrap();

        let path = temp_dir.path().join("test").join("test.decrypt.private.php");
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_decryption_key_file_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let (store, temp_dir) = temp_store();
        let dir = temp_dir.path().join("test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.decrypt.private.php");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        store.save_decryption_key(b"b").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load_decryption_key().unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn test_save_value() {
        let (store, _temp_dir) = temp_store();
        store.save_value("testKey", b"testValue").unwrap();
        assert!(store.value_exists("testKey").unwrap());
        assert_eq!(store.load_value("testKey").unwrap(), b"testValue");
    }

    #[test]
    fn test_save_value_overwrites() {
        let (store, _temp_dir) = temp_store();
        store.save_value("testKey", b"a much longer first value").unwrap();
        store.save_value("testKey", b"short").unwrap();
        assert_eq!(store.load_value("testKey").unwrap(), b"short");
    }

    #[test]
    fn test_remove_value() {
        let (store, _temp_dir) = temp_store();
        store.save_value("testKey", b"testValue").unwrap();
        assert!(store.remove_value("testKey").unwrap());
        assert!(!store.value_exists("testKey").unwrap());

        // Already gone still counts as removed
        assert!(store.remove_value("testKey").unwrap());
    }

    #[test]
    fn test_value_exists() {
        let (store, _temp_dir) = temp_store();
        assert!(!store.value_exists("testKey").unwrap());
        store.save_value("testKey", b"testValue").unwrap();
        assert!(store.value_exists("testKey").unwrap());
    }

    #[test]
    fn test_empty_payloads_rejected() {
        let (store, temp_dir) = temp_store();
        assert!(matches!(store.save_encryption_key(b""), Err(SecretsError::InvalidInput("key"))));
        assert!(matches!(store.save_decryption_key(b""), Err(SecretsError::InvalidInput("key"))));
        assert!(matches!(store.save_value("testKey", b""), Err(SecretsError::InvalidInput("value"))));

        // Nothing was written, not even the directory
        assert!(!temp_dir.path().join("test").exists());
    }

    #[test]
    fn test_invalid_name_rejected() {
        let (store, _temp_dir) = temp_store();
        assert!(matches!(store.save_value("foo bar", b"v"), Err(SecretsError::InvalidName(_))));
        assert!(matches!(store.value_exists("../x"), Err(SecretsError::InvalidName(_))));
        assert!(matches!(store.remove_value(""), Err(SecretsError::InvalidName(_))));
        assert!(matches!(store.load_value("a/b"), Err(SecretsError::InvalidName(_))));
    }

    #[test]
    fn test_corrupt_key_file() {
        let (store, temp_dir) = temp_store();
        let dir = temp_dir.path().join("test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("test.encrypt.public.php"), "garbage").unwrap();

        assert!(store.has_encryption_key());
        assert!(matches!(store.load_encryption_key(), Err(SecretsError::Corrupt { .. })));
    }

    #[test]
    fn test_listing_round_trip_hides_values() {
        let (store, temp_dir) = temp_store();
        assert_eq!(store.load_listing().unwrap(), None);

        let listing: Listing = [("b", Some(b"plain".to_vec())), ("a", None)]
            .into_iter()
            .collect();
        store.update_listing(&listing).unwrap();

        let loaded = store.load_listing().unwrap().unwrap();
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(loaded.get("b"), Some(None));

        let raw = fs::read_to_string(temp_dir.path().join("test").join("test.list.php")).unwrap();
        assert!(!raw.contains("plain"));
    }

    #[test]
    fn test_storage_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let store = Store::new(blocker.join("secrets"));
        assert!(matches!(
            store.save_encryption_key(b"a"),
            Err(SecretsError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_location() {
        let store = Store::new("/srv/app/config/secrets");
        assert_eq!(store.location(), PathBuf::from("/srv/app/config/secrets/secrets."));
        assert_eq!(store.dir(), Path::new("/srv/app/config/secrets"));
    }
}
