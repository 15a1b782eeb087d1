//! Dotenv vault - plaintext local overrides
//!
//! Writes `NAME='value'` lines into a dotenv file and reads values back
//! from an [`Environment`] snapshot. Nothing is encrypted, so it needs no
//! keys; it exists so local development can shadow sealed secrets.

use regex::{NoExpand, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::contract::{is_valid_name, pretty_path, validate_name, Vault};
use crate::error::{Result, SecretsError};
use crate::listing::Listing;
use crate::outcome::Outcome;

/// A snapshot of environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment
    pub fn from_process() -> Self {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }

    /// Parse a dotenv file. A missing file gives an empty environment.
    pub fn load_dotenv(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path).map_err(SecretsError::io(path))?;
        Ok(parse_dotenv(&content))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Layer `other` on top of this snapshot
    pub fn merge(&mut self, other: Environment) {
        self.vars.extend(other.vars);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The plaintext vault
pub struct DotenvVault {
    file: PathBuf,
    env: Environment,
    last_message: Option<String>,
}

impl DotenvVault {
    /// Create a vault writing to `file` and reading from `env`
    pub fn new(file: impl Into<PathBuf>, env: Environment) -> Self {
        Self {
            file: file.into(),
            env,
            last_message: None,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn generate_keys(&mut self, _overwrite: bool) -> Result<Outcome<bool>> {
        Ok(self.report(
            false,
            "The dotenv vault doesn't encrypt secrets thus doesn't need keys.",
        ))
    }

    /// Write `NAME='value'`, replacing an existing assignment of `name`
    pub fn seal(&mut self, name: &str, value: &[u8]) -> Result<Outcome<bool>> {
        self.last_message = None;
        validate_name(name)?;

        let value = String::from_utf8_lossy(value);
        let line = format!("{}='{}'", name, value.replace('\'', "'\\''"));

        let content = self.read_file()?;
        let pattern = assignment_pattern(name, false)?;
        let replaced = pattern.find_iter(&content).count();

        let content = if replaced > 0 {
            pattern.replace_all(&content, NoExpand(&line)).into_owned()
        } else {
            format!("{}{}\n", content, line)
        };
        fs::write(&self.file, content).map_err(SecretsError::io(&self.file))?;

        debug!(name, file = %self.file.display(), "wrote dotenv secret");
        Ok(self.report(
            true,
            format!(
                "Secret \"{}\" {} in \"{}\".",
                name,
                if replaced > 0 { "updated" } else { "added" },
                pretty_path(&self.file)
            ),
        ))
    }

    pub fn reveal(&mut self, name: &str) -> Result<Outcome<Option<Vec<u8>>>> {
        self.last_message = None;
        validate_name(name)?;

        match self.env.get(name) {
            Some(value) => {
                let value = value.as_bytes().to_vec();
                Ok(self.report(Some(value), format!("Secret \"{}\" revealed.", name)))
            }
            None => Ok(self.report(
                None,
                format!("Secret \"{}\" not found in \"{}\".", name, pretty_path(&self.file)),
            )),
        }
    }

    /// Delete every assignment of `name` from the file
    pub fn remove(&mut self, name: &str) -> Result<Outcome<bool>> {
        self.last_message = None;
        validate_name(name)?;

        let content = self.read_file()?;
        let pattern = assignment_pattern(name, true)?;
        if !pattern.is_match(&content) {
            return Ok(self.report(
                false,
                format!("Secret \"{}\" not found in \"{}\".", name, pretty_path(&self.file)),
            ));
        }

        let content = pattern.replace_all(&content, "").into_owned();
        fs::write(&self.file, content).map_err(SecretsError::io(&self.file))?;

        Ok(self.report(
            true,
            format!(
                "Secret \"{}\" removed from file \"{}\".",
                name,
                pretty_path(&self.file)
            ),
        ))
    }

    /// Every word-named variable of the environment snapshot
    pub fn listing(&mut self, reveal: bool) -> Result<Outcome<Listing>> {
        self.last_message = None;

        let listing: Listing = self
            .env
            .iter()
            .filter(|(name, _)| is_valid_name(name))
            .map(|(name, value)| (name, reveal.then(|| value.as_bytes().to_vec())))
            .collect();

        let count = listing.len();
        Ok(self.report(listing, format!("{} variable(s) listed.", count)))
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    fn read_file(&self) -> Result<String> {
        if !self.file.is_file() {
            return Ok(String::new());
        }
        fs::read_to_string(&self.file).map_err(SecretsError::io(&self.file))
    }

    fn report<T>(&mut self, value: T, message: impl Into<String>) -> Outcome<T> {
        let message = message.into();
        self.last_message = Some(message.clone());
        Outcome::new(value, message)
    }
}

impl Vault for DotenvVault {
    fn generate_keys(&mut self, overwrite: bool) -> Result<Outcome<bool>> {
        DotenvVault::generate_keys(self, overwrite)
    }

    fn seal(&mut self, name: &str, value: &[u8]) -> Result<Outcome<bool>> {
        DotenvVault::seal(self, name, value)
    }

    fn reveal(&mut self, name: &str) -> Result<Outcome<Option<Vec<u8>>>> {
        DotenvVault::reveal(self, name)
    }

    fn remove(&mut self, name: &str) -> Result<Outcome<bool>> {
        DotenvVault::remove(self, name)
    }

    fn listing(&mut self, reveal: bool) -> Result<Outcome<Listing>> {
        DotenvVault::listing(self, reveal)
    }

    fn last_message(&self) -> Option<&str> {
        DotenvVault::last_message(self)
    }
}

/// Matches `NAME=` at the start of a line and its value: a run of quoted
/// segments and escaped quotes (which may span lines), or the rest of the line.
fn assignment_pattern(name: &str, with_newline: bool) -> Result<Regex> {
    let newline = if with_newline { r"\n?" } else { "" };
    let pattern = format!(
        r"(?m)^{}=((\\'|'[^']+')+|.*){}",
        regex::escape(name),
        newline
    );
    Regex::new(&pattern).map_err(|_| SecretsError::InvalidName(name.to_string()))
}

/// Minimal dotenv reader: `NAME=value`, `export NAME=value`, single quoted
/// values with `'\''` escapes, double quoted values with backslash escapes
fn parse_dotenv(content: &str) -> Environment {
    let mut env = Environment::new();
    let mut pos = 0;

    while pos < content.len() {
        let line_end = content[pos..].find('\n').map_or(content.len(), |o| pos + o);
        let line = &content[pos..line_end];
        pos = line_end + 1;

        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let assignment = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some(eq) = assignment.find('=') else {
            continue;
        };
        let name = assignment[..eq].trim();

        // Quoted values may continue on the following lines
        let value_start = line_end - assignment.len() + eq + 1;
        let (value, consumed) = parse_value(&content[value_start..]);
        let value_end = value_start + consumed;
        pos = content[value_end..]
            .find('\n')
            .map_or(content.len(), |o| value_end + o + 1);

        if is_valid_name(name) {
            env.set(name, value);
        }
    }

    env
}

/// Parse one value, returning it and the number of bytes consumed
fn parse_value(input: &str) -> (String, usize) {
    let bytes = input.as_bytes();
    let mut value = String::new();
    let mut i = 0;

    loop {
        match bytes.get(i) {
            Some(b'\'') => {
                let Some(close) = input[i + 1..].find('\'') else {
                    value.push_str(&input[i + 1..]);
                    return (value, input.len());
                };
                value.push_str(&input[i + 1..i + 1 + close]);
                i += close + 2;
            }
            Some(b'\\') if bytes.get(i + 1) == Some(&b'\'') => {
                value.push('\'');
                i += 2;
            }
            Some(b'"') => {
                let mut chars = input[i + 1..].char_indices();
                let mut closed = None;
                while let Some((offset, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = Some(offset);
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, other)) => value.push(other),
                            None => {}
                        },
                        c => value.push(c),
                    }
                }
                match closed {
                    Some(offset) => i += offset + 2,
                    None => return (value, input.len()),
                }
            }
            _ if i == 0 => {
                let line = input.split('\n').next().unwrap_or("");
                let unquoted = line.split(" #").next().unwrap_or("").trim();
                return (unquoted.to_string(), line.len());
            }
            _ => return (value, i),
        }
    }
}
