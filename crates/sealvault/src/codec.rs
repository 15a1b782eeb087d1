//! Codec - the text format of the files in a secrets directory
//!
//! Every file is a small PHP script so the same directory stays readable by
//! PHP tooling that `include`s it. Nothing here executes it: the payload is
//! pulled out and decoded by a strict reader.
//!
//! Single value file:
//!
//! ```text
//! <?php // secrets.token.94a08d.php on Fri, 16 Oct 2026 09:12:44 +0000
//!
//! return "\x8A\x13...";
//! ```
//!
//! The payload is the raw-URL-encoding of the bytes with every `%` turned
//! into `\x`, which keeps it on one line and free of quotes.
//!
//! Listing file:
//!
//! ```text
//! <?php
//!
//! return array (
//!   'token' => NULL,
//! );
//! ```

use crate::contract::is_valid_name;
use crate::listing::Listing;

const RETURN_PREFIX: &str = "return \"";
const RETURN_SUFFIX: &str = "\";";
const LISTING_OPEN: &str = "return array (";
const LISTING_CLOSE: &str = ");";

/// Render a single-value file
pub fn encode_value(file_name: &str, written_at: &str, data: &[u8]) -> String {
    let payload = urlencoding::encode_binary(data).replace('%', "\\x");
    format!("<?php // {file_name} on {written_at}\n\n{RETURN_PREFIX}{payload}{RETURN_SUFFIX}\n")
}

/// Extract the payload of a single-value file
pub fn decode_value(contents: &str) -> Result<Vec<u8>, String> {
    if !contents.starts_with("<?php") {
        return Err("missing PHP open tag".to_string());
    }

    let payload = contents
        .lines()
        .map(str::trim_end)
        .find_map(|line| {
            line.strip_prefix(RETURN_PREFIX)
                .and_then(|rest| rest.strip_suffix(RETURN_SUFFIX))
        })
        .ok_or_else(|| "no return statement found".to_string())?;

    validate_payload(payload)?;

    let percent = payload.replace("\\x", "%");
    Ok(urlencoding::decode_binary(percent.as_bytes()).into_owned())
}

/// Only unreserved characters and `\xHH` escapes may appear in a payload
fn validate_payload(payload: &str) -> Result<(), String> {
    let bytes = payload.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                let escape = bytes.get(i + 1..i + 4);
                match escape {
                    Some([b'x', hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                        i += 4;
                    }
                    _ => return Err(format!("bad escape at offset {i}")),
                }
            }
            b if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') => i += 1,
            b => return Err(format!("unexpected byte 0x{b:02x} at offset {i}")),
        }
    }
    Ok(())
}

/// Render a listing file. Values are never written, only names.
pub fn encode_listing(listing: &Listing) -> String {
    let mut body = String::new();
    for name in listing.names() {
        body.push_str("  ");
        body.push_str(&listing_key(name));
        body.push_str(" => NULL,\n");
    }
    format!("<?php\n\n{LISTING_OPEN}\n{body}{LISTING_CLOSE}\n")
}

/// Parse a listing file into a hidden listing
pub fn decode_listing(contents: &str) -> Result<Listing, String> {
    if !contents.starts_with("<?php") {
        return Err("missing PHP open tag".to_string());
    }

    let mut lines = contents.lines().map(str::trim);
    if !lines.any(|line| line == LISTING_OPEN) {
        return Err("no array found".to_string());
    }

    let mut listing = Listing::new();
    for line in lines {
        if line == LISTING_CLOSE {
            return Ok(listing);
        }

        let (key, value) = line
            .split_once("=>")
            .ok_or_else(|| format!("malformed entry: {line}"))?;
        let value = value.trim().trim_end_matches(',').trim();
        if !value.eq_ignore_ascii_case("null") {
            return Err(format!("listing values must be NULL, got {value}"));
        }

        let key = key.trim();
        let name = key
            .strip_prefix('\'')
            .and_then(|k| k.strip_suffix('\''))
            .unwrap_or(key);
        if !is_valid_name(name) {
            return Err(format!("invalid secret name in listing: {key}"));
        }
        listing.insert(name, None);
    }

    Err("unterminated array".to_string())
}

/// PHP turns decimal-integer string keys that fit an i64 into integers,
/// and prints them unquoted; mirror that so files stay byte-identical.
fn listing_key(name: &str) -> String {
    let is_int_key = name.bytes().all(|b| b.is_ascii_digit())
        && (name == "0" || !name.starts_with('0'))
        && name.parse::<i64>().is_ok();

    if is_int_key {
        name.to_string()
    } else {
        format!("'{name}'")
    }
}
