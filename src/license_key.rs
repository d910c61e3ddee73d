//! License key generation and format validation.
//!
//! Keys look like `RPC-XXXX-XXXX-XXXX-XXXX-XXXX` (uppercase hex). An older
//! five-by-five format is still accepted by the validator.

use rand::RngCore;
use rand::rngs::OsRng;
use uuid::Uuid;

const PREFIX: &str = "RPC-";

/// Generate a new license key from 16 random bytes.
///
/// Uniqueness is not guaranteed here; the store's UNIQUE constraint is the source
/// of truth and callers regenerate on collision.
pub fn generate() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    let hex = hex::encode_upper(bytes);
    format!("{}{}", PREFIX, group(&hex[..20], 4))
}

/// Generate a key in the legacy `XXXXX-XXXXX-XXXXX-XXXXX-XXXXX` format.
pub fn generate_legacy() -> String {
    let simple = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    group(&simple[..25], 5)
}

/// True when `key` matches either the RPC format or the legacy format.
///
/// This is a shape check only; it says nothing about whether the key exists.
pub fn is_valid_format(key: &str) -> bool {
    match key.strip_prefix(PREFIX) {
        Some(rest) => groups_match(rest, 5, 4),
        None => groups_match(key, 5, 5),
    }
}

fn group(chars: &str, size: usize) -> String {
    chars
        .as_bytes()
        .chunks(size)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

fn groups_match(s: &str, count: usize, len: usize) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() == count
        && parts.iter().all(|p| {
            p.len() == len
                && p.bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        })
}
