//! RFC 6238 time-based one-time codes

use crate::error::{Result, VigilError};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const STEP_SECS: u64 = 30;
pub const DIGITS: u32 = 6;

/// Current code for a base32 secret at `unix_secs`
pub fn code_at(secret_b32: &str, unix_secs: u64) -> Result<String> {
    let key = decode_secret(secret_b32)?;
    Ok(hotp(&key, unix_secs / STEP_SECS))
}

fn decode_secret(secret_b32: &str) -> Result<Vec<u8>> {
    let normalized: String = secret_b32
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let normalized = normalized.trim_end_matches('=');

    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|_| VigilError::MissingCredentials("TOTP secret is not valid base32".into()))
}

fn hotp(key: &[u8], counter: u64) -> String {
    let mut mac = match HmacSha1::new_from_slice(key) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => return String::new(),
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    format!(
        "{:0width$}",
        binary % 10u32.pow(DIGITS),
        width = DIGITS as usize
    )
}
