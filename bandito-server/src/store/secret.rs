//! Reversible obfuscation for settings values such as the server password.
//!
//! XOR against a fixed repeating key, then base64. This keeps casual readers
//! out of the settings file and nothing more.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const XOR_KEY: &str = "BanditoSecretKey2026";

fn xor_chars(input: &str) -> Option<String> {
    input
        .chars()
        .zip(XOR_KEY.chars().cycle())
        .map(|(c, k)| char::from_u32(c as u32 ^ k as u32))
        .collect()
}

pub fn encrypt_password(password: &str) -> String {
    if password.is_empty() {
        return String::new();
    }
    match xor_chars(password) {
        Some(mixed) => BASE64.encode(mixed.as_bytes()),
        None => {
            tracing::warn!("Password contains characters that cannot be obfuscated");
            String::new()
        }
    }
}

/// Inverse of [`encrypt_password`]. Undecodable input yields an empty string.
pub fn decrypt_password(encrypted: &str) -> String {
    if encrypted.is_empty() {
        return String::new();
    }
    let decoded = match BASE64.decode(encrypted) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Decryption error: {}", e);
            return String::new();
        }
    };
    let mixed = match String::from_utf8(decoded) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Decryption error: {}", e);
            return String::new();
        }
    };
    xor_chars(&mixed).unwrap_or_default()
}
