//! Helpers for sanitizing data before it enters logs or tracing spans.
//!
//! Job error messages and span attributes are safe to share for debugging;
//! these functions ensure no sensitive data (auth tokens, full upload paths,
//! raw upstream response bodies) leaks into them.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks an auth token down to its first four characters.
///
/// - `sk-abcdef123456` → `sk-a****`
/// - short tokens are fully masked
pub fn redact_token(token: &str) -> String {
    if token.chars().count() <= 4 {
        return "****".to_string();
    }
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}****")
}

/// Clips an upstream error body to a bounded prefix so persisted error
/// messages stay small and free of full response payloads.
pub fn clip_message(message: &str, max_len: usize) -> String {
    if message.len() <= max_len {
        return message.to_string();
    }
    let mut end = max_len;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &message[..end])
}
