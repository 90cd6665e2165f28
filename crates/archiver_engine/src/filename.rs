use sha2::{Digest, Sha256};

const MAX_FILENAME_LEN: usize = 255;

/// Cross-platform file name derived from free text such as a newsletter title.
///
/// Path separators become `_`, characters rejected by common filesystems are
/// removed, leading/trailing dots and spaces are trimmed, and the result is
/// capped at 255 bytes while keeping the extension.
pub fn sanitize_filename(input: &str) -> String {
    let replaced: String = input
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' => Some('_'),
            c if is_forbidden(c) => None,
            c => Some(c),
        })
        .collect();
    let mut cleaned = replaced.trim_matches(&['.', ' '][..]).to_string();

    if cleaned.len() > MAX_FILENAME_LEN {
        cleaned = truncate_keeping_extension(&cleaned, MAX_FILENAME_LEN);
    }
    if cleaned.is_empty() {
        cleaned = "unnamed".to_string();
    }
    if is_reserved_windows_name(&cleaned) {
        cleaned.push('_');
    }
    cleaned
}

/// Artifact stem used by the run pipeline: sanitized title with spaces as underscores.
pub fn artifact_stem(title: &str) -> String {
    sanitize_filename(title).replace(' ', "_")
}

fn truncate_keeping_extension(name: &str, max: usize) -> String {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() < 16 => (stem, Some(ext)),
        _ => (name, None),
    };
    let budget = max.saturating_sub(ext.map_or(0, |e| e.len() + 1));
    let mut end = budget.min(stem.len());
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    match ext {
        Some(ext) => format!("{}.{ext}", &stem[..end]),
        None => stem[..end].to_string(),
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}')
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// First `bytes` bytes of the SHA-256 digest, hex encoded.
pub(crate) fn short_hash(input: &str, bytes: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(bytes * 2);
    for byte in digest.iter().take(bytes) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
