//! Input safety checks for anything that ends up in a storage path.

use crate::defaults::{MAX_FILENAME_LEN, MAX_SCOPE_ID_LEN, UNNAMED_FILE};
use crate::error::{Error, Result};

/// Validate a tenant or client identifier.
///
/// Identifiers become directory names, so only ASCII alphanumerics, `-` and
/// `_` are accepted.
pub fn validate_scope_id(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", kind)));
    }
    if value.len() > MAX_SCOPE_ID_LEN {
        return Err(Error::Validation(format!(
            "{} longer than {} characters",
            kind, MAX_SCOPE_ID_LEN
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Validation(format!(
            "{} contains characters outside [A-Za-z0-9_-]: {:?}",
            kind, value
        )));
    }
    Ok(())
}

/// Validate the size of an upload against a configured maximum.
pub fn validate_upload_size(size: usize, max_bytes: u64) -> Result<()> {
    if size == 0 {
        return Err(Error::Validation("upload is empty".to_string()));
    }
    if size as u64 > max_bytes {
        return Err(Error::Validation(format!(
            "upload of {} bytes exceeds limit of {} bytes",
            size, max_bytes
        )));
    }
    Ok(())
}

/// Sanitize filename for safe storage
pub fn sanitize_filename(filename: &str) -> String {
    // Remove path components
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return UNNAMED_FILE.to_string();
    }

    if sanitized.len() > MAX_FILENAME_LEN {
        // Preserve the extension, cut on a char boundary
        let (stem, ext) = match sanitized.rfind('.') {
            Some(dot) if sanitized.len() - dot <= 16 => sanitized.split_at(dot),
            _ => (sanitized, ""),
        };
        let mut cut = MAX_FILENAME_LEN - ext.len();
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        return format!("{}{}", &stem[..cut], ext);
    }

    sanitized.to_string()
}
