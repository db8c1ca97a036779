//! Form validation mirrored from the original UI.
//!
//! These are the literal accept/reject rules the screens enforced before any
//! request left the browser; the CLI applies them at the same boundary.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Collection names are DNS-label shaped: lowercase letters, digits and
/// hyphens, starting with a letter, no trailing hyphen.
static COLLECTION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z](?:[a-z0-9-]*[a-z0-9])?$").unwrap());

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap());

pub const MAX_COLLECTION_NAME_LEN: usize = 63;

pub fn valid_collection_name(name: &str) -> bool {
    name.len() <= MAX_COLLECTION_NAME_LEN && COLLECTION_NAME_RE.is_match(name)
}

/// Same rules as [`valid_collection_name`], as a `Result` for call sites that
/// propagate.
pub fn check_collection_name(name: &str) -> Result<()> {
    if !valid_collection_name(name) {
        bail!(
            "invalid collection name '{}': use lowercase letters, digits and hyphens, \
             starting with a letter (max {} chars)",
            name,
            MAX_COLLECTION_NAME_LEN
        );
    }
    Ok(())
}

pub fn valid_source_url(url: &str) -> bool {
    URL_RE.is_match(url)
}

pub fn check_source_url(url: &str) -> Result<()> {
    if !valid_source_url(url) {
        bail!("invalid data source URL '{}': must be an http(s) URL", url);
    }
    Ok(())
}

/// Reject an upload set whose total size exceeds the configured ceiling.
pub fn check_upload_size(total_bytes: u64, max_file_mb: u64) -> Result<()> {
    let ceiling = max_file_mb * 1024 * 1024;
    if total_bytes > ceiling {
        bail!(
            "upload set is {} bytes, exceeding the {} MiB ceiling (upload.max_file_mb)",
            total_bytes,
            max_file_mb
        );
    }
    Ok(())
}
