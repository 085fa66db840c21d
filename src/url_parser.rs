//! Turns the `--base` argument (a Drive URL or raw ID) into a folder ID.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{DriveError, Result};
use crate::resolver::ROOT_ID;

/// Folder links, optionally scoped to a signed-in account (`/u/<n>/`).
static FOLDER_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)")
        .expect("Invalid folder URL regex")
});

/// The "My Drive" landing page, which stands for the root folder.
static MY_DRIVE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/drive/(?:u/\d+/)?my-drive/?(?:[?#].*)?$")
        .expect("Invalid my-drive URL regex")
});

static OPEN_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/open\?id=([a-zA-Z0-9_-]+)")
        .expect("Invalid open URL regex")
});

static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// Extract a Google Drive folder ID from a URL or validate a raw ID.
///
/// Supports the following forms:
/// - `https://drive.google.com/drive/folders/<ID>` (also with `/u/<n>/`)
/// - `https://drive.google.com/drive/my-drive`, meaning `root`
/// - `https://drive.google.com/open?id=<ID>`
/// - a raw ID, including `root`
///
/// # Examples
///
/// ```
/// use gget::url_parser::extract_id;
///
/// let id = extract_id("https://drive.google.com/drive/folders/1abc123").unwrap();
/// assert_eq!(id, "1abc123");
///
/// assert_eq!(extract_id("https://drive.google.com/drive/my-drive").unwrap(), "root");
/// ```
pub fn extract_id(url_or_id: &str) -> Result<String> {
    let trimmed = url_or_id.trim();

    if MY_DRIVE_URL_REGEX.is_match(trimmed) {
        return Ok(ROOT_ID.to_string());
    }

    for regex in [&FOLDER_URL_REGEX, &OPEN_URL_REGEX] {
        if let Some(id) = regex.captures(trimmed).and_then(|c| c.get(1)) {
            return Ok(id.as_str().to_string());
        }
    }

    if ID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(DriveError::InvalidUrlOrId(url_or_id.to_string()))
}
