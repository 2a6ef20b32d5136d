//! Title card file naming.
//!
//! Cards live under `<card_directory>/<series full name>/Season <n>/`
//! (`Specials` for season 0) and are named from `card_filename_format`.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::labels::{substitute, EpisodeIndex};

/// Default filename format (without extension).
pub const DEFAULT_FILENAME_FORMAT: &str =
    "{series_full_name} - S{season_number:02}E{episode_number:02}";

/// Default card file extension.
pub const DEFAULT_CARD_EXTENSION: &str = ".jpg";

/// Characters removed from every path component.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Strip characters that are illegal in filenames and trim trailing dots
/// and spaces.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c) && !c.is_control())
        .collect();
    cleaned.trim().trim_end_matches('.').trim_end().to_string()
}

/// Season folder name: `"Specials"` or `"Season N"`.
pub fn season_folder(season_number: i32) -> String {
    if season_number == 0 {
        "Specials".to_string()
    } else {
        format!("Season {season_number}")
    }
}

/// Normalise an extension to start with a dot.
pub fn normalize_extension(extension: &str) -> String {
    let ext = extension.trim();
    if ext.is_empty() {
        DEFAULT_CARD_EXTENSION.to_string()
    } else if ext.starts_with('.') {
        ext.to_lowercase()
    } else {
        format!(".{}", ext.to_lowercase())
    }
}

/// Full output path of one card.
///
/// `fields` supplies named placeholders such as `series_full_name` and
/// `title`; index placeholders come from `index`.
pub fn card_path(
    card_directory: &Path,
    series_full_name: &str,
    filename_format: &str,
    extension: &str,
    index: &EpisodeIndex,
    fields: &Map<String, Value>,
) -> Result<PathBuf, CoreError> {
    let stem = sanitize_component(&substitute(filename_format, index, fields)?);
    if stem.is_empty() {
        return Err(CoreError::Validation(format!(
            "Filename format '{filename_format}' produced an empty name"
        )));
    }
    Ok(card_directory
        .join(sanitize_component(series_full_name))
        .join(season_folder(index.season_number))
        .join(format!("{stem}{}", normalize_extension(extension))))
}
