use std::fs;

use super::Locator;
use crate::error::LoadError;

/// Reads a JSON array of frequency offsets in Hz. `null` entries (unvoiced
/// frames) read as 0.
pub fn load_contour(locator: &Locator) -> Result<Vec<f32>, LoadError> {
    let path = locator.path();
    let text = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
    parse_contour(&text).map_err(|message| LoadError::ContourParse {
        path: path.to_path_buf(),
        message,
    })
}

pub fn parse_contour(text: &str) -> Result<Vec<f32>, String> {
    let raw: Vec<Option<f32>> = serde_json::from_str(text).map_err(|e| e.to_string())?;
    Ok(raw
        .into_iter()
        .map(|v| v.filter(|v| v.is_finite()).unwrap_or(0.0))
        .collect())
}
