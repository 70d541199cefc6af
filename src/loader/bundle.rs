use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::Locator;
use crate::composition::MIDI_TRACK_ID;
use crate::error::LoadError;

/// Manifest naming every resource of one song. Stems without a locator are
/// listed but skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongBundle {
    pub title: String,
    pub midi: String,
    #[serde(default)]
    pub contour: Option<String>,
    #[serde(default)]
    pub stems: BTreeMap<String, Option<String>>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl SongBundle {
    pub fn new(title: impl Into<String>, midi: impl Into<String>, base_dir: &Path) -> Self {
        Self {
            title: title.into(),
            midi: midi.into(),
            contour: None,
            stems: BTreeMap::new(),
            base_dir: base_dir.to_path_buf(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let ron_string = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_ron(&ron_string, base_dir).map_err(|message| LoadError::Manifest {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_ron(ron_string: &str, base_dir: &Path) -> Result<Self, String> {
        let mut bundle: SongBundle = ron::from_str(ron_string).map_err(|e| e.to_string())?;
        bundle.base_dir = base_dir.to_path_buf();
        Ok(bundle)
    }

    pub fn save(&self, path: &Path) -> Result<(), LoadError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| LoadError::Manifest {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        fs::write(path, ron_string).map_err(|e| LoadError::io(path, e))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn midi_locator(&self) -> Result<Locator, LoadError> {
        Locator::resolve(&self.midi, &self.base_dir)
    }

    pub fn contour_locator(&self) -> Result<Option<Locator>, LoadError> {
        self.contour
            .as_deref()
            .map(|raw| Locator::resolve(raw, &self.base_dir))
            .transpose()
    }

    /// Stems that have a locator, in name order. The melody track's name
    /// cannot be used by a stem.
    pub fn stem_locators(&self) -> Result<Vec<(String, Locator)>, LoadError> {
        if self.stems.contains_key(MIDI_TRACK_ID) {
            return Err(LoadError::ReservedTrackName(MIDI_TRACK_ID.to_string()));
        }
        self.stems
            .iter()
            .filter_map(|(name, raw)| raw.as_deref().map(|raw| (name, raw)))
            .map(|(name, raw)| Ok((name.clone(), Locator::resolve(raw, &self.base_dir)?)))
            .collect()
    }
}
