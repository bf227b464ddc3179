//! Separation models and stem definitions
//!
//! [`StemSettings`] is the live, user-editable list of stems. Jobs never read
//! it directly: at creation time they receive a [`StemSelection`], an
//! immutable snapshot of the stems that are both selected and supported by
//! the chosen model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::types::Color;

/// Available separation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ModelType {
    /// Hybrid Transformer Demucs, 4 stems
    #[default]
    #[serde(rename = "htdemucs")]
    HtDemucs,

    /// Fine-tuned Demucs, 4 stems, better quality but slower
    #[serde(rename = "htdemucs_ft")]
    HtDemucsFt,

    /// 6-stem Demucs (adds guitar and piano)
    #[serde(rename = "htdemucs_6s")]
    HtDemucs6s,

    /// Hybrid Demucs MMI, 4 stems
    #[serde(rename = "hdemucs_mmi")]
    HDemucsMmi,
}

impl ModelType {
    /// Identifier passed to the worker
    pub fn id(&self) -> &'static str {
        match self {
            Self::HtDemucs => "htdemucs",
            Self::HtDemucsFt => "htdemucs_ft",
            Self::HtDemucs6s => "htdemucs_6s",
            Self::HDemucsMmi => "hdemucs_mmi",
        }
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::HtDemucs => "Demucs 4-stem",
            Self::HtDemucsFt => "Demucs 4-stem (fine-tuned)",
            Self::HtDemucs6s => "Demucs 6-stem",
            Self::HDemucsMmi => "Hybrid Demucs MMI",
        }
    }

    /// Description for UI
    pub fn description(&self) -> &'static str {
        match self {
            Self::HtDemucs => "Vocals, Drums, Bass, Other - fast default",
            Self::HtDemucsFt => "Vocals, Drums, Bass, Other - better quality, slower",
            Self::HtDemucs6s => "Adds Guitar and Piano stems",
            Self::HDemucsMmi => "Vocals, Drums, Bass, Other - older hybrid model",
        }
    }

    /// True if the model produces the model-exclusive stems (guitar, piano)
    pub fn supports_extended_stems(&self) -> bool {
        matches!(self, Self::HtDemucs6s)
    }

    /// Number of output stems
    pub fn stem_count(&self) -> usize {
        if self.supports_extended_stems() {
            6
        } else {
            4
        }
    }

    /// All available models
    pub fn all() -> &'static [Self] {
        &[
            Self::HtDemucs,
            Self::HtDemucsFt,
            Self::HtDemucs6s,
            Self::HDemucsMmi,
        ]
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|m| m.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::all().iter().map(|m| m.id()).collect();
                format!("Unknown model '{}' (known: {})", s, known.join(", "))
            })
    }
}

/// One stem the worker can produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemSpec {
    /// Display name ("Vocals")
    pub name: String,
    /// File the worker writes into the output directory ("vocals.wav")
    pub file_suffix: String,
    /// Color applied to created tracks and takes
    pub color: Color,
    /// Whether the user wants this stem
    #[serde(default = "default_true")]
    pub selected: bool,
    /// Only produced by models with extended stems
    #[serde(default)]
    pub model_exclusive: bool,
}

fn default_true() -> bool {
    true
}

impl StemSpec {
    pub fn new(name: &str, file_suffix: &str, color: Color) -> Self {
        Self {
            name: name.to_string(),
            file_suffix: file_suffix.to_string(),
            color,
            selected: true,
            model_exclusive: false,
        }
    }

    fn exclusive(mut self) -> Self {
        self.model_exclusive = true;
        self
    }

    fn deselected(mut self) -> Self {
        self.selected = false;
        self
    }

    /// Stem key: the file suffix without its extension ("vocals")
    pub fn key(&self) -> &str {
        Path::new(&self.file_suffix)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_suffix)
    }

    /// True if `model` can produce this stem
    pub fn supported_by(&self, model: ModelType) -> bool {
        !self.model_exclusive || model.supports_extended_stems()
    }
}

/// Live stem settings, freely edited by the user between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StemSettings {
    stems: Vec<StemSpec>,
}

impl Default for StemSettings {
    fn default() -> Self {
        Self {
            stems: vec![
                StemSpec::new("Vocals", "vocals.wav", Color::rgb(0xFF, 0x64, 0x64)),
                StemSpec::new("Drums", "drums.wav", Color::rgb(0x64, 0xC8, 0xFF)),
                StemSpec::new("Bass", "bass.wav", Color::rgb(0x96, 0x64, 0xFF)),
                StemSpec::new("Other", "other.wav", Color::rgb(0x64, 0xFF, 0x96)),
                StemSpec::new("Guitar", "guitar.wav", Color::rgb(0xFF, 0xB4, 0x50))
                    .exclusive()
                    .deselected(),
                StemSpec::new("Piano", "piano.wav", Color::rgb(0xFF, 0x78, 0xC8))
                    .exclusive()
                    .deselected(),
            ],
        }
    }
}

impl StemSettings {
    pub fn new(stems: Vec<StemSpec>) -> Self {
        Self { stems }
    }

    pub fn stems(&self) -> &[StemSpec] {
        &self.stems
    }

    /// Select or deselect a stem by name (case-insensitive)
    ///
    /// Returns false if no stem has that name.
    pub fn set_selected(&mut self, name: &str, selected: bool) -> bool {
        match self
            .stems
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name) || s.key().eq_ignore_ascii_case(name))
        {
            Some(stem) => {
                stem.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Select exactly the named stems, deselecting all others
    ///
    /// Returns the names that matched no stem.
    pub fn select_only<S: AsRef<str>>(&mut self, names: &[S]) -> Vec<String> {
        for stem in &mut self.stems {
            stem.selected = false;
        }
        names
            .iter()
            .filter(|name| !self.set_selected(name.as_ref(), true))
            .map(|name| name.as_ref().to_string())
            .collect()
    }

    /// Freeze the stems a job will produce with `model`
    pub fn snapshot(&self, model: ModelType) -> StemSelection {
        let stems: Vec<StemSpec> = self
            .stems
            .iter()
            .filter(|s| s.selected && s.supported_by(model))
            .cloned()
            .collect();
        StemSelection {
            model,
            stems: stems.into(),
        }
    }
}

/// Immutable stem selection captured when a job is created
#[derive(Debug, Clone, PartialEq)]
pub struct StemSelection {
    model: ModelType,
    stems: Arc<[StemSpec]>,
}

impl StemSelection {
    pub fn model(&self) -> ModelType {
        self.model
    }

    pub fn stems(&self) -> &[StemSpec] {
        &self.stems
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stems.iter().map(|s| s.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_stems_filtered_by_model() {
        let mut settings = StemSettings::default();
        settings.set_selected("guitar", true);

        let four = settings.snapshot(ModelType::HtDemucs);
        assert_eq!(four.names(), vec!["Vocals", "Drums", "Bass", "Other"]);

        let six = settings.snapshot(ModelType::HtDemucs6s);
        assert_eq!(six.names(), vec!["Vocals", "Drums", "Bass", "Other", "Guitar"]);
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_changes() {
        let mut settings = StemSettings::default();
        let snapshot = settings.snapshot(ModelType::HtDemucs);
        settings.select_only(&["Vocals"]);
        assert_eq!(snapshot.len(), 4);
        assert_eq!(settings.snapshot(ModelType::HtDemucs).len(), 1);
    }

    #[test]
    fn test_select_only_reports_unknown_names() {
        let mut settings = StemSettings::default();
        let unknown = settings.select_only(&["drums", "kazoo"]);
        assert_eq!(unknown, vec!["kazoo".to_string()]);
        assert_eq!(settings.snapshot(ModelType::HtDemucs).names(), vec!["Drums"]);
    }

    #[test]
    fn test_stem_key_strips_extension() {
        let spec = StemSpec::new("Vocals", "vocals.wav", Color::rgb(0, 0, 0));
        assert_eq!(spec.key(), "vocals");
    }

    #[test]
    fn test_model_parse() {
        assert_eq!("HTDEMUCS_6S".parse::<ModelType>(), Ok(ModelType::HtDemucs6s));
        assert!("spleeter".parse::<ModelType>().is_err());
        assert_eq!(ModelType::HtDemucs6s.stem_count(), 6);
    }
}
