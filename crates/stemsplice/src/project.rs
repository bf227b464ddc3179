//! Project files: a JSON-serialized timeline

use anyhow::{Context, Result};
use std::path::Path;

use stemsplice_core::timeline::Timeline;

pub fn load_project(path: &Path) -> Result<Timeline> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project file: {:?}", path))?;
    let timeline: Timeline = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse project file: {:?}", path))?;
    log::info!(
        "load_project: {:?} has {} track(s), {} item(s)",
        path,
        timeline.tracks().len(),
        timeline.items().len()
    );
    Ok(timeline)
}

/// Write the project, replacing the file only once the new contents are complete
pub fn save_project(timeline: &Timeline, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(timeline).context("Failed to serialize project")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {:?}", tmp))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {:?}", path))?;
    log::info!("save_project: Saved {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stemsplice_core::timeline::{Take, TimelineHost};

    #[test]
    fn test_save_and_load_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.json");

        let mut timeline = Timeline::new();
        let track = timeline.add_track("Lead");
        timeline.add_item(track, 1.0, 2.0, Take::new("lead", "lead.wav")).unwrap();
        save_project(&timeline, &path).unwrap();

        let loaded = load_project(&path).unwrap();
        assert_eq!(loaded.tracks(), timeline.tracks());
        assert_eq!(loaded.items(), timeline.items());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_invalid_project_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_project(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));
    }
}
