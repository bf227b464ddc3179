//! Names of created tracks

/// Name of a new stem track
///
/// With a single requested stem the stem comes first ("Vocals - Lead"),
/// otherwise the source does ("Lead - Vocals").
pub fn stem_track_name(source: &str, stem: &str, single_stem: bool) -> String {
    if single_stem {
        format!("{} - {}", stem, source)
    } else {
        format!("{} - {}", source, stem)
    }
}

/// Name of the folder track that groups the stems of one source
pub fn folder_track_name(source: &str) -> String {
    format!("{} Stems", source)
}
