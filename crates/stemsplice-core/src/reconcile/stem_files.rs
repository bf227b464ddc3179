//! Finding and importing stem files

use std::io;
use std::path::{Path, PathBuf};

use crate::stems::StemSpec;

/// Find the file the worker wrote for `spec` in `output_dir`
///
/// Looks for `<output_dir>/<file_suffix>` first, then for any file whose
/// name without extension equals the stem key (case-insensitive), so
/// `Vocals.flac` satisfies `vocals.wav`.
pub fn locate_stem(output_dir: &Path, spec: &StemSpec) -> Option<PathBuf> {
    let exact = output_dir.join(&spec.file_suffix);
    if exact.is_file() {
        return Some(exact);
    }

    let entries = match std::fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("locate_stem: Cannot read {:?}: {}", output_dir, e);
            return None;
        }
    };
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.eq_ignore_ascii_case(spec.key()))
        })
        .collect();
    // Directory order is platform-dependent
    candidates.sort();
    let found = candidates.into_iter().next();
    if let Some(path) = &found {
        log::debug!("locate_stem: '{}' matched alias {:?}", spec.name, path);
    }
    found
}

/// Replace characters that are invalid in file names
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// First path of the form `stem.ext`, `stem (2).ext`, ... that does not exist
fn unique_path(dir: &Path, stem: &str, ext: Option<&str>) -> PathBuf {
    let file_name = |n: usize| {
        let base = if n == 1 {
            stem.to_string()
        } else {
            format!("{} ({})", stem, n)
        };
        match ext {
            Some(ext) => format!("{}.{}", base, ext),
            None => base,
        }
    };
    (1..)
        .map(|n| dir.join(file_name(n)))
        .find(|p| !p.exists())
        .unwrap_or_else(|| dir.join(file_name(1)))
}

/// Copy a stem into the project's media folder
///
/// The copy is named `<source> - <stem>.<ext>`, sanitized and never
/// overwriting an existing file.
pub fn import_stem(
    path: &Path,
    media_dir: &Path,
    source: &str,
    spec: &StemSpec,
) -> io::Result<PathBuf> {
    std::fs::create_dir_all(media_dir)?;
    let stem = sanitize_filename(&format!("{} - {}", source, spec.name));
    let ext = path.extension().and_then(|e| e.to_str());
    let target = unique_path(media_dir, &stem, ext);
    std::fs::copy(path, &target)?;
    log::debug!("import_stem: {:?} -> {:?}", path, target);
    Ok(target)
}
