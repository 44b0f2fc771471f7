use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, BuildResult, SchemaKind};
use crate::manifest::Manifest;

const MANIFEST_EXTENSION: &str = "json";

/// A validated manifest together with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub path: PathBuf,
    pub manifest: Manifest,
}

/// Load every `*.json` manifest directly inside `dir`.
///
/// The first invalid file aborts the whole load; no partial result is
/// returned. Files are visited in sorted path order.
pub fn load_all(dir: &Path) -> BuildResult<Vec<LoadedManifest>> {
    let mut paths = Vec::new();
    let entries = fs::read_dir(dir).map_err(|err| BuildError::io(dir, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| BuildError::io(dir, err))?;
        let path = entry.path();
        if is_manifest_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        let manifest = load_one(&path)?;
        tracing::debug!(
            package = %manifest.name,
            version = %manifest.version,
            path = %path.display(),
            "found package"
        );
        loaded.push(LoadedManifest { path, manifest });
    }
    Ok(loaded)
}

/// Parse and validate a single manifest file.
pub fn load_one(path: &Path) -> BuildResult<Manifest> {
    let raw = fs::read(path).map_err(|err| BuildError::io(path, err))?;
    Manifest::parse(&raw).map_err(|source| {
        tracing::error!(path = %path.display(), error = %source, "manifest failed validation");
        BuildError::Schema {
            kind: SchemaKind::Manifest,
            path: path.to_path_buf(),
            source,
        }
    })
}

fn is_manifest_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(MANIFEST_EXTENSION))
}
