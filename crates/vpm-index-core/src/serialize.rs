use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::error::{BuildError, BuildResult};
use crate::index::Repository;

/// Canonical JSON for `repository`: keys sorted at every depth, absent
/// optionals omitted, two-space indentation and a trailing newline.
///
/// Output is byte-identical for equal repositories, and parsing it back
/// then serializing again yields the same bytes.
pub fn to_canonical_json(repository: &Repository) -> BuildResult<Vec<u8>> {
    let value = sort_keys(serde_json::to_value(repository)?);
    let mut out = serde_json::to_vec_pretty(&value)?;
    out.push(b'\n');
    Ok(out)
}

/// Rebuild every object with its keys in lexicographic order, whatever map
/// type `serde_json` was compiled with.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key, sort_keys(value)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Write the canonical form of `repository` to `path`, replacing it in one
/// rename so readers never observe a partial file.
pub fn write_repository(path: &Path, repository: &Repository) -> BuildResult<()> {
    let bytes = to_canonical_json(repository)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| BuildError::io(dir, err))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| BuildError::io(dir, err))?;
    tmp.write_all(&bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|err| BuildError::io(tmp.path(), err))?;
    tmp.persist(path)
        .map_err(|err| BuildError::io(path, err.error))?;
    Ok(())
}
