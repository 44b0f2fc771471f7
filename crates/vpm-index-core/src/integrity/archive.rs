use std::io::Cursor;

use zip::ZipArchive;

use crate::digest::Sha256Digest;
use crate::error::IntegrityError;

/// Check that `bytes` form a readable zip archive and return their digest.
///
/// The digest covers the raw bytes as downloaded, not the extracted content.
pub fn verify_archive(bytes: &[u8]) -> Result<Sha256Digest, IntegrityError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| IntegrityError::InvalidArchive {
            reason: err.to_string(),
        })?;
    for i in 0..archive.len() {
        archive
            .by_index(i)
            .map_err(|err| IntegrityError::InvalidArchive {
                reason: format!("entry {i}: {err}"),
            })?;
    }
    Ok(Sha256Digest::of(bytes))
}
