//! Content fingerprints for inputs, prompt templates, and reviewed artifacts.

use std::path::Path;

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as lowercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 of a UTF-8 string.
pub fn hash_str(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

/// SHA-256 of a single file's contents.
pub fn hash_file(path: &Path) -> rf_core::Result<String> {
    let data = std::fs::read(path)?;
    Ok(hash_bytes(&data))
}

/// One digest over the concatenated contents of every existing file in
/// `paths`, taken in sorted path order.
///
/// Missing files are skipped. The result does not depend on the order
/// `paths` is given in.
pub fn hash_files<P: AsRef<Path>>(paths: &[P]) -> rf_core::Result<String> {
    let mut sorted: Vec<&Path> = paths.iter().map(AsRef::as_ref).collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    for path in sorted {
        match std::fs::read(path) {
            Ok(data) => hasher.update(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Skipping missing file {} in content hash", path.display());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(hex::encode(hasher.finalize()))
}
