//! Directory walk -> file list -> Merkle root -> signed anchor (C7).

use std::fs;
use std::path::Path;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use provara_core::{canon, crypto, integrity};

use crate::error::VaultError;
use crate::layout::VaultPaths;

const MANIFEST_META_FILES: [&str; 3] = ["manifest.json", "merkle_root.txt", "manifest.sig"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

/// `M` (§3): `files` is lexicographically sorted by `path`, which is
/// POSIX-style and relative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub backpack_spec_version: String,
    pub manifest_version: String,
    pub created_at_utc: String,
    pub file_count: usize,
    pub files: Vec<FileEntry>,
}

/// Walks the vault, hashing every file except the manifest's own three meta
/// files. Symlinks are never followed; ones that escape the vault root are
/// skipped with a warning rather than rejected outright.
pub fn build_manifest(paths: &VaultPaths) -> Result<(Manifest, Vec<String>), VaultError> {
    let root = paths.root.canonicalize()?;
    let mut files = Vec::new();
    let mut warnings = Vec::new();
    walk(&root, &root, &mut files, &mut warnings)?;
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let manifest = Manifest {
        backpack_spec_version: "1.0".to_string(),
        manifest_version: "manifest.v0".to_string(),
        created_at_utc: chrono::Utc::now().to_rfc3339(),
        file_count: files.len(),
        files,
    };
    Ok((manifest, warnings))
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<FileEntry>, warnings: &mut Vec<String>) -> Result<(), VaultError> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            match path.canonicalize() {
                Ok(resolved) if resolved.starts_with(root) => {
                    warnings.push(format!("NOTE (symlink within root): {}", path.display()));
                }
                _ => {
                    warnings.push(format!("SKIPPED (symlink escapes root): {}", path.display()));
                    continue;
                }
            }
        }

        if file_type.is_dir() {
            walk(root, &path, out, warnings)?;
            continue;
        }
        if !file_type.is_file() && !file_type.is_symlink() {
            continue;
        }

        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        if MANIFEST_META_FILES.contains(&rel.as_str()) {
            continue;
        }

        let sha256 = integrity::sha256_file(&path)?;
        let size = entry.metadata()?.len();
        out.push(FileEntry { path: rel, sha256, size });
    }
    Ok(())
}

/// Merkle leaves = canonical JSON bytes of each file entry, excluding
/// `created_at_utc` and the other header fields so regeneration is stable
/// unless file contents actually change.
pub fn manifest_leaves(manifest: &Manifest) -> Result<Vec<Vec<u8>>, VaultError> {
    manifest
        .files
        .iter()
        .map(|f| Ok(canon::to_canonical_bytes(f)?))
        .collect()
}

/// Rebuilds `manifest.json`, `merkle_root.txt`, and `manifest.sig` from the
/// vault's current contents.
pub fn regenerate(paths: &VaultPaths, signing: &SigningKey, key_id: &str) -> Result<(), VaultError> {
    let (manifest, warnings) = build_manifest(paths)?;
    for warning in &warnings {
        tracing::warn!(%warning, "manifest walk warning");
    }

    let leaves = manifest_leaves(&manifest)?;
    let root_hex = integrity::merkle_root_hex(&leaves);

    let manifest_bytes = canon::to_canonical_bytes(&manifest)?;
    fs::write(paths.manifest_json(), &manifest_bytes)?;
    fs::write(paths.merkle_root_txt(), format!("{}\n", root_hex))?;

    let record = crypto::sign_manifest(&paths.manifest_json(), &paths.merkle_root_txt(), signing, key_id)?;
    let sig_bytes = serde_json::to_vec(&record)?;
    fs::write(paths.manifest_sig(), sig_bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use provara_core::Keypair;

    #[test]
    fn regenerate_writes_all_three_files_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::new(dir.path());
        paths.ensure_directories().unwrap();
        fs::write(paths.events_ndjson(), b"").unwrap();

        let kp = Keypair::generate();
        regenerate(&paths, &kp.signing, &kp.key_id()).unwrap();

        assert!(paths.manifest_json().exists());
        assert!(paths.merkle_root_txt().exists());
        assert!(paths.manifest_sig().exists());

        let root_content = fs::read_to_string(paths.merkle_root_txt()).unwrap();
        assert!(!root_content.trim().is_empty());
    }
}
