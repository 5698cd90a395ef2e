//! File hashing, Merkle root computation, and path-safety checks (C2).

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Streams a file in 1 MiB chunks and returns its SHA-256 digest as
/// lowercase hex. Large manifests must never be read fully into memory.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an arbitrary byte slice, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A 32-byte SHA-256 digest, used as both leaf and internal node value in the
/// Merkle tree.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Digest32(pub [u8; 32]);

impl Digest32 {
    pub fn of(bytes: &[u8]) -> Self {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(bytes));
        Digest32(out)
    }

    pub fn combine(left: &Digest32, right: &Digest32) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&left.0);
        buf.extend_from_slice(&right.0);
        Digest32::of(&buf)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

/// Computes the Merkle root over `leaves` (each leaf already the raw bytes to
/// hash, typically canonical JSON of a manifest file entry). Odd nodes at a
/// level are duplicated rather than carried up unpaired, so every internal
/// node always has two children. An empty leaf set hashes to
/// `SHA-256("")`.
pub fn merkle_root_hex(leaves: &[Vec<u8>]) -> String {
    if leaves.is_empty() {
        return sha256_hex(&[]);
    }

    let mut level: Vec<Digest32> = leaves.iter().map(|l| Digest32::of(l)).collect();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| Digest32::combine(&pair[0], &pair[1]))
            .collect();
    }
    level[0].to_hex()
}

/// Rejects absolute paths, any `..` segment, and any path whose
/// canonicalization escapes `root` (including via symlink).
///
/// `rel` is interpreted as a POSIX-style relative path under `root`; `root`
/// must already exist. Returns the resolved absolute path on success.
pub fn is_safe_relative_path(root: &Path, rel: &str) -> Option<PathBuf> {
    if rel.is_empty() {
        return None;
    }
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return None;
    }
    if rel_path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return None;
    }

    let root_canon = root.canonicalize().ok()?;
    let candidate = root.join(rel_path);

    // The file may not exist yet (e.g. manifest build mid-walk), so canonicalize
    // the deepest existing ancestor and rejoin the remaining components.
    let mut existing = candidate.clone();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(resolved) => {
                let mut resolved = resolved;
                for component in tail.iter().rev() {
                    resolved.push(component);
                }
                return if resolved.starts_with(&root_canon) {
                    Some(resolved)
                } else {
                    None
                };
            }
            Err(_) => {
                let file_name = existing.file_name()?.to_owned();
                tail.push(file_name);
                if !existing.pop() {
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn merkle_root_empty_is_sha256_of_empty_string() {
        let root = merkle_root_hex(&[]);
        assert_eq!(root, sha256_hex(&[]));
    }

    #[test]
    fn merkle_root_duplicates_odd_node() {
        let leaves = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        let h = |b: &[u8]| Digest32::of(b);
        let (a, b, c) = (h(b"a"), h(b"b"), h(b"c"));
        let top_left = Digest32::combine(&a, &b);
        let top_right = Digest32::combine(&c, &c);
        let expected = Digest32::combine(&top_left, &top_right).to_hex();
        assert_eq!(merkle_root_hex(&leaves), expected);
    }

    #[test]
    fn merkle_root_deterministic() {
        let leaves = vec![b"x".to_vec(), b"y".to_vec()];
        assert_eq!(merkle_root_hex(&leaves), merkle_root_hex(&leaves));
    }

    #[test]
    fn rejects_absolute_and_traversal_paths() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_safe_relative_path(dir.path(), "/etc/passwd").is_none());
        assert!(is_safe_relative_path(dir.path(), "../escape").is_none());
        assert!(is_safe_relative_path(dir.path(), "a/../../escape").is_none());
    }

    #[test]
    fn accepts_nested_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("events")).unwrap();
        let resolved = is_safe_relative_path(dir.path(), "events/events.ndjson").unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn sha256_file_streams_large_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        fs::write(&path, vec![7u8; 3 * 1024 * 1024]).unwrap();
        let digest = sha256_file(&path).unwrap();
        assert_eq!(digest.len(), 64);
    }
}
