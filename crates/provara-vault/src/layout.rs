//! The on-disk vault layout (§3).

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct VaultPaths {
    pub root: PathBuf,
}

impl VaultPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        VaultPaths { root: root.into() }
    }

    pub fn genesis_json(&self) -> PathBuf {
        self.root.join("identity/genesis.json")
    }
    pub fn keys_json(&self) -> PathBuf {
        self.root.join("identity/keys.json")
    }
    pub fn privacy_keys_db(&self) -> PathBuf {
        self.root.join("identity/privacy_keys.db")
    }
    pub fn events_ndjson(&self) -> PathBuf {
        self.root.join("events/events.ndjson")
    }
    pub fn current_state_json(&self) -> PathBuf {
        self.root.join("state/current_state.json")
    }
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }
    pub fn policies_dir(&self) -> PathBuf {
        self.root.join("policies")
    }
    pub fn artifacts_cas_dir(&self) -> PathBuf {
        self.root.join("artifacts/cas")
    }
    pub fn manifest_json(&self) -> PathBuf {
        self.root.join("manifest.json")
    }
    pub fn merkle_root_txt(&self) -> PathBuf {
        self.root.join("merkle_root.txt")
    }
    pub fn manifest_sig(&self) -> PathBuf {
        self.root.join("manifest.sig")
    }

    /// Creates every directory the layout requires. Idempotent.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.root.join("identity"),
            self.root.join("events"),
            self.root.join("state"),
            self.checkpoints_dir(),
            self.policies_dir(),
            self.artifacts_cas_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// `E302 VaultStructureInvalid`: the required top-level files/directories
    /// that must exist for a vault to be considered valid.
    pub fn missing_required_paths(&self) -> Vec<String> {
        let required: [(&str, PathBuf); 4] = [
            ("identity/genesis.json", self.genesis_json()),
            ("identity/keys.json", self.keys_json()),
            ("events/events.ndjson", self.events_ndjson()),
            ("manifest.json", self.manifest_json()),
        ];
        required
            .into_iter()
            .filter(|(_, p)| !p.exists())
            .map(|(name, _): (&str, PathBuf)| name.to_string())
            .collect()
    }
}

pub fn is_within(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}
