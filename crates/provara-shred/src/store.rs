//! `identity/privacy_keys.db`: a synchronous SQLite sidecar mapping a random
//! `kid` to its DEK (and, for per-actor mode, to the actor it was issued
//! for). Deleting a row is what "shredding" actually destroys.

use std::path::Path;

use rand::RngCore;
use rusqlite::{params, Connection};

use crate::error::ShredError;

pub struct PrivacyKeyStore {
    conn: Connection,
}

impl PrivacyKeyStore {
    /// Opens (creating if absent) the sidecar at `path` and ensures its
    /// schema exists.
    pub fn open(path: &Path) -> Result<Self, ShredError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS dek (
                kid TEXT PRIMARY KEY,
                actor TEXT,
                dek BLOB NOT NULL,
                created_at_utc TEXT NOT NULL
            )",
            [],
        )?;
        Ok(PrivacyKeyStore { conn })
    }

    /// Opens an in-memory sidecar, useful for tests and ephemeral shredding
    /// workflows that never persist the DEK to begin with.
    pub fn open_in_memory() -> Result<Self, ShredError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS dek (
                kid TEXT PRIMARY KEY,
                actor TEXT,
                dek BLOB NOT NULL,
                created_at_utc TEXT NOT NULL
            )",
            [],
        )?;
        Ok(PrivacyKeyStore { conn })
    }

    /// Stores a freshly generated DEK under a random `kid` and returns it.
    pub fn store_new_dek(&self, dek: &[u8; 32], actor: Option<&str>) -> Result<String, ShredError> {
        let kid = random_kid();
        self.conn.execute(
            "INSERT INTO dek (kid, actor, dek, created_at_utc) VALUES (?1, ?2, ?3, ?4)",
            params![kid, actor, dek.as_slice(), chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(kid)
    }

    pub fn get_dek(&self, kid: &str) -> Result<Option<[u8; 32]>, ShredError> {
        let mut stmt = self.conn.prepare("SELECT dek FROM dek WHERE kid = ?1")?;
        let mut rows = stmt.query(params![kid])?;
        let Some(row) = rows.next()? else { return Ok(None) };
        let bytes: Vec<u8> = row.get(0)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ShredError::Crypto("stored DEK has unexpected length".to_string()))?;
        Ok(Some(arr))
    }

    /// Finds the DEK already issued for `actor`, if per-actor mode is in use.
    pub fn dek_for_actor(&self, actor: &str) -> Result<Option<(String, [u8; 32])>, ShredError> {
        let mut stmt = self.conn.prepare("SELECT kid, dek FROM dek WHERE actor = ?1 LIMIT 1")?;
        let mut rows = stmt.query(params![actor])?;
        let Some(row) = rows.next()? else { return Ok(None) };
        let kid: String = row.get(0)?;
        let bytes: Vec<u8> = row.get(1)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ShredError::Crypto("stored DEK has unexpected length".to_string()))?;
        Ok(Some((kid, arr)))
    }

    /// Destroys one DEK. Idempotent: shredding an already-shredded `kid` is a
    /// no-op, not an error.
    pub fn destroy_dek(&self, kid: &str) -> Result<(), ShredError> {
        self.conn.execute("DELETE FROM dek WHERE kid = ?1", params![kid])?;
        Ok(())
    }

    /// Destroys every DEK issued to `actor` and returns how many were
    /// removed.
    pub fn destroy_actor_deks(&self, actor: &str) -> Result<usize, ShredError> {
        Ok(self.conn.execute("DELETE FROM dek WHERE actor = ?1", params![actor])?)
    }
}

fn random_kid() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    format!("kid_{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_retrieve_dek() {
        let store = PrivacyKeyStore::open_in_memory().unwrap();
        let dek = [7u8; 32];
        let kid = store.store_new_dek(&dek, Some("actor_a")).unwrap();
        assert_eq!(store.get_dek(&kid).unwrap(), Some(dek));
    }

    #[test]
    fn destroy_dek_makes_it_unrecoverable() {
        let store = PrivacyKeyStore::open_in_memory().unwrap();
        let dek = [9u8; 32];
        let kid = store.store_new_dek(&dek, None).unwrap();
        store.destroy_dek(&kid).unwrap();
        assert_eq!(store.get_dek(&kid).unwrap(), None);
    }

    #[test]
    fn destroy_actor_deks_removes_all_for_that_actor() {
        let store = PrivacyKeyStore::open_in_memory().unwrap();
        let k1 = store.store_new_dek(&[1u8; 32], Some("actor_a")).unwrap();
        let k2 = store.store_new_dek(&[2u8; 32], Some("actor_a")).unwrap();
        let k3 = store.store_new_dek(&[3u8; 32], Some("actor_b")).unwrap();
        let removed = store.destroy_actor_deks("actor_a").unwrap();
        assert_eq!(removed, 2);
        assert!(store.get_dek(&k1).unwrap().is_none());
        assert!(store.get_dek(&k2).unwrap().is_none());
        assert!(store.get_dek(&k3).unwrap().is_some());
    }
}
