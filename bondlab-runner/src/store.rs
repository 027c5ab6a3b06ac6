//! Persistence collaborator: idempotent upsert of canonical bonds by ISIN.

use bondlab_core::domain::{CanonicalBond, Isin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("store serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Receives canonical bonds for idempotent upsert.
pub trait BondStore: Send + Sync {
    fn upsert_batch(&self, bonds: &[CanonicalBond]) -> Result<UpsertStats, StoreError>;
}

/// Content hash of a bond, ignoring when it was synced.
///
/// Two syncs of unchanged upstream data produce the same hash, so a re-run
/// reports `unchanged` rather than `updated`.
pub fn content_hash(bond: &CanonicalBond) -> Result<String, StoreError> {
    let mut value = serde_json::to_value(bond)?;
    if let Some(provenance) = value.get_mut("provenance").and_then(|p| p.as_object_mut()) {
        provenance.remove("lastSyncedAt");
    }
    let json = serde_json::to_string(&value)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredBond {
    hash: String,
    bond: CanonicalBond,
}

fn upsert_into(
    entries: &mut BTreeMap<Isin, StoredBond>,
    bonds: &[CanonicalBond],
) -> Result<UpsertStats, StoreError> {
    let mut stats = UpsertStats::default();
    for bond in bonds {
        let hash = content_hash(bond)?;
        match entries.get(&bond.isin) {
            None => stats.created += 1,
            Some(existing) if existing.hash == hash => stats.unchanged += 1,
            Some(_) => stats.updated += 1,
        }
        entries.insert(
            bond.isin.clone(),
            StoredBond {
                hash,
                bond: bond.clone(),
            },
        );
    }
    Ok(stats)
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<Isin, StoredBond>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, isin: &Isin) -> Option<CanonicalBond> {
        self.lock().get(isin).map(|s| s.bond.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored bond, ordered by ISIN.
    pub fn all(&self) -> Vec<CanonicalBond> {
        self.lock().values().map(|s| s.bond.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Isin, StoredBond>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BondStore for MemoryStore {
    fn upsert_batch(&self, bonds: &[CanonicalBond]) -> Result<UpsertStats, StoreError> {
        upsert_into(&mut self.lock(), bonds)
    }
}

/// Single JSON file holding every bond. Read-modify-write per batch.
pub struct JsonSnapshotStore {
    path: PathBuf,
    write_gate: Mutex<()>,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored bond, ordered by ISIN. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<CanonicalBond>, StoreError> {
        Ok(self.read_entries()?.into_values().map(|s| s.bond).collect())
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read_entries(&self) -> Result<BTreeMap<Isin, StoredBond>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_entries(&self, entries: &BTreeMap<Isin, StoredBond>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }
}

impl BondStore for JsonSnapshotStore {
    fn upsert_batch(&self, bonds: &[CanonicalBond]) -> Result<UpsertStats, StoreError> {
        let _guard = self.write_gate.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_entries()?;
        let stats = upsert_into(&mut entries, bonds)?;
        self.write_entries(&entries)?;
        debug!(path = %self.path.display(), total = entries.len(), "snapshot written");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondlab_core::domain::SourceEndpoint;
    use bondlab_core::transform::{finalize, BondPatch, KeywordClassifier, PartialBond};
    use chrono::{TimeZone, Utc};

    fn bond(isin: &str, rating: &str, day: u32) -> CanonicalBond {
        finalize(
            PartialBond {
                isin: Isin::parse(isin).unwrap(),
                patch: BondPatch {
                    issuer_name: Some("Test Issuer Ltd".into()),
                    credit_rating: Some(rating.into()),
                    ..BondPatch::default()
                },
                sources: vec![SourceEndpoint::ActiveSecurities],
            },
            &KeywordClassifier::default(),
            Utc.with_ymd_and_hms(2026, 10, day, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn hash_ignores_sync_time() {
        let a = bond("INE002A07809", "AAA", 1);
        let b = bond("INE002A07809", "AAA", 2);
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
        let c = bond("INE002A07809", "AA", 2);
        assert_ne!(content_hash(&a).unwrap(), content_hash(&c).unwrap());
    }

    #[test]
    fn memory_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let first = store
            .upsert_batch(&[bond("INE002A07809", "AAA", 1), bond("INE040A08393", "AA", 1)])
            .unwrap();
        assert_eq!(first.created, 2);

        let again = store
            .upsert_batch(&[bond("INE002A07809", "AAA", 2), bond("INE040A08393", "AA+", 2)])
            .unwrap();
        assert_eq!(
            again,
            UpsertStats {
                created: 0,
                updated: 1,
                unchanged: 1
            }
        );
        assert_eq!(store.len(), 2);
        let isin = Isin::parse("INE040A08393").unwrap();
        assert_eq!(store.get(&isin).unwrap().credit_rating.as_deref(), Some("AA+"));
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bonds.json");
        let store = JsonSnapshotStore::new(&path);
        assert!(store.load().unwrap().is_empty());

        let stats = store.upsert_batch(&[bond("INE002A07809", "AAA", 1)]).unwrap();
        assert_eq!(stats.created, 1);
        assert!(path.exists());

        let reopened = JsonSnapshotStore::new(&path);
        let stats = reopened.upsert_batch(&[bond("INE002A07809", "AAA", 3)]).unwrap();
        assert_eq!(stats.unchanged, 1);
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].provenance.last_synced_at.format("%d").to_string(), "03");
    }
}
