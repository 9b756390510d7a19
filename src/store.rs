// 💾 History Store - Per-location event logs, loaded and saved as JSON
//
// File shape (the only authoritative contract):
//   { key: { name, identifier, current_status, events: [{timestamp, status, sequence?}] } }
//
// Older files written as {ts, status} / "current" load as well.
// Saving goes through a temp file in the same directory + rename, so a failed
// run never leaves a half-written store behind.

use crate::deduplication::DuplicatePolicy;
use crate::entities::{EntityKey, EntityRecord, NameDirectory, StatusEvent};
use crate::ordering::OrderingStrategy;
use anyhow::{Context, Result};
use std::collections::btree_map::{self, BTreeMap};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub type EntityMap = BTreeMap<String, EntityRecord>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStore {
    records: BTreeMap<EntityKey, EntityRecord>,
    duplicate_policy: DuplicatePolicy,
    log_order: OrderingStrategy,
}

impl HistoryStore {
    /// Empty store (first run)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    /// Order kept inside every event log. Existing logs are re-sorted.
    pub fn with_log_order(mut self, order: OrderingStrategy) -> Self {
        self.log_order = order;
        for record in self.records.values_mut() {
            record.normalize(order);
        }
        self
    }

    pub fn log_order(&self) -> OrderingStrategy {
        self.log_order
    }

    // ========================================================================
    // LOAD / SAVE
    // ========================================================================

    /// Load a store file. A missing file is the first-run condition and
    /// yields an empty store; anything else unreadable is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no store file yet, starting empty");
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read store: {:?}", path));
            }
        };

        if content.trim().is_empty() {
            warn!(path = %path.display(), "store file is empty, starting empty");
            return Ok(Self::new());
        }

        let map: EntityMap = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse store JSON: {:?}", path))?;

        let store = Self::from_map(map);
        info!(path = %path.display(), records = store.len(), "store loaded");
        Ok(store)
    }

    /// Build a store from the serialized map.
    ///
    /// Records carrying an identifier are keyed by it; others keep their
    /// map key as provisional slug. Two entries landing on the same key
    /// are merged.
    pub fn from_map(map: EntityMap) -> Self {
        let mut store = Self::new();

        for (raw_key, mut record) in map {
            record.normalize(store.log_order);
            // Old files keyed by code without an identifier field
            if record.identifier.is_none() && looks_like_code(&raw_key) {
                record.identifier = Some(raw_key.clone());
            }
            let key = match record.identifier.as_deref() {
                Some(code) => EntityKey::canonical(code),
                None => EntityKey::Provisional(raw_key),
            };
            store.insert(key, record);
        }

        store
    }

    pub fn to_map(&self) -> EntityMap {
        self.records
            .iter()
            .map(|(key, record)| (key.to_string(), record.clone()))
            .collect()
    }

    /// Replace the file at `path` with the full store
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.save_with(path.as_ref(), |writer, map| {
            serde_json::to_writer_pretty(writer, map).context("Failed to serialize store")
        })
    }

    /// Write the map through `encode` into a temp file, then swap it in.
    /// Any error leaves the previous file untouched.
    fn save_with<F>(&self, path: &Path, encode: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<&fs::File>, &EntityMap) -> Result<()>,
    {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {:?}", dir))?;

        {
            let mut writer = BufWriter::new(temp.as_file());
            encode(&mut writer, &self.to_map())?;
            writer.flush().context("Failed to write store")?;
        }
        temp.as_file().sync_all().context("Failed to sync store")?;

        temp.persist(path)
            .with_context(|| format!("Failed to replace store file: {:?}", path))?;

        info!(path = %path.display(), records = self.len(), "store saved");
        Ok(())
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Append one event under `key`, creating the record if needed.
    ///
    /// Returns `false` when the duplicate policy dropped the event.
    pub fn append_event(&mut self, key: &EntityKey, name: &str, event: StatusEvent) -> bool {
        let (policy, order) = (self.duplicate_policy, self.log_order);
        let record = self.records.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, name, "new record");
            EntityRecord::new(name, key.identifier())
        });
        record.append(event, policy, order)
    }

    /// Insert a whole record, merging with any record already under `key`
    pub fn insert(&mut self, key: EntityKey, record: EntityRecord) -> usize {
        match self.records.entry(key) {
            btree_map::Entry::Occupied(mut existing) => {
                existing
                .get_mut()
                .absorb(record, self.duplicate_policy, self.log_order)
            }
            btree_map::Entry::Vacant(slot) => {
                let count = record.event_count();
                slot.insert(record);
                count
            }
        }
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<EntityRecord> {
        self.records.remove(key)
    }

    /// Register every stored name with the directory
    pub fn prime_directory(&self, directory: &mut NameDirectory) -> usize {
        self.records
            .values()
            .filter(|record| directory.learn(&record.name, record.identifier.as_deref()))
            .count()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get(&self, key: &EntityKey) -> Option<&EntityRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &EntityRecord)> {
        self.records.iter()
    }

    /// Keys of records still waiting for a code
    pub fn provisional_keys(&self) -> Vec<EntityKey> {
        self.records
            .keys()
            .filter(|key| key.is_provisional())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Codes are uppercase; provisional slugs never are. A slug can be all
/// digits ("2024"), so a code needs at least one letter.
fn looks_like_code(key: &str) -> bool {
    key.chars().any(|c| c.is_ascii_uppercase())
        && key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Status;
    use chrono::{TimeZone, Utc};

    fn at(day: u32, hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_append_creates_record() {
        let mut store = HistoryStore::new();
        let key = EntityKey::canonical("EXAM");

        assert!(store.append_event(&key, "Example City", StatusEvent::closed(at(1, 0))));

        let record = store.get(&key).unwrap();
        assert_eq!(record.name, "Example City");
        assert_eq!(record.identifier.as_deref(), Some("EXAM"));
        assert_eq!(record.current_status, Status::Closed);
    }

    #[test]
    fn test_append_provisional_has_no_identifier() {
        let mut store = HistoryStore::new();
        let key = EntityKey::provisional_for("Example City");

        store.append_event(&key, "Example City", StatusEvent::opened(at(1, 0)));

        assert_eq!(store.get(&key).unwrap().identifier, None);
        assert_eq!(store.provisional_keys(), vec![key]);
    }

    #[test]
    fn test_duplicate_policy_applies() {
        let key = EntityKey::canonical("EXAM");

        let mut suppress = HistoryStore::new();
        assert!(suppress.append_event(&key, "Example City", StatusEvent::closed(at(1, 0))));
        assert!(!suppress.append_event(&key, "Example City", StatusEvent::closed(at(1, 0))));
        assert_eq!(suppress.get(&key).unwrap().event_count(), 1);

        let mut accumulate = HistoryStore::new().with_duplicate_policy(DuplicatePolicy::Accumulate);
        accumulate.append_event(&key, "Example City", StatusEvent::closed(at(1, 0)));
        accumulate.append_event(&key, "Example City", StatusEvent::closed(at(1, 0)));
        assert_eq!(accumulate.get(&key).unwrap().event_count(), 2);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        let mut store = HistoryStore::new();
        let exam = EntityKey::canonical("EXAM");
        let prov = EntityKey::provisional_for("Somewhere");
        store.append_event(&exam, "Example City", StatusEvent::closed(at(1, 0)));
        store.append_event(&exam, "Example City", StatusEvent::opened(at(2, 0)));
        store.append_event(&prov, "Somewhere", StatusEvent::closed(at(3, 0)));

        store.save(&path).unwrap();
        let loaded = HistoryStore::load(&path).unwrap();

        assert_eq!(loaded, store);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["EXAM"]["current_status"], "open");
        assert_eq!(json["EXAM"]["events"][0]["timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(json["somewhere"]["identifier"], serde_json::Value::Null);
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::load(dir.path().join("absent.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        fs::write(&path, "{not json").unwrap();

        assert!(HistoryStore::load(&path).is_err());
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nope").join("status.json");

        let mut store = HistoryStore::new();
        store.append_event(
            &EntityKey::canonical("EXAM"),
            "Example City",
            StatusEvent::closed(at(1, 0)),
        );

        assert!(store.save(&target).is_err());
        assert!(!target.exists());
    }

    #[test]
    fn test_save_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        fs::write(&path, "{}").unwrap();

        let mut store = HistoryStore::new();
        store.append_event(
            &EntityKey::canonical("EXAM"),
            "Example City",
            StatusEvent::closed(at(1, 0)),
        );
        store.save(&path).unwrap();

        assert_eq!(HistoryStore::load(&path).unwrap().len(), 1);
        // Only the store file remains, no temp leftovers
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_legacy_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        fs::write(
            &path,
            r#"{"UUEE": {"name": "Шереметьево", "current": "closed",
                "events": [{"ts": "2024-01-02T00:00:00+00:00", "status": "open"},
                           {"ts": "2024-01-01T00:00:00+03:00", "status": "closed"}]}}"#,
        )
        .unwrap();

        let store = HistoryStore::load(&path).unwrap();
        let record = store.get(&EntityKey::canonical("UUEE")).unwrap();

        // Re-sorted on load, status follows the last event
        assert_eq!(record.identifier.as_deref(), Some("UUEE"));
        assert_eq!(record.events[0].status, Status::Closed);
        assert_eq!(record.current_status, Status::Open);
    }

    #[test]
    fn test_from_map_merges_colliding_keys() {
        let mut map = EntityMap::new();
        let mut a = EntityRecord::new("Example City", Some("EXAM"));
        a.append(
            StatusEvent::closed(at(1, 0)),
            DuplicatePolicy::Suppress,
            OrderingStrategy::default(),
        );
        let mut b = EntityRecord::new("Example", Some("EXAM"));
        b.append(
            StatusEvent::opened(at(2, 0)),
            DuplicatePolicy::Suppress,
            OrderingStrategy::default(),
        );
        map.insert("EXAM".to_string(), a);
        map.insert("example".to_string(), b);

        let store = HistoryStore::from_map(map);

        assert_eq!(store.len(), 1);
        let record = store.get(&EntityKey::canonical("EXAM")).unwrap();
        assert_eq!(record.event_count(), 2);
        assert_eq!(record.current_status, Status::Open);
    }

    #[test]
    fn test_prime_directory() {
        let mut store = HistoryStore::new();
        store.append_event(
            &EntityKey::canonical("EXAM"),
            "Example City",
            StatusEvent::closed(at(1, 0)),
        );
        store.append_event(
            &EntityKey::provisional_for("Somewhere"),
            "Somewhere",
            StatusEvent::closed(at(1, 0)),
        );

        let mut directory = NameDirectory::new(crate::entities::MIN_STEM_LEN);
        assert_eq!(store.prime_directory(&mut directory), 2);
        assert_eq!(directory.identifier_for("Example City"), Some("EXAM"));
        assert!(directory.contains("Somewhere"));
    }

    #[test]
    fn test_numeric_slug_stays_provisional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");

        let mut store = HistoryStore::new();
        let key = EntityKey::Provisional("2024".to_string());
        store.append_event(&key, "2024", StatusEvent::closed(at(1, 0)));
        store.save(&path).unwrap();

        let loaded = HistoryStore::load(&path).unwrap();

        assert_eq!(loaded, store);
        assert_eq!(loaded.provisional_keys(), vec![key]);
        assert!(!loaded.contains(&EntityKey::canonical("2024")));
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let previous = r#"{"EXAM": {"name": "Example City", "identifier": "EXAM", "current_status": "open", "events": []}}"#;
        fs::write(&path, previous).unwrap();

        let mut store = HistoryStore::new();
        store.append_event(
            &EntityKey::canonical("UUEE"),
            "Шереметьево",
            StatusEvent::closed(at(1, 0)),
        );

        let result = store.save_with(&path, |writer, _| {
            writer.write_all(b"{\"partial\": ")?;
            anyhow::bail!("disk full")
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), previous);
        // The temp file is cleaned up with the failed write
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sequence_log_order_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let key = EntityKey::canonical("EXAM");

        let mut store = HistoryStore::new().with_log_order(OrderingStrategy::SequenceThenPublished);
        store.append_event(
            &key,
            "Example City",
            StatusEvent::opened(at(1, 0)).with_sequence(Some(11)),
        );
        store.append_event(
            &key,
            "Example City",
            StatusEvent::closed(at(2, 0)).with_sequence(Some(10)),
        );
        assert_eq!(store.get(&key).unwrap().current_status, Status::Open);
        store.save(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["EXAM"]["events"][0]["sequence"], 10);

        // Loading sorts by time until the configured order is applied
        let loaded = HistoryStore::load(&path).unwrap();
        assert_eq!(loaded.get(&key).unwrap().current_status, Status::Closed);

        let loaded = loaded.with_log_order(OrderingStrategy::SequenceThenPublished);
        let record = loaded.get(&key).unwrap();
        assert_eq!(record.current_status, Status::Open);
        assert_eq!(record.events[0].sequence, Some(10));
        assert_eq!(loaded, store);
    }
}
