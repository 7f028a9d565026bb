//! Persisted false-positive and accepted-risk decisions
//!
//! Architecture: Infrastructure Layer - The override store persists decisions without touching domain logic
//! - `OverrideStore` is the mutable repository used by the management commands
//! - `OverrideSet` is the immutable snapshot a run reads once up front
//! - Storage backends sit behind `OverrideStorage`; the file backend writes atomically
//! - Fingerprints tie a decision to a violation's identity, not to its line number

use crate::domain::violations::{OverrideStatus, Violation, WardenError, WardenResult};
use crate::patterns::path_filter::normalize_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Current on-disk format version
pub const STORE_VERSION: u32 = 2;

/// Stable identity of a violation.
///
/// SHA-256 over the NUL-separated validator, rule id, normalized path and,
/// when present, the matched excerpt. Line numbers are left out so edits
/// elsewhere in a file do not orphan a decision.
pub fn fingerprint(validator: &str, rule_id: &str, file_path: &Path, matched: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(validator.as_bytes());
    hasher.update([0u8]);
    hasher.update(rule_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_path(file_path).as_bytes());
    if let Some(matched) = matched {
        hasher.update([0u8]);
        hasher.update(matched.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub fingerprint: String,
    /// `validator/rule_id` of the violation, for humans
    pub rule: String,
    pub file_path: PathBuf,
    pub status: OverrideStatus,
    pub reason: String,
    pub added_by: String,
    pub timestamp: DateTime<Utc>,
}

impl OverrideRecord {
    pub fn new(
        fingerprint: impl Into<String>,
        rule: impl Into<String>,
        file_path: impl Into<PathBuf>,
        status: OverrideStatus,
        reason: impl Into<String>,
        added_by: impl Into<String>,
    ) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            rule: rule.into(),
            file_path: file_path.into(),
            status,
            reason: reason.into(),
            added_by: added_by.into(),
            timestamp: Utc::now(),
        }
    }

    /// Record a decision about an observed violation
    pub fn for_violation(
        violation: &Violation,
        status: OverrideStatus,
        reason: impl Into<String>,
        added_by: impl Into<String>,
    ) -> Self {
        Self::new(
            violation.fingerprint.clone(),
            format!("{}/{}", violation.validator, violation.rule_id),
            violation.file_path.clone(),
            status,
            reason,
            added_by,
        )
    }
}

/// Backend that holds the records between runs
pub trait OverrideStorage: Send + Sync + fmt::Debug {
    /// Read every record; a missing store is empty
    fn load(&self) -> WardenResult<BTreeMap<String, OverrideRecord>>;

    /// Replace the stored records
    fn save(&self, records: &BTreeMap<String, OverrideRecord>) -> WardenResult<()>;

    /// Where the records live, for messages
    fn location(&self) -> String;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    records: BTreeMap<String, OverrideRecord>,
}

/// JSON file backend
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bring an older document up to [`STORE_VERSION`]
    fn migrate(mut document: serde_json::Value) -> WardenResult<StoreDocument> {
        let version = match document.get("version") {
            None | Some(serde_json::Value::Null) => 1,
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| WardenError::overrides(format!("Invalid override store version: {value}")))?,
        };

        if version > STORE_VERSION {
            return Err(WardenError::overrides(format!(
                "Unsupported override store version: {version}. This build reads up to version {STORE_VERSION}."
            )));
        }

        if version < STORE_VERSION {
            tracing::info!("Migrating override store from version {} to {}", version, STORE_VERSION);
        }

        if version == 1 {
            // Version 1 kept records as a list
            let list = match document.get_mut("records").map(serde_json::Value::take) {
                Some(serde_json::Value::Array(items)) => items,
                Some(serde_json::Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(WardenError::overrides(format!(
                        "Version 1 override store must hold a record list, found {other}"
                    )))
                }
            };
            let mut records = BTreeMap::new();
            for item in list {
                let record: OverrideRecord = serde_json::from_value(item)
                    .map_err(|e| WardenError::overrides(format!("Invalid version 1 record: {e}")))?;
                records.insert(record.fingerprint.clone(), record);
            }
            return Ok(StoreDocument {
                version: STORE_VERSION,
                records,
            });
        }

        serde_json::from_value(document)
            .map_err(|e| WardenError::overrides(format!("Failed to parse override store: {e}")))
    }
}

impl OverrideStorage for JsonFileStorage {
    fn load(&self) -> WardenResult<BTreeMap<String, OverrideRecord>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            WardenError::overrides(format!("Failed to read {}: {}", self.path.display(), e))
        })?;
        let raw: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            WardenError::overrides(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;

        Ok(Self::migrate(raw)?.records)
    }

    fn save(&self, records: &BTreeMap<String, OverrideRecord>) -> WardenResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                WardenError::overrides(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let document = StoreDocument {
            version: STORE_VERSION,
            records: records.clone(),
        };
        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| WardenError::overrides(format!("Failed to serialize override store: {e}")))?;

        // Readers only ever see the old or the new document
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "overrides.json".to_string());
        let temp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            WardenError::overrides(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory backend for tests and embedding
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    records: Arc<Mutex<BTreeMap<String, OverrideRecord>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OverrideStorage for MemoryStorage {
    fn load(&self) -> WardenResult<BTreeMap<String, OverrideRecord>> {
        Ok(self.records.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, records: &BTreeMap<String, OverrideRecord>) -> WardenResult<()> {
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = records.clone();
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Counts of stored decisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverrideStats {
    pub total: usize,
    pub by_status: BTreeMap<OverrideStatus, usize>,
}

impl OverrideStats {
    /// Format statistics for display
    pub fn format_display(&self) -> String {
        let parts: Vec<String> = self
            .by_status
            .iter()
            .map(|(status, count)| format!("{} {}", count, status.as_str()))
            .collect();
        if parts.is_empty() {
            format!("Overrides: {}", self.total)
        } else {
            format!("Overrides: {} ({})", self.total, parts.join(", "))
        }
    }
}

/// Mutable view of the persisted decisions
#[derive(Debug)]
pub struct OverrideStore {
    storage: Box<dyn OverrideStorage>,
    records: BTreeMap<String, OverrideRecord>,
}

impl OverrideStore {
    /// Read every record from `storage`
    pub fn load(storage: impl OverrideStorage + 'static) -> WardenResult<Self> {
        let records = storage.load()?;
        tracing::debug!("Loaded {} overrides from {}", records.len(), storage.location());
        Ok(Self {
            storage: Box::new(storage),
            records,
        })
    }

    /// Open the JSON store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> WardenResult<Self> {
        Self::load(JsonFileStorage::new(path))
    }

    /// Snapshot for a run; an unreadable store degrades to no overrides
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> OverrideSet {
        match Self::open(&path) {
            Ok(store) => store.snapshot(),
            Err(e) => {
                tracing::warn!(
                    "Ignoring override store {}: {}",
                    path.as_ref().display(),
                    e
                );
                OverrideSet::default()
            }
        }
    }

    /// Add or replace a decision and persist it. Returns the replaced record.
    pub fn add(&mut self, record: OverrideRecord) -> WardenResult<Option<OverrideRecord>> {
        // Pick up changes made by other processes since we loaded
        self.records = self.storage.load()?;
        let previous = self.records.insert(record.fingerprint.clone(), record);
        self.storage.save(&self.records)?;
        Ok(previous)
    }

    /// Remove a decision; `false` if none was stored under `fingerprint`
    pub fn remove(&mut self, fingerprint: &str) -> WardenResult<bool> {
        self.records = self.storage.load()?;
        if self.records.remove(fingerprint).is_none() {
            return Ok(false);
        }
        self.storage.save(&self.records)?;
        Ok(true)
    }

    pub fn get(&self, fingerprint: &str) -> Option<&OverrideRecord> {
        self.records.get(fingerprint)
    }

    /// Records, oldest first
    pub fn list(&self) -> Vec<&OverrideRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        records
    }

    pub fn stats(&self) -> OverrideStats {
        let mut stats = OverrideStats {
            total: self.records.len(),
            ..Default::default()
        };
        for record in self.records.values() {
            *stats.by_status.entry(record.status).or_default() += 1;
        }
        stats
    }

    /// Immutable copy of the current decisions
    pub fn snapshot(&self) -> OverrideSet {
        OverrideSet {
            statuses: Arc::new(
                self.records
                    .iter()
                    .map(|(fp, record)| (fp.clone(), record.status))
                    .collect(),
            ),
        }
    }
}

/// Tallies from applying overrides to one result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideCounts {
    pub suppressed: usize,
    pub accepted_risk: usize,
}

impl OverrideCounts {
    pub fn add(&mut self, other: OverrideCounts) {
        self.suppressed += other.suppressed;
        self.accepted_risk += other.accepted_risk;
    }
}

/// Read-only decisions shared by every worker of a run
#[derive(Debug, Clone, Default)]
pub struct OverrideSet {
    statuses: Arc<HashMap<String, OverrideStatus>>,
}

impl OverrideSet {
    pub fn from_records<I: IntoIterator<Item = OverrideRecord>>(records: I) -> Self {
        Self {
            statuses: Arc::new(records.into_iter().map(|r| (r.fingerprint, r.status)).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Decision recorded for this violation. Tooling failures are never overridden.
    pub fn is_overridden(&self, violation: &Violation) -> Option<OverrideStatus> {
        if violation.is_internal() {
            return None;
        }
        self.statuses.get(&violation.fingerprint).copied()
    }

    /// Drop false positives and flag accepted risks, preserving order
    pub fn apply(&self, violations: Vec<Violation>) -> (Vec<Violation>, OverrideCounts) {
        let mut counts = OverrideCounts::default();
        if self.is_empty() {
            return (violations, counts);
        }

        let kept = violations
            .into_iter()
            .filter_map(|mut violation| match self.is_overridden(&violation) {
                Some(OverrideStatus::FalsePositive) => {
                    counts.suppressed += 1;
                    None
                }
                Some(OverrideStatus::AcceptedRisk) => {
                    counts.accepted_risk += 1;
                    violation.override_status = Some(OverrideStatus::AcceptedRisk);
                    Some(violation)
                }
                None => Some(violation),
            })
            .collect();
        (kept, counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::violations::{Severity, ViolationKind};
    use tempfile::TempDir;

    fn violation(rule_id: &str, kind: ViolationKind) -> Violation {
        let file_path = PathBuf::from("src/index.js");
        Violation {
            validator: "v".into(),
            rule_id: rule_id.into(),
            kind,
            fingerprint: fingerprint("v", rule_id, &file_path, None),
            file_path,
            message: "m".into(),
            line_number: Some(1),
            matched: None,
            confidence: 1.0,
            severity: Severity::Error,
            suggested_fix: None,
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
            override_status: None,
        }
    }

    #[test]
    fn test_fingerprint_identity() {
        let path = Path::new("src/a.js");
        let base = fingerprint("v", "r", path, Some("console.log"));

        assert_eq!(base, fingerprint("v", "r", Path::new("./src/a.js"), Some("console.log")));
        assert_ne!(base, fingerprint("v", "r", path, Some("debugger")));
        assert_ne!(base, fingerprint("v", "r", path, None));
        assert_ne!(fingerprint("ab", "c", path, None), fingerprint("a", "bc", path, None));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn test_apply_suppresses_and_flags() {
        let fp = violation("fp", ViolationKind::Rule);
        let risk = violation("risk", ViolationKind::Rule);
        let plain = violation("plain", ViolationKind::Rule);

        let set = OverrideSet::from_records([
            OverrideRecord::for_violation(&fp, OverrideStatus::FalsePositive, "noise", "dev"),
            OverrideRecord::for_violation(&risk, OverrideStatus::AcceptedRisk, "legacy", "dev"),
        ]);

        let (kept, counts) = set.apply(vec![fp, risk, plain]);
        assert_eq!(counts, OverrideCounts { suppressed: 1, accepted_risk: 1 });
        let ids: Vec<_> = kept.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["risk", "plain"]);
        assert_eq!(kept[0].override_status, Some(OverrideStatus::AcceptedRisk));
        assert!(!kept[0].is_blocking());
    }

    #[test]
    fn test_internal_violations_never_overridden() {
        let internal = violation("r", ViolationKind::PluginExecution);
        let set = OverrideSet::from_records([OverrideRecord::for_violation(
            &internal,
            OverrideStatus::FalsePositive,
            "x",
            "dev",
        )]);
        assert_eq!(set.is_overridden(&internal), None);
    }

    #[test]
    fn test_store_round_trip() -> WardenResult<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("overrides.json");
        let v = violation("r", ViolationKind::Rule);

        {
            let mut store = OverrideStore::open(&path)?;
            assert!(store.add(OverrideRecord::for_violation(&v, OverrideStatus::FalsePositive, "noise", "dev"))?
                .is_none());
        }

        let mut store = OverrideStore::open(&path)?;
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.get(&v.fingerprint).unwrap().rule, "v/r");
        assert_eq!(store.snapshot().is_overridden(&v), Some(OverrideStatus::FalsePositive));

        assert!(store.remove(&v.fingerprint)?);
        assert!(!store.remove(&v.fingerprint)?);
        assert!(OverrideStore::open(&path)?.list().is_empty());

        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn test_stats() -> WardenResult<()> {
        let mut store = OverrideStore::load(MemoryStorage::new())?;
        store.add(OverrideRecord::new("a", "v/r", "x.js", OverrideStatus::FalsePositive, "", "dev"))?;
        store.add(OverrideRecord::new("b", "v/r", "y.js", OverrideStatus::FalsePositive, "", "dev"))?;
        store.add(OverrideRecord::new("c", "v/r", "z.js", OverrideStatus::AcceptedRisk, "", "dev"))?;

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status[&OverrideStatus::FalsePositive], 2);
        assert_eq!(stats.by_status[&OverrideStatus::AcceptedRisk], 1);
        assert!(stats.format_display().contains("2 false-positive"));
        Ok(())
    }

    #[test]
    fn test_migrates_version_one() -> WardenResult<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("overrides.json");
        fs::write(
            &path,
            r#"{"version": 1, "records": [{
                "fingerprint": "abc", "rule": "v/r", "file_path": "src/a.js",
                "status": "accepted-risk", "reason": "legacy", "added_by": "dev",
                "timestamp": "2024-01-01T00:00:00Z"
            }]}"#,
        )?;

        let store = OverrideStore::open(&path)?;
        assert_eq!(store.get("abc").unwrap().status, OverrideStatus::AcceptedRisk);
        Ok(())
    }

    #[test]
    fn test_unreadable_store_degrades_to_empty() -> WardenResult<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("overrides.json");
        fs::write(&path, "{ not json")?;

        assert!(OverrideStore::open(&path).is_err());
        assert!(OverrideStore::load_or_empty(&path).is_empty());

        fs::write(&path, r#"{"version": 99, "records": {}}"#)?;
        assert!(OverrideStore::open(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_rejects_out_of_range_version() -> WardenResult<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("overrides.json");

        // 2^32 + 1 would wrap to version 1 if narrowed
        fs::write(&path, r#"{"version": 4294967297, "records": []}"#)?;
        let err = OverrideStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("4294967297"));

        fs::write(&path, r#"{"version": "2", "records": {}}"#)?;
        assert!(OverrideStore::open(&path).is_err());
        Ok(())
    }
}
