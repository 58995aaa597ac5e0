//! Telemetry snapshot model
//!
//! A snapshot is a flat, schema-stable record of node status:
//! - every field name comes from [`FIELDS`]
//! - a field is either undefined (absent) or defined (present, possibly empty)
//! - [`diff`] compares two snapshots to build incremental payloads

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Field set accepted by [`Snapshot`]
pub const FIELDS: &[&str] = &[
    "status",
    "status_notes",
    "current_time",
    // agent configuration
    "components",
    "api_endpoint",
    "engine_version",
    "installation_parameters",
    "host_user_home",
    // metrics
    "resources",
    "last_boot",
    "gpio_pins",
    "vulnerabilities",
    "inferred_location",
    "network",
    "temperatures",
    "container_stats",
    // system configuration
    "operating_system",
    "architecture",
    "ip",
    "hostname",
    "docker_server_version",
    // cluster information
    "node_id",
    "cluster_id",
    "cluster_managers",
    "cluster_nodes",
    "cluster_node_role",
    "cluster_node_labels",
    "swarm_node_cert_expiry_date",
    "cluster_join_address",
    "orchestrator",
    "container_plugins",
    "kubelet_version",
];

/// Field stamped by the orchestrator on every cycle
pub const CURRENT_TIME: &str = "current_time";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Unknown snapshot field: {0}")]
    UnknownField(String),
    #[error("Cannot encode field {field}: {source}")]
    Encode {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Point-in-time description of the node.
///
/// Deserializing goes through [`Snapshot::set`], so unknown fields are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Value>")]
pub struct Snapshot {
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
    #[serde(skip)]
    revision: u64,
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl TryFrom<BTreeMap<String, Value>> for Snapshot {
    type Error = SnapshotError;

    fn try_from(fields: BTreeMap<String, Value>) -> Result<Self, Self::Error> {
        let mut snapshot = Snapshot::new();
        for (field, value) in fields {
            snapshot.set(&field, value)?;
        }
        Ok(snapshot)
    }
}

/// Fields of `A` that differ from `B`, see [`diff`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Defined in both, values differ
    pub changed: BTreeSet<String>,
    /// Defined only in the first snapshot
    pub added: BTreeSet<String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty()
    }

    /// `changed ∪ added`, the fields an incremental payload must carry
    pub fn fields(&self) -> BTreeSet<String> {
        self.changed.union(&self.added).cloned().collect()
    }
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_known_field(field: &str) -> bool {
        FIELDS.contains(&field)
    }

    /// Defines `field`, replacing any previous value
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), SnapshotError> {
        if !Self::is_known_field(field) {
            return Err(SnapshotError::UnknownField(field.to_string()));
        }
        self.fields.insert(field.to_string(), value);
        Ok(())
    }

    /// Serializes `value` and defines `field` with it
    pub fn set_serialized<T: Serialize>(&mut self, field: &str, value: &T) -> Result<(), SnapshotError> {
        let encoded = serde_json::to_value(value).map_err(|source| SnapshotError::Encode {
            field: field.to_string(),
            source,
        })?;
        self.set(field, encoded)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_defined(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of merges applied to this snapshot
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Copies every defined field of `other` onto this snapshot
    pub fn merge(&mut self, other: Snapshot) {
        self.fields.extend(other.fields);
        self.revision += 1;
    }

    /// Defines `current_time` as `YYYY-MM-DDTHH:MM:SSZ`
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        self.fields.insert(
            CURRENT_TIME.to_string(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
    }

    pub fn current_time(&self) -> Option<&str> {
        self.get(CURRENT_TIME).and_then(Value::as_str)
    }

    /// Incremental payload: only the fields that `diff(self, previous)` reports
    pub fn delta(&self, previous: &Snapshot) -> Snapshot {
        let wanted = diff(self, previous).fields();
        let fields = self
            .fields
            .iter()
            .filter(|(name, _)| wanted.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Snapshot { fields, revision: 0 }
    }

    /// Drops fields whose value is null or an empty string/array/object
    pub fn without_empty(mut self) -> Snapshot {
        self.fields.retain(|_, value| !is_empty_value(value));
        self
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone().into_iter().collect())
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Classifies the fields of `a` relative to `b`.
///
/// Fields undefined in both, or defined only in `b`, are not reported.
pub fn diff(a: &Snapshot, b: &Snapshot) -> Diff {
    let mut result = Diff::default();

    for (field, value) in &a.fields {
        match b.fields.get(field) {
            Some(other) if other != value => {
                result.changed.insert(field.clone());
            }
            Some(_) => {}
            None => {
                result.added.insert(field.clone());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_diff_fresh_snapshots() {
        let a = Snapshot::new();
        let b = Snapshot::new();
        assert_eq!(diff(&a, &b), Diff::default());
    }

    #[test]
    fn test_diff_is_asymmetric() {
        let mut a = Snapshot::new();
        let b = Snapshot::new();
        a.set("hostname", json!("my_host")).unwrap();

        let forward = diff(&a, &b);
        assert!(forward.changed.is_empty());
        assert_eq!(forward.added, BTreeSet::from(["hostname".to_string()]));

        assert!(diff(&b, &a).is_empty());
    }

    #[test]
    fn test_diff_changed_values() {
        let mut a = Snapshot::new();
        let mut b = Snapshot::new();
        a.set("hostname", json!("my_host")).unwrap();
        b.set("hostname", json!("my_host_2")).unwrap();
        a.set("ip", json!("10.0.0.1")).unwrap();
        b.set("ip", json!("10.0.0.1")).unwrap();
        a.set("architecture", json!("x86_64")).unwrap();

        let result = diff(&a, &b);
        assert_eq!(result.changed, BTreeSet::from(["hostname".to_string()]));
        assert_eq!(result.added, BTreeSet::from(["architecture".to_string()]));
        assert!(result.changed.is_disjoint(&result.added));
    }

    #[test]
    fn test_empty_value_is_defined() {
        let mut a = Snapshot::new();
        a.set("components", json!([])).unwrap();
        assert!(a.is_defined("components"));
        assert_eq!(diff(&a, &Snapshot::new()).added.len(), 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut a = Snapshot::new();
        let err = a.set("favourite_colour", json!("blue")).unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownField(f) if f == "favourite_colour"));
        assert!(a.is_empty());
    }

    #[test]
    fn test_merge_bumps_revision_once() {
        let mut target = Snapshot::new();
        let mut buffer = Snapshot::new();
        buffer.set("hostname", json!("edge-1")).unwrap();
        buffer.set("ip", json!("192.168.1.10")).unwrap();

        target.merge(buffer);
        assert_eq!(target.revision(), 1);
        assert_eq!(target.get("hostname"), Some(&json!("edge-1")));

        target.merge(Snapshot::new());
        assert_eq!(target.revision(), 2);
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_stamp_format() {
        let mut snapshot = Snapshot::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        snapshot.stamp(now);
        assert_eq!(snapshot.current_time(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn test_delta_keeps_changed_and_added() {
        let mut previous = Snapshot::new();
        previous.set("hostname", json!("edge-1")).unwrap();
        previous.set("ip", json!("10.0.0.1")).unwrap();
        previous.set("orchestrator", json!("docker")).unwrap();

        let mut current = previous.clone();
        current.set("ip", json!("10.0.0.2")).unwrap();
        current.set("architecture", json!("aarch64")).unwrap();
        current.unset("orchestrator");

        let delta = current.delta(&previous);
        assert_eq!(delta.len(), 2);
        assert_eq!(delta.get("ip"), Some(&json!("10.0.0.2")));
        assert_eq!(delta.get("architecture"), Some(&json!("aarch64")));
        assert!(!delta.is_defined("hostname"));
    }

    #[test]
    fn test_without_empty() {
        let mut snapshot = Snapshot::new();
        snapshot.set("hostname", json!("")).unwrap();
        snapshot.set("components", json!([])).unwrap();
        snapshot.set("resources", json!({})).unwrap();
        snapshot.set("ip", Value::Null).unwrap();
        snapshot.set("operating_system", json!("linux")).unwrap();

        let cleaned = snapshot.without_empty();
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned.is_defined("operating_system"));
    }

    #[test]
    fn test_serializes_defined_fields_only() {
        let mut snapshot = Snapshot::new();
        snapshot.set("hostname", json!("edge-1")).unwrap();
        snapshot.merge(Snapshot::new());

        let encoded = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(encoded, json!({"hostname": "edge-1"}));
        assert_eq!(snapshot.to_json(), encoded);
    }

    #[test]
    fn test_deserialize_checks_schema() {
        let decoded: Snapshot = serde_json::from_value(json!({"hostname": "edge-1", "ip": ""})).unwrap();
        assert_eq!(decoded.get("hostname"), Some(&json!("edge-1")));
        assert!(decoded.is_defined("ip"));
        assert_eq!(decoded.revision(), 0);

        let err = serde_json::from_value::<Snapshot>(json!({"hostname": "edge-1", "gpu_count": 2})).unwrap_err();
        assert!(err.to_string().contains("Unknown snapshot field: gpu_count"));
    }
}
