//! Sync engine settings: accepted `schemaVersion` range, partition
//! default, retention knobs, snapshot paging defaults, heartbeat interval,
//! maintenance debounce interval.
//!
//! Parsed from the `LoadedConfig::config_json` produced by
//! [`crate::load_layered_yaml`] — one flat `SyncSettings`, read once at
//! startup and passed by value into `sync-engine` instead of re-reading
//! pointers on the hot path.

use serde::Deserialize;
use serde_json::Value;
use sync_wire::SyncError;

fn default_schema_version_min() -> u32 {
    1
}
fn default_schema_version_max() -> u32 {
    1
}
fn default_partition() -> String {
    sync_wire::DEFAULT_PARTITION.to_string()
}
fn default_keep_newest_commits() -> i64 {
    40
}
fn default_active_window_ms() -> i64 {
    24 * 60 * 60 * 1000
}
fn default_full_history_hours() -> i64 {
    24
}
fn default_fallback_max_age_ms() -> i64 {
    7 * 24 * 60 * 60 * 1000
}
fn default_audit_max_age_ms() -> i64 {
    7 * 24 * 60 * 60 * 1000
}
fn default_audit_max_rows() -> i64 {
    100_000
}
fn default_limit_snapshot_rows() -> u32 {
    500
}
fn default_max_snapshot_pages() -> u32 {
    10
}
fn default_heartbeat_interval_ms() -> u64 {
    30_000
}
fn default_maintenance_min_interval_ms() -> u64 {
    60_000
}
fn default_max_append_retries() -> u32 {
    5
}

/// Commit retention knobs for the prune/compact maintenance loop (spec
/// §4.9).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetentionSettings {
    pub keep_newest_commits: i64,
    pub active_window_ms: i64,
    pub full_history_hours: i64,
    pub fallback_max_age_ms: i64,
    /// Audit prune loop bounds for `sync_request_events`/`sync_operation_events`.
    pub audit_max_age_ms: i64,
    pub audit_max_rows: i64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            keep_newest_commits: default_keep_newest_commits(),
            active_window_ms: default_active_window_ms(),
            full_history_hours: default_full_history_hours(),
            fallback_max_age_ms: default_fallback_max_age_ms(),
            audit_max_age_ms: default_audit_max_age_ms(),
            audit_max_rows: default_audit_max_rows(),
        }
    }
}

/// Bootstrap snapshot paging defaults (spec §4.7), overridable per pull
/// request up to these ceilings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotPagingSettings {
    pub limit_snapshot_rows: u32,
    pub max_snapshot_pages: u32,
}

impl Default for SnapshotPagingSettings {
    fn default() -> Self {
        Self {
            limit_snapshot_rows: default_limit_snapshot_rows(),
            max_snapshot_pages: default_max_snapshot_pages(),
        }
    }
}

/// Top-level sync engine settings, deserialized from the merged config JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
    pub schema_version_min: u32,
    pub schema_version_max: u32,
    pub partition_default: String,
    pub retention: RetentionSettings,
    pub snapshot_paging: SnapshotPagingSettings,
    pub heartbeat_interval_ms: u64,
    pub maintenance_min_interval_ms: u64,
    pub max_append_retries: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            schema_version_min: default_schema_version_min(),
            schema_version_max: default_schema_version_max(),
            partition_default: default_partition(),
            retention: RetentionSettings::default(),
            snapshot_paging: SnapshotPagingSettings::default(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            maintenance_min_interval_ms: default_maintenance_min_interval_ms(),
            max_append_retries: default_max_append_retries(),
        }
    }
}

impl SyncSettings {
    /// Parse settings out of the `/sync` object of a loaded config, falling
    /// back to defaults for any field (or the whole object) that is absent.
    pub fn from_config_json(config_json: &Value) -> Result<Self, serde_json::Error> {
        match config_json.pointer("/sync") {
            Some(v) => serde_json::from_value(v.clone()),
            None => Ok(Self::default()),
        }
    }

    /// Validate a client-supplied `schemaVersion` against the accepted
    /// range (spec §4.5 step 1, §7 `SCHEMA_VERSION_UNSUPPORTED`).
    pub fn validate_schema_version(&self, got: u32) -> Result<(), SyncError> {
        if got < self.schema_version_min || got > self.schema_version_max {
            return Err(SyncError::SchemaVersionUnsupported {
                got,
                min: self.schema_version_min,
                max: self.schema_version_max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_config() {
        let settings = SyncSettings::from_config_json(&Value::Object(Default::default())).unwrap();
        assert_eq!(settings.partition_default, "default");
        assert_eq!(settings.schema_version_min, 1);
    }

    #[test]
    fn overrides_from_config_json_take_effect() {
        let cfg: Value = serde_json::json!({
            "sync": {
                "schemaVersionMax": 3,
                "retention": { "keepNewestCommits": 100 },
            }
        });
        let settings = SyncSettings::from_config_json(&cfg).unwrap();
        assert_eq!(settings.schema_version_max, 3);
        assert_eq!(settings.retention.keep_newest_commits, 100);
        // Untouched fields keep their defaults.
        assert_eq!(settings.retention.active_window_ms, default_active_window_ms());
    }

    #[test]
    fn schema_version_outside_range_is_rejected() {
        let settings = SyncSettings::default();
        assert!(settings.validate_schema_version(1).is_ok());
        assert!(matches!(
            settings.validate_schema_version(2),
            Err(SyncError::SchemaVersionUnsupported { got: 2, min: 1, max: 1 })
        ));
    }
}
