//! `performFieldLevelMerge` (spec §4.4).

use serde_json::{Map, Value};

/// Deep-equality as defined by spec §4.4: primitives by value, arrays by
/// length + element-wise equality, objects by equal key-set and recursive
/// equality on values. `null` is distinct from absent.
///
/// `serde_json::Value`'s derived `PartialEq` already implements exactly
/// this (object comparison is key-set based regardless of insertion
/// order), so this is a thin named wrapper kept at the API boundary the
/// rest of the crate (and its callers) are written against.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    a == b
}

/// Result of [`perform_field_level_merge`].
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    CanMerge { merged_payload: Value },
    Conflict { conflicting_fields: Vec<String> },
}

impl MergeOutcome {
    pub fn can_merge(&self) -> bool {
        matches!(self, MergeOutcome::CanMerge { .. })
    }
}

fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key)
}

fn field_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => json_eq(x, y),
        _ => false,
    }
}

/// Three-way, field-level merge.
///
/// - `base`: the row as of the client's last sync (`None` for a new insert).
/// - `server`: the row's current state on the server.
/// - `client`: the client's proposed payload.
///
/// Only fields present in `client` are considered; each is resolved
/// independently:
/// - both client and server changed it from `base`, to different values:
///   conflict.
/// - only the client changed it: take the client's value.
/// - only the server changed it, or neither changed it: keep the server's
///   value.
pub fn perform_field_level_merge(base: Option<&Value>, server: &Value, client: &Value) -> MergeOutcome {
    let empty = Map::new();

    let Value::Object(client_obj) = client else {
        // Non-object payloads have no fields to merge; treat the whole
        // value as a single unit.
        return if base.map_or(true, |b| json_eq(b, client)) || json_eq(server, client) {
            MergeOutcome::CanMerge {
                merged_payload: client.clone(),
            }
        } else {
            MergeOutcome::Conflict {
                conflicting_fields: vec![],
            }
        };
    };

    let Some(base_obj) = base else {
        return MergeOutcome::CanMerge {
            merged_payload: client.clone(),
        };
    };
    let base_obj = base_obj.as_object().unwrap_or(&empty);
    let server_obj = server.as_object().unwrap_or(&empty);

    let mut merged = Map::with_capacity(client_obj.len());
    let mut conflicts = Vec::new();

    for (f, client_value) in client_obj {
        let base_value = field(base_obj, f);
        let server_value = field(server_obj, f);

        let client_changed = !field_eq(base_value, Some(client_value));
        let server_changed = !field_eq(base_value, server_value);

        if client_changed && server_changed && !field_eq(Some(client_value), server_value) {
            conflicts.push(f.clone());
            continue;
        }

        if client_changed {
            merged.insert(f.clone(), client_value.clone());
        } else if let Some(sv) = server_value {
            merged.insert(f.clone(), sv.clone());
        }
        // else: neither side has a value for this field; leave it absent.
    }

    if !conflicts.is_empty() {
        MergeOutcome::Conflict {
            conflicting_fields: conflicts,
        }
    } else {
        MergeOutcome::CanMerge {
            merged_payload: Value::Object(merged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_insert_always_merges() {
        let client = json!({"name": "A"});
        let out = perform_field_level_merge(None, &json!({}), &client);
        assert_eq!(
            out,
            MergeOutcome::CanMerge {
                merged_payload: client
            }
        );
    }

    #[test]
    fn concurrent_disjoint_field_edits_merge_cleanly() {
        let base = json!({"name": "Original", "type": "praxis"});
        let server = json!({"name": "Original", "type": "server-type"});
        let client = json!({"name": "Client Name", "type": "praxis"});

        let out = perform_field_level_merge(Some(&base), &server, &client);
        assert_eq!(
            out,
            MergeOutcome::CanMerge {
                merged_payload: json!({"name": "Client Name", "type": "server-type"})
            }
        );
    }

    #[test]
    fn overlapping_field_edits_conflict() {
        let base = json!({"name": "Original", "type": "praxis"});
        let server = json!({"name": "Server Name", "type": "praxis"});
        let client = json!({"name": "Client Name", "type": "op"});

        let out = perform_field_level_merge(Some(&base), &server, &client);
        assert_eq!(
            out,
            MergeOutcome::Conflict {
                conflicting_fields: vec!["name".to_string()]
            }
        );
    }

    #[test]
    fn merge_result_is_idempotent() {
        let base = json!({"name": "Original", "type": "praxis"});
        let server = json!({"name": "Original", "type": "server-type"});
        let client = json!({"name": "Client Name", "type": "praxis"});

        let first = perform_field_level_merge(Some(&base), &server, &client);
        let MergeOutcome::CanMerge { merged_payload } = first else {
            panic!("expected clean merge");
        };

        // Feed the result back in as both client and server: it must merge
        // cleanly again with no conflicts (property #6).
        let second = perform_field_level_merge(Some(&base), &merged_payload, &merged_payload);
        assert!(second.can_merge());
    }
}
