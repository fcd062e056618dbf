//! Deterministic conflict-resolution policy.
//!
//! The rules are checked in a fixed order and the first match wins; later
//! rules are reachable only when earlier ones do not match. The field lists
//! are a built-in policy, not configuration.

use serde_json::Value;

use crate::models::ResolutionStrategy;

/// Safety-critical fields: the server/expert system is authoritative.
const SAFETY_FIELDS: [&str; 3] = ["safety_status", "hazard_level", "compliance_status"];

/// Direct field observations: the worker on site is authoritative.
const MEASUREMENT_FIELDS: [&str; 3] = ["measurements", "readings", "sensor_data"];

/// Status transitions: the most recent side wins.
const STATUS_FIELDS: [&str; 3] = ["status", "completion_status", "approval_status"];

/// Free-text fields: merged, never dropped.
const TEXT_FIELDS: [&str; 3] = ["notes", "comments", "observations"];

/// Decide how a conflict should be resolved.
pub fn determine_strategy(
    local: &Value,
    remote: &Value,
    changed_fields: &[String],
) -> ResolutionStrategy {
    let changed = |candidates: &[&str]| {
        changed_fields
            .iter()
            .any(|field| candidates.contains(&field.as_str()))
    };

    if changed(&SAFETY_FIELDS) {
        return ResolutionStrategy::RemoteWins;
    }
    if changed(&MEASUREMENT_FIELDS) {
        return ResolutionStrategy::LocalWins;
    }
    if changed(&STATUS_FIELDS) {
        let local_time = payload_timestamp(local);
        let remote_time = payload_timestamp(remote);
        return if local_time > remote_time {
            ResolutionStrategy::LocalWins
        } else {
            ResolutionStrategy::RemoteWins
        };
    }
    if changed(&TEXT_FIELDS) {
        return ResolutionStrategy::Merge;
    }

    ResolutionStrategy::Manual
}

/// Best-effort modification timestamp of a payload, in Unix ms.
///
/// Reads `updated_at`, falling back to `created_at`; accepts either a
/// numeric millisecond value or an ISO-8601 string (with or without zone).
pub fn payload_timestamp(data: &Value) -> Option<i64> {
    let raw = data.get("updated_at").or_else(|| data.get("created_at"))?;
    match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp_millis());
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Merge a local and a remote payload non-destructively.
///
/// Free-text fields are joined so neither side's text is lost; arrays are
/// unioned; for every other divergent field the local value is kept (the
/// merge strategy is only selected when no higher-precedence rule matched,
/// so divergences outside the text fields are incidental edits).
pub fn merge_payloads(local: &Value, remote: &Value) -> Value {
    let (Value::Object(local_map), Value::Object(remote_map)) = (local, remote) else {
        return local.clone();
    };

    let mut merged = remote_map.clone();
    for (key, local_value) in local_map {
        match remote_map.get(key) {
            None => {
                merged.insert(key.clone(), local_value.clone());
            }
            Some(remote_value) if remote_value == local_value => {}
            Some(remote_value) => {
                let value = if TEXT_FIELDS.contains(&key.as_str()) {
                    merge_field(local_value, remote_value)
                } else {
                    local_value.clone()
                };
                merged.insert(key.clone(), value);
            }
        }
    }
    Value::Object(merged)
}

fn merge_field(local: &Value, remote: &Value) -> Value {
    match (local, remote) {
        (Value::String(local_text), Value::String(remote_text)) => {
            Value::String(merge_text(local_text, remote_text))
        }
        (Value::Array(local_items), Value::Array(remote_items)) => {
            let mut union = local_items.clone();
            for item in remote_items {
                if !union.contains(item) {
                    union.push(item.clone());
                }
            }
            Value::Array(union)
        }
        _ => local.clone(),
    }
}

fn merge_text(local: &str, remote: &str) -> String {
    if local == remote || local.contains(remote) {
        return local.to_string();
    }
    if remote.contains(local) {
        return remote.to_string();
    }
    format!("{local}\n\n{remote}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_safety_fields_always_take_remote() {
        let strategy = determine_strategy(&json!({}), &json!({}), &fields(&["hazard_level"]));
        assert_eq!(strategy, ResolutionStrategy::RemoteWins);
    }

    #[test]
    fn test_safety_outranks_measurements() {
        // Both a safety field and a measurement field changed: rule 1 wins
        let strategy = determine_strategy(
            &json!({}),
            &json!({}),
            &fields(&["safety_status", "measurements"]),
        );
        assert_eq!(strategy, ResolutionStrategy::RemoteWins);
    }

    #[test]
    fn test_measurements_take_local() {
        let strategy = determine_strategy(&json!({}), &json!({}), &fields(&["sensor_data"]));
        assert_eq!(strategy, ResolutionStrategy::LocalWins);
    }

    #[test]
    fn test_status_fields_take_most_recent() {
        let newer_local = json!({"updated_at": 2_000});
        let older_remote = json!({"updated_at": 1_000});
        assert_eq!(
            determine_strategy(&newer_local, &older_remote, &fields(&["status"])),
            ResolutionStrategy::LocalWins
        );
        assert_eq!(
            determine_strategy(&older_remote, &newer_local, &fields(&["status"])),
            ResolutionStrategy::RemoteWins
        );
    }

    #[test]
    fn test_text_fields_merge() {
        let strategy = determine_strategy(&json!({}), &json!({}), &fields(&["observations"]));
        assert_eq!(strategy, ResolutionStrategy::Merge);
    }

    #[test]
    fn test_unmatched_fields_require_manual_review() {
        let strategy = determine_strategy(&json!({}), &json!({}), &fields(&["assignee"]));
        assert_eq!(strategy, ResolutionStrategy::Manual);
    }

    #[test]
    fn test_payload_timestamp_accepts_iso_and_millis() {
        assert_eq!(payload_timestamp(&json!({"updated_at": 1_500})), Some(1_500));
        assert_eq!(
            payload_timestamp(&json!({"created_at": "1970-01-01T00:00:01"})),
            Some(1_000)
        );
        assert_eq!(
            payload_timestamp(&json!({"updated_at": "1970-01-01T00:00:02+00:00"})),
            Some(2_000)
        );
        assert_eq!(payload_timestamp(&json!({"value": 1})), None);
    }

    #[test]
    fn test_merge_keeps_both_texts() {
        let local = json!({"notes": "valve worn", "status": "open"});
        let remote = json!({"notes": "replacement ordered", "status": "open"});

        let merged = merge_payloads(&local, &remote);
        let notes = merged["notes"].as_str().unwrap();
        assert!(notes.contains("valve worn"));
        assert!(notes.contains("replacement ordered"));
        assert_eq!(merged["status"], "open");
    }

    #[test]
    fn test_merge_is_idempotent_over_text() {
        let local = json!({"notes": "valve worn"});
        let remote = json!({"notes": "replacement ordered"});

        let once = merge_payloads(&local, &remote);
        // Merging the merged result with the same remote changes nothing
        let twice = merge_payloads(&once, &remote);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_unions_arrays_and_keeps_remote_only_fields() {
        let local = json!({"observations": ["crack"], "crew": "night"});
        let remote = json!({"observations": ["crack", "rust"], "approved_by": "qa-2"});

        let merged = merge_payloads(&local, &remote);
        assert_eq!(merged["observations"], json!(["crack", "rust"]));
        assert_eq!(merged["crew"], "night");
        assert_eq!(merged["approved_by"], "qa-2");
    }
}
