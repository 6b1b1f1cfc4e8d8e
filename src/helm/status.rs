//! Parses `helm status <release> -o json` output into the three known
//! states the deployer cares about.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelmReleaseStatus {
    Deployed,
    Failed,
    Pending,
    Unknown,
}

/// Anything other than `deployed`/`failed`/`pending` (including malformed
/// JSON) maps to `Unknown` rather than erroring — the deployer treats an
/// unreadable status as inconclusive, not fatal.
pub fn parse_status(raw_json: &str) -> HelmReleaseStatus {
    let value: Value = match serde_json::from_str(raw_json) {
        Ok(v) => v,
        Err(_) => return HelmReleaseStatus::Unknown,
    };
    let status = value
        .get("info")
        .and_then(|i| i.get("status"))
        .and_then(Value::as_str)
        .or_else(|| value.get("status").and_then(Value::as_str))
        .unwrap_or("");

    match status {
        "deployed" => HelmReleaseStatus::Deployed,
        "failed" => HelmReleaseStatus::Failed,
        s if s.starts_with("pending") => HelmReleaseStatus::Pending,
        _ => HelmReleaseStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_deployed_from_nested_info_status() {
        let raw = r#"{"info":{"status":"deployed"}}"#;
        assert_eq!(parse_status(raw), HelmReleaseStatus::Deployed);
    }

    #[test]
    fn parses_top_level_status_field() {
        let raw = r#"{"status":"failed"}"#;
        assert_eq!(parse_status(raw), HelmReleaseStatus::Failed);
    }

    #[test]
    fn pending_variants_map_to_pending() {
        let raw = r#"{"info":{"status":"pending-upgrade"}}"#;
        assert_eq!(parse_status(raw), HelmReleaseStatus::Pending);
    }

    #[test]
    fn malformed_json_is_unknown() {
        assert_eq!(parse_status("not json"), HelmReleaseStatus::Unknown);
    }

    #[test]
    fn unrecognised_value_is_unknown() {
        let raw = r#"{"info":{"status":"superseded"}}"#;
        assert_eq!(parse_status(raw), HelmReleaseStatus::Unknown);
    }
}
