//! Wire shapes exchanged with the scan worker's HTTP API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{ids::JobId, status::JobStatus};

/// Body of `GET scan/status/{id}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub result: Option<Value>,
}

impl StatusResponse {
    /// Returns the result payload only when it carries data.
    ///
    /// The worker stores the result as a document that defaults to `{}`, so
    /// an empty object means "nothing yet", same as `null`.
    pub fn result_payload(&self) -> Option<&Value> {
        self.result.as_ref().filter(|value| !is_empty_payload(value))
    }
}

pub(crate) fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Body of `POST gcp/projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(rename = "keyId")]
    pub key_id: String,
    /// Set when the key was stored but project enumeration failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Body of `POST scan/async/gcp/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncScanAccepted {
    pub scan_id: JobId,
}

/// Body of `POST scan/aws`, which runs the scan before answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncScanResponse {
    pub scan_id: String,
    #[serde(rename = "findingsCount", default)]
    pub findings_count: u64,
}

impl SyncScanResponse {
    /// Result payload in the same shape the asynchronous worker reports.
    pub fn to_result(&self) -> Value {
        serde_json::json!({
            "scanId": self.scan_id,
            "findingsCount": self.findings_count,
        })
    }
}

/// Body of `GET scan/history/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub data: Vec<JobSummary>,
}

/// One row of the worker's job history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub scan_id: JobId,
    pub provider: String,
    #[serde(rename = "projectId", default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Error envelope the worker uses for 4xx/5xx answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// The worker emits naive UTC timestamps; accept RFC 3339 as well.
fn deserialize_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_result_object_is_not_a_payload() {
        let response: StatusResponse = serde_json::from_value(json!({
            "status": "running",
            "progress": 100,
            "result": {}
        }))
        .unwrap();
        assert!(response.result_payload().is_none());
    }

    #[test]
    fn populated_result_is_a_payload() {
        let response: StatusResponse = serde_json::from_value(json!({
            "status": "completed",
            "progress": 100,
            "result": {"scanId": "s-1", "findingsCount": 3}
        }))
        .unwrap();
        assert_eq!(
            response.result_payload(),
            Some(&json!({"scanId": "s-1", "findingsCount": 3}))
        );
    }

    #[test]
    fn missing_fields_default() {
        let response: StatusResponse =
            serde_json::from_value(json!({})).unwrap();
        assert_eq!(response.progress, 0);
        assert_eq!(response.status, JobStatus::Queued);
        assert!(response.result.is_none());
    }

    #[test]
    fn history_accepts_naive_and_rfc3339_timestamps() {
        let history: HistoryResponse = serde_json::from_value(json!({
            "data": [
                {
                    "scan_id": "a",
                    "provider": "GCP",
                    "projectId": "proj-a",
                    "status": "completed",
                    "created_at": "2024-05-01T10:00:00.123456"
                },
                {
                    "scan_id": "b",
                    "provider": "GCP",
                    "projectId": null,
                    "status": "running",
                    "created_at": "2024-05-02T10:00:00Z"
                }
            ]
        }))
        .unwrap();
        assert_eq!(history.data.len(), 2);
        assert!(history.data.iter().all(|row| row.created_at.is_some()));
        assert_eq!(history.data[0].project_id.as_deref(), Some("proj-a"));
    }

    #[test]
    fn accepted_scan_id_is_trimmed_and_never_blank() {
        let accepted: AsyncScanAccepted =
            serde_json::from_value(json!({"scan_id": " j-1 "})).unwrap();
        assert_eq!(accepted.scan_id.as_str(), "j-1");

        let blank =
            serde_json::from_value::<AsyncScanAccepted>(json!({"scan_id": ""}));
        assert!(blank.is_err());

        let history = serde_json::from_value::<HistoryResponse>(json!({
            "data": [{"scan_id": "  ", "provider": "GCP"}]
        }));
        assert!(history.is_err());
    }

    #[test]
    fn sync_response_maps_to_async_result_shape() {
        let response = SyncScanResponse {
            scan_id: "665f".into(),
            findings_count: 12,
        };
        assert_eq!(
            response.to_result(),
            json!({"scanId": "665f", "findingsCount": 12})
        );
    }
}
