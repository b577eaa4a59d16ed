//! Purpose: Define a stable, structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `notice_json`, `fallback_notice`.
//! Role: Diagnostics for recovered failures (the counter showed stale or default data).
//! Invariants: Notices are non-fatal and never alter stdout payloads.
//! Invariants: JSON schema is additive-only; `time` is RFC 3339 UTC.
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::counter::Visit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub endpoint: String,
    pub message: String,
    pub details: Map<String, Value>,
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("cmd".to_string(), json!(notice.cmd));
    inner.insert("endpoint".to_string(), json!(notice.endpoint));
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));

    let mut outer = Map::new();
    outer.insert("notice".to_string(), Value::Object(inner));
    Value::Object(outer)
}

/// Build the notice for a visit that fell back to cached or default data.
/// Returns `None` when the visit used a fresh value.
pub fn fallback_notice(cmd: &str, endpoint: &str, visit: &Visit) -> Option<Notice> {
    let failure = visit.failure.as_ref()?;
    let mut details = Map::new();
    details.insert("request".to_string(), json!(visit.request.as_str()));
    details.insert("source".to_string(), json!(visit.source.as_str()));
    details.insert("count".to_string(), json!(visit.count));
    details.insert("error_kind".to_string(), json!(failure.kind().as_str()));
    if let Some(status) = failure.status() {
        details.insert("status".to_string(), json!(status));
    }
    Some(Notice {
        kind: "fallback".to_string(),
        time: now_rfc3339(),
        cmd: cmd.to_string(),
        endpoint: endpoint.to_string(),
        message: format!("counting request failed: {failure}"),
        details,
    })
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
