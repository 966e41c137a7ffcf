use classhubd::SyncError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Unsolicited line pushed to the UI.
pub fn event(name: &str, data: serde_json::Value) -> serde_json::Value {
    json!({
        "event": name,
        "data": data,
    })
}

pub fn sync_err(id: &str, e: &SyncError) -> serde_json::Value {
    let details = match e {
        SyncError::Validation(_) => None,
        SyncError::LocalPersistence { kind, .. } => Some(json!({ "kind": kind.as_str() })),
        SyncError::PartialBulkFailure { attempted, failed } => {
            Some(json!({ "attempted": attempted, "failed": failed }))
        }
        SyncError::PartialReset { cleared, failed } => Some(json!({
            "cleared": cleared.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "failed": failed
                .iter()
                .map(|(k, reason)| json!({ "kind": k.as_str(), "reason": reason }))
                .collect::<Vec<_>>(),
        })),
    };
    err(id, e.code(), e.to_string(), details)
}
