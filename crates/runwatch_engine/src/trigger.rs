use runwatch_core::RunId;
use serde_json::Value;
use url::Url;

use crate::{ChannelError, StreamSource, TriggerError, TriggerOutcome};

/// Asks the server to start a run.
pub async fn trigger_run(source: &dyn StreamSource, url: &Url) -> Result<TriggerOutcome, TriggerError> {
    let body = source.post(url).await?;
    let value: Value =
        serde_json::from_slice(&body).map_err(|err| ChannelError::Decode(err.to_string()))?;

    if value.get("ok").and_then(Value::as_bool) != Some(true) {
        let reason = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(TriggerError::Rejected(reason));
    }

    if let Some(skipped) = value.get("skipped").filter(|v| !v.is_null() && **v != Value::Bool(false)) {
        let reason = match skipped {
            Value::String(reason) => reason.clone(),
            other => other.to_string(),
        };
        return Ok(TriggerOutcome::Skipped { reason });
    }

    let run_id = match value.get("run_id") {
        Some(Value::String(raw)) => RunId::parse(raw),
        Some(Value::Number(n)) => n.as_f64().map(|secs| RunId::issued(secs as i64)),
        _ => None,
    };
    Ok(TriggerOutcome::Started { run_id })
}
