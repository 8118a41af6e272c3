//! Shared plumbing: argument extraction and the timeout guard every
//! environment-backed tool runs its operation under.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use uipilot_core::{EnvironmentError, ToolError, ToolOutcome};

/// Head-room added to a tool's own budget before the registry steps in, so
/// the tool's more descriptive timeout error wins.
pub(crate) const REGISTRY_GRACE: Duration = Duration::from_millis(500);

/// Run `operation` under `timeout`.
pub(crate) async fn guard<T>(
    description: &str,
    timeout: Duration,
    operation: impl Future<Output = Result<T, EnvironmentError>>,
) -> Result<T, ToolError> {
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result.map_err(ToolError::from),
        Err(_) => Err(ToolError::Timeout {
            operation: description.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Like [`guard`], reporting `"OK: <description>"` on success.
pub(crate) async fn perform(
    description: String,
    timeout: Duration,
    operation: impl Future<Output = Result<(), EnvironmentError>>,
) -> Result<ToolOutcome, ToolError> {
    guard(&description, timeout, operation).await?;
    Ok(ToolOutcome::Done(description))
}

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::missing(key))
}

/// A string argument that may be absent or `null`.
pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ToolError::missing(key)),
    }
}

/// A numeric argument; numeric strings are accepted since models emit them.
pub(crate) fn number(args: &Value, key: &str, default: f64) -> Result<f64, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| ToolError::missing(key)),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| ToolError::missing(key)),
        Some(_) => Err(ToolError::missing(key)),
    }
}

/// Quote like a debugger would: `'text'`, or `None` when absent.
pub(crate) fn quoted(value: Option<&str>) -> String {
    match value {
        Some(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        None => "None".into(),
    }
}

/// Render a float so whole numbers keep a trailing `.0`.
pub(crate) fn float(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_accept_strings_and_defaults() {
        let args = json!({ "a": 3, "b": "2.5", "c": null, "d": true });
        assert_eq!(number(&args, "a", 0.0).unwrap(), 3.0);
        assert_eq!(number(&args, "b", 0.0).unwrap(), 2.5);
        assert_eq!(number(&args, "c", 7.0).unwrap(), 7.0);
        assert_eq!(number(&args, "missing", 1.0).unwrap(), 1.0);
        assert!(number(&args, "d", 0.0).is_err());
    }

    #[test]
    fn optional_strings_reject_wrong_types() {
        let args = json!({ "name": null, "role": 3 });
        assert_eq!(optional_str(&args, "name").unwrap(), None);
        assert!(optional_str(&args, "role").is_err());
    }

    #[test]
    fn quoting_escapes_single_quotes() {
        assert_eq!(quoted(Some("it's")), "'it\\'s'");
        assert_eq!(quoted(None), "None");
    }

    #[test]
    fn floats_keep_decimal_point() {
        assert_eq!(float(2.0), "2.0");
        assert_eq!(float(0.25), "0.25");
    }

    #[tokio::test(start_paused = true)]
    async fn guard_times_out_with_description() {
        let err = guard("slow op", Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), EnvironmentError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.render(), "ERROR: TimeoutError: slow op did not finish within 100ms");
    }
}
