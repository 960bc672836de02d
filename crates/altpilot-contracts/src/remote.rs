use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One user-triggerable action kind. At most one remote operation of a given
/// kind is in flight per overlay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    Title,
    Alt,
    Both,
    Rename,
    Duplicate,
}

impl ActionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Alt => "alt",
            Self::Both => "both",
            Self::Rename => "rename",
            Self::Duplicate => "duplicate",
        }
    }
}

/// The two single-field generation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Title,
    Alt,
}

impl MetadataField {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Alt => "alt",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Title => "Title",
            Self::Alt => "Alt Text",
        }
    }
}

/// Success payload of the combined generation call. Both halves are
/// mandatory; a half-empty payload is rejected upstream as
/// [`RemoteError::InvalidPayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BothResult {
    pub title: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRef {
    #[serde(rename = "type")]
    pub ref_type: String,
    #[serde(rename = "post_title")]
    pub label: String,
}

/// Result of the pre-rename safety scan. Consumed once, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub is_safe_to_rename: bool,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub usage: Vec<UsageRef>,
}

impl UsageReport {
    /// One `type: label` line per reference, in the order the service
    /// reported them. The destructive-rename warning enumerates these.
    pub fn reference_lines(&self) -> Vec<String> {
        self.usage
            .iter()
            .map(|usage| format!("{}: {}", usage.ref_type, usage.label))
            .collect()
    }
}

pub const UNKNOWN_ERROR: &str = "Unknown error";
pub const INVALID_RESPONSE: &str = "Invalid response from server";

/// Failure taxonomy for remote calls. Transport and parse failures are kept
/// distinct from a well-formed envelope that reports `success: false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid JSON response from server")]
    Parse,
    #[error("{0}")]
    Domain(String),
    #[error("{}", INVALID_RESPONSE)]
    InvalidPayload,
}

impl RemoteError {
    /// Builds the domain error for a `success: false` envelope: a structured
    /// `{message}` wins, then a plain string payload, then the fixed default.
    pub fn from_failure_data(data: &Value) -> Self {
        let message = data
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| data.as_str())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .unwrap_or(UNKNOWN_ERROR);
        Self::Domain(message.to_string())
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_message_prefers_structured_payload() {
        let err = RemoteError::from_failure_data(&json!({"message": "quota exceeded"}));
        assert_eq!(err, RemoteError::Domain("quota exceeded".to_string()));

        let err = RemoteError::from_failure_data(&json!("backend offline"));
        assert_eq!(err, RemoteError::Domain("backend offline".to_string()));

        let err = RemoteError::from_failure_data(&json!({"code": 500}));
        assert_eq!(err, RemoteError::Domain(UNKNOWN_ERROR.to_string()));

        let err = RemoteError::from_failure_data(&Value::Null);
        assert_eq!(err, RemoteError::Domain(UNKNOWN_ERROR.to_string()));
    }

    #[test]
    fn usage_report_uses_wire_field_names() -> anyhow::Result<()> {
        let report: UsageReport = serde_json::from_str(
            r#"{
                "is_safe_to_rename": false,
                "usage_count": 2,
                "usage": [
                    {"type": "post", "post_title": "Summer launch"},
                    {"type": "widget", "post_title": "Footer gallery"}
                ]
            }"#,
        )?;
        assert!(!report.is_safe_to_rename);
        assert_eq!(report.usage_count, 2);
        assert_eq!(
            report.reference_lines(),
            vec![
                "post: Summer launch".to_string(),
                "widget: Footer gallery".to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn usage_report_defaults_empty_usage() -> anyhow::Result<()> {
        let report: UsageReport = serde_json::from_str(r#"{"is_safe_to_rename": true}"#)?;
        assert!(report.is_safe_to_rename);
        assert_eq!(report.usage_count, 0);
        assert!(report.usage.is_empty());
        Ok(())
    }
}
