use thiserror::Error;

use crate::model::SchemaError;

/// Every failure a backend call can surface. `Display` is the message shown
/// to the user: the backend's `detail` string verbatim when one was sent,
/// otherwise `"<Operation> failed (<status>)"`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{file_name} is not a video (type {mime})")]
    NotAVideo { file_name: String, mime: String },
    #[error("invalid backend base url: {0}")]
    InvalidBaseUrl(String),
    #[error("failed to read video file: {0}")]
    Io(#[from] std::io::Error),
    #[error("{}", failure_message("Upload", .status, .detail))]
    UploadFailed { status: u16, detail: Option<String> },
    #[error("malformed response from backend: {0}")]
    MalformedResponse(String),
    #[error("{}", failure_message("List violations", .status, .detail))]
    ListFailed { status: u16, detail: Option<String> },
    #[error("{}", failure_message("Delete", .status, .detail))]
    DeleteFailed { status: u16, detail: Option<String> },
    #[error("Analytics failed ({status})")]
    AnalyticsUnavailable { status: u16 },
    #[error("Reset failed ({status})")]
    ResetFailed { status: u16 },
    #[error("Heatmap failed ({status})")]
    HeatmapUnavailable { status: u16 },
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::UploadFailed { status, .. }
            | ClientError::ListFailed { status, .. }
            | ClientError::DeleteFailed { status, .. }
            | ClientError::AnalyticsUnavailable { status }
            | ClientError::ResetFailed { status }
            | ClientError::HeatmapUnavailable { status } => Some(*status),
            _ => None,
        }
    }
}

impl From<SchemaError> for ClientError {
    fn from(e: SchemaError) -> Self {
        ClientError::MalformedResponse(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::MalformedResponse(e.to_string())
    }
}

fn failure_message(operation: &str, status: &u16, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => detail.clone(),
        None => format!("{operation} failed ({status})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_is_verbatim() {
        let err = ClientError::UploadFailed {
            status: 500,
            detail: Some("Could not open video stream".into()),
        };
        assert_eq!(err.to_string(), "Could not open video stream");
    }

    #[test]
    fn test_generic_fallbacks() {
        let cases = [
            (ClientError::UploadFailed { status: 502, detail: None }, "Upload failed (502)"),
            (ClientError::ListFailed { status: 500, detail: None }, "List violations failed (500)"),
            (ClientError::DeleteFailed { status: 404, detail: None }, "Delete failed (404)"),
            (ClientError::AnalyticsUnavailable { status: 503 }, "Analytics failed (503)"),
            (ClientError::ResetFailed { status: 500 }, "Reset failed (500)"),
            (ClientError::HeatmapUnavailable { status: 404 }, "Heatmap failed (404)"),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_schema_error_becomes_malformed() {
        let err: ClientError = SchemaError::Missing("video_url").into();
        assert!(matches!(err, ClientError::MalformedResponse(_)));
        assert_eq!(err.status(), None);
    }
}
