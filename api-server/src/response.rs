use actix_web::{http::StatusCode, HttpResponse};

pub(crate) fn json_error_with_code(
    status: StatusCode,
    message: impl Into<String>,
    error_code: Option<&str>,
) -> HttpResponse {
    let mut body = serde_json::json!({
        "success": false,
        "error": message.into(),
    });
    if let Some(code) = error_code {
        body["error_code"] = serde_json::Value::String(code.to_string());
    }
    HttpResponse::build(status).json(body)
}

/// A request failure that maps onto one JSON error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
    pub(crate) code: &'static str,
}

impl ApiError {
    pub(crate) fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>, code: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, code)
    }

    pub(crate) fn race_not_found(race_id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("race not found: {race_id}"),
            "race_not_found",
        )
    }

    /// Details go to the log; the client sees a generic message.
    pub(crate) fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!("{context}: {err}");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "race store error",
            "internal_error",
        )
    }

    pub(crate) fn into_response(self) -> HttpResponse {
        json_error_with_code(self.status, self.message, Some(self.code))
    }
}
