use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use eventing_core::EventingError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Eventing(#[from] EventingError),

    #[error("请求体超过大小限制")]
    PayloadTooLarge,

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,
}

impl ApiError {
    /// 错误类型标识与对应的HTTP状态码
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Eventing(EventingError::MalformedEvent(_)) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_EVENT")
            }
            ApiError::Eventing(EventingError::ChannelNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "CHANNEL_NOT_FOUND")
            }
            ApiError::Eventing(e) if e.is_transient() => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE")
            }
            ApiError::Eventing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();

        if status.is_server_error() {
            tracing::error!(error = %self, "请求处理失败");
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "type": error_type,
                "message": self.to_string(),
                "code": status.as_u16(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
