use axum::{http::StatusCode, response::IntoResponse};
use bank_api::ApiError;
use engine::EngineError;

pub use server::{ServerState, router, run_with_listener};

mod redirect;
mod server;

pub enum ServerError {
    Engine(EngineError),
    Generic(String),
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Remote(ApiError::Unauthorized(_)) => StatusCode::BAD_GATEWAY,
        EngineError::Remote(ApiError::RateLimited { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::InvalidId(_)
        | EngineError::InvalidData(_)
        | EngineError::InvalidConfig(_)
        | EngineError::Remote(_)
        | EngineError::Database(_)
        | EngineError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::KeyNotFound(_) => "Requisition not found.".to_string(),
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        other => {
            tracing::error!("redirect handling failed: {other}");
            other.to_string()
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), message_for_engine_error(err)),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, message).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}
