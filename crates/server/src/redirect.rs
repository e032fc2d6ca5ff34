//! Landing page of the bank-linking flow.
//!
//! The provider sends the end user here with either `ref`, the reference id
//! of the requisition, or `error` (and sometimes `details`) when linking
//! failed or was cancelled.

use axum::{
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{ServerError, server::ServerState};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RedirectParams {
    error: Option<String>,
    details: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
}

pub(crate) async fn handle(
    State(state): State<ServerState>,
    Query(params): Query<RedirectParams>,
) -> Result<(StatusCode, String), ServerError> {
    if let Some(error) = params.error.filter(|e| !e.trim().is_empty()) {
        tracing::warn!(
            reference = params.reference.as_deref().unwrap_or("-"),
            "bank linking failed: {error}"
        );
        let message = match params.details.filter(|d| !d.trim().is_empty()) {
            Some(details) => format!("Requisition failed: {error}: {details}"),
            None => format!("Requisition failed: {error}"),
        };
        return Ok((StatusCode::OK, message));
    }

    let Some(reference) = params.reference.filter(|r| !r.trim().is_empty()) else {
        return Ok((StatusCode::NOT_FOUND, "Requisition not found.".to_string()));
    };

    let requisition = state
        .engine
        .requisition_by_reference(&state.integration, reference.trim())
        .await?;
    state
        .engine
        .accept_requisition(&state.integration, &requisition)
        .await?;

    Ok((StatusCode::OK, "Requisition successful.".to_string()))
}
