use std::sync::Arc;

use axum::{Router, routing::get};

use crate::redirect;
use engine::{Engine, Integration, REDIRECT_PATH};

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    /// Integration the redirect callbacks belong to.
    pub integration: Arc<Integration>,
}

impl ServerState {
    pub fn new(engine: Arc<Engine>, integration: Integration) -> Self {
        Self {
            engine,
            integration: Arc::new(integration),
        }
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route(REDIRECT_PATH, get(redirect::handle))
        .with_state(state)
}

pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state)).await
}
