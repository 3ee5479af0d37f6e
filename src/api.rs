//! CRUD surface over poll records. This layer never touches the tally or
//! the broker; it shares only the store schema with the pipeline.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::models::{NewPoll, Poll};
use crate::store::Store;

pub fn router(store: Arc<Store>) -> Router {
    Router::new()
        .route("/polls", get(list_polls).post(create_poll))
        .route("/polls/{id}", get(get_poll).delete(delete_poll))
        .with_state(store)
}

pub async fn serve(store: Arc<Store>, addr: &str, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);
    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn list_polls(State(store): State<Arc<Store>>) -> Result<Json<Vec<Poll>>> {
    Ok(Json(store.list_polls().await?))
}

async fn get_poll(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
) -> Result<Json<Poll>> {
    Ok(Json(store.get_poll(&id).await?))
}

async fn create_poll(
    State(store): State<Arc<Store>>,
    Json(new_poll): Json<NewPoll>,
) -> Result<(StatusCode, Json<Poll>)> {
    if new_poll.title.trim().is_empty() || new_poll.options.is_empty() {
        return Err(Error::Malformed(
            "a poll needs a title and at least one option".to_string(),
        ));
    }

    let poll = Poll::new(new_poll.title, new_poll.options);
    store.create_poll(&poll).await?;
    info!("Created poll {}", poll.id);
    Ok((StatusCode::CREATED, Json(poll)))
}

async fn delete_poll(
    State(store): State<Arc<Store>>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    store.delete_poll(&id).await?;
    info!("Deleted poll {}", id);
    Ok(StatusCode::NO_CONTENT)
}
