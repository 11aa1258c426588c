use std::sync::Arc;

use axum::Router;

use crate::main_lib::AppState;

mod events;
mod settings;
mod sync_jobs;

pub fn app_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(settings::router())
        .merge(sync_jobs::router())
        .merge(events::router());

    Router::new().nest("/api/v1", api).with_state(state)
}
