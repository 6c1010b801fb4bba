pub mod invocations;
pub mod ping;

use crate::state::AppState;
use axum::Router;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(ping::routes())
        .merge(invocations::routes(state))
}
