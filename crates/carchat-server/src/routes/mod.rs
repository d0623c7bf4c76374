pub mod cars;
pub mod chat;
pub mod health;
pub mod pages;
pub mod search;

use crate::state::AppState;
use axum::Router;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(pages::routes(state.clone()))
        .merge(cars::routes(state.clone()))
        .merge(search::routes(state.clone()))
        .merge(chat::routes(state))
        .merge(health::routes())
}
