use axum::{routing::post, Router};

pub mod borrow_requests;
pub mod items;
pub mod system;
pub mod users;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .nest("/items", items::router())
        .nest("/borrow-requests", borrow_requests::router())
        .route("/login", post(users::login))
        .route("/signup", post(users::signup))
}
