//! HTTP layer (spec §6): routes, cookie/CORS middleware, and the `AppState` wiring
//! together the component modules behind axum handlers.

pub mod middleware;
pub mod routes;

pub use routes::AppState;
