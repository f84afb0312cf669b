//! Long-lived staging agent
//!
//! Holds one resident store per identity scope and serves the use cases over
//! HTTP JSON:
//! - `POST /v1/<usecase>` with `{"service": "...", ...input}` bodies
//! - `POST /v1/drain` and `POST /v1/persist` to move state to and from the file
//! - `GET /v1/scopes` and `GET /health`
//!
//! The scope defaults to the configured one; `X-Paramstage-Account` and
//! `X-Paramstage-Region` select another.

pub mod error;
pub mod http_server;

pub use error::{ApiError, ErrorBody};
pub use http_server::{build_app, start_server, AppState};
