//! # kontakt-bff
//!
//! Backend-for-frontend for the contact pages. It sits between the public web
//! client and the content backend plus two internal services, and does four
//! things:
//!
//! - tells the frontend who is logged in (`/fodselsnr`),
//! - serves content collections from a 60 second read-through cache,
//! - forwards `/enheter/**` and `/mottak/**` to their services with the
//!   right headers (and, for mottak, an exchanged service token),
//! - drops the cache when the content backend's publish webhook calls.
//!
//! TLS, rate limiting, body-size limits and slow-client protection belong to
//! the ingress in front of it.
//!
//! ## Wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kontakt_bff::{AppState, Config, Server, app};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = Arc::new(AppState::from_config(&config)?);
//!     Server::bind(config.bind_addr).serve(app::router(state)).await?;
//!     Ok(())
//! }
//! ```

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub mod app;
pub mod cache;
pub mod config;
pub mod content;
pub mod health;
pub mod identity;
pub mod middleware;
pub mod proxy;

pub use app::AppState;
pub use config::Config;
pub use error::{AppError, ConfigError, Error};
pub use handler::Handler;
pub use method::Method;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use status::Status;
