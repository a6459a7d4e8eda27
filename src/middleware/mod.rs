//! Cross-cutting request and response concerns.
//!
//! - [`cors`]: the origin gate, decides whether a response may be read
//!   cross-origin.
//! - [`trace`]: per-request span with method, path, status and latency.

pub mod cors;
pub mod trace;
