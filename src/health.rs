//! Platform health probes.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/internal/isAlive` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/internal/isReady` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Neither probe touches an upstream: a slow content backend must not get
//! the pod restarted or pulled.

use crate::{Request, Response};

pub async fn liveness(_req: Request) -> Response {
    Response::text("Alive")
}

pub async fn readiness(_req: Request) -> Response {
    Response::text("Ready")
}
