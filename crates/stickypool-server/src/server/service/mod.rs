//! HTTP front end for the worker pool.
//!
//! This module exposes the job endpoint and the health probe as an axum
//! [`Router`](axum::Router). Handlers never block: a request submits its job,
//! awaits the result and answers, while the pool's own threads do the work.
//!
//! ## Structure
//!
//! - [`handler`] - Route handlers, shared state and router assembly.

pub mod handler;
