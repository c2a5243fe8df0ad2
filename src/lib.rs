//! Billing Core Library
//!
//! The order-commit transaction core of a multi-tenant retail billing
//! platform: inventory reservation, per-tenant bill numbering, monthly usage
//! quotas, deterministic totals, and retry-safe order persistence against a
//! single relational datastore.
//!
//! This crate owns no transport. It is a library-level transaction boundary
//! callable from any HTTP handler or queue consumer; authentication, CRUD
//! screens, and message delivery live with the caller.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod retry;
pub mod services;

pub use config::AppConfig;
pub use errors::ServiceError;
pub use retry::{RetryExecutor, RetryPolicy};
pub use services::orders::{
    CommitOrderItem, CommitOrderRequest, CommitOrderResult, OrderCommitService,
};
