//! Multi-account channel monitor.
//!
//! A pool of independently authenticated accounts polls target channels for
//! new posts and fans out view (and optionally reaction) actions across the
//! pool, under per-account rate limits and platform flood-control backoff.

pub mod account;
pub mod broadcast;
pub mod channel;
pub mod config;
pub mod credentials;
pub mod datetime_utils;
pub mod dispatcher;
pub mod error_utils;
pub mod gateway;
pub mod health;
pub mod join;
pub mod lifecycle;
pub mod monitor;
pub mod pacing;
pub mod poller;
pub mod rate_limit;
pub mod session;
pub mod summary;
pub mod watermark;
