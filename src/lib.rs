//! # Regroup
//!
//! Merge and rehash of error groups: the workers that consolidate duplicate
//! groups and regroup events under a new fingerprinting scheme, plus the HTTP
//! surface that triggers them.

pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod deletion;
pub mod error;
pub mod features;
pub mod grouping;
pub mod handlers;
pub mod merge;
pub mod models;
pub mod queue;
pub mod rehash;
pub mod repositories;
pub mod server;
pub mod services;
pub mod telemetry;
pub mod tsdb;
pub mod worker;
pub use migration;
