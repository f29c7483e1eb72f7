#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for oss-stats
//!
//! This library keeps pre-computed npm download counts, GitHub repository metrics and a
//! unified content feed fresh and cheap to serve, even though the data comes from slow,
//! rate-limited upstream APIs.
//!
//! # Module Organization
//!
//! - [`store`]: The persistent cache store and its staleness policies
//! - [`npm`]: npm download refresher
//! - [`github`]: GitHub stats refresher
//! - [`feed`]: Feed synchronizer (releases, blog posts, manual announcements)
//! - [`ratelimit`]: Fixed-window rate limiter for caller-facing endpoints
//! - [`query`]: Read-only façade used by the rendering layer
//! - [`jobs`]: Job runner and scheduler
//! - [`commands`]: Command-line interface and orchestration
//!
//! Writes flow from the refreshers into the store; reads flow from the store through the
//! query façade. The two paths never call each other, so a read never waits on upstream.

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod github;
pub mod http;
pub mod jobs;
pub mod model;
pub mod npm;
pub mod query;
pub mod ratelimit;
pub mod registry;
pub mod store;

pub use crate::commands::{Host, run};
