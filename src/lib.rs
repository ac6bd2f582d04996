//! Intel Stream - A Security Feed Aggregator
//!
//! This crate merges security news, breach reports and freshly published
//! vulnerabilities from unreliable upstream sources into one de-duplicated,
//! newest-first stream that refreshes on a fixed interval.

pub mod accumulator;
pub mod config;
pub mod error;
pub mod feeds;
pub mod fetcher;
pub mod model;
pub mod notify;
pub mod routes;
pub mod scheduler;
pub mod selector;
pub mod source;
pub mod vulnerability;
