//! Gator - A command line RSS aggregator
//!
//! Users follow RSS feeds; `gator agg` polls the feed that has waited
//! longest on a fixed interval and stores its items as posts, which
//! `gator browse` then lists newest first.

pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod runner;
pub mod scheduler;

pub use error::{Error, FetchError, Result};
