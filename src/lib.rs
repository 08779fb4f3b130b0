//! Feedboard - a feed dashboard builder
//!
//! This crate fetches RSS, Atom and proxied JSON feeds, normalizes their items,
//! renders them into a static dashboard with a daily activity chart, and
//! maintains the editable list of feed sources.

pub mod activity;
pub mod aggregate;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod parser;
pub mod registry;
pub mod render;
pub mod store;
