//! # Engage API Library
//!
//! This library provides the core functionality for the Engage service: a
//! social engagement auto-responder that polls inbound DMs and comments,
//! classifies them through an AI gateway, and dispatches replies through
//! per-platform adapters.

pub mod adapters;
pub mod ai;
pub mod auth;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod crypto;
pub mod cursor;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod models;
pub mod poller;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod telemetry;
pub mod token_refresh;
pub use migration;
