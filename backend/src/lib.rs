//! # Reminder Bridge Backend
//!
//! HTTP backend between a voice agent, the caller profile store and the
//! cron service that fires scheduled reminder calls.
//!
//! ```text
//! REST layer (rest, auth)
//!     ↓
//! Domain layer (domain, schedule)
//!     ↓
//! Storage (db) and upstream clients (scheduler, voice)
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod rest;
pub mod schedule;
pub mod scheduler;
pub mod voice;
