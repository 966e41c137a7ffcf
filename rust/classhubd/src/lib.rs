//! Offline-first sync core for the classroom submission tracker.

pub mod analytics;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod polls;
pub mod remote;
pub mod reset;
pub mod roster;
pub mod session;
pub mod store;
pub mod sync;
pub mod view;

pub use error::SyncError;
