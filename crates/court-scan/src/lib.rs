//! # Court Scan
//!
//! This crate watches a padel-court booking service for openings. It keeps the
//! last-known availability of every court slot across polling cycles, detects
//! slots that just became bookable and decides when the user must be emailed.

/// Types shared by the scan engine, the provider client and the notifiers
mod scan_types;
pub use scan_types::*;

/// Durable per-slot state and the known-dates record
mod state_store;
pub use state_store::*;

/// Change detection between a fresh snapshot and stored state
mod differ;
pub use differ::*;

/// The polling loop driving fetch, diff, notify and persist
mod executor;
pub use executor::*;

/// Login and cookie handling for the booking site
mod session_manager;
pub use session_manager::*;

/// Extraction of slot availability from the planning page markup
mod planning_parser;
pub use planning_parser::*;

/// Booking site client implementing [`AvailabilityProvider`]
mod padel_client;
pub use padel_client::*;

/// Rendering of notification messages
mod notification_service;
pub use notification_service::*;

/// Email and logging notifiers implementing [`Notifier`]
mod email_service;
pub use email_service::*;

#[cfg(test)]
mod test_server;
