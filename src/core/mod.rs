pub mod config;
pub mod error;
pub mod event_bus;
pub mod platform;
pub mod store;
pub mod updater;
