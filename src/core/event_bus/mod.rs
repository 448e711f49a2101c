//! Event Bus System
//!
//! Provides a unified, type-safe event bus implementation with:
//! - Subscription lifecycle management (subscribe/unsubscribe)
//! - Filtering and one-shot subscriptions
//! - Synchronous, registration-order delivery with listener isolation

pub mod core;
pub mod progress_bus;

pub use self::core::{EventBusContainer, EventBusStats, SubscriptionId};
pub use progress_bus::{ProgressBusContainer, ProgressEvent};
