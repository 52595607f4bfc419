//! Domain Layer - Core quote session types.
//!
//! This layer contains the core domain types for the quote feed with no
//! knowledge of transports or wire framing.

/// Quote session identifiers, lifecycle state, and quote updates.
pub mod quote;

/// Subscription tracking.
pub mod subscription;
