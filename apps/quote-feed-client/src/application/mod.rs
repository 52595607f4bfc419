//! Application Layer - Port definitions.
//!
//! This layer defines how the quote session interacts with external
//! systems without depending on any concrete transport.

/// Port interfaces for external systems (transport).
pub mod ports;
