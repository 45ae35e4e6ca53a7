//! Type-safe bindings for the two bridge contracts.

pub mod dest_bridge;
pub mod source_bridge;

pub use dest_bridge::DestBridge;
pub use source_bridge::SourceBridge;
