//! The editor-facing side of the bridge.
//!
//! [`RazorMessageTarget`] answers the custom `razor/*` messages the Razor
//! language server sends to its client. [`RazorBridge`] assembles it with the
//! document model, the downstream server pool and the project pipeline.

pub mod message_target;
pub mod razor_bridge;

pub use message_target::RazorMessageTarget;
pub use razor_bridge::RazorBridge;
