//! Editor-side Razor language client.
//!
//! A Razor file (`.razor`, `.cshtml`) mixes markup, C# and Razor directives.
//! The Razor language server projects it into a generated C# document and a
//! generated HTML document, and pushes those to the client as incremental
//! buffer updates. This crate keeps the projections as virtual documents,
//! mirrors them into C# and HTML language servers, and answers the Razor
//! server's delegated requests against the projection version it asked for.
//!
//! Entry point: [`RazorBridge`], which wires the [`document`] model, the
//! downstream [`bridge`] pool, the [`mapping`] services and the [`project`]
//! pipeline, and exposes the [`lsp::RazorMessageTarget`] that handles the
//! Razor server's custom messages.
//!
//! The crate logs through the `log` facade and installs no logger.

pub mod bridge;
pub mod config;
pub mod document;
pub mod lsp;
pub mod mapping;
pub mod project;
pub mod protocol;
pub mod text;

pub use config::BridgeSettings;
pub use document::{DocumentManager, DocumentSynchronizer, SyncOutcome, VirtualDocumentKind};
pub use lsp::{RazorBridge, RazorMessageTarget};
