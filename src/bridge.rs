//! Downstream language server plumbing.
//!
//! Requests from the Razor server are re-targeted at virtual documents and sent
//! to the C# and HTML language servers held in a [`LanguageServerPool`].
//! Multi-server requests go through [`fan_out`] and are gathered by one of the
//! [`fan_in`] strategies. [`VirtualDocumentPublisher`] mirrors virtual buffers
//! into those servers with the standard text synchronization notifications.

pub mod capabilities;
pub mod connection;
mod dispatch;
pub mod fan_in;
pub mod fan_out;
pub mod pool;
pub mod publisher;
pub mod stdio;
pub mod transport;

pub use connection::{IncomingMessageHandler, LanguageServerConnection};
pub use dispatch::{dispatch_collect_all, dispatch_first_win};
pub use fan_in::FanInResult;
pub use fan_out::TaggedResult;
pub use pool::LanguageServerPool;
pub use publisher::VirtualDocumentPublisher;
pub use stdio::{DownstreamMessageHandler, StdioConnection};
