//! Fan-out infrastructure for concurrent downstream requests.
//!
//! [`fan_out()`] spawns one task per server and returns a `JoinSet` for the
//! caller to pass to a collection strategy in [`super::fan_in`].

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::task::JoinSet;

use super::connection::LanguageServerConnection;

/// A task result tagged with the server that produced it.
///
/// The tag lets collection strategies order results by server priority.
#[derive(Debug)]
pub struct TaggedResult<T> {
    pub server_name: String,
    pub value: io::Result<T>,
}

/// Spawn one task per server, returning a `JoinSet` for collection.
///
/// `f` receives the server and returns the request future. Dropping or
/// aborting the `JoinSet` drops those futures, which abandons the downstream
/// requests.
#[must_use = "the JoinSet must be passed to a collection strategy"]
pub fn fan_out<T, F, Fut>(
    servers: Vec<Arc<dyn LanguageServerConnection>>,
    f: F,
) -> JoinSet<TaggedResult<T>>
where
    T: Send + 'static,
    F: Fn(Arc<dyn LanguageServerConnection>) -> Fut,
    Fut: Future<Output = io::Result<T>> + Send + 'static,
{
    let mut join_set = JoinSet::new();
    for server in servers {
        let server_name = server.name().to_string();
        let request = f(server);
        join_set.spawn(async move {
            TaggedResult {
                server_name,
                value: request.await,
            }
        });
    }
    join_set
}
