//! One-call fan-out + fan-in entry points for handlers.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::connection::LanguageServerConnection;
use super::fan_in::{FanInResult, all, first_win};
use super::fan_out::fan_out;

/// Fan out to `servers` and return the first non-empty result.
pub async fn dispatch_first_win<T, F, Fut>(
    servers: Vec<Arc<dyn LanguageServerConnection>>,
    f: F,
    is_nonempty: impl Fn(&T) -> bool,
    cancel: &CancellationToken,
) -> FanInResult<T>
where
    T: Send + 'static,
    F: Fn(Arc<dyn LanguageServerConnection>) -> Fut,
    Fut: Future<Output = io::Result<T>> + Send + 'static,
{
    let mut join_set = fan_out(servers, f);
    first_win::first_win(&mut join_set, is_nonempty, cancel).await
}

/// Fan out to `servers` and collect every successful result, ordered by
/// `priorities`.
pub async fn dispatch_collect_all<T, F, Fut>(
    servers: Vec<Arc<dyn LanguageServerConnection>>,
    f: F,
    priorities: &[String],
    cancel: &CancellationToken,
) -> FanInResult<Vec<T>>
where
    T: Send + 'static,
    F: Fn(Arc<dyn LanguageServerConnection>) -> Fut,
    Fut: Future<Output = io::Result<T>> + Send + 'static,
{
    let mut join_set = fan_out(servers, f);
    all::collect_all(&mut join_set, priorities, cancel).await
}
