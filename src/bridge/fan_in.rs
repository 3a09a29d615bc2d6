//! Gathering results of a [`fan_out`](super::fan_out::fan_out).
//!
//! [`all::collect_all`] keeps every answer, ordered by server priority, and
//! backs `razor/codeAction`. [`first_win::first_win`] stops at the first
//! useful answer and backs `razor/resolveCodeAction`.

pub mod all;
pub mod first_win;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc;

use super::fan_out::TaggedResult;

const LOG_TARGET: &str = "razor_bridge::bridge";

/// Outcome of gathering a fan-out.
#[derive(Debug)]
#[must_use]
pub enum FanInResult<T> {
    Done(T),
    /// Nothing usable came back. `errors` counts servers that failed or
    /// whose task panicked; zero means every server answered empty.
    NoResult { errors: usize },
    /// The Razor server cancelled the request first.
    Cancelled,
}

impl<T> FanInResult<T> {
    /// Turn the outcome into the answer for `method`.
    ///
    /// `NoResult` is answered with `fallback`; `Cancelled` becomes a
    /// `RequestCancelled` error.
    pub fn into_response<R>(
        self,
        method: &str,
        fallback: R,
        on_done: impl FnOnce(T) -> jsonrpc::Result<R>,
    ) -> jsonrpc::Result<R> {
        let errors = match self {
            FanInResult::Done(value) => return on_done(value),
            FanInResult::Cancelled => return Err(jsonrpc::Error::request_cancelled()),
            FanInResult::NoResult { errors } => errors,
        };
        if errors == 0 {
            log::debug!(target: LOG_TARGET, "{}: every server answered empty", method);
        } else {
            log::warn!(
                target: LOG_TARGET,
                "{}: no usable answer, {} server(s) failed",
                method,
                errors
            );
        }
        Ok(fallback)
    }
}

/// One finished task, as seen by a gathering strategy.
enum Arrival<T> {
    Answer { server: String, value: T },
    Failed,
    Exhausted,
    Cancelled,
}

/// Wait for the next task of `tasks` to finish.
///
/// On cancellation every outstanding task is aborted. Failures are logged
/// here so strategies only count them.
async fn next_arrival<T: Send + 'static>(
    tasks: &mut JoinSet<TaggedResult<T>>,
    cancel: &CancellationToken,
) -> Arrival<T> {
    let joined = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tasks.abort_all();
            return Arrival::Cancelled;
        }
        joined = tasks.join_next() => joined,
    };
    match joined {
        None => Arrival::Exhausted,
        Some(Ok(TaggedResult {
            server_name,
            value: Ok(value),
        })) => Arrival::Answer {
            server: server_name,
            value,
        },
        Some(Ok(TaggedResult {
            server_name,
            value: Err(e),
        })) => {
            log::warn!(target: LOG_TARGET, "Request to {} failed: {}", server_name, e);
            Arrival::Failed
        }
        Some(Err(e)) => {
            log::warn!(target: LOG_TARGET, "Request task did not finish: {}", e);
            Arrival::Failed
        }
    }
}

#[cfg(test)]
pub(super) mod test_helpers {
    use std::io;
    use std::time::Duration;

    use tokio::task::JoinSet;

    use super::FanInResult;
    use crate::bridge::fan_out::TaggedResult;

    pub(crate) fn done<T: std::fmt::Debug>(result: FanInResult<T>) -> T {
        match result {
            FanInResult::Done(value) => value,
            other => panic!("expected Done, got {other:?}"),
        }
    }

    pub(crate) fn failures<T: std::fmt::Debug>(result: FanInResult<T>) -> usize {
        match result {
            FanInResult::NoResult { errors } => errors,
            other => panic!("expected NoResult, got {other:?}"),
        }
    }

    /// Queue a server answer that arrives after `delay_ms`.
    pub(crate) fn answer<T: Send + 'static>(
        tasks: &mut JoinSet<TaggedResult<T>>,
        server: &str,
        delay_ms: u64,
        value: io::Result<T>,
    ) {
        let server_name = server.to_string();
        tasks.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            TaggedResult { server_name, value }
        });
    }
}
