//! Keep every answer.

use indexmap::IndexMap;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{Arrival, FanInResult, next_arrival};
use crate::bridge::fan_out::TaggedResult;

/// Wait for every task and return all successful answers.
///
/// Servers named in `priorities` come first, in that order; the others
/// follow in arrival order. An empty set of tasks is `Done` with no answers,
/// while tasks that all failed give `NoResult`.
pub async fn collect_all<T: Send + 'static>(
    tasks: &mut JoinSet<TaggedResult<T>>,
    priorities: &[String],
    cancel: &CancellationToken,
) -> FanInResult<Vec<T>> {
    // Keyed by server, in arrival order.
    let mut answers: IndexMap<String, Vec<T>> = IndexMap::new();
    let mut errors = 0;
    loop {
        match next_arrival(tasks, cancel).await {
            Arrival::Answer { server, value } => answers.entry(server).or_default().push(value),
            Arrival::Failed => errors += 1,
            Arrival::Exhausted => break,
            Arrival::Cancelled => return FanInResult::Cancelled,
        }
    }
    if answers.is_empty() && errors > 0 {
        return FanInResult::NoResult { errors };
    }

    let mut ordered = Vec::new();
    for server in priorities {
        if let Some(values) = answers.shift_remove(server) {
            ordered.extend(values);
        }
    }
    ordered.extend(answers.into_values().flatten());
    FanInResult::Done(ordered)
}
