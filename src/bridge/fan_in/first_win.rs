//! Stop at the first useful answer.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{Arrival, FanInResult, LOG_TARGET, next_arrival};
use crate::bridge::fan_out::TaggedResult;

/// Return the first successful answer accepted by `accept`, in arrival order,
/// and abort the remaining tasks.
pub async fn first_win<T: Send + 'static>(
    tasks: &mut JoinSet<TaggedResult<T>>,
    accept: impl Fn(&T) -> bool,
    cancel: &CancellationToken,
) -> FanInResult<T> {
    let mut errors = 0;
    loop {
        match next_arrival(tasks, cancel).await {
            Arrival::Answer { server, value } if accept(&value) => {
                log::debug!(target: LOG_TARGET, "Taking the answer from {}", server);
                tasks.abort_all();
                return FanInResult::Done(value);
            }
            Arrival::Answer { .. } => {}
            Arrival::Failed => errors += 1,
            Arrival::Exhausted => return FanInResult::NoResult { errors },
            Arrival::Cancelled => return FanInResult::Cancelled,
        }
    }
}
