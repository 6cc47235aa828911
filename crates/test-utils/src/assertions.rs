//! Polling assertions for async tests.

use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Default polling interval for [`assert_eventually`].
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it holds or `timeout` expires.
///
/// Returns `true` if the condition held before the deadline. The condition is
/// checked once more after the deadline so a slow final poll is not lost.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use shardmeta_test_utils::assert_eventually;
///
/// # async fn example(is_reachable: impl Fn() -> bool) {
/// let recovered = assert_eventually(Duration::from_secs(1), || is_reachable()).await;
/// assert!(recovered, "probe should mark the node reachable");
/// # }
/// ```
pub async fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }
    condition()
}
