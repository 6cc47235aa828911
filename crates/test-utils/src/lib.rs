//! Shared test utilities for shardmeta crates.
//!
//! - [`assert_eventually`] - Poll a condition until it's true or timeout
//! - [`init_tracing`] - Install a test log subscriber once per process
//! - [`strategies`] - Proptest generators for ids, roles, addresses, and keys

#![deny(unsafe_code)]

mod assertions;
pub use assertions::assert_eventually;

pub mod strategies;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing through the test harness.
///
/// Honors `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use proptest::prelude::*;

    use super::*;

    #[tokio::test]
    async fn test_assert_eventually_immediate_success() {
        assert!(assert_eventually(Duration::from_millis(100), || true).await);
    }

    #[tokio::test]
    async fn test_assert_eventually_delayed_success() {
        let counter = AtomicUsize::new(0);
        let result = assert_eventually(Duration::from_millis(500), || {
            counter.fetch_add(1, Ordering::SeqCst) >= 3
        })
        .await;
        assert!(result);
        assert!(counter.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn test_assert_eventually_timeout() {
        assert!(!assert_eventually(Duration::from_millis(50), || false).await);
    }

    #[tokio::test]
    async fn test_assert_eventually_sees_spawned_change() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            setter.store(true, Ordering::SeqCst);
        });
        assert!(assert_eventually(Duration::from_millis(500), || flag.load(Ordering::SeqCst)).await);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    proptest! {
        #[test]
        fn prop_record_addresses_are_durable(addr in strategies::arb_record_address()) {
            prop_assert!(!addr.is_null_or_transient());
        }

        #[test]
        fn prop_node_ids_within_bounds(node in strategies::arb_node_id(4, 3)) {
            prop_assert!((1..=4).contains(&node.shard_id().value()));
            prop_assert!((1..=3).contains(&node.node_num()));
        }

        #[test]
        fn prop_timestamps_strictly_increase(ts in strategies::arb_timestamps(8)) {
            prop_assert!(ts.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
