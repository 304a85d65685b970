//! Shared helpers for coordinator integration tests.


use crate::types::Subscriptions;
use std::sync::Once;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long a test waits for an expected snapshot before failing.
pub(crate) const RECV_DEADLINE: Duration = Duration::from_secs(5);

/// Initialize tracing output for tests. Safe to call from every test.
pub(crate) fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Receive the next snapshot or fail the test.
pub(crate) async fn recv_snapshot(rx: &mut mpsc::Receiver<Subscriptions>) -> Subscriptions {
    timeout(RECV_DEADLINE, rx.recv())
        .await
        .expect("timed out waiting for a subscriptions snapshot")
        .expect("subscriptions channel closed")
}

/// Assert that no snapshot arrives within the given window.
pub(crate) async fn assert_no_snapshot(rx: &mut mpsc::Receiver<Subscriptions>, window: Duration) {
    if let Ok(snapshot) = timeout(window, rx.recv()).await {
        panic!("unexpected snapshot: {snapshot:?}");
    }
}

/// Build an owned topic list from string literals.
pub(crate) fn topic_list(topics: &[&str]) -> Vec<String> {
    topics.iter().map(|t| t.to_string()).collect()
}
