use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hierarchy::{
    ChainClient, Connector, Dialer, Endpoints, HierarchyError, Level, MemoryChain, Result,
    RetryPolicy,
};
use tokio_util::sync::CancellationToken;

/// Fails the first `n` dials of selected URLs, counts every attempt
#[derive(Default)]
struct FlakyDialer {
    fail_first: HashMap<String, usize>,
    attempts: Mutex<HashMap<String, usize>>,
}

impl FlakyDialer {
    fn failing(pairs: &[(&str, usize)]) -> Self {
        Self {
            fail_first: pairs.iter().map(|(u, n)| (u.to_string(), *n)).collect(),
            attempts: Mutex::default(),
        }
    }

    fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Dialer for FlakyDialer {
    type Client = MemoryChain;

    async fn dial(&self, url: &str) -> Result<MemoryChain> {
        let n = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(url.to_string()).or_default();
            *n += 1;
            *n
        };
        if n <= self.fail_first.get(url).copied().unwrap_or(0) {
            return Err(HierarchyError::NotConnected(url.to_string()));
        }
        Ok(MemoryChain::new(url, Level::Top))
    }
}

fn endpoints(r: usize) -> Endpoints {
    Endpoints::new(
        "http://top".into(),
        (0..r).map(|i| format!("http://region-{i}")).collect(),
        (0..r)
            .map(|i| (0..r).map(|j| format!("http://zone-{i}-{j}")).collect())
            .collect(),
    )
    .unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        max_sweeps: None,
    }
}

#[tokio::test]
async fn test_establish_connects_everything() {
    let connector = Connector::new(FlakyDialer::default(), fast_retry());
    let progress = connector.subscribe();

    let pool = connector
        .establish(&endpoints(3), &CancellationToken::new())
        .await
        .unwrap();

    assert!(pool.all_connected());
    assert_eq!(pool.branching(), 3);
    assert_eq!(pool.zone(2, 1).unwrap().endpoint(), "http://zone-2-1");

    let state = progress.borrow().clone();
    assert!(state.is_fully_connected());
    assert_eq!(state.connected(), 13);
    assert_eq!(state.sweeps, 1);
}

#[tokio::test]
async fn test_failed_endpoints_retried_connected_ones_not() {
    let dialer = FlakyDialer::failing(&[("http://region-1", 2), ("http://zone-0-2", 1)]);
    let connector = Connector::new(dialer, fast_retry());
    let progress = connector.subscribe();

    let pool = connector
        .establish(&endpoints(3), &CancellationToken::new())
        .await
        .unwrap();
    assert!(pool.all_connected());

    let state = progress.borrow().clone();
    assert_eq!(state.sweeps, 3);
    assert!(state.is_fully_connected());
}

#[tokio::test]
async fn test_each_endpoint_dialed_until_first_success() {
    let dialer = FlakyDialer::failing(&[("http://top", 3)]);
    let connector = Connector::new(dialer, fast_retry());
    let eps = endpoints(2);

    let pool = connector.establish(&eps, &CancellationToken::new()).await.unwrap();
    assert!(pool.all_connected());
    assert_eq!(pool.top().unwrap().endpoint(), "http://top");
}

#[tokio::test]
async fn test_dial_counts() {
    let dialer = std::sync::Arc::new(FlakyDialer::failing(&[("http://zone-1-0", 4)]));

    struct Shared(std::sync::Arc<FlakyDialer>);

    #[async_trait]
    impl Dialer for Shared {
        type Client = MemoryChain;
        async fn dial(&self, url: &str) -> Result<MemoryChain> {
            self.0.dial(url).await
        }
    }

    let connector = Connector::new(Shared(dialer.clone()), fast_retry());
    connector
        .establish(&endpoints(2), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(dialer.attempts("http://zone-1-0"), 5);
    assert_eq!(dialer.attempts("http://top"), 1);
    assert_eq!(dialer.attempts("http://region-1"), 1);
}

#[tokio::test]
async fn test_partial_progress_is_not_fully_connected() {
    let dialer = FlakyDialer::failing(&[("http://zone-1-1", usize::MAX)]);
    let connector = Connector::new(
        dialer,
        RetryPolicy { max_sweeps: Some(2), ..fast_retry() },
    );
    let progress = connector.subscribe();

    let err = connector
        .establish(&endpoints(2), &CancellationToken::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, HierarchyError::NotConnected(ref u) if u == "http://zone-1-1"));

    let state = progress.borrow().clone();
    assert_eq!(state.connected(), 6);
    assert_eq!(state.total(), 7);
    assert!(!state.is_fully_connected());
    assert!(!state.zones[1][1]);
}

#[tokio::test]
async fn test_cancel_stops_retry_loop() {
    let dialer = FlakyDialer::failing(&[("http://top", usize::MAX)]);
    let connector = Connector::new(
        dialer,
        RetryPolicy {
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(20),
            max_sweeps: None,
        },
    );
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = connector.establish(&endpoints(2), &cancel).await.err().unwrap();
    assert!(matches!(err, HierarchyError::Cancelled));
}
