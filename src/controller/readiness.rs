use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::info;

/// Holds back the first reconcile of a controller type until its caches have
/// had time to fill. Every caller after the first passes straight through.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    delay: Duration,
    passed: OnceCell<()>,
}

impl ReadinessGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            passed: OnceCell::new(),
        }
    }

    /// A gate that never waits.
    pub fn open() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn wait(&self) {
        self.passed
            .get_or_init(|| async {
                if !self.delay.is_zero() {
                    info!(delay = ?self.delay, "cold start: delaying first reconcile");
                    tokio::time::sleep(self.delay).await;
                }
            })
            .await;
    }
}
