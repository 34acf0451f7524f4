use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};

/// The single watchdog timer of a session.
///
/// At most one deadline is pending; re-arming moves it instead of adding
/// another one.
#[derive(Debug)]
pub struct KeepAlive {
    period: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl KeepAlive {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn arm(&mut self) {
        let at = Instant::now() + self.period;
        match self.deadline.as_mut() {
            Some(timer) => timer.as_mut().reset(at),
            None => self.deadline = Some(Box::pin(sleep(self.period))),
        }
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the armed deadline passes; pending forever when disarmed.
    pub async fn expired(&mut self) {
        match self.deadline.as_mut() {
            Some(timer) => {
                timer.as_mut().await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_period() {
        let mut keepalive = KeepAlive::new(Duration::from_millis(100));
        keepalive.arm();

        let started = Instant::now();
        keepalive.expired().await;
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(!keepalive.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_pushes_deadline() {
        let mut keepalive = KeepAlive::new(Duration::from_millis(100));
        keepalive.arm();

        tokio::time::sleep(Duration::from_millis(80)).await;
        keepalive.arm();

        let fired = tokio::time::timeout(Duration::from_millis(50), keepalive.expired()).await;
        assert!(fired.is_err());

        let fired = tokio::time::timeout(Duration::from_millis(100), keepalive.expired()).await;
        assert!(fired.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_never_fires() {
        let mut keepalive = KeepAlive::new(Duration::from_millis(10));
        keepalive.arm();
        keepalive.clear();

        let fired = tokio::time::timeout(Duration::from_secs(60), keepalive.expired()).await;
        assert!(fired.is_err());
    }
}
