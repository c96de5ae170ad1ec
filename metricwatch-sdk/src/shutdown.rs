//! One-shot cancellation signal shared by a module's workers.

use tokio::sync::watch;

/// The triggering side. Dropping it also counts as triggered.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// The observing side; cheap to clone, one per worker.
#[derive(Debug, Clone)]
pub struct Done {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (Self, Done) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, Done { rx })
    }

    /// Signal every `Done` handle. Further calls are no-ops.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Another observer for this signal.
    pub fn done(&self) -> Done {
        Done {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Done {
    /// Resolves once the signal is triggered or the trigger is dropped.
    pub async fn wait(&mut self) {
        // An Err means the sender is gone, which is treated as done.
        let _ = self.rx.wait_for(|done| *done).await;
    }

    pub fn is_done(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_every_observer() {
        let (shutdown, done) = Shutdown::new();
        let mut a = done.clone();
        let mut b = shutdown.done();

        assert!(!a.is_done());
        shutdown.trigger();
        shutdown.trigger();

        a.wait().await;
        b.wait().await;
        assert!(a.is_done());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn dropping_the_trigger_counts_as_done() {
        let (shutdown, mut done) = Shutdown::new();
        drop(shutdown);

        tokio::time::timeout(Duration::from_secs(1), done.wait())
            .await
            .expect("wait should resolve once the sender is dropped");
        assert!(done.is_done());
    }

    #[tokio::test]
    async fn observers_created_after_trigger_see_it() {
        let (shutdown, _done) = Shutdown::new();
        shutdown.trigger();
        let mut late = shutdown.done();
        late.wait().await;
    }
}
