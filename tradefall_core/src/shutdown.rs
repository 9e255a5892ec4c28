//! Cooperative shutdown signal shared by the clock and feed tasks.

use tokio::sync::watch;

/// Receiving side: tasks poll or await this.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Sending side: flip to `true` to stop every task holding a signal.
pub type ShutdownTrigger = watch::Sender<bool>;

/// Creates an un-triggered shutdown pair.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    watch::channel(false)
}

/// True once shutdown was requested or the trigger was dropped.
pub fn is_triggered(signal: &ShutdownSignal) -> bool {
    *signal.borrow() || signal.has_changed().is_err()
}

/// Resolves when shutdown is requested or the trigger is dropped.
pub async fn triggered(signal: &mut ShutdownSignal) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_triggered_resolves_on_send() {
        let (tx, mut rx) = channel();
        assert!(!is_triggered(&rx));

        tx.send(true).unwrap();
        triggered(&mut rx).await;
        assert!(is_triggered(&rx));
    }

    #[tokio::test]
    async fn test_dropped_trigger_counts_as_shutdown() {
        let (tx, mut rx) = channel();
        drop(tx);

        triggered(&mut rx).await;
        assert!(is_triggered(&rx));
    }
}
