//! One-shot completion signal used to wait for asynchronous sink finalization.
//!
//! The notifier is consumed by [`CompletionNotifier::notify`], so it can fire at
//! most once. Dropping it without firing wakes the waiter with
//! [`CompletionError::Abandoned`] rather than blocking forever.

use crossbeam_channel::{bounded, Receiver, Sender};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion notifier was dropped without signalling")]
    Abandoned,
}

/// Creates a linked notifier/waiter pair.
pub fn channel() -> (CompletionNotifier, CompletionWaiter) {
    let (tx, rx) = bounded(1);
    (CompletionNotifier { tx }, CompletionWaiter { rx })
}

#[derive(Debug)]
pub struct CompletionNotifier {
    tx: Sender<()>,
}

impl CompletionNotifier {
    pub fn notify(self) {
        // The waiter may already be gone if the caller gave up; nothing to do then.
        let _ = self.tx.send(());
    }
}

#[derive(Debug)]
pub struct CompletionWaiter {
    rx: Receiver<()>,
}

impl CompletionWaiter {
    /// Blocks until the notifier fires.
    pub fn wait(self) -> Result<(), CompletionError> {
        self.rx.recv().map_err(|_| CompletionError::Abandoned)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn wait_returns_after_notify_from_another_thread() {
        let (notifier, waiter) = channel();
        let flushed = Arc::new(AtomicBool::new(false));
        let worker_flag = flushed.clone();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            worker_flag.store(true, Ordering::SeqCst);
            notifier.notify();
        });
        waiter.wait().unwrap();
        assert!(flushed.load(Ordering::SeqCst));
        worker.join().unwrap();
    }

    #[test]
    fn dropped_notifier_is_reported() {
        let (notifier, waiter) = channel();
        drop(notifier);
        assert_eq!(waiter.wait(), Err(CompletionError::Abandoned));
    }

    #[test]
    fn notify_before_wait_is_not_lost() {
        let (notifier, waiter) = channel();
        notifier.notify();
        assert_eq!(waiter.wait(), Ok(()));
    }
}
