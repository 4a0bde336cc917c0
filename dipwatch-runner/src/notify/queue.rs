//! Rate-limited FIFO delivery on one sender thread.

use super::{Notifier, NotifyError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    sent: AtomicUsize,
    failed: AtomicUsize,
}

struct Connection {
    tx: Sender<String>,
    handle: JoinHandle<()>,
}

/// Long-lived notification client.
///
/// `enqueue` never blocks on delivery. `disconnect` delivers everything already
/// queued, then stops the sender thread.
pub struct NotificationQueue {
    connection: Mutex<Option<Connection>>,
    counters: Arc<Counters>,
}

impl NotificationQueue {
    /// Spawn the sender thread for `notifier`.
    pub fn connect(notifier: Arc<dyn Notifier>, min_delay: Duration) -> Result<Self, NotifyError> {
        let (tx, rx) = mpsc::channel::<String>();
        let counters = Arc::new(Counters::default());
        let thread_counters = Arc::clone(&counters);

        let handle = thread::Builder::new()
            .name("dipwatch-notify".into())
            .spawn(move || {
                let mut last_sent: Option<Instant> = None;
                for message in rx {
                    if let Some(last) = last_sent {
                        let since = last.elapsed();
                        if since < min_delay {
                            thread::sleep(min_delay - since);
                        }
                    }
                    match notifier.send(&message) {
                        Ok(()) => {
                            thread_counters.sent.fetch_add(1, Ordering::Relaxed);
                            tracing::info!(message = %message, "notification sent");
                        }
                        Err(e) => {
                            thread_counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(message = %message, error = %e, "notification failed");
                        }
                    }
                    last_sent = Some(Instant::now());
                }
            })
            .map_err(NotifyError::Spawn)?;

        tracing::debug!(min_delay_ms = min_delay.as_millis() as u64, "notification queue connected");
        Ok(Self {
            connection: Mutex::new(Some(Connection { tx, handle })),
            counters,
        })
    }

    /// Queue a message behind every earlier one. Fails once disconnected.
    pub fn enqueue(&self, message: impl Into<String>) -> Result<(), NotifyError> {
        let connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        match connection.as_ref() {
            Some(c) => c.tx.send(message.into()).map_err(|_| NotifyError::Disconnected),
            None => Err(NotifyError::Disconnected),
        }
    }

    /// False after `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Drain pending messages and join the sender thread. Idempotent.
    pub fn disconnect(&self) {
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(Connection { tx, handle }) = connection {
            drop(tx);
            if handle.join().is_err() {
                tracing::error!("notification sender thread panicked");
            }
            tracing::debug!(stats = ?self.stats(), "notification queue disconnected");
        }
    }

    /// Delivery counters so far.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for NotificationQueue {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(Instant, String)>>,
    }

    impl Notifier for Recorder {
        fn send(&self, message: &str) -> Result<(), NotifyError> {
            if message == "fail" {
                return Err(NotifyError::InvalidConfig("scripted failure".into()));
            }
            self.sent.lock().unwrap().push((Instant::now(), message.to_string()));
            Ok(())
        }
    }

    #[test]
    fn delivers_in_order_with_min_delay() {
        let recorder = Arc::new(Recorder::default());
        let queue = NotificationQueue::connect(recorder.clone(), Duration::from_millis(40)).unwrap();
        for m in ["a", "b", "c"] {
            queue.enqueue(m).unwrap();
        }
        queue.disconnect();

        let sent = recorder.sent.lock().unwrap();
        let messages: Vec<&str> = sent.iter().map(|(_, m)| m.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
        for pair in sent.windows(2) {
            assert!(pair[1].0.duration_since(pair[0].0) >= Duration::from_millis(40));
        }
    }

    #[test]
    fn failures_are_counted_not_retried() {
        let recorder = Arc::new(Recorder::default());
        let queue = NotificationQueue::connect(recorder.clone(), Duration::ZERO).unwrap();
        queue.enqueue("fail").unwrap();
        queue.enqueue("ok").unwrap();
        queue.disconnect();

        assert_eq!(queue.stats(), QueueStats { sent: 1, failed: 1 });
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn enqueue_after_disconnect_fails() {
        let queue = NotificationQueue::connect(Arc::new(Recorder::default()), Duration::ZERO).unwrap();
        queue.disconnect();
        assert!(!queue.is_connected());
        assert!(matches!(queue.enqueue("late"), Err(NotifyError::Disconnected)));
        queue.disconnect();
    }
}
