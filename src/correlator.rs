//! Single-slot request/reply correlation for the control lane.
//!
//! Replies carry no request identifier, so the only way to pair a reply
//! with its request is to allow one request in flight and match what comes
//! back against it. [`Correlator`] enforces that:
//!
//! ```text
//! caller ── lane lock ── register slot ── send ── await oneshot
//!                                                     ▲
//! link event handler ───────── resolve(reply) ────────┘
//! ```
//!
//! Each exchange registers a filter with its slot. A message the filter
//! rejects (typically the late answer to an exchange that already timed
//! out) is dropped and the exchange keeps waiting, so it never receives
//! another request's reply.
//!
//! The slot also carries a ticket. Cleanup after a timeout or a dropped
//! caller only clears the slot if the ticket still matches, so it never
//! removes a later request's registration.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{NetSdrError, Result};

/// Decides whether a received message answers the pending exchange.
pub type ReplyFilter = Box<dyn Fn(&[u8]) -> bool + Send>;

struct Pending {
    ticket: u64,
    accepts: ReplyFilter,
    reply_tx: oneshot::Sender<Result<Bytes>>,
}

#[derive(Default)]
struct Slot {
    next_ticket: u64,
    pending: Option<Pending>,
}

/// What [`Correlator::resolve`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the waiting exchange.
    Delivered,
    /// An exchange is waiting but this isn't its reply.
    Stale,
    /// Nothing was waiting.
    Unsolicited,
}

/// Serializes control exchanges and routes each reply to its caller.
#[derive(Default)]
pub struct Correlator {
    /// Held for the whole exchange; a second caller waits here.
    lane: tokio::sync::Mutex<()>,
    slot: Mutex<Slot>,
}

/// Clears the slot if the exchange ends without a reply (timeout, send
/// failure, or the caller's future being dropped).
struct SlotGuard<'a> {
    correlator: &'a Correlator,
    ticket: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.correlator.clear(self.ticket);
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, accepts: ReplyFilter) -> (u64, oneshot::Receiver<Result<Bytes>>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut slot = self.slot();
        slot.next_ticket = slot.next_ticket.wrapping_add(1);
        let ticket = slot.next_ticket;
        slot.pending = Some(Pending {
            ticket,
            accepts,
            reply_tx,
        });
        (ticket, reply_rx)
    }

    fn clear(&self, ticket: u64) {
        let mut slot = self.slot();
        if slot.pending.as_ref().is_some_and(|p| p.ticket == ticket) {
            slot.pending = None;
        }
    }

    /// Run one exchange: register interest, dispatch with `send`, then wait
    /// for a reply that `accepts` admits.
    ///
    /// Interest is registered before `send` runs, so a reply that arrives
    /// before `send` returns is still delivered. `timeout` bounds the whole
    /// wait, rejected messages included. With `None` the wait ends only on
    /// a reply or [`fail_pending`](Self::fail_pending).
    pub async fn exchange<A, F, Fut>(
        &self,
        timeout: Option<Duration>,
        accepts: A,
        send: F,
    ) -> Result<Bytes>
    where
        A: Fn(&[u8]) -> bool + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let _lane = self.lane.lock().await;

        let (ticket, reply_rx) = self.register(Box::new(accepts));
        let _guard = SlotGuard {
            correlator: self,
            ticket,
        };

        send().await?;

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, reply_rx)
                .await
                .map_err(|_| NetSdrError::CorrelationTimeout(limit))?,
            None => reply_rx.await,
        };

        // Sender dropped without an answer: the slot was replaced or torn down.
        outcome.unwrap_or_else(|_| Err(NetSdrError::Cancelled))
    }

    /// Offer a received message to the pending exchange.
    pub fn resolve(&self, reply: Bytes) -> Delivery {
        let mut slot = self.slot();
        let Some(pending) = slot.pending.take() else {
            return Delivery::Unsolicited;
        };
        if !(pending.accepts)(&reply) {
            slot.pending = Some(pending);
            return Delivery::Stale;
        }
        // Receiver gone means the caller already gave up.
        let _ = pending.reply_tx.send(Ok(reply));
        Delivery::Delivered
    }

    /// Release the pending exchange, if any, with `error`.
    pub fn fail_pending(&self, error: NetSdrError) -> bool {
        match self.slot().pending.take() {
            Some(pending) => {
                let _ = pending.reply_tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Check if an exchange is waiting for its reply.
    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        self.slot().pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn any_reply(_: &[u8]) -> bool {
        true
    }

    #[tokio::test]
    async fn test_reply_resolves_exchange() {
        let correlator = Arc::new(Correlator::new());
        let responder = correlator.clone();

        let reply = correlator
            .exchange(Some(Duration::from_secs(1)), any_reply, || async move {
                // Reply arrives before send returns
                assert_eq!(
                    responder.resolve(Bytes::from_static(b"ack")),
                    Delivery::Delivered
                );
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(&reply[..], b"ack");
        assert!(!correlator.has_pending());
    }

    #[tokio::test]
    async fn test_unsolicited_reply_not_consumed() {
        let correlator = Correlator::new();
        assert_eq!(
            correlator.resolve(Bytes::from_static(b"late")),
            Delivery::Unsolicited
        );
        assert!(!correlator.fail_pending(NetSdrError::Cancelled));
    }

    #[tokio::test]
    async fn test_send_failure_clears_slot() {
        let correlator = Correlator::new();
        let result = correlator
            .exchange(None, any_reply, || async {
                Err(NetSdrError::NotConnected)
            })
            .await;

        assert!(matches!(result, Err(NetSdrError::NotConnected)));
        assert!(!correlator.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_slot() {
        let correlator = Correlator::new();
        let result = correlator
            .exchange(Some(Duration::from_millis(50)), any_reply, || async {
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(NetSdrError::CorrelationTimeout(_))));
        assert!(!correlator.has_pending());
        // A late reply now finds nothing waiting
        assert_eq!(
            correlator.resolve(Bytes::from_static(b"late")),
            Delivery::Unsolicited
        );
    }

    #[tokio::test]
    async fn test_fail_pending_releases_waiter() {
        let correlator = Arc::new(Correlator::new());
        let waiter = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                correlator
                    .exchange(None, any_reply, || async { Ok(()) })
                    .await
            })
        };

        while !correlator.has_pending() {
            tokio::task::yield_now().await;
        }
        assert!(correlator.fail_pending(NetSdrError::Cancelled));

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(NetSdrError::Cancelled)));
    }

    #[tokio::test]
    async fn test_one_exchange_in_flight() {
        let correlator = Arc::new(Correlator::new());
        let (sent_tx, mut sent_rx) = tokio::sync::mpsc::unbounded_channel();

        let mut waiters = Vec::new();
        for i in 0u8..3 {
            let correlator = correlator.clone();
            let sent_tx = sent_tx.clone();
            waiters.push(tokio::spawn(async move {
                correlator
                    .exchange(None, any_reply, move || async move {
                        let _ = sent_tx.send(i);
                        Ok(())
                    })
                    .await
            }));
        }

        // Each send only happens after the previous exchange was answered
        for _ in 0..3 {
            let sent = sent_rx.recv().await.unwrap();
            assert!(sent_rx.try_recv().is_err());
            assert_eq!(
                correlator.resolve(Bytes::copy_from_slice(&[sent])),
                Delivery::Delivered
            );
        }

        for waiter in waiters {
            let reply = waiter.await.unwrap().unwrap();
            assert_eq!(reply.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_leave_slot() {
        let correlator = Correlator::new();
        {
            let exchange = correlator.exchange(None, any_reply, || async { Ok(()) });
            tokio::pin!(exchange);
            // Poll once so the slot is registered, then drop
            let _ = futures_poll_once(exchange.as_mut()).await;
            assert!(correlator.has_pending());
        }
        assert!(!correlator.has_pending());
    }

    #[tokio::test]
    async fn test_rejected_reply_keeps_exchange_waiting() {
        let correlator = Arc::new(Correlator::new());
        let waiter = {
            let correlator = correlator.clone();
            tokio::spawn(async move {
                correlator
                    .exchange(None, |reply: &[u8]| reply == b"mine", || async { Ok(()) })
                    .await
            })
        };

        while !correlator.has_pending() {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            correlator.resolve(Bytes::from_static(b"stale")),
            Delivery::Stale
        );
        assert!(correlator.has_pending());

        assert_eq!(
            correlator.resolve(Bytes::from_static(b"mine")),
            Delivery::Delivered
        );
        let reply = waiter.await.unwrap().unwrap();
        assert_eq!(&reply[..], b"mine");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_replies_do_not_extend_timeout() {
        let correlator = Arc::new(Correlator::new());
        let responder = correlator.clone();
        let start = tokio::time::Instant::now();

        let result = correlator
            .exchange(
                Some(Duration::from_millis(100)),
                |_: &[u8]| false,
                || async move {
                    assert_eq!(
                        responder.resolve(Bytes::from_static(b"stale")),
                        Delivery::Stale
                    );
                    Ok(())
                },
            )
            .await;

        assert!(matches!(result, Err(NetSdrError::CorrelationTimeout(_))));
        assert_eq!(start.elapsed(), Duration::from_millis(100));
        assert!(!correlator.has_pending());
    }

    async fn futures_poll_once<F: Future + Unpin>(mut fut: F) -> Option<F::Output> {
        use std::task::Poll;
        std::future::poll_fn(|cx| match std::pin::Pin::new(&mut fut).poll(cx) {
            Poll::Ready(out) => Poll::Ready(Some(out)),
            Poll::Pending => Poll::Ready(None),
        })
        .await
    }
}
