//! Single-producer stream pump
//!
//! Moves upstream items through a capacity-1 channel so the upstream is
//! pulled only as fast as the client consumes. Dropping the consumer cancels
//! the producer, which drops the upstream at its next await point; a watchdog
//! aborts the producer if it has not stopped within the grace period.

use futures_util::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

pub struct PumpedStream<T> {
    rx: mpsc::Receiver<T>,
    _cancel_on_drop: DropGuard,
}

impl<T> Stream for PumpedStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

pub fn spawn_pump<T>(upstream: BoxStream<'static, T>, cancel_grace: Duration) -> PumpedStream<T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();

    let token = cancel.clone();
    let producer = tokio::spawn(async move {
        let mut upstream = upstream;
        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                item = upstream.next() => item,
            };
            let Some(item) = item else { break };

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                sent = tx.send(item) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(cancelled = token.is_cancelled(), "Stream pump stopped");
    });

    let abort = producer.abort_handle();
    let watchdog = cancel.clone();
    tokio::spawn(async move {
        watchdog.cancelled().await;
        tokio::time::sleep(cancel_grace).await;
        if !abort.is_finished() {
            debug!(?cancel_grace, "Aborting stream pump after grace period");
            abort.abort();
        }
    });

    PumpedStream {
        rx,
        _cancel_on_drop: cancel.drop_guard(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn slow_upstream(
        items: usize,
        pulls: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    ) -> BoxStream<'static, usize> {
        Box::pin(async_stream::stream! {
            let _flag = DropFlag(dropped);
            for item in 0..items {
                pulls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                yield item;
            }
        })
    }

    #[tokio::test]
    async fn forwards_every_item_in_order() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let pumped = spawn_pump(
            slow_upstream(5, pulls.clone(), dropped.clone()),
            Duration::from_millis(100),
        );

        let items: Vec<usize> = pumped.collect().await;

        assert_eq!(items, vec![0, 1, 2, 3, 4]);
        assert_eq!(pulls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn dropping_consumer_stops_upstream_within_grace() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let grace = Duration::from_millis(200);
        let mut pumped = spawn_pump(slow_upstream(5, pulls.clone(), dropped.clone()), grace);

        assert_eq!(pumped.next().await, Some(0));
        drop(pumped);

        let deadline = tokio::time::Instant::now() + grace * 2;
        while !dropped.load(Ordering::SeqCst) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(dropped.load(Ordering::SeqCst), "upstream was never dropped");

        let pulls_after_drop = pulls.load(Ordering::SeqCst);
        assert!(pulls_after_drop < 5);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pulls.load(Ordering::SeqCst), pulls_after_drop);
    }

    #[tokio::test]
    async fn consumer_drop_releases_a_stalled_upstream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();
        let stuck: BoxStream<'static, usize> = Box::pin(async_stream::stream! {
            let _flag = DropFlag(flag);
            yield 0;
            std::future::pending::<()>().await;
            yield 1;
        });

        let mut pumped = spawn_pump(stuck, Duration::from_millis(20));
        assert_eq!(pumped.next().await, Some(0));
        drop(pumped);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(dropped.load(Ordering::SeqCst));
    }
}
