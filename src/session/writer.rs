//! Outbound writer task
//!
//! The sole drainer of an endpoint's outbound queue and the only task
//! that writes to the socket. Exits when the queue closes, when the
//! endpoint is cancelled, or when a write fails or times out; exiting
//! fires the endpoint's cancel token, so the reader never outlives a
//! dead write path.

use std::time::Duration;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::protocol::Frame;

/// Writer half of one endpoint
pub struct EndpointWriter<S> {
    sink: S,
    outbound: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
    endpoint_id: u64,
    heartbeat_interval: Duration,
    write_timeout: Duration,
}

impl<S> EndpointWriter<S>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    pub fn new(
        sink: S,
        outbound: mpsc::Receiver<Frame>,
        cancel: CancellationToken,
        endpoint_id: u64,
        heartbeat_interval: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            sink,
            outbound,
            cancel,
            endpoint_id,
            heartbeat_interval,
            write_timeout,
        }
    }

    /// Drain the queue onto the socket until the endpoint is done
    ///
    /// Sends a heartbeat ping on the configured interval and bounds
    /// every write with the per-write timeout. On cancellation, frames
    /// still queued (the shutdown notice in particular) are flushed
    /// before the close frame goes out. The cancel token is fired on
    /// every exit, so a write failure tears down the reader as well.
    pub async fn run(mut self) {
        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = self.outbound.recv() => match frame {
                    Some(frame) => {
                        if !self.send_frame(&frame).await {
                            break;
                        }
                    }
                    None => {
                        // Queue closed; say goodbye and stop
                        self.send_close().await;
                        break;
                    }
                },
                _ = self.cancel.cancelled() => {
                    self.flush_remaining().await;
                    self.send_close().await;
                    break;
                }
                _ = heartbeat.tick() => {
                    if !self.send_message(Message::Ping(Bytes::new())).await {
                        break;
                    }
                }
            }
        }

        // Whatever ended the writer must end the reader too
        self.cancel.cancel();
        tracing::debug!(endpoint = self.endpoint_id, "Writer exited");
    }

    /// Encode and send one frame; returns false when the socket is done
    async fn send_frame(&mut self, frame: &Frame) -> bool {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(endpoint = self.endpoint_id, error = %e, "Failed to encode frame");
                return true;
            }
        };
        self.send_message(Message::Text(json.into())).await
    }

    /// Write one message within the per-write timeout
    async fn send_message(&mut self, message: Message) -> bool {
        match timeout(self.write_timeout, self.sink.send(message)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(endpoint = self.endpoint_id, error = %e, "Write failed");
                false
            }
            Err(_) => {
                tracing::debug!(endpoint = self.endpoint_id, "Write timed out");
                false
            }
        }
    }

    /// Send frames still queued at cancellation
    ///
    /// Stops at the first failed write so a stuck socket cannot stall
    /// teardown for longer than one write timeout.
    async fn flush_remaining(&mut self) {
        while let Ok(frame) = self.outbound.try_recv() {
            if !self.send_frame(&frame).await {
                break;
            }
        }
    }

    async fn send_close(&mut self) {
        let _ = timeout(self.write_timeout, self.sink.send(Message::Close(None))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use tokio_test::{assert_pending, assert_ready};

    /// Sink that records messages and fails once `fail_after` have been
    /// accepted
    struct TestSink {
        sent: Arc<Mutex<Vec<Message>>>,
        fail_after: usize,
    }

    impl TestSink {
        fn new(fail_after: usize) -> (Self, Arc<Mutex<Vec<Message>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    sent: Arc::clone(&sent),
                    fail_after,
                },
                sent,
            )
        }
    }

    impl Sink<Message> for TestSink {
        type Error = io::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, message: Message) -> io::Result<()> {
            let mut sent = self.sent.lock().unwrap();
            if sent.len() >= self.fail_after {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            sent.push(message);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn writer(
        sink: TestSink,
        outbound: mpsc::Receiver<Frame>,
        cancel: CancellationToken,
        heartbeat: Duration,
    ) -> EndpointWriter<TestSink> {
        EndpointWriter::new(
            sink,
            outbound,
            cancel,
            7,
            heartbeat,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_write_failure_cancels_endpoint() {
        let (sink, sent) = TestSink::new(0);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(writer(sink, rx, cancel.clone(), Duration::from_secs(60)).run());

        tx.send(Frame::update("blog", 1)).await.unwrap();
        task.await.unwrap();

        // The failed write must take the whole endpoint down, not just
        // the writer, or the member would stay attached with a dead
        // send path
        assert!(cancel.is_cancelled());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_heartbeat_cancels_endpoint() {
        let (sink, _sent) = TestSink::new(0);
        let (_tx, rx) = mpsc::channel::<Frame>(4);
        let cancel = CancellationToken::new();

        writer(sink, rx, cancel.clone(), Duration::from_millis(5))
            .run()
            .await;

        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_flushes_queue_before_close() {
        let (sink, sent) = TestSink::new(usize::MAX);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        tx.send(Frame::update("blog", 1)).await.unwrap();
        tx.send(Frame::update("blog", 2)).await.unwrap();
        cancel.cancel();

        writer(sink, rx, cancel, Duration::from_secs(60)).run().await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        for (message, count) in sent.iter().zip([1usize, 2]) {
            match message {
                Message::Text(text) => {
                    let frame: Frame = serde_json::from_str(text.as_str()).unwrap();
                    assert!(matches!(frame, Frame::Update { count: c, .. } if c == count));
                }
                other => panic!("expected an update frame, got {other:?}"),
            }
        }
        assert!(matches!(sent[2], Message::Close(None)));
    }

    #[tokio::test]
    async fn test_closed_queue_sends_close_and_cancels() {
        let (sink, sent) = TestSink::new(usize::MAX);
        let (tx, rx) = mpsc::channel::<Frame>(4);
        let cancel = CancellationToken::new();
        drop(tx);

        writer(sink, rx, cancel.clone(), Duration::from_secs(60))
            .run()
            .await;

        assert!(cancel.is_cancelled());
        assert!(matches!(sent.lock().unwrap()[..], [Message::Close(None)]));
    }

    #[tokio::test]
    async fn test_cancel_wakes_idle_writer() {
        let (sink, sent) = TestSink::new(usize::MAX);
        let (_tx, rx) = mpsc::channel::<Frame>(4);
        let cancel = CancellationToken::new();

        let mut task = tokio_test::task::spawn(
            writer(sink, rx, cancel.clone(), Duration::from_secs(60)).run(),
        );
        assert_pending!(task.poll());

        cancel.cancel();
        assert!(task.is_woken());
        assert_ready!(task.poll());

        assert!(matches!(sent.lock().unwrap()[..], [Message::Close(None)]));
    }
}
