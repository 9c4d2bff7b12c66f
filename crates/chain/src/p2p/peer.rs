//! A single framed TCP peer connection.
//!
//! The socket is split: the write half lives behind a tokio mutex so
//! concurrent broadcasts never interleave frame bytes, and a dedicated
//! receive task performs exact-length reads (header, then payload). Any
//! short read marks the peer dead and ends the task; later sends drop
//! their bytes silently. Stop is idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::message::{Message, MessageType, HEADER_LEN, MAX_FRAME_PAYLOAD};

pub struct Peer {
    remote: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    running: AtomicBool,
    read_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Peer {
    /// Wrap a connected socket. The read half is returned for
    /// [`Peer::start`] so the caller chooses the dispatcher.
    pub fn new(stream: TcpStream, remote: String) -> (Arc<Peer>, OwnedReadHalf) {
        let (reader, writer) = stream.into_split();
        let peer = Arc::new(Peer {
            remote,
            writer: tokio::sync::Mutex::new(writer),
            running: AtomicBool::new(true),
            read_task: parking_lot::Mutex::new(None),
        });
        (peer, reader)
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn is_alive(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the receive loop. `handler` runs on every complete frame.
    pub fn start<F>(self: &Arc<Self>, mut reader: OwnedReadHalf, handler: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let peer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let mut header = [0u8; HEADER_LEN];
                if reader.read_exact(&mut header).await.is_err() {
                    break;
                }

                let Some(kind) = MessageType::from_u8(header[0]) else {
                    warn!(peer = %peer.remote, kind = header[0], "unknown message type, dropping peer");
                    break;
                };

                let len =
                    u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
                if len > MAX_FRAME_PAYLOAD {
                    warn!(peer = %peer.remote, len, "oversized frame, dropping peer");
                    break;
                }

                let mut payload = vec![0u8; len];
                if reader.read_exact(&mut payload).await.is_err() {
                    break;
                }

                handler(Message { kind, payload });
            }

            peer.running.store(false, Ordering::SeqCst);
            debug!(peer = %peer.remote, "receive loop ended");
        });
        *self.read_task.lock() = Some(handle);
    }

    /// Serialise and send one frame. A dead peer swallows the bytes; a
    /// failed write marks the peer dead.
    pub async fn send(&self, msg: &Message) {
        if !self.is_alive() {
            return;
        }
        let encoded = msg.encode();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(&encoded).await {
            debug!(peer = %self.remote, error = %e, "send failed, marking peer dead");
            self.running.store(false, Ordering::SeqCst);
        }
    }

    /// Shut the socket down and join the receive task. Safe to call any
    /// number of times.
    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let mut writer = self.writer.lock().await;
            let _ = writer.shutdown().await;
        }
        let task = self.read_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr);
        let (server, client) = tokio::join!(listener.accept(), client);
        (server.unwrap().0, client.unwrap())
    }

    #[tokio::test]
    async fn frames_are_delivered_to_the_handler() {
        let (a, b) = socket_pair().await;

        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);

        let (peer_a, reader_a) = Peer::new(a, "test-a".into());
        peer_a.start(reader_a, move |msg| {
            assert_eq!(msg.kind, MessageType::NewTx);
            assert_eq!(msg.payload, b"0xabcd");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (peer_b, reader_b) = Peer::new(b, "test-b".into());
        peer_b.start(reader_b, |_| {});

        peer_b
            .send(&Message::from_str_payload(MessageType::NewTx, "0xabcd"))
            .await;
        peer_b
            .send(&Message::from_str_payload(MessageType::NewTx, "0xabcd"))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(received.load(Ordering::SeqCst), 2);

        peer_a.stop().await;
        peer_b.stop().await;
    }

    #[tokio::test]
    async fn double_stop_is_a_noop() {
        let (a, _b) = socket_pair().await;
        let (peer, reader) = Peer::new(a, "test".into());
        peer.start(reader, |_| {});

        peer.stop().await;
        peer.stop().await;
        assert!(!peer.is_alive());

        // Sends after stop are silently dropped.
        peer.send(&Message::new(MessageType::Ping, vec![])).await;
    }

    #[tokio::test]
    async fn remote_close_marks_peer_dead() {
        let (a, b) = socket_pair().await;
        let (peer, reader) = Peer::new(a, "test".into());
        peer.start(reader, |_| {});

        drop(b);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!peer.is_alive());
        peer.stop().await;
    }
}
