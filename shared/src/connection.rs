//! Per-peer message buffering, wire framing and cooperative transport shutdown
//!
//! The engine loop talks to the network only through a [`MessageBuffer`].
//! Network tasks own the matching [`RemoteEnd`] and move whole messages
//! between the queues and the socket, one datagram per message.

use crate::error::TransportError;
use crate::message::Message;
use bincode::{deserialize, serialize};
use log::{debug, warn};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Largest payload that fits in a single UDP datagram
pub const MAX_FRAME_LEN: usize = 65_507;

/// Upper bound on how long an I/O task blocks in a socket receive
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest a client stays silent; it sends an empty message when idle
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// How long a shutdown waits for each I/O task to confirm
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Engine side of a peer connection
///
/// `send` and `receive` never block. `receive` hands back an empty message
/// when nothing is pending so the engine loop can keep ticking.
#[derive(Debug)]
pub struct MessageBuffer {
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<Message>,
}

/// Network side of a peer connection
#[derive(Debug)]
pub struct RemoteEnd {
    pub outbound: mpsc::UnboundedReceiver<Message>,
    pub inbound: mpsc::UnboundedSender<Message>,
}

impl MessageBuffer {
    pub fn pair() -> (MessageBuffer, RemoteEnd) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        (
            MessageBuffer {
                outbound: outbound_tx,
                inbound: inbound_rx,
            },
            RemoteEnd {
                outbound: outbound_rx,
                inbound: inbound_tx,
            },
        )
    }

    /// Queues a message for the remote peer
    pub fn send(&self, message: Message) {
        if self.outbound.send(message).is_err() {
            warn!("Dropping outbound message, network task has stopped");
        }
    }

    /// False once the network task serving this peer has stopped
    pub fn is_connected(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Takes the oldest buffered message, or an empty one
    pub fn receive(&mut self) -> Message {
        self.try_receive().unwrap_or_default()
    }

    /// Like [`MessageBuffer::receive`], but tells an empty frame (a
    /// keepalive) apart from no frame at all
    pub fn try_receive(&mut self) -> Option<Message> {
        self.inbound.try_recv().ok()
    }
}

/// Serializes one message into one datagram payload
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, TransportError> {
    let data = serialize(message)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len: data.len(),
            max: MAX_FRAME_LEN,
        });
    }
    Ok(data)
}

/// Deserializes one datagram payload into one message
pub fn decode_frame(data: &[u8]) -> Result<Message, TransportError> {
    Ok(deserialize::<Message>(data)?)
}

/// Cooperative stop flag shared by an engine and its I/O tasks
///
/// Tasks watch the flag between bounded receives. A task finishing is its
/// confirmation; [`Shutdown::trigger_and_wait`] waits for each one with a
/// deadline instead of spinning.
#[derive(Debug)]
pub struct Shutdown {
    flag: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag,
            tasks: Vec::new(),
        }
    }

    /// A receiver for tasks to observe the flag
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }

    /// Tracks a task that must confirm before shutdown completes
    pub fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(task);
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag.borrow()
    }

    /// Sets the flag and waits for every tracked task to stop
    ///
    /// Returns the number of tasks that did not confirm in time; those are
    /// aborted.
    pub async fn trigger_and_wait(&mut self) -> usize {
        self.flag.send_replace(true);

        let mut unconfirmed = 0;
        for mut task in self.tasks.drain(..) {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("Network task did not stop within {:?}", SHUTDOWN_TIMEOUT);
                    task.abort();
                    unconfirmed += 1;
                }
            }
        }
        debug!("Transport shutdown complete");
        unconfirmed
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// True once the flag behind `receiver` has been set
pub fn is_shutdown(receiver: &watch::Receiver<bool>) -> bool {
    *receiver.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use tokio_test::{assert_err, assert_ok};

    fn says(text: &str) -> Message {
        Message::from(vec![Event::Says {
            identifier: "p1".to_string(),
            text: text.to_string(),
        }])
    }

    #[test]
    fn test_receive_without_pending_returns_empty() {
        let (mut buffer, _remote) = MessageBuffer::pair();
        assert!(buffer.receive().is_empty());
    }

    #[test]
    fn test_empty_frame_is_distinguishable() {
        let (mut buffer, remote) = MessageBuffer::pair();
        assert_eq!(buffer.try_receive(), None);

        remote.inbound.send(Message::new()).unwrap();
        assert_eq!(buffer.try_receive(), Some(Message::new()));
        assert_eq!(buffer.try_receive(), None);
    }

    #[test]
    fn test_messages_keep_arrival_order() {
        let (mut buffer, remote) = MessageBuffer::pair();
        remote.inbound.send(says("first")).unwrap();
        remote.inbound.send(says("second")).unwrap();

        assert_eq!(buffer.receive(), says("first"));
        assert_eq!(buffer.receive(), says("second"));
        assert!(buffer.receive().is_empty());
    }

    #[test]
    fn test_send_reaches_remote_end() {
        let (buffer, mut remote) = MessageBuffer::pair();
        buffer.send(says("hello"));
        assert_eq!(remote.outbound.try_recv().unwrap(), says("hello"));
    }

    #[test]
    fn test_send_after_remote_dropped_does_not_block() {
        let (buffer, remote) = MessageBuffer::pair();
        drop(remote);
        buffer.send(says("lost"));
    }

    #[test]
    fn test_is_connected_tracks_remote_end() {
        let (buffer, remote) = MessageBuffer::pair();
        assert!(buffer.is_connected());
        drop(remote);
        assert!(!buffer.is_connected());
    }

    #[test]
    fn test_frame_roundtrip_is_one_message() {
        let message = says("framed");
        let frame = assert_ok!(encode_frame(&message));
        let decoded = assert_ok!(decode_frame(&frame));
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_oversized_message_is_rejected() {
        let message = says(&"x".repeat(MAX_FRAME_LEN + 1));
        match encode_frame(&message) {
            Err(TransportError::FrameTooLarge { len, max }) => {
                assert!(len > max);
                assert_eq!(max, MAX_FRAME_LEN);
            }
            other => panic!("expected FrameTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_frames_fail() {
        let frame = encode_frame(&says("hello")).unwrap();
        assert_err!(decode_frame(&frame[..frame.len() / 2]));

        let mut corrupted = frame.clone();
        for byte in corrupted.iter_mut().take(8) {
            *byte = 0xFF;
        }
        assert_err!(decode_frame(&corrupted));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks() {
        let mut shutdown = Shutdown::new();
        let mut flag = shutdown.subscribe();

        shutdown.track(tokio::spawn(async move {
            while !is_shutdown(&flag) {
                if flag.changed().await.is_err() {
                    break;
                }
            }
        }));

        assert!(!shutdown.is_triggered());
        assert_eq!(shutdown.trigger_and_wait().await, 0);
        assert!(shutdown.is_triggered());
    }
}
