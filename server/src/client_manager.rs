//! Connected clients and their message buffers
//!
//! The network layer hands over one [`MessageBuffer`] per peer address. The
//! main loop reads and writes clients only through this manager, which also
//! enforces the server's capacity.

use log::{debug, info};
use shared::{ClientKey, Message, MessageBuffer};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Silence after which a client is considered gone
///
/// Clients send a keepalive every
/// [`KEEPALIVE_INTERVAL`](shared::connection::KEEPALIVE_INTERVAL), so only
/// departed peers reach this.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected client and its side of the transport
#[derive(Debug)]
pub struct ClientConnection {
    pub addr: ClientKey,
    pub buffer: MessageBuffer,
    pub connected_at: Instant,
    /// Last frame of any kind, keepalives included
    pub last_seen: Instant,
    /// Non-empty messages received so far
    pub messages_received: u64,
}

impl ClientConnection {
    pub fn new(addr: ClientKey, buffer: MessageBuffer) -> Self {
        Self {
            addr,
            buffer,
            connected_at: Instant::now(),
            last_seen: Instant::now(),
            messages_received: 0,
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All clients, iterated in address order
///
/// Address order is the only cross-client ordering the server gives.
pub struct ClientManager {
    clients: BTreeMap<ClientKey, ClientConnection>,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            max_clients,
        }
    }

    /// Adds a client. Returns false if the server is full or the address
    /// is already connected.
    pub fn add_client(&mut self, addr: ClientKey, buffer: MessageBuffer) -> bool {
        if self.clients.len() >= self.max_clients || self.clients.contains_key(&addr) {
            return false;
        }

        info!("Client connected from {}", addr);
        self.clients.insert(addr, ClientConnection::new(addr, buffer));
        true
    }

    pub fn remove_client(&mut self, addr: &ClientKey) -> bool {
        match self.clients.remove(addr) {
            Some(client) => {
                info!(
                    "Client {} removed after {:?}, {} messages",
                    addr,
                    client.connected_at.elapsed(),
                    client.messages_received
                );
                true
            }
            None => false,
        }
    }

    /// Takes the next message from `addr`, or an empty one
    pub fn receive(&mut self, addr: &ClientKey) -> Message {
        let Some(client) = self.clients.get_mut(addr) else {
            return Message::new();
        };
        let Some(message) = client.buffer.try_receive() else {
            return Message::new();
        };
        client.last_seen = Instant::now();
        if !message.is_empty() {
            client.messages_received += 1;
        }
        message
    }

    pub fn send(&self, addr: &ClientKey, message: Message) {
        match self.clients.get(addr) {
            Some(client) => client.buffer.send(message),
            None => debug!("Dropping message for unknown client {}", addr),
        }
    }

    /// Clients whose network task has stopped
    pub fn disconnected(&self) -> Vec<ClientKey> {
        self.clients
            .values()
            .filter(|client| !client.buffer.is_connected())
            .map(|client| client.addr)
            .collect()
    }

    /// Removes clients that have been silent for longer than `timeout`
    ///
    /// Dropping a client's buffer also stops its sender task and frees its
    /// slot in the network receiver.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ClientKey> {
        let timed_out: Vec<ClientKey> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.addr)
            .collect();

        for addr in &timed_out {
            info!("Client {} timed out", addr);
            self.remove_client(addr);
        }
        timed_out
    }

    pub fn addrs(&self) -> Vec<ClientKey> {
        self.clients.keys().copied().collect()
    }

    pub fn contains(&self, addr: &ClientKey) -> bool {
        self.clients.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }
}
