//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::engine::{Dispatch, ServerEngine};
use crate::error::ServerError;
use crate::plugin::GameLogic;
use log::{debug, error, info, warn};
use shared::connection::{is_shutdown, MAX_FRAME_LEN, RECV_TIMEOUT};
use shared::{decode_frame, encode_frame, ClientKey, Message, MessageBuffer, RemoteEnd, Shutdown};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// Main server coordinating networking and the authoritative engine
pub struct Server {
    socket: Arc<UdpSocket>,
    engine: ServerEngine,
    clients: ClientManager,
    tick_duration: Duration,
    max_clients: usize,
    client_timeout: Duration,

    // New peers discovered by the receiver task
    new_clients_tx: mpsc::UnboundedSender<(ClientKey, MessageBuffer)>,
    new_clients_rx: mpsc::UnboundedReceiver<(ClientKey, MessageBuffer)>,

    shutdown: Shutdown,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        plugin: Box<dyn GameLogic>,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        info!("Server listening on {}", addr);

        let (new_clients_tx, new_clients_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket: Arc::new(socket),
            engine: ServerEngine::new(plugin),
            clients: ClientManager::new(max_clients),
            tick_duration,
            max_clients,
            client_timeout: CLIENT_TIMEOUT,
            new_clients_tx,
            new_clients_rx,
            shutdown: Shutdown::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self
            .socket
            .local_addr()
            .map_err(shared::TransportError::from)?)
    }

    pub fn engine(&self) -> &ServerEngine {
        &self.engine
    }

    /// Overrides [`CLIENT_TIMEOUT`]
    pub fn set_client_timeout(&mut self, timeout: Duration) {
        self.client_timeout = timeout;
    }

    /// Spawns the task that demultiplexes datagrams into per-client buffers
    fn spawn_network_receiver(&mut self) {
        let socket = Arc::clone(&self.socket);
        let new_clients = self.new_clients_tx.clone();
        let stop = self.shutdown.subscribe();
        let max_clients = self.max_clients;

        let task = tokio::spawn(async move {
            let mut peers: HashMap<ClientKey, mpsc::UnboundedSender<Message>> = HashMap::new();
            let mut senders = Vec::new();
            let mut buffer = vec![0u8; MAX_FRAME_LEN];

            while !is_shutdown(&stop) {
                let (len, addr) = match timeout(RECV_TIMEOUT, socket.recv_from(&mut buffer)).await {
                    Err(_) => continue,
                    Ok(Ok(received)) => received,
                    Ok(Err(e)) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };

                let message = match decode_frame(&buffer[..len]) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Failed to decode frame from {}: {}", addr, e);
                        continue;
                    }
                };

                // Unknown addresses, and peers whose buffer the main loop
                // has already dropped, get a fresh connection
                if peers.get(&addr).map_or(true, |inbound| inbound.is_closed()) {
                    peers.retain(|_, inbound| !inbound.is_closed());
                    if peers.len() >= max_clients {
                        warn!("Server full, ignoring {}", addr);
                        continue;
                    }

                    let (engine_side, RemoteEnd { outbound, inbound }) = MessageBuffer::pair();
                    senders.push(tokio::spawn(run_peer_sender(
                        Arc::clone(&socket),
                        addr,
                        outbound,
                        stop.clone(),
                    )));
                    peers.insert(addr, inbound);

                    if new_clients.send((addr, engine_side)).is_err() {
                        error!("Main loop is gone, stopping receiver");
                        break;
                    }
                    debug!("New peer {}", addr);
                }

                if let Some(inbound) = peers.get(&addr) {
                    if inbound.send(message).is_err() {
                        debug!("Dropping message from {}, client was removed", addr);
                    }
                }
            }

            for sender in senders {
                let _ = sender.await;
            }
            debug!("Receiver task stopped");
        });

        self.shutdown.track(task);
    }

    /// Runs one iteration of the main loop
    ///
    /// Every connected client gets one message processed, in address
    /// order, followed by the game logic's idle phase.
    pub fn step(&mut self) -> Result<(), ServerError> {
        for addr in self.clients.disconnected() {
            self.clients.remove_client(&addr);
            self.engine.disconnect(&addr);
        }
        for addr in self.clients.check_timeouts(self.client_timeout) {
            self.engine.disconnect(&addr);
        }

        while let Ok((addr, buffer)) = self.new_clients_rx.try_recv() {
            if !self.clients.add_client(addr, buffer) {
                warn!("Rejected client {}, server full or already connected", addr);
            }
        }

        for addr in self.clients.addrs() {
            let message = self.clients.receive(&addr);
            if message.is_empty() {
                continue;
            }

            debug!("{} events from {}", message.len(), addr);
            let dispatch = self.engine.handle_message(addr, message)?;
            self.deliver(Some(addr), dispatch);
        }

        if let Some(dispatch) = self.engine.idle()? {
            self.deliver(None, dispatch);
        }

        Ok(())
    }

    fn deliver(&self, origin: Option<ClientKey>, dispatch: Dispatch) {
        let Dispatch {
            reply,
            broadcast,
            recipients,
        } = dispatch;

        if let Some(origin) = origin {
            if !reply.is_empty() {
                self.clients.send(&origin, reply);
            }
        }

        if broadcast.is_empty() {
            return;
        }
        for recipient in &recipients {
            self.clients.send(recipient, broadcast.clone());
        }
    }

    /// Main server loop
    ///
    /// Runs until a termination signal arrives, game logic asks to exit or
    /// the world desynchronizes. The transport is shut down in every case.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        info!("Server started, tick {:?}", self.tick_duration);

        let result = self.main_loop().await;

        let unconfirmed = self.shutdown.trigger_and_wait().await;
        if unconfirmed > 0 {
            warn!("{} network tasks had to be aborted", unconfirmed);
        }
        match &result {
            Ok(()) => info!("Server shut down"),
            Err(e) => error!("Server stopped: {}", e),
        }
        result
    }

    async fn main_loop(&mut self) -> Result<(), ServerError> {
        let signal = shutdown_signal();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Received termination signal, shutting down gracefully...");
                    return Ok(());
                }
                _ = wait_tick(self.tick_duration) => {}
            }

            self.step()?;

            if self.engine.exit_requested() {
                info!("Game logic requested exit");
                return Ok(());
            }
        }
    }
}

/// Drains one client's outbound queue onto the socket
async fn run_peer_sender(
    socket: Arc<UdpSocket>,
    addr: ClientKey,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    stop: watch::Receiver<bool>,
) {
    while !is_shutdown(&stop) {
        match timeout(RECV_TIMEOUT, outbound.recv()).await {
            Ok(Some(message)) => {
                if let Err(e) = send_frame(&socket, &message, addr).await {
                    error!("Failed to send to {}, dropping connection: {}", addr, e);
                    return;
                }
            }
            Ok(None) => return,
            Err(_) => {}
        }
    }

    // Flush whatever the engine queued before the flag went up
    while let Ok(message) = outbound.try_recv() {
        if send_frame(&socket, &message, addr).await.is_err() {
            break;
        }
    }
}

async fn send_frame(socket: &UdpSocket, message: &Message, addr: ClientKey) -> Result<(), ServerError> {
    let data = encode_frame(message)?;
    socket
        .send_to(&data, addr)
        .await
        .map_err(shared::TransportError::from)?;
    Ok(())
}

/// Sleeps for one tick; a zero tick only yields
async fn wait_tick(tick: Duration) {
    if tick.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(tick).await;
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            error!("Cannot listen for Ctrl+C: {}", e);
                            std::future::pending::<()>().await;
                        }
                    }
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::testing::EchoGame;
    use shared::Event;

    async fn test_server() -> Server {
        Server::new("127.0.0.1:0", Duration::ZERO, 2, Box::new(EchoGame::default()))
            .await
            .unwrap()
    }

    fn says(text: &str) -> Message {
        Message::from(vec![Event::Says {
            identifier: "p1".to_string(),
            text: text.to_string(),
        }])
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let result = Server::new("127.0.0.1:notaport", Duration::ZERO, 1, Box::new(EchoGame::default())).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_step_replies_to_origin() {
        let mut server = test_server().await;
        let addr: ClientKey = "127.0.0.1:40000".parse().unwrap();
        let (buffer, mut remote) = MessageBuffer::pair();
        server.new_clients_tx.send((addr, buffer)).unwrap();

        remote.inbound.send(says("hi")).unwrap();
        server.step().unwrap();

        assert_eq!(remote.outbound.try_recv().unwrap(), says("hi"));
        assert_eq!(server.clients.len(), 1);
    }

    #[tokio::test]
    async fn test_step_removes_disconnected_clients() {
        let mut server = test_server().await;
        let addr: ClientKey = "127.0.0.1:40001".parse().unwrap();
        let (buffer, remote) = MessageBuffer::pair();
        server.new_clients_tx.send((addr, buffer)).unwrap();
        server.step().unwrap();
        assert_eq!(server.clients.len(), 1);

        drop(remote);
        server.step().unwrap();
        assert!(server.clients.is_empty());
    }

    #[tokio::test]
    async fn test_silent_peer_frees_its_slot() {
        let mut server = Server::new("127.0.0.1:0", Duration::ZERO, 1, Box::new(EchoGame::default()))
            .await
            .unwrap();
        server.set_client_timeout(Duration::from_millis(200));
        let server_addr = server.local_addr().unwrap();
        server.spawn_network_receiver();

        let mut buffer = vec![0u8; MAX_FRAME_LEN];
        let frame = encode_frame(&says("first")).unwrap();

        let gone = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        gone.send_to(&frame, server_addr).await.unwrap();
        let mut answered = false;
        for _ in 0..200 {
            server.step().unwrap();
            if timeout(Duration::from_millis(10), gone.recv_from(&mut buffer)).await.is_ok() {
                answered = true;
                break;
            }
        }
        assert!(answered);
        drop(gone);

        for _ in 0..100 {
            server.step().unwrap();
            if server.clients.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(server.clients.is_empty());

        let next = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        next.send_to(&encode_frame(&says("second")).unwrap(), server_addr)
            .await
            .unwrap();
        let mut reply = None;
        for _ in 0..200 {
            server.step().unwrap();
            if let Ok(Ok((len, _))) = timeout(Duration::from_millis(10), next.recv_from(&mut buffer)).await {
                reply = Some(decode_frame(&buffer[..len]).unwrap());
                break;
            }
        }

        assert_eq!(reply, Some(says("second")));
        assert_eq!(server.shutdown.trigger_and_wait().await, 0);
    }

    #[tokio::test]
    async fn test_wait_tick_zero_returns() {
        wait_tick(Duration::ZERO).await;
        wait_tick(Duration::from_millis(1)).await;
    }

    #[tokio::test]
    async fn test_udp_roundtrip() {
        let mut server = test_server().await;
        let server_addr = server.local_addr().unwrap();
        server.spawn_network_receiver();

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let frame = encode_frame(&says("over the wire")).unwrap();
        peer.send_to(&frame, server_addr).await.unwrap();

        let mut buffer = vec![0u8; MAX_FRAME_LEN];
        let mut reply = None;
        for _ in 0..200 {
            server.step().unwrap();
            if let Ok(Ok((len, _))) =
                timeout(Duration::from_millis(10), peer.recv_from(&mut buffer)).await
            {
                reply = Some(decode_frame(&buffer[..len]).unwrap());
                break;
            }
        }

        assert_eq!(reply, Some(says("over the wire")));
        assert_eq!(server.shutdown.trigger_and_wait().await, 0);
    }
}
