//! Client network layer and frame loop

use crate::error::ClientError;
use crate::game::ClientEngine;
use crate::presentation::Presentation;
use log::{debug, error, info, warn};
use shared::connection::{is_shutdown, KEEPALIVE_INTERVAL, MAX_FRAME_LEN, RECV_TIMEOUT};
use shared::{decode_frame, encode_frame, Message, MessageBuffer, RemoteEnd, Shutdown, TransportError};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

/// Connects a client engine and a presentation to one server
pub struct Client {
    engine: ClientEngine,
    buffer: MessageBuffer,
    presentation: Box<dyn Presentation>,
    frame_duration: Duration,
    shutdown: Shutdown,
    last_sent: Instant,
}

impl Client {
    /// Builds a client over an existing buffer, without any network task
    pub fn new(
        engine: ClientEngine,
        buffer: MessageBuffer,
        presentation: Box<dyn Presentation>,
        frame_duration: Duration,
    ) -> Self {
        Self {
            engine,
            buffer,
            presentation,
            frame_duration,
            shutdown: Shutdown::new(),
            last_sent: Instant::now(),
        }
    }

    /// Binds a local socket, connects it to `server_addr` and starts the I/O task
    ///
    /// `fake_ping` delays every outgoing frame by half its value to simulate
    /// latency.
    pub async fn connect(
        server_addr: &str,
        engine: ClientEngine,
        presentation: Box<dyn Presentation>,
        frame_duration: Duration,
        fake_ping: Duration,
    ) -> Result<Self, ClientError> {
        let server: SocketAddr = server_addr.parse().map_err(|e: std::net::AddrParseError| ClientError::Address {
            addr: server_addr.to_string(),
            reason: e.to_string(),
        })?;

        let local = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await.map_err(TransportError::from)?;
        socket.connect(server).await.map_err(TransportError::from)?;
        info!("Connected to {} from {}", server, socket.local_addr().map_err(TransportError::from)?);

        let (buffer, remote) = MessageBuffer::pair();
        let mut client = Client::new(engine, buffer, presentation, frame_duration);
        let stop = client.shutdown.subscribe();
        let task = tokio::spawn(run_io(socket, remote, stop, fake_ping / 2));
        client.shutdown.track(task);

        Ok(client)
    }

    pub fn engine(&self) -> &ClientEngine {
        &self.engine
    }

    /// Runs one frame: server events, asset prefetch, presentation, player input
    ///
    /// An empty message goes out when nothing was sent for
    /// [`KEEPALIVE_INTERVAL`], so the server keeps the slot.
    pub fn step(&mut self, now: Instant) -> Result<(), ClientError> {
        let incoming = self.buffer.receive();
        if !incoming.is_empty() {
            debug!("{} events from the server", incoming.len());
        }
        let events = self.engine.handle_server_message(incoming)?;

        let tiles = self.engine.take_tiles_to_fetch();
        if !tiles.is_empty() {
            self.presentation.prefetch(&tiles)?;
        }

        let input = self
            .presentation
            .process(&events, self.engine.room(), self.engine.rack())?;
        let outbound = self.engine.handle_player_message(input, now)?;
        if !outbound.is_empty() || now.saturating_duration_since(self.last_sent) >= KEEPALIVE_INTERVAL {
            self.buffer.send(outbound);
            self.last_sent = now;
        }
        Ok(())
    }

    /// Main client loop
    ///
    /// Sends the Init message, then steps once per frame until the player
    /// quits, Ctrl+C arrives or an error occurs. The Init is repeated until
    /// the room arrives. The I/O task is shut down in every case.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        info!("Joining as {}", self.engine.player_id());
        let now = Instant::now();
        let init = self.engine.join(now);
        self.buffer.send(init);
        self.last_sent = now;

        let result = self.main_loop().await;

        let unconfirmed = self.shutdown.trigger_and_wait().await;
        if unconfirmed > 0 {
            warn!("{} network tasks had to be aborted", unconfirmed);
        }
        match &result {
            Ok(()) => info!("Client shut down"),
            Err(e) => error!("Client stopped: {}", e),
        }
        result
    }

    async fn main_loop(&mut self) -> Result<(), ClientError> {
        let signal = tokio::signal::ctrl_c();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("Received Ctrl+C, leaving");
                    return Ok(());
                }
                _ = sleep(self.frame_duration) => {}
            }

            self.step(Instant::now())?;

            if self.presentation.exit_requested() {
                return Ok(());
            }
            if !self.buffer.is_connected() {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "network task stopped",
                ))
                .into());
            }
        }
    }
}

/// Moves frames between the connected socket and the engine's buffer
async fn run_io(socket: UdpSocket, remote: RemoteEnd, stop: watch::Receiver<bool>, delay: Duration) {
    let RemoteEnd { mut outbound, inbound } = remote;
    let mut buffer = vec![0u8; MAX_FRAME_LEN];

    while !is_shutdown(&stop) {
        tokio::select! {
            received = timeout(RECV_TIMEOUT, socket.recv(&mut buffer)) => match received {
                Err(_) => {}
                Ok(Ok(len)) => match decode_frame(&buffer[..len]) {
                    Ok(message) => {
                        if inbound.send(message).is_err() {
                            debug!("Engine is gone, stopping I/O task");
                            return;
                        }
                    }
                    Err(e) => warn!("Failed to decode frame from server: {}", e),
                },
                Ok(Err(e)) => {
                    warn!("Error receiving from server: {}", e);
                    sleep(Duration::from_millis(10)).await;
                }
            },
            queued = outbound.recv() => match queued {
                Some(message) => {
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    if let Err(e) = send_frame(&socket, &message).await {
                        error!("Failed to send to server: {}", e);
                    }
                }
                None => return,
            },
        }
    }

    while let Ok(message) = outbound.try_recv() {
        if send_frame(&socket, &message).await.is_err() {
            break;
        }
    }
    debug!("I/O task stopped");
}

async fn send_frame(socket: &UdpSocket, message: &Message) -> Result<(), TransportError> {
    let data = encode_frame(message)?;
    socket.send(&data).await?;
    Ok(())
}
