//! # Room Server Library
//!
//! This library provides the authoritative server for the tile-grid
//! adventure game. It owns the canonical room and rack, checks every
//! client attempt against them and sends the confirmed outcome back to the
//! originating client and to everyone else in the room.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The server keeps the only trusted copy of the room. Clients predict
//! their own moves, but every attempt is validated here regardless of what
//! the client believes, and the answer is always exactly one confirmation
//! or an `AttemptFailed`.
//!
//! ### Pluggable Game Rules
//! Game rules live behind the [`plugin::GameLogic`] trait. The engine calls
//! it once per validated event with read access to the room and rack, then
//! folds the returned events into the authoritative state. [`game::DefaultGame`]
//! is the stock implementation used by the `server` binary.
//!
//! ### Room Broadcasting
//! Results go to the originating client in full. Other clients in the room
//! receive a filtered copy with only ambient world changes, and never the
//! per-client resync burst sent on `Init`.
//!
//! ## Module Organization
//!
//! - `engine`: the transport-agnostic state machine (validation, plugin
//!   calls, folding)
//! - `broadcast`: selection of events for room peers
//! - `plugin` / `game` / `map`: the game-logic capability, its default
//!   implementation and the text map format it loads rooms from
//! - `client_manager`: connected clients and their message buffers
//! - `network`: UDP transport tasks and the tick loop
//! - `error`: server-level errors
//!
//! ## Limitations
//!
//! A server holds a single room. Entering a room with a different
//! identifier replaces the current one for everybody.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::DefaultGame;
//! use server::map::MapDescription;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let game = DefaultGame::new(MapDescription::builtin()?);
//!
//!     // 16ms tick, at most 32 clients
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16),
//!         32,
//!         Box::new(game),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod engine;
pub mod error;
pub mod game;
pub mod map;
pub mod network;
pub mod plugin;
