//! # Room Client Library
//!
//! This library provides the client side of the tile-grid adventure game.
//! It keeps a mirror of the server's room, lets the player act on it with
//! no visible delay and repairs the mirror when the server disagrees.
//!
//! ## Architecture Overview
//!
//! ### Mirror
//! The client folds every server message into its own `Room` and `Rack`
//! with the same operations the server uses. Each event is applied exactly
//! once, in the order the server sent it.
//!
//! ### Prediction and Reconciliation
//! Own moves are applied to the mirror as soon as they are sent. The
//! server's answer either matches the prediction (nothing to do), moves the
//! player somewhere else (the server wins) or fails the attempt (the
//! prediction is rolled back).
//!
//! ### Flow Control
//! Only one attempt is in flight at a time. Attempts made while waiting are
//! dropped, and a server that stays silent gets the last attempt resent a
//! bounded number of times before the client gives up.
//!
//! ## Module Organization
//!
//! - `game`: the client engine (mirror, flow control, prediction)
//! - `presentation`: the capability driven once per frame, and a console
//!   implementation
//! - `input`: command parsing and translation into attempt events
//! - `assets`: asset fetching for the presentation
//! - `network`: UDP transport task and the frame loop
//! - `error`: client-level errors
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientEngine;
//! use client::network::Client;
//! use client::presentation::{spawn_stdin_reader, ConsolePresentation};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let console = ConsolePresentation::new("alice", spawn_stdin_reader(), None);
//!
//!     let mut client = Client::connect(
//!         "127.0.0.1:8080",
//!         ClientEngine::new("alice"),
//!         Box::new(console),
//!         Duration::from_millis(16),
//!         Duration::ZERO,
//!     )
//!     .await?;
//!
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod error;
pub mod game;
pub mod input;
pub mod network;
pub mod presentation;
