//! # rsshmgr - Managed Interactive SSH Sessions
//!
//! `rsshmgr` is a Rust library for embedding a single interactive SSH shell
//! in a larger control application. The application issues line-oriented
//! commands and consumes the remote terminal output asynchronously, while
//! the library takes care of the connection lifecycle.
//!
//! ## Features
//!
//! - **Deterministic Lifecycle**: Disconnected → Connecting → Connected, with one
//!   idempotent teardown path for every failure
//! - **Keyboard-Interactive Auth**: Password prompts are answered without a human
//! - **Pluggable Host Trust**: Accept-all, trust-on-first-use or pinned fingerprints
//! - **Chunked Output**: Shell output is drained per notification and split into
//!   bounded chunks (250 characters by default)
//! - **Reconnect on Send**: Sending while disconnected reconnects once with the
//!   stored credentials
//! - **Async/Await**: Built on Tokio and russh
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rsshmgr::config::SessionConfig;
//! use rsshmgr::session::{ChannelSink, Session, SessionEvent};
//! use rsshmgr::transport::RusshTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (sink, mut events) = ChannelSink::new();
//!     let session = Session::new(RusshTransport::new(), Arc::new(sink));
//!
//!     session
//!         .initialize(SessionConfig::new("10.0.0.5", 22, "op", "s3cr3t").with_label("rack-1"))
//!         .await?;
//!     session.connect().await?;
//!     session.send("show status").await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let SessionEvent::Data(chunk) = event {
//!             print!("{chunk}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::Session`] - Connection state machine, reader and send gate
//! - [`session::EventSink`] - Connection-state and data-chunk callbacks
//! - [`transport::Transport`] - SSH transport seam, implemented by [`transport::RusshTransport`]
//! - [`error::SessionError`] - Error types for every failure class
//! - [`config`] - Session configuration and SSH algorithm tables

pub mod config;
pub mod error;
pub mod session;
pub mod transport;
