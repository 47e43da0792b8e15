//! Tick-driven IRC client engine.
//!
//! One [`Client`] maintains one server connection. The host ticks it
//! periodically; each tick reads what the socket has, dispatches complete
//! lines into the channel [`Registry`], and runs keepalive and auto-join.
//! Everything observable comes out as an ordered stream of [`Event`]s.
//!
//! ```rust,no_run
//! use tether_sdk::{Client, EngineConfig};
//!
//! let mut client = Client::new();
//! client
//!     .connect(EngineConfig {
//!         nick: "jeb".into(),
//!         channels: "#kspofficial".into(),
//!         ..Default::default()
//!     })
//!     .ok();
//! loop {
//!     client.tick();
//!     while let Some(event) = client.poll_event() {
//!         println!("{event:?}");
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod message;
pub mod registry;
pub mod transport;
pub mod user_command;

pub use client::Client;
pub use config::{EngineConfig, Endpoint};
pub use engine::{Engine, State};
pub use error::{ConfigError, ConnectError, ParseError};
pub use event::Event;
pub use message::{Command, Ctcp, decode, encode};
pub use registry::Registry;
pub use user_command::UserCommand;
