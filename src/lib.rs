//! Client for a line-oriented per-process USS telemetry stream.
//!
//! Bytes from the socket are framed into lines ([`framer`]), grouped into
//! one block per tick ([`block`]), decoded into events ([`protocol`]) and
//! applied to a [`model::ProcessModel`] by the consumer ([`monitor`]).

pub mod block;
pub mod config;
pub mod connection;
pub mod framer;
pub mod model;
pub mod monitor;
pub mod protocol;

pub use block::{Block, BlockAssembler};
pub use connection::{
    ClientEvent, ConnectionHandle, ConnectionManager, ConnectionOptions, ConnectionStatus, Phase,
};
pub use framer::StreamFramer;
pub use model::{ProcessModel, ProcessRecord, TickDelta};
pub use monitor::{ModelObserver, Monitor};
pub use protocol::{Event, EventKind, Fields};
