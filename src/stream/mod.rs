//! Server side: replays a recording to every connected client
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    BroadcastServer (emg-relay-server)            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   Arc<Recording> ─────────────┬──────────────┬─────────────      │
//! │                               ▼              ▼                   │
//! │   accept loop ──► ClientStream { Packetizer @ 0 } ──► socket     │
//! │        │          ClientStream { Packetizer @ 0 } ──► socket     │
//! │        ▼                                                         │
//! │   ConnectionRegistry (add on connect, remove on exit)            │
//! │                                                                  │
//! │   watch<bool> stop signal ──► accept loop + every client         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each client is paced independently at `samples_per_packet / sampling_rate`
//! seconds per packet and restarts from the top of the recording when it
//! reaches the end.

pub mod broadcaster;
pub mod dump;
pub mod packetizer;
pub mod registry;

pub use broadcaster::{BroadcastOptions, BroadcastServer, ServerHandle};
pub use dump::DataDump;
pub use packetizer::Packetizer;
pub use registry::{ClientId, ClientInfo, ConnectionRegistry, RegistryStats};
