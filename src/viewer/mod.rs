//! Client side: turns a packet stream into display-ready frames
//!
//! ```text
//! ┌──────────────┐  Delivery   ┌──────────────┐  ViewFrame   ┌───────────┐
//! │ PacketSource │ ──────────▶ │ ViewSession  │ ───────────▶ │ broadcast │ ──▶ renderer
//! └──────────────┘  per tick   └──────────────┘              └───────────┘
//!        ▲                            ▲
//!        │ TCP / scripted             │ commands (mode, selection, start/stop)
//!                                ViewerHandle
//! ```
//!
//! [`ViewerHandle`] owns the tick loop. Each tick pulls at most one packet,
//! feeds it through the session's active mode and broadcasts the resulting
//! [`ViewFrame`]. The connection status is published separately on a watch
//! channel so a renderer can show it without polling the task.

pub mod mode;
pub mod player;
pub mod session;
pub mod source;
pub mod window;

pub use mode::{ChannelId, ChannelSelection, SelectionError, ViewMode};
pub use player::{ConnectionStatus, ViewerHandle};
pub use session::{
    Series, SeriesLabel, SkipReason, TickOutcome, ViewFrame, ViewSession, WindowSpec,
};
pub use source::{Delivery, PacketSource, ScriptedSource, StreamPacketSource, TcpPacketSource};
pub use window::SlidingWindowBuffer;
