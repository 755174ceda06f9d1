//! View modes and channel selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which derived view the viewer computes each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Raw samples of one channel
    Individual,
    /// Sample-wise difference of two channels
    Differential,
    /// Magnitude spectrum of one channel's window
    Frequency,
    /// Raw samples of every selected channel
    MultiChannel,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] = [
        ViewMode::Individual,
        ViewMode::Differential,
        ViewMode::Frequency,
        ViewMode::MultiChannel,
    ];

    /// Most channels the mode can hold at once, `None` for unbounded
    pub fn selection_limit(&self) -> Option<usize> {
        match self {
            ViewMode::Individual | ViewMode::Frequency => Some(1),
            ViewMode::Differential => Some(2),
            ViewMode::MultiChannel => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ViewMode::Individual => "individual",
            ViewMode::Differential => "differential",
            ViewMode::Frequency => "frequency",
            ViewMode::MultiChannel => "multi",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ViewMode {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "individual" | "indi" => Ok(ViewMode::Individual),
            "differential" | "diff" => Ok(ViewMode::Differential),
            "frequency" | "freq" => Ok(ViewMode::Frequency),
            "multi" | "multi_channel" | "multichannel" => Ok(ViewMode::MultiChannel),
            other => Err(SelectionError::UnknownMode(other.to_string())),
        }
    }
}

/// Invalid user input for mode or channel selection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("channel {channel} is outside 1..={channels}")]
    OutOfRange { channel: usize, channels: usize },

    #[error("{mode} mode holds at most {limit} channel(s)")]
    Full { mode: ViewMode, limit: usize },

    #[error("unknown view mode: {0}")]
    UnknownMode(String),
}

/// One-based channel number as shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(usize);

impl ChannelId {
    /// Validate a one-based channel number against the stream's channel count
    pub fn new(number: usize, channels: usize) -> Result<Self, SelectionError> {
        if number == 0 || number > channels {
            return Err(SelectionError::OutOfRange {
                channel: number,
                channels,
            });
        }
        Ok(Self(number))
    }

    pub fn number(&self) -> usize {
        self.0
    }

    /// Zero-based row in a packet
    pub fn index(&self) -> usize {
        self.0 - 1
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered set of selected channels, sized to a mode's limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSelection {
    channels: Vec<ChannelId>,
    limit: Option<usize>,
}

impl ChannelSelection {
    pub fn for_mode(mode: ViewMode) -> Self {
        Self {
            channels: Vec::new(),
            limit: mode.selection_limit(),
        }
    }

    /// Add a channel; single-channel modes replace, bounded modes reject overflow
    ///
    /// Returns `Ok(false)` when the channel was already selected.
    pub fn select(&mut self, channel: ChannelId, mode: ViewMode) -> Result<bool, SelectionError> {
        if self.channels.contains(&channel) {
            return Ok(false);
        }
        match self.limit {
            Some(1) => self.channels.clear(),
            Some(limit) if self.channels.len() >= limit => {
                return Err(SelectionError::Full { mode, limit });
            }
            _ => {}
        }
        self.channels.push(channel);
        Ok(true)
    }

    /// Returns whether the channel was selected
    pub fn deselect(&mut self, channel: ChannelId) -> bool {
        let before = self.channels.len();
        self.channels.retain(|c| *c != channel);
        self.channels.len() != before
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn first(&self) -> Option<ChannelId> {
        self.channels.first().copied()
    }

    /// The two channels of a complete differential pair
    pub fn pair(&self) -> Option<(ChannelId, ChannelId)> {
        match self.channels.as_slice() {
            [a, b] => Some((*a, *b)),
            _ => None,
        }
    }
}
