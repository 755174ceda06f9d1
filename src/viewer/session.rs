//! Per-viewer session: mode, selection and the buffers they imply
//!
//! A session is plain state driven from one task. Mode and selection changes arrive
//! between ticks, and each tick hands the session one [`Delivery`] and gets back a
//! [`TickOutcome`]. Nothing here touches the network or logs.
//!
//! # Buffer lifecycle
//!
//! | Event                 | Effect                                              |
//! |-----------------------|-----------------------------------------------------|
//! | mode change           | selection cleared, previous buffers dropped         |
//! | selection change      | buffers rebuilt zero-filled for the new selection   |
//! | start / stop          | every buffer reset to zeros                          |
//! | packet                | buffers of the active view appended in arrival order |
//! | filter change         | buffers kept; only emitted time-domain series change |

use std::sync::Arc;

use serde::Serialize;

use crate::dsp::{self, SpectrumAnalyzer};
use crate::filters::{FilterError, FilterSettings, SeriesFilter, SignalFilter};
use crate::frame::{ChannelFrameDecoder, DecodeError, FrameLayout, Packet};
use crate::viewer::mode::{ChannelId, ChannelSelection, SelectionError, ViewMode};
use crate::viewer::source::Delivery;
use crate::viewer::window::SlidingWindowBuffer;

/// Geometry of the display window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSpec {
    /// Samples held per buffer
    pub capacity: usize,
    /// Seconds spanned by the time axis
    pub window_seconds: f32,
    /// Recording rate used for the frequency axis
    pub sampling_rate_hz: f64,
}

/// What one emitted series represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeriesLabel {
    Channel { channel: ChannelId },
    Difference { minuend: ChannelId, subtrahend: ChannelId },
    Spectrum { channel: ChannelId },
}

/// One array of values sharing the frame's axis
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: SeriesLabel,
    pub values: Vec<f32>,
}

/// Output of one tick, handed to whatever renders
#[derive(Debug, Clone)]
pub struct ViewFrame {
    /// Emitted frames counted since the session was created
    pub sequence: u64,
    pub mode: ViewMode,
    /// Display filter applied to time-domain series; spectra are always raw
    pub filter: SignalFilter,
    /// Time axis (seconds) or frequency axis (Hz); same length as every series
    pub axis: Arc<[f32]>,
    pub series: Vec<Series>,
}

/// Why a tick produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing arrived before the receive timeout
    NoData,
    /// The active mode has no channel selected
    NoSelection,
    /// Differential mode without exactly two channels
    IncompletePair { selected: usize },
}

/// Result of one tick
#[derive(Debug, Clone)]
pub enum TickOutcome {
    Emitted(ViewFrame),
    Skipped(SkipReason),
    DecodeFailed(DecodeError),
    Disconnected,
}

impl TickOutcome {
    pub fn frame(&self) -> Option<&ViewFrame> {
        match self {
            TickOutcome::Emitted(frame) => Some(frame),
            _ => None,
        }
    }
}

/// Buffers owned by the active mode
enum ActiveView {
    Individual {
        buffer: SlidingWindowBuffer,
    },
    Differential {
        buffer: SlidingWindowBuffer,
    },
    Frequency {
        buffer: SlidingWindowBuffer,
        analyzer: SpectrumAnalyzer,
    },
    MultiChannel {
        buffers: Vec<(ChannelId, SlidingWindowBuffer)>,
    },
}

impl ActiveView {
    fn build(mode: ViewMode, selection: &ChannelSelection, capacity: usize) -> Self {
        match mode {
            ViewMode::Individual => ActiveView::Individual {
                buffer: SlidingWindowBuffer::new(capacity),
            },
            ViewMode::Differential => ActiveView::Differential {
                buffer: SlidingWindowBuffer::new(capacity),
            },
            ViewMode::Frequency => ActiveView::Frequency {
                buffer: SlidingWindowBuffer::new(capacity),
                analyzer: SpectrumAnalyzer::new(capacity),
            },
            ViewMode::MultiChannel => ActiveView::MultiChannel {
                buffers: selection
                    .channels()
                    .iter()
                    .map(|&channel| (channel, SlidingWindowBuffer::new(capacity)))
                    .collect(),
            },
        }
    }

    fn reset(&mut self) {
        match self {
            ActiveView::Individual { buffer }
            | ActiveView::Differential { buffer }
            | ActiveView::Frequency { buffer, .. } => buffer.reset(),
            ActiveView::MultiChannel { buffers } => {
                buffers.iter_mut().for_each(|(_, buffer)| buffer.reset())
            }
        }
    }

    fn buffers(&self) -> Vec<&SlidingWindowBuffer> {
        match self {
            ActiveView::Individual { buffer }
            | ActiveView::Differential { buffer }
            | ActiveView::Frequency { buffer, .. } => vec![buffer],
            ActiveView::MultiChannel { buffers } => buffers.iter().map(|(_, b)| b).collect(),
        }
    }
}

/// Mode, selection and buffers of one viewer
pub struct ViewSession {
    decoder: ChannelFrameDecoder,
    window: WindowSpec,
    mode: ViewMode,
    selection: ChannelSelection,
    view: ActiveView,
    filter_settings: FilterSettings,
    filter: SeriesFilter,
    time_axis: Arc<[f32]>,
    frequency_axis: Arc<[f32]>,
    emitted: u64,
}

impl ViewSession {
    pub fn new(layout: FrameLayout, window: WindowSpec, mode: ViewMode) -> Self {
        let selection = ChannelSelection::for_mode(mode);
        let view = ActiveView::build(mode, &selection, window.capacity);
        Self {
            decoder: ChannelFrameDecoder::new(layout),
            window,
            mode,
            selection,
            view,
            filter_settings: FilterSettings::default(),
            filter: SeriesFilter::Raw,
            time_axis: dsp::time_axis(window.window_seconds, window.capacity).into(),
            frequency_axis: dsp::frequency_axis(window.capacity, window.sampling_rate_hz).into(),
            emitted: 0,
        }
    }

    /// Replace the band edges, order and RMS window used by later filter changes
    pub fn with_filter_settings(mut self, settings: FilterSettings) -> Self {
        self.filter_settings = settings;
        self
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn filter(&self) -> SignalFilter {
        self.filter.kind()
    }

    pub fn window(&self) -> WindowSpec {
        self.window
    }

    pub fn layout(&self) -> FrameLayout {
        self.decoder.layout()
    }

    pub fn selection(&self) -> &[ChannelId] {
        self.selection.channels()
    }

    /// Axis that frames in the current mode are emitted against
    pub fn axis(&self) -> Arc<[f32]> {
        match self.mode {
            ViewMode::Frequency => Arc::clone(&self.frequency_axis),
            _ => Arc::clone(&self.time_axis),
        }
    }

    /// Raw time-domain contents of every live buffer, in selection order
    pub fn buffer_snapshots(&self) -> Vec<Vec<f32>> {
        self.view
            .buffers()
            .into_iter()
            .map(SlidingWindowBuffer::snapshot)
            .collect()
    }

    /// Enter `mode`; the selection is cleared and old buffers are dropped
    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
        self.selection = ChannelSelection::for_mode(mode);
        self.rebuild();
    }

    pub fn select(&mut self, channel: usize) -> Result<bool, SelectionError> {
        let channel = self.channel_id(channel)?;
        let changed = self.selection.select(channel, self.mode)?;
        if changed {
            self.rebuild();
        }
        Ok(changed)
    }

    pub fn deselect(&mut self, channel: usize) -> Result<bool, SelectionError> {
        let channel = self.channel_id(channel)?;
        let changed = self.selection.deselect(channel);
        if changed {
            self.rebuild();
        }
        Ok(changed)
    }

    /// Replace the whole selection; nothing changes if any channel is invalid
    pub fn set_selection(&mut self, channels: &[usize]) -> Result<(), SelectionError> {
        let mut selection = ChannelSelection::for_mode(self.mode);
        for &number in channels {
            selection.select(self.channel_id(number)?, self.mode)?;
        }
        self.selection = selection;
        self.rebuild();
        Ok(())
    }

    /// Switch the display filter; the current one stays if the new one cannot be built
    pub fn set_filter(&mut self, filter: SignalFilter) -> Result<(), FilterError> {
        self.filter = SeriesFilter::design(filter, &self.filter_settings, self.window.sampling_rate_hz)?;
        Ok(())
    }

    /// Zero every buffer without touching mode or selection
    pub fn clear(&mut self) {
        self.view.reset();
    }

    /// Run one tick on whatever the source delivered
    pub fn process(&mut self, delivery: Delivery) -> TickOutcome {
        match delivery {
            Delivery::Data(bytes) => match self.decoder.decode(&bytes) {
                Ok(packet) => self.apply(&packet),
                Err(e) => TickOutcome::DecodeFailed(e),
            },
            Delivery::TimedOut => TickOutcome::Skipped(SkipReason::NoData),
            Delivery::Closed => TickOutcome::Disconnected,
        }
    }

    fn channel_id(&self, number: usize) -> Result<ChannelId, SelectionError> {
        ChannelId::new(number, self.decoder.layout().channels)
    }

    fn rebuild(&mut self) {
        self.view = ActiveView::build(self.mode, &self.selection, self.window.capacity);
    }

    fn apply(&mut self, packet: &Packet) -> TickOutcome {
        let filter = &self.filter;
        let series = match &mut self.view {
            ActiveView::Individual { buffer } => {
                let Some(channel) = self.selection.first() else {
                    return TickOutcome::Skipped(SkipReason::NoSelection);
                };
                buffer.append(channel_samples(packet, channel));
                vec![Series {
                    label: SeriesLabel::Channel { channel },
                    values: filter.apply(buffer.snapshot()),
                }]
            }
            ActiveView::Differential { buffer } => {
                let Some((minuend, subtrahend)) = self.selection.pair() else {
                    return TickOutcome::Skipped(SkipReason::IncompletePair {
                        selected: self.selection.len(),
                    });
                };
                let a: Vec<f32> = channel_samples(packet, minuend).collect();
                let b: Vec<f32> = channel_samples(packet, subtrahend).collect();
                let Ok(diff) = dsp::difference(&a, &b) else {
                    return TickOutcome::Skipped(SkipReason::NoData);
                };
                buffer.append(diff);
                vec![Series {
                    label: SeriesLabel::Difference {
                        minuend,
                        subtrahend,
                    },
                    values: filter.apply(buffer.snapshot()),
                }]
            }
            ActiveView::Frequency { buffer, analyzer } => {
                let Some(channel) = self.selection.first() else {
                    return TickOutcome::Skipped(SkipReason::NoSelection);
                };
                buffer.append(channel_samples(packet, channel));
                let Ok(magnitudes) = analyzer.magnitudes(&buffer.snapshot()) else {
                    return TickOutcome::Skipped(SkipReason::NoData);
                };
                vec![Series {
                    label: SeriesLabel::Spectrum { channel },
                    values: magnitudes,
                }]
            }
            ActiveView::MultiChannel { buffers } => {
                if buffers.is_empty() {
                    return TickOutcome::Skipped(SkipReason::NoSelection);
                }
                buffers
                    .iter_mut()
                    .map(|(channel, buffer)| {
                        buffer.append(channel_samples(packet, *channel));
                        Series {
                            label: SeriesLabel::Channel { channel: *channel },
                            values: filter.apply(buffer.snapshot()),
                        }
                    })
                    .collect()
            }
        };

        self.emitted += 1;
        TickOutcome::Emitted(ViewFrame {
            sequence: self.emitted,
            mode: self.mode,
            filter: self.filter.kind(),
            axis: self.axis(),
            series,
        })
    }
}

fn channel_samples(packet: &Packet, channel: ChannelId) -> impl Iterator<Item = f32> + '_ {
    packet
        .channel(channel.index())
        .into_iter()
        .flat_map(|row| row.into_iter().copied())
}
