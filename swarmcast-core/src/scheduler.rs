//! Playback-aware piece priority scheduling.
//!
//! Maps a playback position inside one file onto the swarm's piece grid and
//! raises the priority of the pieces around and ahead of it:
//! 1. High: the playhead piece and the next few pieces (immediate window).
//! 2. Normal: the rest of the look-ahead buffer.
//! 3. Normal: a short prefetch tail past the buffer so the next recompute has
//!    a head start.
//!
//! Everything else stays at the engine default. Priorities are only a hint;
//! the engine still decides which peers deliver what and when.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::SchedulerConfig;
use crate::engine::{PieceIndex, PiecePriority, SwarmHandle};

/// Classification of a piece relative to the current playback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PriorityBand {
    /// Needed for the next moments of playback
    High,
    /// Look-ahead buffer and prefetch tail
    Normal,
    /// Outside the window; left at the engine default
    Deprioritized,
}

impl PriorityBand {
    /// Engine priority written for pieces in this band.
    pub fn engine_priority(self) -> PiecePriority {
        match self {
            PriorityBand::High => PiecePriority::High,
            PriorityBand::Normal => PiecePriority::Normal,
            PriorityBand::Deprioritized => PiecePriority::Default,
        }
    }
}

/// Fixed piece grid of one swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceLayout {
    pub piece_length: u64,
    pub piece_count: u32,
}

impl PieceLayout {
    /// Piece holding an absolute byte offset, clamped to the last piece.
    pub fn piece_at(&self, absolute_offset: u64) -> u32 {
        (absolute_offset / self.piece_length).min(self.last_piece() as u64) as u32
    }

    fn last_piece(&self) -> u32 {
        self.piece_count.saturating_sub(1)
    }
}

/// Where a file's bytes sit inside the swarm's contiguous data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileExtent {
    pub offset: u64,
    pub length: u64,
}

/// Inclusive run of piece indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PieceSpan {
    pub first: u32,
    pub last: u32,
}

impl PieceSpan {
    fn new(first: u32, last: u32) -> Option<Self> {
        (first <= last).then_some(Self { first, last })
    }

    /// Whether the span covers a piece.
    pub fn contains(&self, piece: u32) -> bool {
        (self.first..=self.last).contains(&piece)
    }

    /// Number of pieces in the span, at least one.
    pub fn piece_count(&self) -> u32 {
        self.last - self.first + 1
    }

    /// Piece indices covered.
    pub fn indices(&self) -> RangeInclusive<u32> {
        self.first..=self.last
    }
}

/// Piece priority assignment for one playback position.
///
/// The three spans are disjoint, contiguous and ordered: every High piece
/// precedes every Normal piece, which precedes every prefetch piece.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityPlan {
    /// Position inside the file after clamping
    pub position_bytes: u64,
    #[serde(rename = "highPieces")]
    pub high: Option<PieceSpan>,
    #[serde(rename = "normalPieces")]
    pub normal: Option<PieceSpan>,
    #[serde(rename = "prefetchPieces")]
    pub prefetch: Option<PieceSpan>,
}

impl PriorityPlan {
    /// Plan that touches nothing.
    pub fn empty() -> Self {
        Self {
            position_bytes: 0,
            high: None,
            normal: None,
            prefetch: None,
        }
    }

    /// Computes the plan for a position inside a file.
    ///
    /// Out-of-range positions are clamped to the last byte of the file. Empty
    /// files and degenerate layouts yield [`PriorityPlan::empty`].
    pub fn compute(
        layout: PieceLayout,
        file: FileExtent,
        position_bytes: u64,
        config: &SchedulerConfig,
    ) -> Self {
        if file.length == 0 || layout.piece_count == 0 || layout.piece_length == 0 {
            return Self::empty();
        }

        let last_piece = layout.last_piece();
        let position = position_bytes.min(file.length - 1);

        let start_piece = layout.piece_at(file.offset.saturating_add(position));

        let buffer_end_byte = position
            .saturating_add(config.buffer_ahead_bytes)
            .min(file.length);
        let end_piece = file
            .offset
            .saturating_add(buffer_end_byte)
            .div_ceil(layout.piece_length)
            .min(last_piece as u64) as u32;
        let end_piece = end_piece.max(start_piece);

        let immediate_end = start_piece
            .saturating_add(config.immediate_window_pieces)
            .min(end_piece);

        let high = PieceSpan::new(start_piece, immediate_end);
        let normal = PieceSpan::new(immediate_end + 1, end_piece);
        let prefetch = if config.prefetch_tail_pieces == 0 || end_piece >= last_piece {
            None
        } else {
            PieceSpan::new(
                end_piece + 1,
                end_piece
                    .saturating_add(config.prefetch_tail_pieces)
                    .min(last_piece),
            )
        };

        Self {
            position_bytes: position,
            high,
            normal,
            prefetch,
        }
    }

    /// Band a piece falls into under this plan.
    pub fn band_of(&self, piece: u32) -> PriorityBand {
        if self.high.is_some_and(|span| span.contains(piece)) {
            PriorityBand::High
        } else if self.normal.is_some_and(|span| span.contains(piece))
            || self.prefetch.is_some_and(|span| span.contains(piece))
        {
            PriorityBand::Normal
        } else {
            PriorityBand::Deprioritized
        }
    }

    /// Spans paired with their band, in piece order.
    pub fn bands(&self) -> impl Iterator<Item = (PieceSpan, PriorityBand)> + '_ {
        [
            (self.high, PriorityBand::High),
            (self.normal, PriorityBand::Normal),
            (self.prefetch, PriorityBand::Normal),
        ]
        .into_iter()
        .filter_map(|(span, band)| span.map(|span| (span, band)))
    }

    /// Every piece this plan raises above the engine default.
    pub fn raised_pieces(&self) -> impl Iterator<Item = u32> + '_ {
        self.bands().flat_map(|(span, _)| span.indices())
    }

    /// Whether the plan raises nothing.
    pub fn is_empty(&self) -> bool {
        self.high.is_none() && self.normal.is_none() && self.prefetch.is_none()
    }
}

/// Last reported playback position for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackWindow {
    pub file_index: usize,
    pub current_position_bytes: u64,
    pub buffer_ahead_bytes: u64,
    pub last_updated_at: DateTime<Utc>,
}

/// Per-session piece priority scheduler.
///
/// The only component that writes piece priorities for its session. Callers
/// serialize access (the session keeps it behind a mutex), so a recompute is
/// never interleaved with another one.
#[derive(Debug)]
pub struct PriorityScheduler {
    config: SchedulerConfig,
    window: Option<PlaybackWindow>,
    applied: Option<PriorityPlan>,
}

impl PriorityScheduler {
    /// Creates a scheduler that has not written any priorities yet.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            window: None,
            applied: None,
        }
    }

    /// Records a new playback position and recomputes priorities from scratch.
    pub fn update_playback_position(
        &mut self,
        handle: &dyn SwarmHandle,
        layout: PieceLayout,
        file_index: usize,
        file: FileExtent,
        position_bytes: u64,
    ) -> PriorityPlan {
        self.window = Some(PlaybackWindow {
            file_index,
            current_position_bytes: position_bytes.min(file.length.saturating_sub(1)),
            buffer_ahead_bytes: self.config.buffer_ahead_bytes,
            last_updated_at: Utc::now(),
        });
        self.recompute(handle, layout, file, position_bytes)
    }

    /// Rewrites piece priorities for a position.
    ///
    /// Pieces raised by the previous plan that fall outside the new one are
    /// handed back to the engine default, so after this returns the engine's
    /// priority map reflects exactly this plan. Idempotent.
    pub fn recompute(
        &mut self,
        handle: &dyn SwarmHandle,
        layout: PieceLayout,
        file: FileExtent,
        position_bytes: u64,
    ) -> PriorityPlan {
        let plan = PriorityPlan::compute(layout, file, position_bytes, &self.config);

        if let Some(previous) = self.applied.take() {
            for piece in previous.raised_pieces() {
                if plan.band_of(piece) == PriorityBand::Deprioritized {
                    handle.set_piece_priority(PieceIndex::new(piece), PiecePriority::Default);
                }
            }
        }

        for (span, band) in plan.bands() {
            handle.set_priority_range(span.indices(), band.engine_priority());
        }

        tracing::debug!(
            "Recomputed priorities for {} at byte {}: high={:?} normal={:?} prefetch={:?}",
            handle.info_hash(),
            plan.position_bytes,
            plan.high,
            plan.normal,
            plan.prefetch
        );

        self.applied = Some(plan.clone());
        plan
    }

    /// Last recorded playback window.
    pub fn window(&self) -> Option<&PlaybackWindow> {
        self.window.as_ref()
    }

    /// Plan currently reflected in the engine.
    pub fn applied_plan(&self) -> Option<&PriorityPlan> {
        self.applied.as_ref()
    }
}
