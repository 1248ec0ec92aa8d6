//! Auto-follow tracking for scrolling log views.
//!
//! Thresholds are deliberately asymmetric: leaving follow mode requires a
//! run of more than `disable_after` consecutive scroll events away from the
//! bottom, while a single event within `bottom_tolerance_px` of the bottom
//! re-enables it.

use crate::constants::{FOLLOW_BOTTOM_TOLERANCE_PX, FOLLOW_DISABLE_AFTER};

/// Scroll geometry reported by the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPosition {
    /// Offset of the top of the viewport.
    pub scroll_top: f64,
    /// Total content height.
    pub scroll_height: f64,
    /// Viewport height.
    pub client_height: f64,
}

impl ScrollPosition {
    /// Distance between the bottom of the viewport and the end of content.
    pub fn distance_from_bottom(&self) -> f64 {
        (self.scroll_height - self.scroll_top - self.client_height).max(0.0)
    }
}

/// Hysteresis tracker deciding whether new lines scroll into view.
#[derive(Debug, Clone)]
pub struct AutoFollow {
    following: bool,
    away_run: u32,
    disable_after: u32,
    bottom_tolerance_px: f64,
}

impl AutoFollow {
    /// Tracker with explicit thresholds. Starts in follow mode.
    pub fn new(disable_after: u32, bottom_tolerance_px: f64) -> Self {
        Self {
            following: true,
            away_run: 0,
            disable_after,
            bottom_tolerance_px,
        }
    }

    /// Feed one scroll event; returns the resulting follow state.
    pub fn on_scroll(&mut self, position: ScrollPosition) -> bool {
        if position.distance_from_bottom() <= self.bottom_tolerance_px {
            self.away_run = 0;
            self.following = true;
        } else {
            self.away_run = self.away_run.saturating_add(1);
            if self.away_run > self.disable_after {
                self.following = false;
            }
        }
        self.following
    }

    /// Whether the view currently follows new content.
    pub fn is_following(&self) -> bool {
        self.following
    }
}

impl Default for AutoFollow {
    fn default() -> Self {
        Self::new(FOLLOW_DISABLE_AFTER, FOLLOW_BOTTOM_TOLERANCE_PX)
    }
}
