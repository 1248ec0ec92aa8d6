//! Touch scrolling and on-screen keyboard layout.

use crate::constants::TOUCH_SCROLL_PX_PER_LINE;

/// What a touch event asks the terminal to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    /// Nothing.
    None,
    /// Scroll by this many lines (negative scrolls up into history).
    Scroll(i32),
    /// Touch ended without moving: focus the terminal.
    Tap,
}

/// Tracks one touch gesture from start to end.
///
/// Scroll distance is always measured from the start position, so a long
/// drag keeps producing scroll steps as the finger moves.
#[derive(Debug, Clone)]
pub struct TouchGesture {
    start_y: Option<f64>,
    scrolled: bool,
    px_per_line: f64,
}

impl TouchGesture {
    /// Gesture tracker scrolling one line per `px_per_line` pixels.
    pub fn new(px_per_line: f64) -> Self {
        Self {
            start_y: None,
            scrolled: false,
            px_per_line: px_per_line.max(1.0),
        }
    }

    /// Finger down.
    pub fn start(&mut self, y: f64) {
        self.start_y = Some(y);
        self.scrolled = false;
    }

    /// Finger moved.
    pub fn moved(&mut self, y: f64) -> TouchOutcome {
        let Some(start) = self.start_y else {
            return TouchOutcome::None;
        };
        let diff = start - y;
        if diff.abs() < f64::EPSILON {
            return TouchOutcome::None;
        }
        self.scrolled = true;
        let lines = (diff.abs() / self.px_per_line).ceil() as i32;
        if diff > 0.0 {
            TouchOutcome::Scroll(-lines)
        } else {
            TouchOutcome::Scroll(lines)
        }
    }

    /// Finger lifted.
    pub fn end(&mut self) -> TouchOutcome {
        let was_active = self.start_y.take().is_some();
        if was_active && !self.scrolled {
            TouchOutcome::Tap
        } else {
            TouchOutcome::None
        }
    }
}

impl Default for TouchGesture {
    fn default() -> Self {
        Self::new(TOUCH_SCROLL_PX_PER_LINE)
    }
}

/// Terminal layout relative to an on-screen keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportLayout {
    /// Full height.
    Full,
    /// Shrunk above a keyboard of this height (pixels).
    KeyboardInset {
        /// Keyboard height in pixels.
        keyboard_height: f64,
    },
}

impl ViewportLayout {
    /// Layout for the given viewport heights.
    ///
    /// A keyboard is assumed when the visible viewport is more than
    /// `threshold_px` shorter than the window.
    pub fn from_heights(window_height: f64, visual_height: f64, threshold_px: f64) -> Self {
        let keyboard_height = window_height - visual_height;
        if keyboard_height > threshold_px {
            Self::KeyboardInset { keyboard_height }
        } else {
            Self::Full
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::KEYBOARD_HEIGHT_THRESHOLD_PX;

    #[test]
    fn upward_drag_scrolls_back_into_history() {
        let mut gesture = TouchGesture::default();
        gesture.start(300.0);
        assert_eq!(gesture.moved(240.0), TouchOutcome::Scroll(-2));
        assert_eq!(gesture.moved(239.0), TouchOutcome::Scroll(-3));
        assert_eq!(gesture.end(), TouchOutcome::None);
    }

    #[test]
    fn downward_drag_scrolls_forward() {
        let mut gesture = TouchGesture::default();
        gesture.start(100.0);
        assert_eq!(gesture.moved(101.0), TouchOutcome::Scroll(1));
        assert_eq!(gesture.moved(100.0), TouchOutcome::None);
    }

    #[test]
    fn tap_without_movement_focuses() {
        let mut gesture = TouchGesture::default();
        gesture.start(50.0);
        assert_eq!(gesture.moved(50.0), TouchOutcome::None);
        assert_eq!(gesture.end(), TouchOutcome::Tap);
        assert_eq!(gesture.end(), TouchOutcome::None);
    }

    #[test]
    fn keyboard_inset_above_threshold() {
        assert_eq!(ViewportLayout::from_heights(800.0, 790.0, KEYBOARD_HEIGHT_THRESHOLD_PX), ViewportLayout::Full);
        assert_eq!(ViewportLayout::from_heights(800.0, 780.0, KEYBOARD_HEIGHT_THRESHOLD_PX), ViewportLayout::Full);
        assert_eq!(
            ViewportLayout::from_heights(800.0, 500.0, KEYBOARD_HEIGHT_THRESHOLD_PX),
            ViewportLayout::KeyboardInset { keyboard_height: 300.0 }
        );
    }
}
