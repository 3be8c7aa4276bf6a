//! Rate limiting for pointer-move bursts.
//!
//! Timestamps are caller-supplied milliseconds (`performance.now()` in the
//! browser) so the throttle works the same on every target and in tests.

/// Trailing-edge throttle: lets at most one value through per interval and
/// always keeps the most recent value of a burst so it can be delivered later.
#[derive(Debug, Clone)]
pub struct TrailingThrottle<T> {
    interval_ms: f64,
    last_emit_ms: Option<f64>,
    pending: Option<T>,
}

impl<T> TrailingThrottle<T> {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms: interval_ms.max(0.0),
            last_emit_ms: None,
            pending: None,
        }
    }

    fn due(&self, now_ms: f64) -> bool {
        match self.last_emit_ms {
            None => true,
            Some(last) => now_ms - last >= self.interval_ms,
        }
    }

    /// Offer a new value. Returns it immediately when the interval has
    /// elapsed, otherwise holds it (replacing any older held value).
    pub fn push(&mut self, value: T, now_ms: f64) -> Option<T> {
        if self.due(now_ms) {
            self.pending = None;
            self.last_emit_ms = Some(now_ms);
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// Release the held value once its interval has elapsed.
    pub fn poll(&mut self, now_ms: f64) -> Option<T> {
        if self.pending.is_some() && self.due(now_ms) {
            self.last_emit_ms = Some(now_ms);
            self.pending.take()
        } else {
            None
        }
    }

    /// Release the held value unconditionally, e.g. when the drag ends.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Forget any held value and timing state.
    pub fn reset(&mut self) {
        self.pending = None;
        self.last_emit_ms = None;
    }
}
