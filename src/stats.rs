//! Streaming statistics

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live counters shared by the steady-state loops
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_captured: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    capture_misses: AtomicU64,
    bytes_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_capture(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_miss(&self) {
        self.capture_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, wire_bytes: usize) {
        self.bytes_sent.fetch_add(wire_bytes as u64, Ordering::Relaxed);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            capture_misses: self.capture_misses.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Frames delivered by the sensor
    pub frames_captured: u64,

    /// Frames written to the connection
    pub frames_sent: u64,

    /// Frames dropped because encoding failed
    pub frames_dropped: u64,

    /// Capture attempts that yielded no frame
    pub capture_misses: u64,

    /// Bytes put on the wire, length prefixes included
    pub bytes_sent: u64,

    /// Non-empty reads from the server
    pub messages_received: u64,

    pub bytes_received: u64,
}

impl StreamStats {
    /// Calculates frame rate based on delta
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let frames_delta = self.frames_sent.saturating_sub(previous.frames_sent);
        frames_delta as f64 / elapsed_secs
    }

    /// Calculates bitrate in kbps based on delta
    pub fn calculate_bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let bytes_delta = self.bytes_sent.saturating_sub(previous.bytes_sent);
        (bytes_delta as f64 * 8.0) / elapsed_secs / 1000.0
    }

    /// Fraction of captured frames that were dropped before sending
    pub fn drop_rate(&self) -> f64 {
        if self.frames_captured == 0 {
            return 0.0;
        }

        self.frames_dropped as f64 / self.frames_captured as f64
    }
}

/// Rates over the frames sent since the window was last reported
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRates {
    pub fps: f64,
    pub bitrate_kbps: f64,
    pub drop_rate: f64,
}

/// Sliding reporting window over successive snapshots
#[derive(Debug)]
pub struct StatsWindow {
    every: u64,
    since: Instant,
    base: StreamStats,
}

impl StatsWindow {
    /// Reports once every `every` sent frames
    pub fn new(every: u64, start: Instant) -> Self {
        Self {
            every: every.max(1),
            since: start,
            base: StreamStats::default(),
        }
    }

    /// Returns rates once the window is full and starts the next one
    pub fn advance(&mut self, now: StreamStats, at: Instant) -> Option<WindowRates> {
        if now.frames_sent < self.base.frames_sent + self.every {
            return None;
        }

        let elapsed = at.saturating_duration_since(self.since).as_secs_f64();
        let rates = WindowRates {
            fps: now.calculate_fps(&self.base, elapsed),
            bitrate_kbps: now.calculate_bitrate_kbps(&self.base, elapsed),
            drop_rate: now.drop_rate(),
        };
        self.base = now;
        self.since = at;
        Some(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_calculate_fps() {
        let prev = StreamStats {
            frames_sent: 100,
            ..Default::default()
        };

        let current = StreamStats {
            frames_sent: 110,
            ..Default::default()
        };

        assert_eq!(current.calculate_fps(&prev, 1.0), 10.0);
        assert_eq!(current.calculate_fps(&prev, 0.0), 0.0);
    }

    #[test]
    fn test_calculate_bitrate() {
        let prev = StreamStats::default();
        let current = StreamStats {
            bytes_sent: 125_000, // 125KB in 1 second = 1000 kbps
            ..Default::default()
        };

        assert_eq!(current.calculate_bitrate_kbps(&prev, 1.0), 1000.0);
    }

    #[test]
    fn test_drop_rate() {
        let stats = StreamStats {
            frames_captured: 40,
            frames_dropped: 4,
            ..Default::default()
        };

        assert_eq!(stats.drop_rate(), 0.1);
        assert_eq!(StreamStats::default().drop_rate(), 0.0);
    }

    #[test]
    fn test_counters() {
        let stats = PipelineStats::new();
        stats.record_capture();
        stats.record_capture();
        stats.record_drop();
        stats.record_capture_miss();
        stats.record_sent(104);
        stats.record_received(12);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_captured, 2);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.capture_misses, 1);
        assert_eq!(snap.frames_sent, 1);
        assert_eq!(snap.bytes_sent, 104);
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.bytes_received, 12);
    }

    #[test]
    fn test_window_reports_once_full() {
        let start = Instant::now();
        let mut window = StatsWindow::new(100, start);

        let partial = StreamStats {
            frames_sent: 99,
            ..Default::default()
        };
        assert_eq!(window.advance(partial, start + Duration::from_secs(1)), None);

        let full = StreamStats {
            frames_captured: 110,
            frames_sent: 100,
            frames_dropped: 11,
            bytes_sent: 250_000,
            ..Default::default()
        };
        let rates = window.advance(full, start + Duration::from_secs(4)).unwrap();
        assert_eq!(rates.fps, 25.0);
        assert_eq!(rates.bitrate_kbps, 500.0);
        assert_eq!(rates.drop_rate, 0.1);

        // Next window is measured from the last report
        let next = StreamStats {
            frames_sent: 200,
            bytes_sent: 250_000,
            ..full
        };
        let rates = window.advance(next, start + Duration::from_secs(6)).unwrap();
        assert_eq!(rates.fps, 50.0);
        assert_eq!(rates.bitrate_kbps, 0.0);
    }
}
