use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Frame counters shared by the renderer pool and its callers.
#[derive(Debug, Default)]
pub struct RenderStats {
    frames_rendered: AtomicU64,
    draw_micros: AtomicU64,
    round_trip_micros: AtomicU64,
}

impl RenderStats {
    /// Time a worker spent rasterizing one frame.
    pub fn record_draw(&self, elapsed: Duration) {
        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
        self.draw_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Submit-to-reply time of one frame as seen by the caller.
    pub fn record_round_trip(&self, elapsed: Duration) {
        self.round_trip_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            draw_time: Duration::from_micros(self.draw_micros.load(Ordering::Relaxed)),
            round_trip_time: Duration::from_micros(self.round_trip_micros.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_rendered: u64,
    pub draw_time: Duration,
    pub round_trip_time: Duration,
}

impl StatsSnapshot {
    /// Counters accumulated since `earlier`.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            frames_rendered: self.frames_rendered.saturating_sub(earlier.frames_rendered),
            draw_time: self.draw_time.saturating_sub(earlier.draw_time),
            round_trip_time: self.round_trip_time.saturating_sub(earlier.round_trip_time),
        }
    }

    pub fn mean_draw_time(&self) -> Duration {
        match u32::try_from(self.frames_rendered) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(frames) => self.draw_time / frames,
        }
    }
}
