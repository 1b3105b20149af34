//! Performance measurement for the tracking loop.

use std::{
    fmt, mem,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Weight of a new measurement in the running average.
const EMA_ALPHA: f32 = 0.3;

/// A timer that measures and averages the time an operation takes.
///
/// Collected timings are averaged with an exponential moving average, and reset when the timer is
/// displayed using `{}` ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// The current average time in seconds.
    avg: f32,
    /// The number of time measurements that contributed to the current `avg`.
    count: usize,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    /// Returns the number of measurements and their average since the timer was last displayed.
    pub fn average(&self) -> (usize, Duration) {
        let state = self.state.lock().unwrap();
        (state.count, Duration::from_secs_f32(state.avg))
    }

    fn record(&self, duration: Duration) {
        let secs = duration.as_secs_f32();
        let mut state = self.state.lock().unwrap();
        state.avg = if state.count == 0 {
            secs
        } else {
            EMA_ALPHA * secs + (1.0 - EMA_ALPHA) * state.avg
        };
        state.count += 1;
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let State { avg, count } = mem::take(&mut *self.state.lock().unwrap());
        let avg_ms = avg * 1000.0;
        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

/// Counts processed frames and logs the frame rate once per second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS if one second has passed.
    pub fn tick(&mut self) {
        self.tick_with(&[]);
    }

    /// Advances the frame counter by 1 and logs FPS and the averages of `timers` if one second has
    /// passed.
    ///
    /// Logging resets the timers.
    pub fn tick_with(&mut self, timers: &[&Timer]) -> Option<u32> {
        self.frames += 1;
        if self.start.elapsed() < Duration::from_secs(1) {
            return None;
        }

        let fps = mem::take(&mut self.frames);
        self.start = Instant::now();

        let mut extra = String::new();
        for (i, timer) in timers.iter().enumerate() {
            extra += if i == 0 { " (" } else { ", " };
            extra += &timer.to_string();
        }
        if !timers.is_empty() {
            extra.push(')');
        }
        log::debug!("{}: {} FPS{}", self.name, fps, extra);
        Some(fps)
    }
}
