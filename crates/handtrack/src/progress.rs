//! Aggregation of progress reports from concurrent downloads.
//!
//! Model files are often fetched in several concurrent chunks or streams, each reporting its own
//! progress. [`ProgressAggregator`] combines them into a single `(received, total)` pair that never
//! decreases.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

/// Combined progress of all streams, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub received: u64,
    /// Sum of the sizes of all streams that have reported at least once.
    pub total: u64,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} bytes", self.received, self.total)
    }
}

type Callback = Box<dyn Fn(Progress) + Send + Sync>;

/// Combines progress reports of several streams and forwards them to a callback.
///
/// This is a cheaply [`Clone`]able handle; all clones share the same state.
#[derive(Clone)]
pub struct ProgressAggregator {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    callback: Callback,
}

#[derive(Default)]
struct State {
    streams: Vec<Stream>,
    combined: Progress,
}

#[derive(Default)]
struct Stream {
    received: u64,
    total: Option<u64>,
}

impl ProgressAggregator {
    /// Creates an aggregator that invokes `callback` with the combined progress after every
    /// report.
    ///
    /// The callback is invoked with an internal lock held, so reports are delivered in order. It
    /// must not report progress itself.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                callback: Box::new(callback),
            }),
        }
    }

    /// Registers a new stream and returns the handle it reports its progress through.
    pub fn stream(&self) -> StreamProgress {
        let mut state = self.shared.state.lock().unwrap();
        state.streams.push(Stream::default());
        StreamProgress {
            shared: self.shared.clone(),
            index: state.streams.len() - 1,
        }
    }

    /// Returns the current combined progress.
    pub fn progress(&self) -> Progress {
        self.shared.state.lock().unwrap().combined
    }
}

impl fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

/// Progress reporting handle of a single stream.
pub struct StreamProgress {
    shared: Arc<Shared>,
    index: usize,
}

impl StreamProgress {
    /// Reports that this stream has received `received` of `total` bytes.
    ///
    /// Only the `total` passed in the first report of a stream is taken into account. A `received`
    /// count lower than a previously reported one is ignored.
    pub fn report(&self, received: u64, total: u64) {
        let mut state = self.shared.state.lock().unwrap();

        let stream = &mut state.streams[self.index];
        stream.received = stream.received.max(received);
        stream.total.get_or_insert(total);

        let received = state.streams.iter().map(|s| s.received).sum::<u64>();
        let total = state.streams.iter().filter_map(|s| s.total).sum::<u64>();
        state.combined = Progress {
            received: state.combined.received.max(received),
            total: state.combined.total.max(total),
        };

        (self.shared.callback)(state.combined);
    }
}
