//! The tracking loop.
//!
//! An [`Engine`] alternates between two states:
//!
//! - **Seeking**: no hand is being tracked. The whole frame is fed to the box model, and a crop
//!   window is derived from its output. The landmark model then runs on that crop in the same
//!   tick.
//! - **Tracking**: the crop window derived from the previous frame's landmarks is fed to the
//!   landmark model. Its output yields both the emitted [`TrackResult`] and the crop window for the
//!   next frame.
//!
//! Tracking is lost (and the engine goes back to seeking) when the landmark model's hand presence
//! probability drops below
//! [`EngineConfig::min_hand_presence_probability_threshold`], or when the landmarks are too
//! degenerate to derive a crop window from.

use std::{
    io,
    panic::resume_unwind,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use handtrack_image::{AspectRatio, Image, Resolution};

use crate::{
    config::EngineConfig,
    error::{ConfigError, GeometryError},
    geometry::{
        compute_transform_from_box_output, compute_transform_from_landmark_output,
        TransformDescriptor,
    },
    model::{Model, ModelInput},
    postprocess::{self, TrackResult},
    preprocess::{FramePreprocessor, PaddingMode},
    timer::{FpsCounter, Timer},
};

/// A source of video frames.
///
/// [`FrameSource::next_frame`] is the only point where the tracking loop waits for something
/// other than the models, so it also paces the loop: a camera blocks until it has captured a
/// frame, and [`Paced`] can be used to limit the rate further.
///
/// All frames of a tracking session should have the same resolution. When it changes, the engine
/// starts seeking again.
pub trait FrameSource {
    /// Blocks until the next frame is available.
    ///
    /// Returns `Ok(None)` when there are no more frames.
    fn next_frame(&mut self) -> anyhow::Result<Option<Arc<Image>>>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> anyhow::Result<Option<Arc<Image>>>,
{
    fn next_frame(&mut self) -> anyhow::Result<Option<Arc<Image>>> {
        self()
    }
}

/// A [`FrameSource`] yielding the frames of an iterator.
pub struct IterFrames<I> {
    iter: I,
}

/// Creates a [`FrameSource`] that yields the frames produced by `iter`.
pub fn frames_from_iter<I>(iter: I) -> IterFrames<I::IntoIter>
where
    I: IntoIterator<Item = Arc<Image>>,
{
    IterFrames {
        iter: iter.into_iter(),
    }
}

impl<I: Iterator<Item = Arc<Image>>> FrameSource for IterFrames<I> {
    fn next_frame(&mut self) -> anyhow::Result<Option<Arc<Image>>> {
        Ok(self.iter.next())
    }
}

/// Limits the rate at which frames are taken from a [`FrameSource`].
pub struct Paced<S> {
    source: S,
    interval: Duration,
    next: Option<Instant>,
}

impl<S: FrameSource> Paced<S> {
    /// Wraps `source` so that it yields at most `max_fps` frames per second.
    pub fn new(source: S, max_fps: u32) -> Self {
        Self {
            source,
            interval: Duration::from_secs(1) / max_fps.max(1),
            next: None,
        }
    }
}

impl<S: FrameSource> FrameSource for Paced<S> {
    fn next_frame(&mut self) -> anyhow::Result<Option<Arc<Image>>> {
        if let Some(next) = self.next {
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            }
        }
        self.next = Some(Instant::now() + self.interval);
        self.source.next_frame()
    }
}

/// Signals a tracking loop to stop.
///
/// Cloning the handle yields another handle to the same loop. Stopping is idempotent.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the loop to stop.
    ///
    /// The loop checks for this once per tick, before running any model, and exits without
    /// emitting another result.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Seeking,
    Tracking(TransformDescriptor),
}

/// Tracks a single hand across a sequence of frames.
pub struct Engine {
    config: EngineConfig,
    box_model: Box<dyn Model>,
    landmark_model: Box<dyn Model>,
    preprocessor: FramePreprocessor,
    state: State,
    frame_res: Option<Resolution>,
    t_preprocess: Timer,
    t_box: Timer,
    t_landmark: Timer,
    t_postprocess: Timer,
    fps: FpsCounter,
}

impl Engine {
    /// Creates an engine from a box model, a landmark model and a configuration.
    ///
    /// Returns an error if the configuration is invalid, or if the models do not take input images
    /// of the same, non-empty resolution.
    pub fn new<B, L>(
        box_model: B,
        landmark_model: L,
        config: EngineConfig,
    ) -> Result<Self, ConfigError>
    where
        B: Model + 'static,
        L: Model + 'static,
    {
        config.validate()?;

        let box_res = box_model.input_resolution();
        let landmark_res = landmark_model.input_resolution();
        if box_res != landmark_res {
            return Err(ConfigError::InputResolutionMismatch {
                box_model: box_res,
                landmark_model: landmark_res,
            });
        }
        if box_res.aspect_ratio().is_none() {
            return Err(ConfigError::EmptyInputResolution(box_res));
        }

        log::debug!("creating engine with {box_res} model input, {config:?}");

        Ok(Self {
            config,
            box_model: Box::new(box_model),
            landmark_model: Box::new(landmark_model),
            preprocessor: FramePreprocessor::new(box_res),
            state: State::Seeking,
            frame_res: None,
            t_preprocess: Timer::new("preprocess"),
            t_box: Timer::new("box"),
            t_landmark: Timer::new("landmark"),
            t_postprocess: Timer::new("postprocess"),
            fps: FpsCounter::new("handtrack"),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns whether a hand is currently being tracked.
    pub fn is_tracking(&self) -> bool {
        matches!(self.state, State::Tracking(_))
    }

    /// Returns the crop window that will be used for the next frame, if a hand is being tracked.
    pub fn transform(&self) -> Option<TransformDescriptor> {
        match self.state {
            State::Seeking => None,
            State::Tracking(transform) => Some(transform),
        }
    }

    /// Drops the tracked hand, so that the next tick runs the box model again.
    pub fn reset(&mut self) {
        self.state = State::Seeking;
    }

    /// Returns the profiling timers of the pipeline stages.
    pub fn timers(&self) -> [&Timer; 4] {
        [
            &self.t_preprocess,
            &self.t_box,
            &self.t_landmark,
            &self.t_postprocess,
        ]
    }

    /// Runs the tracking loop on the current thread until `source` runs out of frames or `stop` is
    /// signaled.
    ///
    /// `on_result` is invoked with every result. It is called on the loop's thread, so it should
    /// return quickly.
    ///
    /// Returns an error if `source` or a model fails, or if a model produces output of the wrong
    /// shape.
    pub fn run<S, F>(
        &mut self,
        source: &mut S,
        stop: &StopHandle,
        mut on_result: F,
    ) -> anyhow::Result<()>
    where
        S: FrameSource + ?Sized,
        F: FnMut(TrackResult),
    {
        log::debug!("tracking loop starting");
        loop {
            let Some(frame) = source.next_frame()? else {
                log::debug!("frame source exhausted, tracking loop exiting");
                return Ok(());
            };
            if stop.is_stopped() {
                log::debug!("stop requested, tracking loop exiting");
                return Ok(());
            }

            if let Some(result) = self.track(&frame)? {
                on_result(result);
            }
        }
    }

    /// Runs the tracking loop on a background thread.
    ///
    /// The loop ends when `source` runs out of frames or when it is stopped through the returned
    /// [`TrackingThread`].
    pub fn spawn<S, F>(self, mut source: S, on_result: F) -> io::Result<TrackingThread>
    where
        S: FrameSource + Send + 'static,
        F: FnMut(TrackResult) + Send + 'static,
    {
        let stop = StopHandle::new();
        let handle = thread::Builder::new().name("handtrack".into()).spawn({
            let stop = stop.clone();
            let mut engine = self;
            move || engine.run(&mut source, &stop, on_result)
        })?;

        Ok(TrackingThread {
            stop,
            handle: Some(handle),
        })
    }

    /// Performs a single tracking step on `frame`.
    ///
    /// Returns `Ok(None)` if no hand was found.
    pub fn track(&mut self, frame: &Image) -> anyhow::Result<Option<TrackResult>> {
        let res = frame.resolution();
        if self.frame_res != Some(res) {
            if let Some(old) = self.frame_res {
                log::debug!("frame resolution changed from {old} to {res}, seeking");
            }
            self.frame_res = Some(res);
            self.state = State::Seeking;
        }
        let Some(aspect) = res.aspect_ratio() else {
            anyhow::bail!("cannot track hands in empty {res} frame");
        };

        let result = match self.track_impl(frame, aspect) {
            Ok(result) => result,
            Err(e) => match e.downcast_ref::<GeometryError>() {
                Some(err) if !err.is_contract_violation() => {
                    log::debug!("tracking lost: {err}");
                    self.state = State::Seeking;
                    None
                }
                _ => return Err(e),
            },
        };

        self.fps.tick_with(&[
            &self.t_preprocess,
            &self.t_box,
            &self.t_landmark,
            &self.t_postprocess,
        ]);
        Ok(result)
    }

    fn track_impl(
        &mut self,
        frame: &Image,
        aspect: AspectRatio,
    ) -> anyhow::Result<Option<TrackResult>> {
        let transform = match self.state {
            State::Tracking(transform) => transform,
            State::Seeking => {
                let transform = self.find_hand(frame, aspect)?;
                log::debug!("hand found, tracking");
                self.state = State::Tracking(transform);
                transform
            }
        };

        self.estimate_landmarks(frame, aspect, transform).map(Some)
    }

    /// Runs the box model on the whole frame and returns the crop window for the landmark model.
    fn find_hand(
        &mut self,
        frame: &Image,
        aspect: AspectRatio,
    ) -> anyhow::Result<TransformDescriptor> {
        let guard = self.t_preprocess.start();
        let input = self.preprocessor.preprocess(
            frame,
            &TransformDescriptor::full_frame(),
            PaddingMode::FitAspect,
        )?;
        drop(guard);

        let output = self
            .t_box
            .time(|| self.box_model.infer(ModelInput::Image(input.image)))?;
        log::trace!("box model output: {output:?}");

        let _guard = self.t_postprocess.start();
        let coords =
            postprocess::to_global_coordinates(&input.transform, aspect, &output.coordinates);
        let transform =
            compute_transform_from_box_output(&coords, aspect, self.config.box_slack)?;
        log::trace!("crop from box model: {transform:?}");
        Ok(transform)
    }

    /// Runs the landmark model on the crop window described by `transform`, and updates the state
    /// for the next frame.
    fn estimate_landmarks(
        &mut self,
        frame: &Image,
        aspect: AspectRatio,
        transform: TransformDescriptor,
    ) -> anyhow::Result<TrackResult> {
        let guard = self.t_preprocess.start();
        let input = self
            .preprocessor
            .preprocess(frame, &transform, PaddingMode::Stretch)?;
        drop(guard);

        let output = self
            .t_landmark
            .time(|| self.landmark_model.infer(ModelInput::Image(input.image)))?;
        log::trace!("landmark model output: {output:?}");

        let _guard = self.t_postprocess.start();
        let coords =
            postprocess::to_global_coordinates(&input.transform, aspect, &output.coordinates);

        let next =
            compute_transform_from_landmark_output(&coords, aspect, self.config.landmark_slack);
        if let Err(err) = &next {
            if err.is_contract_violation() {
                return Err(err.clone().into());
            }
        }

        let mut coords = postprocess::apply_padding(self.config.padding, &coords)?;
        if self.config.mirror_x {
            coords = postprocess::mirror_horizontally(&coords);
        }
        if self.config.user_friendly_coordinate_order {
            coords = postprocess::reorder_user_friendly(&coords)?;
        }
        let result = postprocess::assemble_result(coords, &output.classes)?;

        let threshold = self.config.min_hand_presence_probability_threshold;
        self.state = match next {
            Ok(_) if result.is_hand_present_prob < threshold => {
                log::debug!(
                    "hand presence {} below threshold {}, seeking",
                    result.is_hand_present_prob,
                    threshold,
                );
                State::Seeking
            }
            Ok(next) => {
                log::trace!("next crop: {next:?}");
                State::Tracking(next)
            }
            Err(err) => {
                log::debug!("cannot derive next crop ({err}), seeking");
                State::Seeking
            }
        };

        Ok(result)
    }
}

/// Handle to a tracking loop running on a background thread, returned by [`Engine::spawn`].
///
/// Dropping the handle stops the loop and waits for the thread to exit. If the thread has
/// panicked, the panic is propagated to the thread dropping the handle.
pub struct TrackingThread {
    stop: StopHandle,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TrackingThread {
    /// Returns a [`StopHandle`] that can stop the loop from elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Requests the loop to stop, without waiting for it.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Returns whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Waits for the loop to exit and returns its result.
    ///
    /// This does not stop the loop. If the loop panicked, the panic is propagated.
    pub fn join(mut self) -> anyhow::Result<()> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(payload) => resume_unwind(payload),
            },
            None => Ok(()),
        }
    }
}

impl Drop for TrackingThread {
    fn drop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("tracking loop failed: {e:#}"),
                Err(payload) => {
                    if !thread::panicking() {
                        resume_unwind(payload);
                    }
                }
            }
        }
    }
}
