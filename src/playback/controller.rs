use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::RgbImage;

use super::{PlaybackState, PlaybackStats, TickOutcome};
use crate::annotate::{annotate, overlay_status};
use crate::config::PlaybackSettings;
use crate::detect::{normalize, DetectorBackend};
use crate::display::{DisplaySink, Status};
use crate::error::PipelineError;
use crate::frame::{fit_to_viewport, Frame};
use crate::ingest::{
    is_supported_video_path, FrameSource, SourceDescriptor, SourceOpener, SourceRead,
};
use crate::labels::LabelTable;
use crate::CONFIDENCE_THRESHOLD;

const THROUGHPUT_WINDOW: Duration = Duration::from_secs(5);

/// Owns one playback session at a time.
///
/// Every operation is synchronous and returns quickly. Work happens in
/// `tick()`, which the host calls once the delay from `take_scheduled_tick()`
/// has elapsed.
pub struct Controller {
    opener: Box<dyn SourceOpener>,
    detector: Box<dyn DetectorBackend>,
    display: Box<dyn DisplaySink>,
    labels: LabelTable,
    settings: PlaybackSettings,
    state: PlaybackState,
    source: Option<Box<dyn FrameSource>>,
    /// Last successfully opened source, for `reset()` after release.
    last_source: Option<SourceDescriptor>,
    loaded: Option<PathBuf>,
    /// Most recent annotated, viewport-sized frame, redrawn while paused.
    held: Option<RgbImage>,
    scheduled: Option<Duration>,
    status: Option<Status>,
    stats: PlaybackStats,
    quit: bool,
    window_started: Instant,
    window_frames: u64,
}

impl Controller {
    pub fn new(
        opener: Box<dyn SourceOpener>,
        detector: Box<dyn DetectorBackend>,
        display: Box<dyn DisplaySink>,
        labels: LabelTable,
        settings: PlaybackSettings,
    ) -> Self {
        Self {
            opener,
            detector,
            display,
            labels,
            settings,
            state: PlaybackState::Stopped,
            source: None,
            last_source: None,
            loaded: None,
            held: None,
            scheduled: None,
            status: None,
            stats: PlaybackStats::default(),
            quit: false,
            window_started: Instant::now(),
            window_frames: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    pub fn source(&self) -> Option<&SourceDescriptor> {
        self.source.as_ref().map(|source| source.descriptor())
    }

    pub fn loaded_file(&self) -> Option<&Path> {
        self.loaded.as_deref()
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Delay before the next tick, if one is wanted. Taking it empties the slot.
    pub fn take_scheduled_tick(&mut self) -> Option<Duration> {
        self.scheduled.take()
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Open camera `index` and start playing. No-op while already playing.
    pub fn start_camera(&mut self, index: u32) -> Result<(), PipelineError> {
        if self.state.is_active() {
            log::debug!("Controller: start camera ignored, already {:?}", self.state);
            return Ok(());
        }
        self.open_source(SourceDescriptor::camera(index))
    }

    /// Open a local file and start playing. No-op while already playing.
    pub fn start_file(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(self.fail(PipelineError::NoSourceLoaded));
        }
        if self.state.is_active() {
            log::debug!("Controller: start file ignored, already {:?}", self.state);
            return Ok(());
        }
        self.open_source(SourceDescriptor::file(path))
    }

    /// Remember a file for a later `start_loaded()`. Nothing is opened yet.
    pub fn load_file(&mut self, path: impl Into<PathBuf>) -> Result<(), PipelineError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(self.fail(PipelineError::NoSourceLoaded));
        }
        let location = path.to_string_lossy();
        let accepted =
            is_supported_video_path(&path) || path.is_dir() || location.starts_with("stub://");
        if !accepted {
            return Err(self.fail(PipelineError::unavailable(
                path.display(),
                "unsupported video type",
            )));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| location.into_owned());
        log::info!("Controller: loaded {}", path.display());
        self.set_status(Status::info(format!("Loaded: {}", name)));
        self.loaded = Some(path);
        Ok(())
    }

    /// Play the file picked by `load_file()`.
    pub fn start_loaded(&mut self) -> Result<(), PipelineError> {
        match self.loaded.clone() {
            Some(path) => self.start_file(path),
            None => Err(self.fail(PipelineError::NoSourceLoaded)),
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Running {
            self.transition(PlaybackState::Paused);
            self.set_status(Status::info("Paused"));
            self.redraw_held();
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.transition(PlaybackState::Running);
            self.set_status(Status::info("Resumed"));
            self.schedule(Duration::ZERO);
        }
    }

    pub fn toggle_pause(&mut self) {
        match self.state {
            PlaybackState::Running => self.pause(),
            PlaybackState::Paused => self.resume(),
            _ => {}
        }
    }

    /// Release the source, forget the loaded file and blank the display.
    /// Valid from any state.
    pub fn stop(&mut self) {
        self.release_source();
        self.loaded = None;
        self.held = None;
        self.scheduled = None;
        self.display.clear();
        self.transition(PlaybackState::Stopped);
        self.set_status(Status::info("Stopped"));
    }

    /// Restart file playback from the first frame.
    ///
    /// While playing, the open source is rewound. After stop or end-of-stream
    /// the last file is reopened. Cameras cannot be reset.
    pub fn reset(&mut self) -> Result<(), PipelineError> {
        if self.state.is_active() {
            let Some(source) = self.source.as_mut() else {
                return Err(self.fail(PipelineError::NoSourceLoaded));
            };
            if !source.descriptor().is_file() {
                return Err(self.fail(PipelineError::ResetUnsupported));
            }
            if let Err(err) = source.rewind() {
                self.stop();
                return Err(self.fail(err));
            }
            self.held = None;
            self.transition(PlaybackState::Running);
            self.set_status(Status::success("Video reset"));
            self.schedule(Duration::ZERO);
            return Ok(());
        }
        match self.last_source.clone() {
            Some(descriptor @ SourceDescriptor::File { .. }) => self.open_source(descriptor),
            Some(SourceDescriptor::Camera { .. }) => Err(self.fail(PipelineError::ResetUnsupported)),
            None => Err(self.fail(PipelineError::NoSourceLoaded)),
        }
    }

    /// Stop and release everything. The host loop exits afterwards.
    pub fn quit(&mut self) {
        self.stop();
        self.quit = true;
        log::info!(
            "Controller: quit after {} frames ({} detector failures)",
            self.stats.frames_processed,
            self.stats.detector_failures
        );
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance playback by one step.
    pub fn tick(&mut self) -> TickOutcome {
        match self.state {
            PlaybackState::Stopped | PlaybackState::Ended => return TickOutcome::Idle,
            PlaybackState::Paused => {
                self.redraw_held();
                self.schedule(self.settings.paused_interval);
                return TickOutcome::Held;
            }
            PlaybackState::Running => {}
        }

        let read = match self.source.as_mut() {
            Some(source) => source.next_frame(),
            None => {
                log::warn!("Controller: running without a source, stopping");
                self.stop();
                return TickOutcome::Idle;
            }
        };
        match read {
            SourceRead::Frame(frame) => self.process(frame),
            SourceRead::Retry => {
                self.stats.camera_retries += 1;
                log::debug!("Controller: {}", PipelineError::TransientReadFailure);
                self.schedule(self.settings.retry_delay);
                TickOutcome::Retry
            }
            SourceRead::EndOfStream => {
                self.finish_stream();
                TickOutcome::Ended
            }
        }
    }

    fn process(&mut self, frame: Frame) -> TickOutcome {
        self.stats.detector_invocations += 1;
        let raw = match self.detector.detect(&frame, CONFIDENCE_THRESHOLD) {
            Ok(raw) => raw,
            Err(err) => {
                self.stats.detector_failures += 1;
                let err = PipelineError::DetectionInvocation(format!("{:#}", err));
                log::warn!("Controller: {} (frame {})", err, frame.sequence());
                self.set_status(Status::error(err.to_string()));
                self.schedule(self.settings.error_backoff);
                return TickOutcome::DetectorFailed;
            }
        };
        if self.status.as_ref().is_some_and(Status::is_error) {
            let playing = self
                .source()
                .map(|descriptor| format!("Playing {}", descriptor))
                .unwrap_or_else(|| "Playing".to_string());
            self.set_status(Status::success(playing));
        }

        let detections = normalize(&raw);
        let annotated = annotate(frame, &detections, &self.labels);
        let image = fit_to_viewport(annotated.into_image(), self.display.viewport());
        self.present(&image);
        self.held = Some(image);

        self.stats.frames_processed += 1;
        self.stats.detections_drawn += detections.len() as u64;
        self.log_throughput();
        self.schedule(self.next_frame_delay());
        TickOutcome::Presented {
            detections: detections.len(),
        }
    }

    fn next_frame_delay(&self) -> Duration {
        if !self.settings.pace_to_source_fps {
            return self.settings.tick_interval;
        }
        self.source
            .as_ref()
            .filter(|source| source.descriptor().is_file())
            .and_then(|source| source.frame_interval())
            .unwrap_or(self.settings.tick_interval)
    }

    fn finish_stream(&mut self) {
        self.release_source();
        self.loaded = None;
        self.held = None;
        self.scheduled = None;
        self.display.clear();
        self.transition(PlaybackState::Ended);
        self.set_status(Status::info(PipelineError::EndOfStream.to_string()));
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn open_source(&mut self, descriptor: SourceDescriptor) -> Result<(), PipelineError> {
        self.release_source();
        self.held = None;
        match self.opener.open(&descriptor) {
            Ok(source) => {
                self.source = Some(source);
                self.last_source = Some(descriptor.clone());
                self.transition(PlaybackState::Running);
                self.set_status(Status::success(format!("Playing {}", descriptor)));
                self.window_started = Instant::now();
                self.window_frames = 0;
                self.schedule(Duration::ZERO);
                Ok(())
            }
            Err(err) => {
                self.scheduled = None;
                self.display.clear();
                self.transition(PlaybackState::Stopped);
                Err(self.fail(err))
            }
        }
    }

    fn release_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            let stats = source.stats();
            source.close();
            log::info!(
                "Controller: released {} ({} frames read, {} failed reads)",
                source.descriptor(),
                stats.frames_read,
                stats.failed_reads
            );
        }
    }

    fn present(&mut self, image: &RgbImage) {
        let result = if self.settings.status_overlay {
            let mut stamped = image.clone();
            overlay_status(&mut stamped, self.state.overlay_label());
            self.display.present(&stamped)
        } else {
            self.display.present(image)
        };
        if let Err(err) = result {
            log::warn!("Controller: display rejected frame: {:#}", err);
        }
    }

    fn redraw_held(&mut self) {
        if let Some(image) = self.held.take() {
            self.present(&image);
            self.held = Some(image);
        }
    }

    fn schedule(&mut self, delay: Duration) {
        self.scheduled = Some(delay);
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.state != next {
            log::info!("Controller: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn set_status(&mut self, status: Status) {
        self.display.show_status(&status);
        self.status = Some(status);
    }

    /// Surface `err` on the status line and hand it back to the caller.
    fn fail(&mut self, err: PipelineError) -> PipelineError {
        log::warn!("Controller: {}", err);
        self.set_status(Status::error(err.to_string()));
        err
    }

    fn log_throughput(&mut self) {
        self.window_frames += 1;
        let elapsed = self.window_started.elapsed();
        if elapsed >= THROUGHPUT_WINDOW {
            log::info!(
                "Controller: {:.1} fps over {:.1}s (frames={}, detections={}, detector failures={})",
                self.window_frames as f64 / elapsed.as_secs_f64(),
                elapsed.as_secs_f64(),
                self.stats.frames_processed,
                self.stats.detections_drawn,
                self.stats.detector_failures
            );
            self.window_started = Instant::now();
            self.window_frames = 0;
        }
    }
}
