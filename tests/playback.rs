use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::RgbImage;

use helmet_watch::config::{CameraSettings, FileSettings, PlaybackSettings};
use helmet_watch::detect::{RawBox, RawResult, RawValue};
use helmet_watch::ingest::SourceStats;
use helmet_watch::{
    ClassLabelMap, Controller, DetectorBackend, DeviceOpener, DisplaySink, Frame, FrameSource,
    HeadlessDisplay, LabelTable, PipelineError, PlaybackState, SourceDescriptor, SourceOpener,
    SourceRead, Status, TickOutcome,
};

#[derive(Default)]
struct Tally {
    pulls: Cell<u64>,
    closed: Cell<u64>,
    opened: RefCell<Vec<SourceDescriptor>>,
    detected: RefCell<Vec<u64>>,
    presented: RefCell<Vec<(u32, u32)>>,
    cleared: Cell<u64>,
    statuses: RefCell<Vec<Status>>,
}

impl Tally {
    fn bump(cell: &Cell<u64>) {
        cell.set(cell.get() + 1);
    }

    fn detect_calls(&self) -> usize {
        self.detected.borrow().len()
    }
}

#[derive(Clone, Copy)]
enum Step {
    Frame,
    Drop,
}

struct ScriptedSource {
    descriptor: SourceDescriptor,
    template: Vec<Step>,
    script: VecDeque<Step>,
    next_sequence: u64,
    ended: bool,
    tally: Rc<Tally>,
}

impl FrameSource for ScriptedSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn next_frame(&mut self) -> SourceRead {
        Tally::bump(&self.tally.pulls);
        if self.ended {
            return SourceRead::EndOfStream;
        }
        match self.script.pop_front() {
            Some(Step::Frame) => {
                let frame = Frame::new(RgbImage::new(64, 48), self.next_sequence);
                self.next_sequence += 1;
                SourceRead::Frame(frame)
            }
            Some(Step::Drop) => SourceRead::Retry,
            None if self.descriptor.is_file() => {
                self.ended = true;
                SourceRead::EndOfStream
            }
            None => SourceRead::Retry,
        }
    }

    fn rewind(&mut self) -> Result<(), PipelineError> {
        if !self.descriptor.is_file() {
            return Err(PipelineError::ResetUnsupported);
        }
        self.script = self.template.iter().copied().collect();
        self.next_sequence = 0;
        self.ended = false;
        Ok(())
    }

    fn close(&mut self) {
        Tally::bump(&self.tally.closed);
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.next_sequence,
            failed_reads: 0,
        }
    }
}

struct ScriptedOpener {
    tally: Rc<Tally>,
    file_script: Vec<Step>,
    camera_script: Vec<Step>,
}

impl SourceOpener for ScriptedOpener {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<Box<dyn FrameSource>, PipelineError> {
        let template = match descriptor {
            SourceDescriptor::File { path } if path.ends_with("missing.mp4") => {
                return Err(PipelineError::SourceUnavailable {
                    source: path.display().to_string(),
                    reason: "no such file".to_string(),
                });
            }
            SourceDescriptor::File { .. } => self.file_script.clone(),
            SourceDescriptor::Camera { .. } => self.camera_script.clone(),
        };
        self.tally.opened.borrow_mut().push(descriptor.clone());
        Ok(Box::new(ScriptedSource {
            descriptor: descriptor.clone(),
            script: template.iter().copied().collect(),
            template,
            next_sequence: 0,
            ended: false,
            tally: Rc::clone(&self.tally),
        }))
    }
}

struct CountingDetector {
    tally: Rc<Tally>,
    fail_on: Vec<u64>,
    names: Option<ClassLabelMap>,
}

impl DetectorBackend for CountingDetector {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn class_names(&self) -> Option<&ClassLabelMap> {
        self.names.as_ref()
    }

    fn detect(&mut self, frame: &Frame, _confidence_threshold: f32) -> Result<Vec<RawResult>> {
        self.tally.detected.borrow_mut().push(frame.sequence());
        if self.fail_on.contains(&frame.sequence()) {
            return Err(anyhow!("model crashed"));
        }
        Ok(vec![RawResult::with_boxes(vec![
            RawBox {
                xyxy: Some(RawValue::array([4.7, 4.2, 30.9, 40.0])),
                cls: Some(RawValue::wrapped(RawValue::from(1.0_f64))),
                conf: Some(RawValue::from(0.92_f64)),
            },
            RawBox {
                xyxy: Some(RawValue::array([1.0, 2.0])),
                cls: None,
                conf: None,
            },
        ])])
    }
}

struct RecordingDisplay {
    tally: Rc<Tally>,
    viewport: Option<(u32, u32)>,
}

impl DisplaySink for RecordingDisplay {
    fn viewport(&self) -> Option<(u32, u32)> {
        self.viewport
    }

    fn present(&mut self, image: &RgbImage) -> Result<()> {
        self.tally.presented.borrow_mut().push(image.dimensions());
        Ok(())
    }

    fn clear(&mut self) {
        Tally::bump(&self.tally.cleared);
    }

    fn show_status(&mut self, status: &Status) {
        self.tally.statuses.borrow_mut().push(status.clone());
    }
}

struct Harness {
    tally: Rc<Tally>,
    controller: Controller,
}

fn harness(file_script: Vec<Step>, camera_script: Vec<Step>, fail_on: Vec<u64>) -> Harness {
    let tally = Rc::new(Tally::default());
    let opener = ScriptedOpener {
        tally: Rc::clone(&tally),
        file_script,
        camera_script,
    };
    let detector = CountingDetector {
        tally: Rc::clone(&tally),
        fail_on,
        names: None,
    };
    let display = RecordingDisplay {
        tally: Rc::clone(&tally),
        viewport: Some((32, 24)),
    };
    let labels = LabelTable::new(ClassLabelMap::new([(0, "No Helmet"), (1, "Helmet")]), None);
    let controller = Controller::new(
        Box::new(opener),
        Box::new(detector),
        Box::new(display),
        labels,
        PlaybackSettings::default(),
    );
    Harness { tally, controller }
}

fn frames(count: usize) -> Vec<Step> {
    vec![Step::Frame; count]
}

#[test]
fn missing_file_leaves_controller_stopped() {
    let mut h = harness(frames(3), Vec::new(), Vec::new());
    let err = h.controller.start_file("missing.mp4").unwrap_err();
    assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert!(h.controller.status().is_some_and(Status::is_error));
    assert_eq!(h.controller.take_scheduled_tick(), None);
    assert_eq!(h.controller.tick(), TickOutcome::Idle);
    assert_eq!(h.tally.detect_calls(), 0);
}

#[test]
fn missing_file_on_disk_is_source_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller = Controller::new(
        Box::new(DeviceOpener::new(CameraSettings::default(), FileSettings::default())),
        Box::new(CountingDetector {
            tally: Rc::new(Tally::default()),
            fail_on: Vec::new(),
            names: None,
        }),
        Box::new(HeadlessDisplay::new(None)),
        LabelTable::new(ClassLabelMap::new([(0, "Helmet")]), None),
        PlaybackSettings::default(),
    );
    let result = controller.start_file(dir.path().join("missing.mp4"));
    assert!(matches!(result, Err(PipelineError::SourceUnavailable { .. })));
    assert_eq!(controller.state(), PlaybackState::Stopped);
}

#[test]
fn ten_frames_then_end_of_stream() {
    let mut h = harness(frames(10), Vec::new(), Vec::new());
    h.controller.start_file("site.mp4").unwrap();

    let mut presented = 0;
    for _ in 0..20 {
        match h.controller.tick() {
            TickOutcome::Presented { detections } => {
                assert_eq!(detections, 1);
                presented += 1;
            }
            TickOutcome::Ended => break,
            other => panic!("unexpected tick outcome {:?}", other),
        }
    }
    assert_eq!(presented, 10);
    assert_eq!(h.controller.state(), PlaybackState::Ended);
    assert_eq!(h.tally.detect_calls(), 10);
    assert_eq!(h.tally.pulls.get(), 11);
    assert_eq!(h.tally.closed.get(), 1);
    assert!(h.tally.cleared.get() >= 1);
    assert_eq!(
        h.controller.status().map(|s| s.message.as_str()),
        Some("video ended")
    );

    for _ in 0..5 {
        assert_eq!(h.controller.tick(), TickOutcome::Idle);
    }
    assert_eq!(h.tally.pulls.get(), 11);
    assert_eq!(h.controller.stats().frames_processed, 10);
    assert_eq!(h.controller.stats().detections_drawn, 10);
}

#[test]
fn pause_holds_the_frame_and_resume_continues_in_order() {
    let mut h = harness(frames(6), Vec::new(), Vec::new());
    h.controller.start_file("site.mp4").unwrap();
    for _ in 0..3 {
        assert!(matches!(h.controller.tick(), TickOutcome::Presented { .. }));
    }

    h.controller.pause();
    assert_eq!(h.controller.state(), PlaybackState::Paused);
    let pulls_at_pause = h.tally.pulls.get();
    for _ in 0..4 {
        assert_eq!(h.controller.tick(), TickOutcome::Held);
    }
    assert_eq!(h.tally.detect_calls(), 3);
    assert_eq!(h.tally.pulls.get(), pulls_at_pause);
    assert!(h.tally.presented.borrow().len() > 3);

    h.controller.resume();
    assert_eq!(h.controller.take_scheduled_tick(), Some(Duration::ZERO));
    while matches!(h.controller.tick(), TickOutcome::Presented { .. }) {}
    assert_eq!(*h.tally.detected.borrow(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn toggle_pause_flips_between_running_and_paused() {
    let mut h = harness(frames(2), Vec::new(), Vec::new());
    h.controller.toggle_pause();
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    h.controller.start_file("site.mp4").unwrap();
    h.controller.toggle_pause();
    assert_eq!(h.controller.state(), PlaybackState::Paused);
    h.controller.toggle_pause();
    assert_eq!(h.controller.state(), PlaybackState::Running);
}

#[test]
fn camera_read_failure_is_retried() {
    let mut h = harness(Vec::new(), vec![Step::Drop, Step::Drop, Step::Frame], Vec::new());
    h.controller.start_camera(0).unwrap();
    assert_eq!(h.controller.take_scheduled_tick(), Some(Duration::ZERO));

    assert_eq!(h.controller.tick(), TickOutcome::Retry);
    assert_eq!(h.controller.take_scheduled_tick(), Some(Duration::from_millis(100)));
    assert_eq!(h.controller.state(), PlaybackState::Running);
    assert_eq!(h.controller.tick(), TickOutcome::Retry);
    assert!(matches!(h.controller.tick(), TickOutcome::Presented { .. }));
    assert_eq!(h.controller.stats().camera_retries, 2);
    assert_eq!(h.tally.detect_calls(), 1);
}

#[test]
fn stop_during_pending_retry_prevents_processing() {
    let mut h = harness(Vec::new(), vec![Step::Drop, Step::Frame, Step::Frame], Vec::new());
    h.controller.start_camera(0).unwrap();
    assert_eq!(h.controller.tick(), TickOutcome::Retry);
    let pulls = h.tally.pulls.get();

    h.controller.stop();
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert_eq!(h.controller.take_scheduled_tick(), None);
    // The retry tick the host already armed still fires.
    assert_eq!(h.controller.tick(), TickOutcome::Idle);
    assert_eq!(h.tally.pulls.get(), pulls);
    assert_eq!(h.tally.detect_calls(), 0);
    assert_eq!(h.tally.closed.get(), 1);
}

#[test]
fn start_camera_while_running_is_a_no_op() {
    let mut h = harness(Vec::new(), frames(5), Vec::new());
    h.controller.start_camera(0).unwrap();
    h.controller.start_camera(1).unwrap();
    assert_eq!(h.tally.opened.borrow().len(), 1);
    assert_eq!(h.controller.source(), Some(&SourceDescriptor::camera(0)));
}

#[test]
fn opening_a_new_source_releases_the_previous_one() {
    let mut h = harness(frames(3), frames(3), Vec::new());
    h.controller.start_camera(0).unwrap();
    h.controller.stop();
    h.controller.start_file("site.mp4").unwrap();
    assert_eq!(h.tally.closed.get(), 1);
    assert_eq!(h.tally.opened.borrow().len(), 2);
    assert_eq!(h.controller.source(), Some(&SourceDescriptor::file("site.mp4")));
}

#[test]
fn detector_failure_backs_off_and_keeps_playing() {
    let mut h = harness(frames(3), Vec::new(), vec![1]);
    h.controller.start_file("site.mp4").unwrap();
    h.controller.take_scheduled_tick();

    assert!(matches!(h.controller.tick(), TickOutcome::Presented { .. }));
    assert_eq!(h.controller.take_scheduled_tick(), Some(Duration::from_millis(10)));

    assert_eq!(h.controller.tick(), TickOutcome::DetectorFailed);
    assert_eq!(h.controller.take_scheduled_tick(), Some(Duration::from_millis(500)));
    assert_eq!(h.controller.state(), PlaybackState::Running);
    let status = h.controller.status().cloned().unwrap();
    assert!(status.is_error());
    assert!(status.message.contains("model crashed"));

    assert!(matches!(h.controller.tick(), TickOutcome::Presented { .. }));
    assert!(!h.controller.status().unwrap().is_error());
    assert_eq!(h.controller.stats().detector_failures, 1);
    assert_eq!(h.controller.stats().frames_processed, 2);
}

#[test]
fn presented_frames_are_fit_to_the_viewport() {
    let mut h = harness(frames(2), Vec::new(), Vec::new());
    h.controller.start_file("site.mp4").unwrap();
    h.controller.tick();
    assert_eq!(*h.tally.presented.borrow(), vec![(32, 24)]);
}

#[test]
fn reset_rewinds_a_playing_file() {
    let mut h = harness(frames(3), Vec::new(), Vec::new());
    h.controller.start_file("site.mp4").unwrap();
    h.controller.tick();
    h.controller.tick();
    h.controller.pause();

    h.controller.reset().unwrap();
    assert_eq!(h.controller.state(), PlaybackState::Running);
    h.controller.tick();
    assert_eq!(*h.tally.detected.borrow(), vec![0, 1, 0]);
    assert_eq!(h.tally.opened.borrow().len(), 1);
}

#[test]
fn reset_on_camera_is_unsupported() {
    let mut h = harness(Vec::new(), frames(3), Vec::new());
    h.controller.start_camera(0).unwrap();
    assert_eq!(h.controller.reset(), Err(PipelineError::ResetUnsupported));
    assert_eq!(h.controller.state(), PlaybackState::Running);
}

#[test]
fn load_then_start_plays_the_loaded_file() {
    let mut h = harness(frames(1), Vec::new(), Vec::new());
    assert_eq!(h.controller.start_loaded(), Err(PipelineError::NoSourceLoaded));
    h.controller.load_file(PathBuf::from("clips/site.webm")).unwrap();
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    h.controller.start_loaded().unwrap();
    assert_eq!(
        h.tally.opened.borrow().last(),
        Some(&SourceDescriptor::file("clips/site.webm"))
    );
}

#[test]
fn stop_forgets_the_loaded_file_but_reset_still_reopens_it() {
    let mut h = harness(frames(3), Vec::new(), Vec::new());
    h.controller.load_file(PathBuf::from("clips/site.webm")).unwrap();
    h.controller.start_loaded().unwrap();
    h.controller.tick();
    h.controller.stop();
    assert!(h.controller.loaded_file().is_none());
    assert_eq!(h.controller.start_loaded(), Err(PipelineError::NoSourceLoaded));
    assert_eq!(h.tally.opened.borrow().len(), 1);

    h.controller.reset().unwrap();
    assert_eq!(h.controller.state(), PlaybackState::Running);
    assert_eq!(h.tally.opened.borrow().len(), 2);
}

#[test]
fn quit_releases_the_source() {
    let mut h = harness(frames(5), Vec::new(), Vec::new());
    h.controller.start_file("site.mp4").unwrap();
    h.controller.tick();
    h.controller.quit();
    assert!(h.controller.quit_requested());
    assert_eq!(h.controller.state(), PlaybackState::Stopped);
    assert_eq!(h.tally.closed.get(), 1);
    assert!(h.controller.source().is_none());
}

#[test]
fn stub_camera_is_mirrored_and_recovers_from_drops() {
    let camera = CameraSettings {
        device: Some("stub://bench?drop_every=2&width=8&height=4".to_string()),
        ..CameraSettings::default()
    };
    let mut opener = DeviceOpener::new(camera, FileSettings::default());
    let mut source = opener.open(&SourceDescriptor::camera(0)).unwrap();

    let SourceRead::Frame(frame) = source.next_frame() else {
        panic!("first read should produce a frame");
    };
    // Red ramps up left to right before mirroring.
    assert_eq!(frame.image().get_pixel(0, 0)[0], 255);
    assert_eq!(frame.image().get_pixel(7, 0)[0], 0);
    assert!(matches!(source.next_frame(), SourceRead::Retry));
    assert!(matches!(source.next_frame(), SourceRead::Frame(_)));
    assert_eq!(source.stats().failed_reads, 1);
}
