use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{anyhow, Result};

use snapplate::detect::load_annotator;
use snapplate::{
    Annotator, CameraConfig, CameraSource, ChannelOrder, CloseReason, FixedRateRunner, Frame,
    FrameSource, HeadlessDisplay, LoopDriver, RowOrder, Session, SessionState, Stage, StopHandle,
    TickOutcome, UiEvent,
};

/// Plays back a fixed list of reads and counts releases.
struct ScriptedSource {
    script: VecDeque<Option<Frame>>,
    releases: Rc<Cell<u32>>,
    stop_when_empty: Option<StopHandle>,
    release_error: Option<&'static str>,
}

impl ScriptedSource {
    fn new(script: Vec<Option<Frame>>, releases: Rc<Cell<u32>>) -> Self {
        Self {
            script: script.into(),
            releases,
            stop_when_empty: None,
            release_error: None,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn acquire(&mut self) -> Option<Frame> {
        match self.script.pop_front() {
            Some(read) => read,
            None => {
                if let Some(stop) = &self.stop_when_empty {
                    stop.stop();
                }
                None
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        self.releases.set(self.releases.get() + 1);
        match self.release_error {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Returns a byte-for-byte copy of its input.
struct Passthrough;

impl Annotator for Passthrough {
    fn annotate(&mut self, frame: &Frame) -> Result<Frame> {
        Frame::with_rows(
            frame.as_bytes().to_vec(),
            frame.width(),
            frame.height(),
            frame.order(),
            frame.rows(),
        )
    }
}

/// Fails on every other call, starting with the second.
struct Flaky {
    calls: u32,
}

impl Annotator for Flaky {
    fn annotate(&mut self, frame: &Frame) -> Result<Frame> {
        self.calls += 1;
        if self.calls % 2 == 0 {
            return Err(anyhow!("inference failed on call {}", self.calls));
        }
        Passthrough.annotate(frame)
    }
}

/// Returns a frame of the wrong size.
struct Shrinking;

impl Annotator for Shrinking {
    fn annotate(&mut self, frame: &Frame) -> Result<Frame> {
        Frame::filled(frame.width() / 2, frame.height(), frame.order(), &[0, 0, 0])
    }
}

fn numbered(width: u32, height: u32, seed: u8) -> Frame {
    let len = width as usize * height as usize * 3;
    let data = (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect();
    Frame::new(data, width, height, ChannelOrder::Bgr).expect("valid frame")
}

fn running<A: Annotator>(
    annotator: A,
    script: Vec<Option<Frame>>,
) -> (Session<ScriptedSource, A>, Rc<Cell<u32>>) {
    let releases = Rc::new(Cell::new(0));
    let mut session = Session::new(annotator);
    let source = ScriptedSource::new(script, releases.clone());
    session.start(|| Ok(source)).expect("start session");
    (session, releases)
}

#[test]
fn published_frames_are_flipped_and_swapped_exactly_once() {
    let inputs: Vec<Frame> = (0..3).map(|i| numbered(640, 480, i * 50)).collect();
    let expected: Vec<Vec<u8>> = inputs.iter().map(|f| f.as_bytes().to_vec()).collect();
    let (mut session, _) = running(Passthrough, inputs.into_iter().map(Some).collect());

    for original in &expected {
        assert!(matches!(session.tick(), TickOutcome::Published));
        let image = session.surface().current().expect("image published");
        assert_eq!((image.width, image.height), (640, 480));
        assert_eq!(image.order, ChannelOrder::Rgb);
        assert_eq!(image.rows, RowOrder::BottomUp);
        assert_eq!(image.bytes.len(), 640 * 480 * 3);

        for (x, y) in [(0u32, 0u32), (639, 0), (0, 479), (321, 17), (639, 479)] {
            let at = (y as usize * 640 + x as usize) * 3;
            let bgr = &original[at..at + 3];
            assert_eq!(image.pixel_on_screen(x, y), &[bgr[2], bgr[1], bgr[0]]);
            // Storage row 0 holds the bottom of the picture.
            assert_eq!(image.pixel(x, 479 - y), &[bgr[2], bgr[1], bgr[0]]);
        }
    }
    assert_eq!(session.surface().generation(), 3);
}

#[test]
fn missing_frame_leaves_surface_untouched() {
    let script: Vec<Option<Frame>> = (0..10u8)
        .map(|i| if i == 4 { None } else { Some(numbered(32, 24, i)) })
        .collect();
    let (mut session, _) = running(Passthrough, script);

    let mut generations = Vec::new();
    let mut before_gap = None;
    for tick in 1..=10 {
        if tick == 5 {
            before_gap = session.surface().current().cloned();
            assert!(matches!(session.tick(), TickOutcome::NoFrame));
            assert_eq!(session.surface().current().cloned(), before_gap);
        } else {
            assert!(matches!(session.tick(), TickOutcome::Published));
        }
        generations.push(session.surface().generation());
    }
    assert!(before_gap.is_some());
    assert_eq!(generations, vec![1, 2, 3, 4, 4, 5, 6, 7, 8, 9]);

    let stats = session.stats();
    assert_eq!((stats.ticks, stats.published, stats.no_frame), (10, 9, 1));
}

#[test]
fn publication_happens_only_on_frame_ticks() {
    let script = vec![
        None,
        Some(numbered(16, 8, 1)),
        None,
        None,
        Some(numbered(16, 8, 2)),
    ];
    let (mut session, _) = running(Passthrough, script);
    let mut generations = Vec::new();
    for _ in 0..5 {
        session.tick();
        generations.push(session.surface().generation());
    }
    assert_eq!(generations, vec![0, 1, 1, 1, 2]);
}

#[test]
fn close_releases_once_and_stops_ticking() {
    let (mut session, releases) = running(Passthrough, vec![Some(numbered(8, 8, 0))]);
    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(releases.get(), 1);

    assert!(matches!(session.tick(), TickOutcome::Inactive));
    assert_eq!(session.stats().ticks, 0);
    assert!(session.start(|| Err(anyhow!("unreachable"))).is_err());

    drop(session);
    assert_eq!(releases.get(), 1);
}

#[test]
fn failed_release_still_stops_the_session() {
    let releases = Rc::new(Cell::new(0));
    let mut source = ScriptedSource::new(vec![Some(numbered(8, 8, 0))], releases.clone());
    source.release_error = Some("device busy");
    let mut session = Session::new(Passthrough);
    session.start(|| Ok(source)).expect("start session");

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(matches!(session.tick(), TickOutcome::Inactive));
    assert_eq!(releases.get(), 1);

    drop(session);
    assert_eq!(releases.get(), 1);
}

#[test]
fn dropping_a_running_session_releases_the_source() {
    let (session, releases) = running(Passthrough, Vec::new());
    assert_eq!(session.state(), SessionState::Running);
    drop(session);
    assert_eq!(releases.get(), 1);
}

#[test]
fn failed_open_leaves_session_idle() {
    let mut session: Session<ScriptedSource, Passthrough> = Session::new(Passthrough);
    let err = session
        .start(|| Err(anyhow!("no camera")))
        .expect_err("open failure propagates");
    assert!(err.to_string().contains("no camera"));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(matches!(session.tick(), TickOutcome::Inactive));

    let releases = Rc::new(Cell::new(0));
    let source = ScriptedSource::new(Vec::new(), releases.clone());
    session.start(|| Ok(source)).expect("second attempt");
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.start(|| Err(anyhow!("again"))).is_err());
}

#[test]
fn annotate_failure_skips_only_that_tick() {
    let script = (0..4).map(|i| Some(numbered(12, 12, i))).collect();
    let (mut session, _) = running(Flaky { calls: 0 }, script);

    assert!(matches!(session.tick(), TickOutcome::Published));
    let first = session.surface().current().cloned();
    match session.tick() {
        TickOutcome::Skipped { stage, error } => {
            assert_eq!(stage, Stage::Annotate);
            assert!(error.to_string().contains("inference failed"));
        }
        other => panic!("expected a skipped tick, got {:?}", other),
    }
    assert_eq!(session.surface().current().cloned(), first);
    assert!(matches!(session.tick(), TickOutcome::Published));
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.stats().skipped, 1);
}

#[test]
fn resized_annotator_output_is_rejected() {
    let (mut session, _) = running(Shrinking, vec![Some(numbered(20, 10, 0))]);
    assert!(matches!(
        session.tick(),
        TickOutcome::Skipped {
            stage: Stage::Annotate,
            ..
        }
    ));
    assert!(session.surface().current().is_none());
}

#[test]
fn driver_runs_until_stopped_and_closes_the_session() -> Result<()> {
    let runner = FixedRateRunner::new(240)?;
    let releases = Rc::new(Cell::new(0));
    let mut source = ScriptedSource::new(
        vec![
            Some(numbered(24, 16, 1)),
            Some(numbered(24, 16, 2)),
            None,
            Some(numbered(24, 16, 3)),
        ],
        releases.clone(),
    );
    source.stop_when_empty = Some(runner.stop_handle());
    let mut session = Session::new(Passthrough);
    session.start(|| Ok(source))?;

    let mut driver = LoopDriver::new(session, HeadlessDisplay::new(), runner);
    let report = driver.run()?;

    assert_eq!(report.close_reason, CloseReason::StopRequested);
    assert_eq!(report.final_state, SessionState::Stopped);
    assert_eq!(report.session.ticks, 5);
    assert_eq!(report.session.published, 3);
    assert_eq!(report.session.no_frame, 2);
    assert_eq!(report.presented, 3);
    assert_eq!(driver.display().presented(), 3);
    assert_eq!(releases.get(), 1);

    let shown = driver.display().last().expect("presented image");
    assert_eq!(shown, driver.session().surface().current().expect("published"));
    assert!(serde_json::to_string(&report)?.contains("\"published\":3"));
    Ok(())
}

#[test]
fn driver_stops_when_the_display_closes() -> Result<()> {
    let releases = Rc::new(Cell::new(0));
    let mut session = Session::new(Passthrough);
    let source = ScriptedSource::new(vec![Some(numbered(8, 8, 0))], releases.clone());
    session.start(|| Ok(source))?;

    let mut display = HeadlessDisplay::new();
    display.push_event(UiEvent::Confirm);
    display.push_event(UiEvent::Close);
    let confirmed = Rc::new(Cell::new(0));
    let hook = confirmed.clone();
    let mut driver = LoopDriver::new(session, display, FixedRateRunner::new(30)?)
        .on_confirm(move || hook.set(hook.get() + 1));

    let report = driver.run()?;
    assert_eq!(report.close_reason, CloseReason::DisplayClosed);
    assert_eq!(report.confirmations, 1);
    assert_eq!(confirmed.get(), 1);
    assert_eq!(report.session.ticks, 0);
    assert_eq!(report.final_state, SessionState::Stopped);
    assert_eq!(releases.get(), 1);
    Ok(())
}

#[test]
fn driver_refuses_an_idle_session() -> Result<()> {
    let session: Session<ScriptedSource, Passthrough> = Session::new(Passthrough);
    let mut driver = LoopDriver::new(session, HeadlessDisplay::new(), FixedRateRunner::new(30)?);
    assert!(driver.run().is_err());
    Ok(())
}

#[test]
fn synthetic_camera_and_stub_detector_run_end_to_end() -> Result<()> {
    let annotator = load_annotator("stub://plates")?;
    let mut session = Session::new(annotator);
    session.start(|| {
        CameraSource::open(CameraConfig {
            device: "stub://lot".to_string(),
            width: 160,
            height: 120,
            ..CameraConfig::default()
        })
    })?;

    for _ in 0..3 {
        assert!(matches!(session.tick(), TickOutcome::Published));
    }
    let image = session.surface().current().expect("published");
    assert_eq!(image.bytes.len(), 160 * 120 * 3);
    assert_eq!(image.order, ChannelOrder::Rgb);
    assert!(session.source_healthy());

    session.close();
    assert!(!session.source_healthy());
    Ok(())
}
