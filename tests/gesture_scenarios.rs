use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, RecvTimeoutError};
use handcursor::config::EngineConfig;
use handcursor::controller::CursorController;
use handcursor::hid::{CommandSink, OutputCommand, RecordingSink, SinkError};
use handcursor::types::*;

const FRAME_MS: u64 = 33;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Mano neutra: cada punta a la altura de su articulación
fn neutral_points() -> Vec<(f32, f32)> {
    let mut points = vec![(0.5, 0.5); NUM_LANDMARKS];
    points[WRIST] = (0.5, 0.7);
    points[MIDDLE_MCP] = (0.5, 0.6);
    let fingers = [
        (THUMB_TIP, THUMB_MCP),
        (INDEX_TIP, INDEX_PIP),
        (MIDDLE_TIP, MIDDLE_PIP),
        (RING_TIP, RING_PIP),
        (PINKY_TIP, PINKY_PIP),
    ];
    for (i, (tip, pip)) in fingers.iter().enumerate() {
        let x = 0.35 + i as f32 * 0.07;
        points[*pip] = (x, 0.5);
        points[*tip] = (x, 0.5);
    }
    points
}

fn frame(points: &[(f32, f32)]) -> LandmarkFrame {
    LandmarkFrame::from_points(points).unwrap()
}

fn neutral() -> LandmarkFrame {
    frame(&neutral_points())
}

/// Puntas arriba (extendido) o abajo (doblado) respecto a su articulación
fn pose(extended: &[usize], curled: &[usize]) -> Vec<(f32, f32)> {
    let mut points = neutral_points();
    let pip_of = |tip: usize| match tip {
        THUMB_TIP => THUMB_MCP,
        INDEX_TIP => INDEX_PIP,
        MIDDLE_TIP => MIDDLE_PIP,
        RING_TIP => RING_PIP,
        _ => PINKY_PIP,
    };
    for &tip in extended {
        let (x, y) = points[pip_of(tip)];
        points[tip] = (x, y - 0.1);
    }
    for &tip in curled {
        let (x, y) = points[pip_of(tip)];
        points[tip] = (x, y + 0.1);
    }
    points
}

/// Pulgar (0.50, 0.50) e índice (0.505, 0.505): distancia ~0.007
fn pinch() -> LandmarkFrame {
    let mut points = neutral_points();
    points[THUMB_TIP] = (0.50, 0.50);
    points[INDEX_TIP] = (0.505, 0.505);
    frame(&points)
}

fn scroll_down() -> LandmarkFrame {
    frame(&pose(&[INDEX_TIP, MIDDLE_TIP], &[RING_TIP]))
}

/// Pose de scroll con el pulgar tocando la punta del índice
fn pinch_and_scroll() -> LandmarkFrame {
    let mut points = pose(&[INDEX_TIP, MIDDLE_TIP], &[RING_TIP]);
    let (ix, iy) = points[INDEX_TIP];
    points[THUMB_TIP] = (ix + 0.01, iy + 0.01);
    frame(&points)
}

fn dictation() -> LandmarkFrame {
    frame(&pose(&[THUMB_TIP, PINKY_TIP], &[INDEX_TIP, MIDDLE_TIP, RING_TIP]))
}

fn right_click() -> LandmarkFrame {
    frame(&pose(&[RING_TIP, PINKY_TIP], &[INDEX_TIP]))
}

fn fist() -> LandmarkFrame {
    let mut points = neutral_points();
    points[WRIST] = (0.5, 0.40);
    points[MIDDLE_MCP] = (0.5, 0.45);
    for tip in [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP] {
        points[tip] = (0.52, 0.43);
    }
    frame(&points)
}

type Timeline = Vec<(Duration, Option<LandmarkFrame>)>;

/// Frames cada 33 ms en [from, to)
fn span(frame: Option<LandmarkFrame>, from_ms: u64, to_ms: u64) -> Timeline {
    (from_ms..to_ms)
        .step_by(FRAME_MS as usize)
        .map(|t| (ms(t), frame.clone()))
        .collect()
}

struct Harness {
    ctrl: CursorController<RecordingSink>,
    sink: RecordingSink,
    t0: Instant,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    fn with_config(config: EngineConfig) -> Self {
        let sink = RecordingSink::new();
        let ctrl = CursorController::new(config, ScreenSize::new(1920, 1080), sink.clone())
            .unwrap();
        Self {
            ctrl,
            sink,
            t0: Instant::now(),
        }
    }

    fn play(&mut self, timeline: Timeline) -> Vec<(Duration, CursorEvent)> {
        let mut out = Vec::new();
        for (offset, frame) in timeline {
            let report = self.ctrl.update(frame.as_ref(), self.t0 + offset);
            out.extend(report.events.into_iter().map(|e| (offset, e)));
        }
        out
    }
}

fn count(events: &[(Duration, CursorEvent)], kind: &str) -> usize {
    events.iter().filter(|(_, e)| e.kind() == kind).count()
}

#[test]
fn scenario_a_short_pinch_is_one_click() {
    let mut h = Harness::new();
    let mut timeline = span(Some(pinch()), 0, 51);
    timeline.extend(span(Some(neutral()), 66, 400));
    let events = h.play(timeline);

    assert_eq!(count(&events, "click"), 1);
    assert_eq!(count(&events, "drag_start"), 0);
    assert_eq!(count(&events, "drag_move"), 0);
    assert_eq!(count(&events, "drag_end"), 0);
    assert!(h.sink.commands().contains(&OutputCommand::Click));
}

#[test]
fn scenario_b_long_pinch_is_one_drag() {
    let mut h = Harness::new();
    let mut timeline = span(Some(pinch()), 0, 500);
    timeline.extend(span(Some(neutral()), 528, 900));
    let events = h.play(timeline);

    assert_eq!(count(&events, "drag_start"), 1);
    assert!(count(&events, "drag_move") >= 1);
    assert_eq!(count(&events, "drag_end"), 1);
    assert_eq!(count(&events, "click"), 0);

    let (started, _) = events
        .iter()
        .find(|(_, e)| *e == CursorEvent::DragStart)
        .unwrap();
    assert!(*started >= ms(250) && *started < ms(300), "{:?}", started);

    let (ended, _) = events
        .iter()
        .find(|(_, e)| *e == CursorEvent::DragEnd)
        .unwrap();
    assert_eq!(*ended, ms(528));

    let commands = h.sink.commands();
    let down = commands.iter().position(|c| *c == OutputCommand::MouseDown).unwrap();
    let up = commands.iter().position(|c| *c == OutputCommand::MouseUp).unwrap();
    assert!(down < up);
}

#[test]
fn tap_and_drag_follow_hold_delay() {
    let config = EngineConfig::default();
    let hold = (config.gestures.drag_hold_delay_secs * 1000.0) as u64;

    let mut h = Harness::with_config(config.clone());
    let mut timeline = span(Some(pinch()), 0, hold / 2 + 1);
    timeline.extend(span(Some(neutral()), hold / 2 + FRAME_MS, 1000));
    let events = h.play(timeline);
    assert_eq!(count(&events, "click"), 1);
    assert_eq!(count(&events, "drag_start") + count(&events, "drag_end"), 0);

    let mut h = Harness::with_config(config);
    let mut timeline = span(Some(pinch()), 0, hold * 3);
    timeline.extend(span(Some(neutral()), hold * 3 + FRAME_MS, 1500));
    let events = h.play(timeline);
    assert_eq!(count(&events, "click"), 0);
    assert_eq!(count(&events, "drag_start"), 1);
    assert!(count(&events, "drag_move") >= 1);
    assert_eq!(count(&events, "drag_end"), 1);
}

#[test]
fn hand_loss_ends_drag_once_and_silences_cursor() {
    let mut h = Harness::new();
    let mut timeline = span(Some(pinch()), 0, 500);
    timeline.extend(span(None, 528, 1200));
    let events = h.play(timeline);

    assert_eq!(count(&events, "drag_start"), 1);
    assert_eq!(count(&events, "drag_end"), 1);
    assert!(!h.ctrl.is_tracking());

    // Durante la ausencia no hay movimiento ni scroll
    let during_loss: Vec<_> = events.iter().filter(|(t, _)| *t >= ms(528)).cloned().collect();
    assert_eq!(count(&during_loss, "move"), 0);
    assert_eq!(count(&during_loss, "drag_move"), 0);
    assert_eq!(count(&during_loss, "scroll_up") + count(&during_loss, "scroll_down"), 0);

    // La pérdida se detecta al superar el timeout, no en el primer frame vacío
    let (ended, _) = during_loss
        .iter()
        .find(|(_, e)| *e == CursorEvent::DragEnd)
        .unwrap();
    assert!(*ended > ms(495 + 300));

    // Al volver la mano el cursor se mueve otra vez y no hay un segundo DragEnd
    let resumed = h.play(span(Some(neutral()), 1300, 1400));
    assert!(count(&resumed, "move") >= 1);
    assert_eq!(count(&resumed, "drag_end"), 0);
    assert!(h.ctrl.is_tracking());
}

#[test]
fn hand_loss_halts_scroll() {
    let mut h = Harness::new();
    let mut timeline = span(Some(scroll_down()), 0, 1000);
    timeline.extend(span(None, 1023, 2000));
    let events = h.play(timeline);

    assert!(count(&events, "scroll_down") > 0);
    assert_eq!(count(&events, "scroll_up"), 0);
    let after_loss = events
        .iter()
        .filter(|(t, e)| *t > ms(990 + 300) && e.kind().starts_with("scroll"))
        .count();
    assert_eq!(after_loss, 0);
}

#[test]
fn scroll_pose_blocks_drag_even_with_pinch() {
    let mut h = Harness::new();
    let mut timeline = span(Some(pinch_and_scroll()), 0, 1000);
    timeline.extend(span(Some(neutral()), 1023, 1500));
    let events = h.play(timeline);

    assert_eq!(count(&events, "drag_start"), 0);
    assert_eq!(count(&events, "click"), 0);
    assert!(count(&events, "scroll_down") > 0);
}

#[test]
fn scroll_goes_quiet_after_release() {
    let mut h = Harness::new();
    let mut timeline = span(Some(scroll_down()), 0, 1000);
    timeline.extend(span(Some(neutral()), 1023, 3000));
    let events = h.play(timeline);

    let late = events
        .iter()
        .filter(|(t, e)| *t > ms(2000) && e.kind().starts_with("scroll"))
        .count();
    assert_eq!(late, 0);
}

#[test]
fn fist_presses_enter_once() {
    let mut h = Harness::new();
    let mut timeline = span(Some(fist()), 0, 700);
    timeline.extend(span(Some(neutral()), 733, 900));
    let events = h.play(timeline);

    let keys: Vec<_> = events
        .iter()
        .filter(|(_, e)| matches!(e, CursorEvent::KeyPress(_)))
        .collect();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].1, CursorEvent::KeyPress("enter".to_string()));
}

#[test]
fn right_click_once_per_pose() {
    let mut h = Harness::new();
    let mut timeline = span(Some(right_click()), 0, 2000);
    timeline.extend(span(Some(neutral()), 2033, 2200));
    let events = h.play(timeline);
    assert_eq!(count(&events, "right_click"), 1);
}

#[test]
fn dictation_toggles_and_stops_on_close() {
    let mut h = Harness::new();
    let mut timeline = span(Some(dictation()), 0, 1500);
    timeline.extend(span(Some(neutral()), 1533, 1700));
    let events = h.play(timeline);
    assert_eq!(count(&events, "dictation_start"), 1);
    assert_eq!(count(&events, "dictation_stop"), 0);

    let report = h.ctrl.close();
    assert_eq!(report.events, vec![CursorEvent::DictationStop]);
    assert_eq!(h.sink.commands().last(), Some(&OutputCommand::DictationStop));
}

#[test]
fn calibration_persists_across_hand_loss_by_default() {
    let mut h = Harness::new();
    h.play(span(Some(neutral()), 0, 300));
    h.play(span(None, 333, 1000));
    assert!(h.ctrl.calibration_box().is_some());

    let mut config = EngineConfig::default();
    config.calibration.reset_on_hand_loss = true;
    let mut h = Harness::with_config(config);
    h.play(span(Some(neutral()), 0, 300));
    h.play(span(None, 333, 1000));
    assert!(h.ctrl.calibration_box().is_none());
}

struct BrokenSink;

impl CommandSink for BrokenSink {
    fn send(&mut self, _command: &OutputCommand) -> Result<(), SinkError> {
        Err(SinkError::Disconnected)
    }
}

#[test]
fn failing_sink_does_not_stall_gestures() {
    let mut ctrl =
        CursorController::new(EngineConfig::default(), ScreenSize::new(1280, 720), BrokenSink)
            .unwrap();
    let t0 = Instant::now();
    let mut emitted = 0;
    let mut failures = 0;
    let mut kinds = Vec::new();

    let mut timeline = span(Some(pinch()), 0, 500);
    timeline.extend(span(Some(neutral()), 528, 700));
    for (offset, frame) in timeline {
        let report = ctrl.update(frame.as_ref(), t0 + offset);
        emitted += report.events.len();
        failures += report.delivery_failures;
        kinds.extend(report.events.iter().map(|e| e.kind()));
    }

    assert_eq!(emitted, failures);
    assert!(kinds.contains(&"drag_start"));
    assert!(kinds.contains(&"drag_end"));
}

#[test]
fn dropping_controller_releases_drag() {
    let sink = RecordingSink::new();
    {
        let mut ctrl =
            CursorController::new(EngineConfig::default(), ScreenSize::new(1920, 1080), sink.clone())
                .unwrap();
        let t0 = Instant::now();
        for (offset, frame) in span(Some(pinch()), 0, 400) {
            ctrl.update(frame.as_ref(), t0 + offset);
        }
        assert!(ctrl.gestures().drag_active());
    }
    assert_eq!(sink.commands().last(), Some(&OutputCommand::MouseUp));
    let ups = sink
        .commands()
        .iter()
        .filter(|c| **c == OutputCommand::MouseUp)
        .count();
    assert_eq!(ups, 1);
}

#[test]
fn scroll_ticker_emits_and_stops_on_close() {
    let (tx, rx) = unbounded();
    let mut config = EngineConfig::default();
    config.scroll.cadence_hz = 200.0;
    let mut ctrl = CursorController::with_scroll_ticker(
        config,
        ScreenSize::new(1920, 1080),
        RecordingSink::new(),
        tx,
    )
    .unwrap();

    ctrl.update(Some(&scroll_down()), Instant::now());
    match rx.recv_timeout(Duration::from_secs(2)) {
        Ok(OutputCommand::Scroll(lines)) => assert!(lines < 0),
        other => panic!("unexpected {:?}", other),
    }

    ctrl.close();
    while rx.try_recv().is_ok() {}
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(500)),
        Err(RecvTimeoutError::Disconnected)
    );
}

#[test]
fn replayed_recording_matches_live_run() {
    use handcursor::csv_loader::parse_recording_str;

    let mut csv = String::from("frame,t_ms,landmark,x,y\n");
    let mut idx = 0;
    for t in (0..500).step_by(FRAME_MS as usize) {
        for (i, (x, y)) in pinch().points().iter().map(|p| (p.x, p.y)).enumerate() {
            csv.push_str(&format!("{},{},{},{},{}\n", idx, t, i, x, y));
        }
        idx += 1;
    }
    csv.push_str(&format!("{},{},,,\n", idx, 528));

    let recording = parse_recording_str(&csv).unwrap();
    let mut h = Harness::new();
    let mut kinds = Vec::new();
    for frame in &recording {
        let report = h.ctrl.update_raw(frame.points.as_deref(), h.t0 + frame.offset);
        kinds.extend(report.events.iter().map(|e| e.kind()));
    }
    assert_eq!(kinds.iter().filter(|k| **k == "drag_start").count(), 1);
    // Un frame sin mano dentro del timeout no suelta el drag
    assert!(!kinds.contains(&"drag_end"));
    assert!(h.ctrl.gestures().drag_active());
}
