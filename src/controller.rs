//! Orquestador por frame.
//!
//! Une clasificador, calibración, remapeo, filtro y máquina de gestos; aplica
//! la política de pérdida de mano y entrega los eventos al [`CommandSink`].

use crossbeam_channel::Sender;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::calibration::{AdaptiveCalibrator, CalibrationBox};
use crate::config::{ConfigError, EngineConfig};
use crate::gesture_classifier::GestureClassifier;
use crate::gesture_state::GestureStateMachine;
use crate::hid::{CommandSink, OutputCommand};
use crate::mouse_filter::MotionFilter;
use crate::remap::NonlinearRemapper;
use crate::scroll::{lock_slot, new_slot, ScrollRamp, ScrollSlot, ScrollTicker};
use crate::types::{CursorEvent, LandmarkFrame, ScreenSize};

/// Resultado de procesar un frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Eventos emitidos, en orden de entrega
    pub events: Vec<CursorEvent>,
    /// Posición filtrada del cursor en píxeles (None sin mano)
    pub cursor: Option<(i32, i32)>,
    pub delivery_failures: usize,
}

impl FrameReport {
    pub fn count(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }
}

enum ScrollDriver {
    /// La rampa avanza con las marcas de tiempo de los frames
    Inline(ScrollRamp),
    /// La rampa vive en su propio hilo
    Ticker(ScrollTicker),
}

pub struct CursorController<S: CommandSink> {
    config: EngineConfig,
    screen: ScreenSize,
    sink: S,

    classifier: GestureClassifier,
    calibrator: AdaptiveCalibrator,
    remapper: NonlinearRemapper,
    filter: MotionFilter,
    gestures: GestureStateMachine,

    scroll_slot: ScrollSlot,
    scroll: ScrollDriver,

    last_valid: Option<Instant>,
    tracking: bool,
    /// Última posición entregada como Move / DragMove
    last_cursor: Option<(i32, i32)>,
    closed: bool,
}

impl<S: CommandSink> CursorController<S> {
    /// Controlador con la rampa de scroll en línea (determinista)
    pub fn new(config: EngineConfig, screen: ScreenSize, sink: S) -> Result<Self, ConfigError> {
        Self::build(config, screen, sink, None)
    }

    /// Controlador con el scroll en un hilo periódico que escribe en `scroll_output`
    pub fn with_scroll_ticker(
        config: EngineConfig,
        screen: ScreenSize,
        sink: S,
        scroll_output: Sender<OutputCommand>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, screen, sink, Some(scroll_output))
    }

    fn build(
        config: EngineConfig,
        screen: ScreenSize,
        sink: S,
        scroll_output: Option<Sender<OutputCommand>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if screen.width == 0 || screen.height == 0 {
            return Err(ConfigError::Invalid {
                field: "screen",
                reason: format!("{}x{} is not a usable screen", screen.width, screen.height),
            });
        }

        let scroll_slot = new_slot();
        let scroll = match scroll_output {
            Some(output) => {
                ScrollDriver::Ticker(ScrollTicker::spawn(scroll_slot.clone(), &config.scroll, output))
            }
            None => ScrollDriver::Inline(ScrollRamp::new(&config.scroll)),
        };

        info!(
            "✅ Controlador listo ({}x{}, scroll {})",
            screen.width,
            screen.height,
            if matches!(scroll, ScrollDriver::Ticker(_)) {
                "en hilo"
            } else {
                "en línea"
            }
        );

        Ok(Self {
            classifier: GestureClassifier::new(&config.gestures),
            calibrator: AdaptiveCalibrator::new(config.calibration.clone()),
            remapper: NonlinearRemapper::new(config.remap.clone()),
            filter: MotionFilter::new(config.filter.clone()),
            gestures: GestureStateMachine::new(
                config.gestures.clone(),
                config.scroll.speed,
                scroll_slot.clone(),
            ),
            scroll_slot,
            scroll,
            last_valid: None,
            tracking: false,
            last_cursor: None,
            closed: false,
            config,
            screen,
            sink,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn gestures(&self) -> &GestureStateMachine {
        &self.gestures
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn calibration_box(&self) -> Option<CalibrationBox> {
        self.calibrator.calibration_box()
    }

    /// Valida puntos crudos; un frame inválido cuenta como mano ausente
    pub fn update_raw(&mut self, points: Option<&[(f32, f32)]>, now: Instant) -> FrameReport {
        let frame = match points.map(LandmarkFrame::from_points) {
            Some(Ok(frame)) => Some(frame),
            Some(Err(e)) => {
                debug!("Frame descartado: {}", e);
                None
            }
            None => None,
        };
        self.update(frame.as_ref(), now)
    }

    pub fn update(&mut self, frame: Option<&LandmarkFrame>, now: Instant) -> FrameReport {
        if self.closed {
            debug!("Frame ignorado: controlador cerrado");
            return FrameReport::default();
        }

        let mut events = Vec::new();

        // Un hueco mayor que el timeout dispara la pérdida aunque este frame sea válido
        if self.tracking {
            if let Some(last) = self.last_valid {
                let gap = now.saturating_duration_since(last);
                if gap > self.config.tracking.detection_timeout() {
                    self.lose_tracking(&mut events);
                }
            }
        }

        let cursor = match frame {
            Some(frame) => Some(self.process_frame(frame, now, &mut events)),
            None => None,
        };

        self.advance_scroll(now, &mut events);

        let delivery_failures = self.deliver(&events);
        FrameReport {
            events,
            cursor,
            delivery_failures,
        }
    }

    fn process_frame(
        &mut self,
        frame: &LandmarkFrame,
        now: Instant,
        events: &mut Vec<CursorEvent>,
    ) -> (i32, i32) {
        if !self.tracking {
            info!("🖐️  Mano detectada");
            self.tracking = true;
        }
        self.last_valid = Some(now);

        let raw = frame.point(self.config.tracking.cursor_landmark);
        let calibrated = self.calibrator.update(raw);
        let mapped = self.remapper.map(calibrated);
        let smoothed = self.filter.smooth(mapped);
        let pixel = self.screen.to_pixels(smoothed);
        trace!("cursor {:?} -> {:?}", raw, pixel);

        let was_dragging = self.gestures.drag_active();
        if !was_dragging && self.moved_enough(pixel) {
            events.push(CursorEvent::Move(pixel.0, pixel.1));
            self.last_cursor = Some(pixel);
        }

        let predicates = self.classifier.classify(Some(frame));
        let gesture_events = self.gestures.update(&predicates, now, pixel);
        if gesture_events
            .iter()
            .any(|e| matches!(e, CursorEvent::DragMove(..)))
        {
            self.last_cursor = Some(pixel);
        }
        events.extend(gesture_events);

        pixel
    }

    fn moved_enough(&self, pixel: (i32, i32)) -> bool {
        match self.last_cursor {
            None => true,
            Some((x, y)) => {
                let min = self.config.tracking.min_move_px;
                (pixel.0 - x).abs() >= min || (pixel.1 - y).abs() >= min
            }
        }
    }

    fn lose_tracking(&mut self, events: &mut Vec<CursorEvent>) {
        info!("✋ Mano perdida, reiniciando seguimiento");
        if let Some(event) = self.gestures.release_drag() {
            events.push(event);
        }
        self.gestures.reset_channels();
        self.filter.reset();
        self.halt_scroll();
        if self.config.calibration.reset_on_hand_loss {
            self.calibrator.reset();
        }
        self.tracking = false;
        self.last_cursor = None;
    }

    fn halt_scroll(&mut self) {
        {
            let mut target = lock_slot(&self.scroll_slot);
            target.velocity = 0.0;
            target.halt = true;
        }
        if let ScrollDriver::Inline(ramp) = &mut self.scroll {
            ramp.halt();
        }
    }

    fn advance_scroll(&mut self, now: Instant, events: &mut Vec<CursorEvent>) {
        let ScrollDriver::Inline(ramp) = &mut self.scroll else {
            return;
        };
        let lines = ramp.advance_from(&self.scroll_slot, now);
        if !self.tracking {
            return;
        }
        match lines {
            n if n > 0 => events.push(CursorEvent::ScrollUp(n.unsigned_abs())),
            n if n < 0 => events.push(CursorEvent::ScrollDown(n.unsigned_abs())),
            _ => {}
        }
    }

    /// Entrega cada evento por separado; un fallo no impide los siguientes
    fn deliver(&mut self, events: &[CursorEvent]) -> usize {
        let mut failures = 0;
        for event in events {
            let command = OutputCommand::from(event);
            if let Err(e) = self.sink.send(&command) {
                warn!("⚠️  No se pudo entregar {:?}: {}", command, e);
                failures += 1;
            }
        }
        failures
    }

    /// Suelta el drag, detiene el dictado y el hilo de scroll. Idempotente.
    pub fn close(&mut self) -> FrameReport {
        if self.closed {
            return FrameReport::default();
        }
        self.closed = true;

        let events = self.gestures.force_release();
        self.halt_scroll();
        if let ScrollDriver::Ticker(ticker) = &mut self.scroll {
            ticker.stop();
        }
        let delivery_failures = self.deliver(&events);
        info!("👋 Controlador cerrado");

        FrameReport {
            events,
            cursor: None,
            delivery_failures,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<S: CommandSink> Drop for CursorController<S> {
    fn drop(&mut self) {
        self.close();
    }
}
