//! Máquina de estados de gestos.
//!
//! Cada canal (click, drag, enter, dictado, scroll y click derecho) es un
//! autómata independiente `Idle → Pending → Active` con su propio cooldown.
//! La única interacción entre canales es la precedencia del scroll sobre el
//! pellizco.

use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::GestureConfig;
use crate::gesture_classifier::GesturePredicates;
use crate::scroll::{lock_slot, ScrollSlot};
use crate::types::CursorEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Pending(Instant),
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureChannel {
    Click,
    Drag,
    Enter,
    Dictation,
    Scroll,
    RightClick,
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    state: ChannelState,
    last_trigger: Option<Instant>,
}

impl Channel {
    fn new() -> Self {
        Self {
            state: ChannelState::Idle,
            last_trigger: None,
        }
    }

    fn cooled_down(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_trigger
            .map_or(true, |t| now.saturating_duration_since(t) >= cooldown)
    }

    fn stamp(&mut self, now: Instant) {
        self.last_trigger = Some(now);
    }
}

pub struct GestureStateMachine {
    config: GestureConfig,
    scroll_speed: f32,
    scroll_slot: ScrollSlot,

    click: Channel,
    drag: Channel,
    enter: Channel,
    dictation: Channel,
    scroll: Channel,
    right_click: Channel,

    /// Sesión de dictado en curso (sobrevive a la pérdida de la mano)
    dictation_since: Option<Instant>,
}

impl GestureStateMachine {
    pub fn new(config: GestureConfig, scroll_speed: f32, scroll_slot: ScrollSlot) -> Self {
        Self {
            config,
            scroll_speed,
            scroll_slot,
            click: Channel::new(),
            drag: Channel::new(),
            enter: Channel::new(),
            dictation: Channel::new(),
            scroll: Channel::new(),
            right_click: Channel::new(),
            dictation_since: None,
        }
    }

    pub fn state(&self, channel: GestureChannel) -> ChannelState {
        match channel {
            GestureChannel::Click => self.click.state,
            GestureChannel::Drag => self.drag.state,
            GestureChannel::Enter => self.enter.state,
            GestureChannel::Dictation => self.dictation.state,
            GestureChannel::Scroll => self.scroll.state,
            GestureChannel::RightClick => self.right_click.state,
        }
    }

    pub fn drag_active(&self) -> bool {
        self.drag.state == ChannelState::Active
    }

    pub fn dictating(&self) -> bool {
        self.dictation_since.is_some()
    }

    /// Procesa los predicados de un frame. `cursor` es la posición filtrada en píxeles.
    pub fn update(
        &mut self,
        predicates: &GesturePredicates,
        now: Instant,
        cursor: (i32, i32),
    ) -> Vec<CursorEvent> {
        let mut events = Vec::new();

        // El scroll tiene prioridad sobre el pellizco
        if predicates.scroll_pose() {
            self.cancel_pinch(&mut events);
        } else {
            self.update_drag(predicates.pinch, now, cursor, &mut events);
        }

        self.update_scroll(predicates);
        self.update_enter(predicates.fist, now, &mut events);
        self.update_dictation(predicates.dictation_pose, now, &mut events);
        self.update_right_click(predicates.right_click_pose, now, &mut events);

        events
    }

    fn update_drag(
        &mut self,
        pinch: bool,
        now: Instant,
        cursor: (i32, i32),
        events: &mut Vec<CursorEvent>,
    ) {
        match (self.drag.state, pinch) {
            (ChannelState::Idle, true) => self.drag.state = ChannelState::Pending(now),
            (ChannelState::Pending(t0), true) => {
                if now.saturating_duration_since(t0) >= self.config.drag_hold_delay() {
                    debug!("✊ Drag iniciado en {:?}", cursor);
                    self.drag.state = ChannelState::Active;
                    self.drag.stamp(now);
                    events.push(CursorEvent::DragStart);
                }
            }
            (ChannelState::Active, true) => events.push(CursorEvent::DragMove(cursor.0, cursor.1)),
            (ChannelState::Pending(_), false) => {
                // Soltado antes del retardo: es un tap
                self.drag.state = ChannelState::Idle;
                self.fire_click(now, events);
            }
            (ChannelState::Active, false) => {
                debug!("🖐️  Drag terminado en {:?}", cursor);
                self.drag.state = ChannelState::Idle;
                events.push(CursorEvent::DragEnd);
            }
            (ChannelState::Idle, false) => {}
        }
    }

    fn fire_click(&mut self, now: Instant, events: &mut Vec<CursorEvent>) {
        if self.click.cooled_down(now, self.config.click_cooldown()) {
            self.click.stamp(now);
            events.push(CursorEvent::Click);
        } else {
            debug!("Click descartado por cooldown");
        }
    }

    /// Descarta un pellizco pendiente y termina un drag activo
    fn cancel_pinch(&mut self, events: &mut Vec<CursorEvent>) {
        if let Some(event) = self.release_drag() {
            events.push(event);
        }
        self.drag.state = ChannelState::Idle;
    }

    fn update_scroll(&mut self, predicates: &GesturePredicates) {
        let velocity = if predicates.scroll_up {
            self.scroll_speed
        } else if predicates.scroll_down {
            -self.scroll_speed
        } else {
            0.0
        };

        let next = if predicates.scroll_pose() {
            ChannelState::Active
        } else {
            ChannelState::Idle
        };
        if next != self.scroll.state {
            debug!("🌀 Scroll {:?} (velocidad {})", next, velocity);
        }
        self.scroll.state = next;

        lock_slot(&self.scroll_slot).velocity = velocity;
    }

    fn update_enter(&mut self, fist: bool, now: Instant, events: &mut Vec<CursorEvent>) {
        if !fist {
            self.enter.state = ChannelState::Idle;
            return;
        }
        match self.enter.state {
            ChannelState::Idle | ChannelState::Active => {
                self.enter.state = ChannelState::Pending(now)
            }
            ChannelState::Pending(t0) => {
                let held = now.saturating_duration_since(t0) >= self.config.enter_hold_time();
                if held && self.enter.cooled_down(now, self.config.enter_cooldown()) {
                    debug!("⏎ Enter");
                    self.enter.stamp(now);
                    self.enter.state = ChannelState::Idle;
                    events.push(CursorEvent::KeyPress("enter".to_string()));
                }
            }
        }
    }

    fn update_dictation(&mut self, pose: bool, now: Instant, events: &mut Vec<CursorEvent>) {
        if let (Some(since), Some(max)) = (self.dictation_since, self.config.dictation_max()) {
            if now.saturating_duration_since(since) >= max {
                debug!("🎙️  Dictado detenido por duración máxima");
                self.dictation_since = None;
                self.dictation.stamp(now);
                events.push(CursorEvent::DictationStop);
            }
        }

        match (self.dictation.state, pose) {
            (ChannelState::Idle, true) => self.dictation.state = ChannelState::Pending(now),
            (ChannelState::Pending(t0), true) => {
                let held = now.saturating_duration_since(t0) >= self.config.dictation_hold_time();
                if held && self.dictation.cooled_down(now, self.config.dictation_cooldown()) {
                    self.dictation.stamp(now);
                    // Enclavado hasta que se suelte la pose
                    self.dictation.state = ChannelState::Active;
                    events.push(self.toggle_dictation(now));
                }
            }
            (ChannelState::Active, true) => {}
            (_, false) => self.dictation.state = ChannelState::Idle,
        }
    }

    fn toggle_dictation(&mut self, now: Instant) -> CursorEvent {
        if self.dictation_since.take().is_some() {
            debug!("🎙️  Dictado detenido");
            CursorEvent::DictationStop
        } else {
            debug!("🎙️  Dictado iniciado");
            self.dictation_since = Some(now);
            CursorEvent::DictationStart
        }
    }

    fn update_right_click(&mut self, pose: bool, now: Instant, events: &mut Vec<CursorEvent>) {
        match (self.right_click.state, pose) {
            (ChannelState::Idle, true) => {
                self.right_click.state = ChannelState::Active;
                if self
                    .right_click
                    .cooled_down(now, self.config.right_click_cooldown())
                {
                    debug!("🖱️  Click derecho");
                    self.right_click.stamp(now);
                    events.push(CursorEvent::RightClick);
                } else {
                    debug!("Click derecho descartado por cooldown");
                }
            }
            (_, false) => self.right_click.state = ChannelState::Idle,
            _ => {}
        }
    }

    /// Termina el drag si está activo y devuelve el `DragEnd` correspondiente
    pub fn release_drag(&mut self) -> Option<CursorEvent> {
        if self.drag_active() {
            debug!("🖐️  Drag liberado a la fuerza");
            self.drag.state = ChannelState::Idle;
            Some(CursorEvent::DragEnd)
        } else {
            None
        }
    }

    /// Vuelve todos los canales a `Idle` conservando cooldowns y la sesión de dictado
    pub fn reset_channels(&mut self) {
        for channel in [
            &mut self.click,
            &mut self.drag,
            &mut self.enter,
            &mut self.dictation,
            &mut self.scroll,
            &mut self.right_click,
        ] {
            channel.state = ChannelState::Idle;
        }
        lock_slot(&self.scroll_slot).velocity = 0.0;
    }

    /// Cierre: suelta el drag y detiene el dictado en curso
    pub fn force_release(&mut self) -> Vec<CursorEvent> {
        let mut events = Vec::new();
        if let Some(event) = self.release_drag() {
            events.push(event);
        }
        if self.dictation_since.take().is_some() {
            debug!("🎙️  Dictado detenido al cerrar");
            events.push(CursorEvent::DictationStop);
        }
        self.reset_channels();
        events
    }
}
