//! Scroll continuo con rampa de magnitud.
//!
//! La máquina de gestos escribe la velocidad objetivo en un [`ScrollSlot`]
//! compartido. La rampa lo lee en cada tick de la cadencia, ya sea desde un
//! hilo propio ([`ScrollTicker`]) o en línea desde el controlador.

use crossbeam_channel::{bounded, select, tick, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::ScrollConfig;
use crate::hid::OutputCommand;

/// Máximo de ticks acumulados en una sola llamada en línea
const MAX_CATCH_UP_TICKS: u32 = 120;

/// Velocidad objetivo compartida entre el hilo de frames y la rampa
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollTarget {
    /// Líneas por tick; positivo = arriba
    pub velocity: f32,
    /// Pide a la rampa que descarte la magnitud acumulada
    pub halt: bool,
}

pub type ScrollSlot = Arc<Mutex<ScrollTarget>>;

pub fn new_slot() -> ScrollSlot {
    Arc::new(Mutex::new(ScrollTarget::default()))
}

/// Bloquea el slot recuperando el valor si otro hilo entró en pánico con el lock
pub fn lock_slot(slot: &ScrollSlot) -> MutexGuard<'_, ScrollTarget> {
    slot.lock().unwrap_or_else(|poisoned| {
        warn!("⚠️  Slot de scroll envenenado, se recupera el valor");
        poisoned.into_inner()
    })
}

/// Lee el objetivo y consume la petición de parada
fn take_target(slot: &ScrollSlot) -> ScrollTarget {
    let mut guard = lock_slot(slot);
    let target = *guard;
    guard.halt = false;
    target
}

#[derive(Debug, Clone)]
pub struct ScrollRamp {
    amount: f32,
    ramp_rate: f32,
    period: Duration,
    last_tick: Option<Instant>,
}

impl ScrollRamp {
    pub fn new(config: &ScrollConfig) -> Self {
        Self {
            amount: 0.0,
            ramp_rate: config.ramp_rate,
            period: config.period(),
            last_tick: None,
        }
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    pub fn is_idle(&self) -> bool {
        self.amount == 0.0
    }

    /// Un tick de la cadencia; devuelve las líneas a desplazar (con signo)
    pub fn tick(&mut self, target: f32) -> i32 {
        self.amount += (target - self.amount) * self.ramp_rate;
        if target == 0.0 && self.amount.abs() < 1.0 {
            self.amount = 0.0;
        }
        self.amount.trunc() as i32
    }

    /// Ticks vencidos hasta `now`, sumados en un solo valor
    pub fn advance(&mut self, target: f32, now: Instant) -> i32 {
        let Some(last) = self.last_tick else {
            self.last_tick = Some(now);
            return 0;
        };

        // En reposo no se acumula retraso
        if target == 0.0 && self.is_idle() {
            self.last_tick = Some(now);
            return 0;
        }

        let mut next = last + self.period;
        let mut ticks = 0;
        let mut lines = 0;
        while next <= now && ticks < MAX_CATCH_UP_TICKS {
            lines += self.tick(target);
            self.last_tick = Some(next);
            next += self.period;
            ticks += 1;
        }
        if ticks == MAX_CATCH_UP_TICKS {
            self.last_tick = Some(now);
        }
        lines
    }

    /// Igual que [`advance`](Self::advance) pero leyendo el objetivo del slot
    pub fn advance_from(&mut self, slot: &ScrollSlot, now: Instant) -> i32 {
        let target = take_target(slot);
        if target.halt {
            self.halt();
        }
        self.advance(target.velocity, now)
    }

    pub fn tick_from(&mut self, slot: &ScrollSlot) -> i32 {
        let target = take_target(slot);
        if target.halt {
            self.halt();
        }
        self.tick(target.velocity)
    }

    /// Descarta la magnitud y el reloj de la cadencia
    pub fn halt(&mut self) {
        self.amount = 0.0;
        self.last_tick = None;
    }
}

/// Hilo periódico que aplica la rampa a la cadencia configurada
pub struct ScrollTicker {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ScrollTicker {
    pub fn spawn(slot: ScrollSlot, config: &ScrollConfig, output: Sender<OutputCommand>) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let ticker = tick(config.period());
        let mut ramp = ScrollRamp::new(config);
        let cadence = config.cadence_hz;

        let handle = thread::spawn(move || {
            info!("🌀 Scroll ticker iniciado a {:.0} Hz", cadence);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        let lines = ramp.tick_from(&slot);
                        if lines != 0 && output.send(OutputCommand::Scroll(lines)).is_err() {
                            warn!("⚠️  Salida de scroll desconectada");
                            break;
                        }
                    }
                    recv(shutdown_rx) -> _ => break,
                }
            }
            info!("🌀 Scroll ticker detenido");
        });

        Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Detiene el hilo y espera a que termine. Idempotente.
    pub fn stop(&mut self) {
        // Soltar el sender desconecta el canal y despierta el select!
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("⚠️  El hilo de scroll terminó con pánico");
            }
        }
    }
}

impl Drop for ScrollTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn config() -> ScrollConfig {
        ScrollConfig::default()
    }

    #[test]
    fn ramps_toward_target_speed() {
        let mut ramp = ScrollRamp::new(&config());
        let mut total = 0;
        for _ in 0..200 {
            total += ramp.tick(3.0);
        }
        assert!((ramp.amount() - 3.0).abs() < 1e-3);
        assert!(total > 0);
        // Primeros ticks por debajo de una línea
        let mut fresh = ScrollRamp::new(&config());
        assert_eq!(fresh.tick(3.0), 0);
    }

    #[test]
    fn decays_to_silence_after_release() {
        let mut ramp = ScrollRamp::new(&config());
        for _ in 0..100 {
            ramp.tick(-3.0);
        }
        let mut emitted = Vec::new();
        for _ in 0..100 {
            emitted.push(ramp.tick(0.0));
        }
        assert!(ramp.is_idle());
        assert!(emitted.iter().all(|&l| l <= 0));
        assert!(emitted.iter().rev().take(50).all(|&l| l == 0));
    }

    #[test]
    fn advance_sums_ticks_in_frame() {
        let cfg = config();
        let mut a = ScrollRamp::new(&cfg);
        let mut b = ScrollRamp::new(&cfg);
        let t0 = Instant::now();
        a.advance(3.0, t0);
        b.advance(3.0, t0);

        // 30 Hz de frames contra 60 Hz de cadencia: dos ticks por frame
        let mut by_frame = 0;
        for i in 1..=30u32 {
            by_frame += a.advance(3.0, t0 + Duration::from_millis(34) * i);
        }
        let mut by_tick = 0;
        for _ in 0..b_ticks(&cfg, Duration::from_millis(34) * 30) {
            by_tick += b.tick(3.0);
        }
        assert_eq!(by_frame, by_tick);
    }

    fn b_ticks(cfg: &ScrollConfig, span: Duration) -> u32 {
        (span.as_secs_f64() / cfg.period().as_secs_f64()).floor() as u32
    }

    #[test]
    fn idle_ramp_does_not_build_backlog() {
        let mut ramp = ScrollRamp::new(&config());
        let t0 = Instant::now();
        ramp.advance(0.0, t0);
        assert_eq!(ramp.advance(0.0, t0 + Duration::from_secs(10)), 0);
        // Tras un largo reposo el primer frame no dispara una ráfaga
        let lines = ramp.advance(3.0, t0 + Duration::from_millis(10_020));
        assert_eq!(lines, 0);
    }

    #[test]
    fn halt_from_slot_discards_amount() {
        let slot = new_slot();
        let mut ramp = ScrollRamp::new(&config());
        lock_slot(&slot).velocity = 3.0;
        for _ in 0..50 {
            ramp.tick_from(&slot);
        }
        assert!(ramp.amount() > 1.0);

        *lock_slot(&slot) = ScrollTarget {
            velocity: 0.0,
            halt: true,
        };
        assert_eq!(ramp.tick_from(&slot), 0);
        assert!(ramp.is_idle());
        assert!(!lock_slot(&slot).halt);
    }

    #[test]
    fn ticker_emits_and_stops() {
        let slot = new_slot();
        let (tx, rx) = unbounded();
        let cfg = ScrollConfig {
            cadence_hz: 200.0,
            ..config()
        };
        let mut ticker = ScrollTicker::spawn(slot.clone(), &cfg, tx);
        lock_slot(&slot).velocity = -3.0;

        let command = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        match command {
            OutputCommand::Scroll(lines) => assert!(lines < 0),
            other => panic!("unexpected {:?}", other),
        }

        ticker.stop();
        assert!(!ticker.is_running());
        ticker.stop();
    }
}
