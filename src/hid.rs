use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::CursorEvent;

/// Órdenes para el colaborador de inyección de entrada (y de dictado)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCommand {
    MoveTo(i32, i32),
    Click,
    RightClick,
    MouseDown,
    MouseUp,
    DragTo(i32, i32),
    /// Líneas; positivo = arriba
    Scroll(i32),
    KeyPress(String),
    DictationStart,
    DictationStop,
}

impl From<&CursorEvent> for OutputCommand {
    fn from(event: &CursorEvent) -> Self {
        match event {
            CursorEvent::Move(x, y) => OutputCommand::MoveTo(*x, *y),
            CursorEvent::Click => OutputCommand::Click,
            CursorEvent::RightClick => OutputCommand::RightClick,
            CursorEvent::DragStart => OutputCommand::MouseDown,
            CursorEvent::DragMove(x, y) => OutputCommand::DragTo(*x, *y),
            CursorEvent::DragEnd => OutputCommand::MouseUp,
            CursorEvent::ScrollUp(n) => OutputCommand::Scroll(saturating_lines(*n)),
            CursorEvent::ScrollDown(n) => OutputCommand::Scroll(-saturating_lines(*n)),
            CursorEvent::KeyPress(name) => OutputCommand::KeyPress(name.clone()),
            CursorEvent::DictationStart => OutputCommand::DictationStart,
            CursorEvent::DictationStop => OutputCommand::DictationStop,
        }
    }
}

fn saturating_lines(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Output disconnected")]
    Disconnected,

    #[error("Device error: {0}")]
    Device(String),
}

#[cfg(feature = "uinput")]
impl From<uinput::Error> for SinkError {
    fn from(e: uinput::Error) -> Self {
        SinkError::Device(e.to_string())
    }
}

/// Destino de las órdenes. `send` no debe bloquear el hilo de frames.
pub trait CommandSink {
    fn send(&mut self, command: &OutputCommand) -> Result<(), SinkError>;
}

impl<T: CommandSink + ?Sized> CommandSink for Box<T> {
    fn send(&mut self, command: &OutputCommand) -> Result<(), SinkError> {
        (**self).send(command)
    }
}

/// Guarda todas las órdenes en memoria. Los clones comparten el mismo registro.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    commands: Arc<Mutex<Vec<OutputCommand>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutputCommand>> {
        self.commands.lock().unwrap_or_else(|poisoned| {
            warn!("⚠️  Registro de órdenes envenenado, se recupera");
            poisoned.into_inner()
        })
    }

    pub fn commands(&self) -> Vec<OutputCommand> {
        self.lock().clone()
    }

    pub fn take(&self) -> Vec<OutputCommand> {
        std::mem::take(&mut *self.lock())
    }
}

impl CommandSink for RecordingSink {
    fn send(&mut self, command: &OutputCommand) -> Result<(), SinkError> {
        self.lock().push(command.clone());
        Ok(())
    }
}

/// Solo registra las órdenes (modo --dry-run)
#[derive(Debug, Default)]
pub struct LogSink;

impl CommandSink for LogSink {
    fn send(&mut self, command: &OutputCommand) -> Result<(), SinkError> {
        match command {
            OutputCommand::MoveTo(..) | OutputCommand::DragTo(..) => {
                debug!("🖱️  {:?}", command)
            }
            _ => info!("🎮 {:?}", command),
        }
        Ok(())
    }
}

/// Reenvía las órdenes a otro hilo por un canal crossbeam
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<OutputCommand>,
}

impl ChannelSink {
    pub fn new(tx: Sender<OutputCommand>) -> Self {
        Self { tx }
    }
}

impl CommandSink for ChannelSink {
    fn send(&mut self, command: &OutputCommand) -> Result<(), SinkError> {
        self.tx
            .send(command.clone())
            .map_err(|_| SinkError::Disconnected)
    }
}

#[cfg(feature = "uinput")]
pub use device::HidOutput;

#[cfg(feature = "uinput")]
mod device {
    use std::time::Duration;
    use tracing::info;
    use uinput::device::Device;
    use uinput::event::controller;
    use uinput::event::keyboard;
    use uinput::event::relative;

    use super::{CommandSink, OutputCommand, SinkError};

    /// Ratón y teclado virtuales sobre /dev/uinput.
    ///
    /// uinput solo admite movimiento relativo: `MoveTo` se traduce a un delta
    /// desde la última posición enviada. La primera orden solo fija la referencia.
    pub struct HidOutput {
        dev: Device,
        last: Option<(i32, i32)>,
    }

    impl HidOutput {
        pub fn new() -> Result<Self, uinput::Error> {
            let dev = uinput::default()?
                .name("handcursor-hid")?
                .event(uinput::event::Keyboard::All)?
                .event(uinput::event::Controller::Mouse(controller::Mouse::Left))?
                .event(uinput::event::Controller::Mouse(controller::Mouse::Right))?
                .event(uinput::event::Relative::Position(relative::Position::X))?
                .event(uinput::event::Relative::Position(relative::Position::Y))?
                .event(uinput::event::Relative::Wheel(relative::Wheel::Vertical))?
                .create()?;

            Ok(HidOutput { dev, last: None })
        }

        fn sync(&mut self) -> Result<(), uinput::Error> {
            self.dev.synchronize()
        }

        fn key_tap(&mut self, key: keyboard::Key) -> Result<(), uinput::Error> {
            self.dev.press(&keyboard::Keyboard::Key(key))?;
            self.sync()?;
            std::thread::sleep(Duration::from_millis(10));
            self.dev.release(&keyboard::Keyboard::Key(key))?;
            self.sync()
        }

        fn button(&mut self, button: controller::Mouse, down: bool) -> Result<(), uinput::Error> {
            let control = controller::Controller::Mouse(button);
            if down {
                self.dev.press(&control)?;
            } else {
                self.dev.release(&control)?;
            }
            self.sync()
        }

        fn click(&mut self, button: controller::Mouse) -> Result<(), uinput::Error> {
            self.button(button, true)?;
            std::thread::sleep(Duration::from_millis(10));
            self.button(button, false)
        }

        /// Mueve el cursor hasta (x, y) en relación a la última posición conocida
        fn move_to(&mut self, x: i32, y: i32) -> Result<(), uinput::Error> {
            let previous = self.last.replace((x, y));
            let Some((px, py)) = previous else {
                return Ok(());
            };
            let (dx, dy) = (x - px, y - py);
            if dx == 0 && dy == 0 {
                return Ok(());
            }
            self.dev.send(relative::Position::X, dx)?;
            self.dev.send(relative::Position::Y, dy)?;
            self.sync()
        }

        fn scroll(&mut self, lines: i32) -> Result<(), uinput::Error> {
            self.dev.send(relative::Wheel::Vertical, lines)?;
            self.sync()
        }
    }

    fn key_for(name: &str) -> Option<keyboard::Key> {
        match name {
            "enter" => Some(keyboard::Key::Enter),
            "esc" | "escape" => Some(keyboard::Key::Esc),
            "space" => Some(keyboard::Key::Space),
            "tab" => Some(keyboard::Key::Tab),
            _ => None,
        }
    }

    impl CommandSink for HidOutput {
        fn send(&mut self, command: &OutputCommand) -> Result<(), SinkError> {
            match command {
                OutputCommand::MoveTo(x, y) | OutputCommand::DragTo(x, y) => {
                    self.move_to(*x, *y)?
                }
                OutputCommand::Click => self.click(controller::Mouse::Left)?,
                OutputCommand::RightClick => self.click(controller::Mouse::Right)?,
                OutputCommand::MouseDown => self.button(controller::Mouse::Left, true)?,
                OutputCommand::MouseUp => self.button(controller::Mouse::Left, false)?,
                OutputCommand::Scroll(lines) => self.scroll(*lines)?,
                OutputCommand::KeyPress(name) => {
                    let key = key_for(name)
                        .ok_or_else(|| SinkError::Device(format!("Unknown key '{}'", name)))?;
                    self.key_tap(key)?
                }
                // El dictado lo atiende otro colaborador; aquí solo se anota
                OutputCommand::DictationStart | OutputCommand::DictationStop => {
                    info!("🎙️  {:?}", command)
                }
            }
            Ok(())
        }
    }
}
