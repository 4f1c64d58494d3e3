use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Número fijo de landmarks por mano
pub const NUM_LANDMARKS: usize = 21;

/// Margen que se tolera fuera de [0, 1] antes de rechazar un frame
pub const FRAME_BOUNDS_MARGIN: f32 = 0.1;

// Índices anatómicos de los landmarks
pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

/// Punto 2D normalizado
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Interpolación lineal: `t = 0` devuelve `self`, `t = 1` devuelve `other`
    pub fn lerp(self, other: Point, t: f32) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    pub fn clamp_unit(self) -> Point {
        Point::new(self.x.clamp(0.0, 1.0), self.y.clamp(0.0, 1.0))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Invalid landmark count: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("Landmark {index} is not finite")]
    NonFinite { index: usize },

    #[error("Landmark {index} out of bounds: ({x}, {y})")]
    OutOfBounds { index: usize, x: f32, y: f32 },
}

/// Una pose de mano: exactamente 21 puntos con indexado anatómico fijo.
///
/// Solo se construye a través de [`LandmarkFrame::from_points`], así que
/// cualquier valor de este tipo ya está validado y dentro de [0, 1]².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkFrame([Point; NUM_LANDMARKS]);

impl LandmarkFrame {
    /// Valida y construye un frame desde pares (x, y).
    ///
    /// Acepta coordenadas con un margen de [`FRAME_BOUNDS_MARGIN`] fuera de la
    /// imagen (el detector las produce cerca de los bordes) y las recorta a [0, 1].
    pub fn from_points(points: &[(f32, f32)]) -> Result<Self, FrameError> {
        if points.len() != NUM_LANDMARKS {
            return Err(FrameError::WrongLength {
                expected: NUM_LANDMARKS,
                actual: points.len(),
            });
        }

        let lo = -FRAME_BOUNDS_MARGIN;
        let hi = 1.0 + FRAME_BOUNDS_MARGIN;
        let mut landmarks = [Point::default(); NUM_LANDMARKS];

        for (index, &(x, y)) in points.iter().enumerate() {
            if !x.is_finite() || !y.is_finite() {
                return Err(FrameError::NonFinite { index });
            }
            if x < lo || x > hi || y < lo || y > hi {
                return Err(FrameError::OutOfBounds { index, x, y });
            }
            landmarks[index] = Point::new(x, y).clamp_unit();
        }

        Ok(Self(landmarks))
    }

    pub fn point(&self, index: usize) -> Point {
        self.0[index]
    }

    pub fn points(&self) -> &[Point; NUM_LANDMARKS] {
        &self.0
    }

    /// Copia el frame reemplazando un landmark (útil para construir poses)
    pub fn with_point(mut self, index: usize, point: Point) -> Self {
        self.0[index] = point.clamp_unit();
        self
    }
}

/// Tamaño de la pantalla en píxeles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Convierte un punto en unidades de pantalla a píxeles, recortado a la pantalla
    pub fn to_pixels(self, point: Point) -> (i32, i32) {
        let max_x = self.width.saturating_sub(1) as f32;
        let max_y = self.height.saturating_sub(1) as f32;
        let px = (point.x * self.width as f32).round().clamp(0.0, max_x);
        let py = (point.y * self.height as f32).round().clamp(0.0, max_y);
        (px as i32, py as i32)
    }
}

/// Eventos discretos producidos en un frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorEvent {
    Move(i32, i32),
    Click,
    RightClick,
    DragStart,
    DragMove(i32, i32),
    DragEnd,
    ScrollUp(u32),
    ScrollDown(u32),
    KeyPress(String),
    DictationStart,
    DictationStop,
}

impl CursorEvent {
    /// Nombre corto del tipo de evento (para resúmenes y logs)
    pub fn kind(&self) -> &'static str {
        match self {
            CursorEvent::Move(..) => "move",
            CursorEvent::Click => "click",
            CursorEvent::RightClick => "right_click",
            CursorEvent::DragStart => "drag_start",
            CursorEvent::DragMove(..) => "drag_move",
            CursorEvent::DragEnd => "drag_end",
            CursorEvent::ScrollUp(_) => "scroll_up",
            CursorEvent::ScrollDown(_) => "scroll_down",
            CursorEvent::KeyPress(_) => "key_press",
            CursorEvent::DictationStart => "dictation_start",
            CursorEvent::DictationStop => "dictation_stop",
        }
    }
}
