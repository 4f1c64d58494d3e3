//! Caja de calibración adaptativa.
//!
//! Mantiene dos cajas: la objetivo, que crece de inmediato para contener cada
//! punto observado (y se contrae lentamente hacia él), y la de mapeo, que se
//! interpola hacia la objetivo una fracción fija por frame para evitar saltos.

use crate::config::CalibrationConfig;
use crate::types::Point;

/// Divisor mínimo al normalizar
const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationBox {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl CalibrationBox {
    fn around(point: Point) -> Self {
        Self {
            min_x: point.x,
            max_x: point.x,
            min_y: point.y,
            max_y: point.y,
        }
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    fn include(&mut self, point: Point) {
        self.min_x = self.min_x.min(point.x);
        self.max_x = self.max_x.max(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_y = self.max_y.max(point.y);
    }

    /// Acerca cada borde al punto sin llegar a dejarlo fuera
    fn contract_toward(&mut self, point: Point, step: f32) {
        self.min_x = (self.min_x + step).min(point.x);
        self.max_x = (self.max_x - step).max(point.x);
        self.min_y = (self.min_y + step).min(point.y);
        self.max_y = (self.max_y - step).max(point.y);
    }

    fn approach(&mut self, target: &CalibrationBox, rate: f32) {
        self.min_x += (target.min_x - self.min_x) * rate;
        self.max_x += (target.max_x - self.max_x) * rate;
        self.min_y += (target.min_y - self.min_y) * rate;
        self.max_y += (target.max_y - self.max_y) * rate;
    }

    /// Impone el tamaño mínimo centrado y mantiene la caja dentro de [0, 1].
    ///
    /// Si la caja mínima se sale de [0, 1] se desplaza en lugar de recortarse,
    /// así el tamaño mínimo se conserva también junto a los bordes.
    fn enforce(&mut self, min_size: f32) {
        (self.min_x, self.max_x) = fit_axis(self.min_x, self.max_x, min_size);
        (self.min_y, self.max_y) = fit_axis(self.min_y, self.max_y, min_size);
    }

    fn normalize(&self, point: Point) -> Point {
        Point::new(
            (point.x - self.min_x) / self.width().max(EPSILON),
            (point.y - self.min_y) / self.height().max(EPSILON),
        )
        .clamp_unit()
    }
}

fn fit_axis(mut lo: f32, mut hi: f32, min_size: f32) -> (f32, f32) {
    if hi - lo < min_size {
        let center = (lo + hi) / 2.0;
        lo = center - min_size / 2.0;
        hi = center + min_size / 2.0;
    }
    if lo < 0.0 {
        hi -= lo;
        lo = 0.0;
    }
    if hi > 1.0 {
        lo -= hi - 1.0;
        hi = 1.0;
    }
    (lo.max(0.0), hi.min(1.0))
}

#[derive(Debug, Clone)]
pub struct AdaptiveCalibrator {
    config: CalibrationConfig,
    target: Option<CalibrationBox>,
    current: Option<CalibrationBox>,
}

impl AdaptiveCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            target: None,
            current: None,
        }
    }

    /// Incorpora un punto crudo y devuelve su posición calibrada en [0, 1]²
    pub fn update(&mut self, point: Point) -> Point {
        let point = point.clamp_unit();
        let min_size = self.config.min_size;

        let (target, current) = match (self.target, self.current) {
            (Some(mut target), Some(mut current)) => {
                target.contract_toward(point, self.config.decay);
                target.include(point);
                target.enforce(min_size);
                target.include(point);

                current.approach(&target, self.config.interpolation_rate);
                current.enforce(min_size);
                (target, current)
            }
            _ => {
                // El primer punto siembra la caja tal cual
                let mut seeded = CalibrationBox::around(point);
                seeded.enforce(min_size);
                seeded.include(point);
                (seeded, seeded)
            }
        };

        self.target = Some(target);
        self.current = Some(current);
        current.normalize(point)
    }

    /// Caja que contiene todos los puntos observados
    pub fn calibration_box(&self) -> Option<CalibrationBox> {
        self.target
    }

    /// Caja interpolada que se usa para normalizar
    pub fn mapping_box(&self) -> Option<CalibrationBox> {
        self.current
    }

    pub fn reset(&mut self) {
        self.target = None;
        self.current = None;
    }
}
