use nalgebra::{SMatrix, SVector};
use std::collections::VecDeque;

use crate::config::{FilterConfig, SmoothingConfig};
use crate::types::Point;

/// Estado [x, y, vx, vy]
type State = SVector<f32, 4>;
type Matrix4 = SMatrix<f32, 4, 4>;
type Matrix2x4 = SMatrix<f32, 2, 4>;
type Matrix4x2 = SMatrix<f32, 4, 2>;
type Matrix2 = SMatrix<f32, 2, 2>;
type Vector2 = SVector<f32, 2>;

/// Estrategia de suavizado intercambiable
pub trait Smoother: Send {
    fn smooth(&mut self, observation: Point) -> Point;

    /// Velocidad estimada (unidades/frame)
    fn velocity(&self) -> Point;

    fn reset(&mut self);
}

/// Media móvil exponencial con alpha fijo
#[derive(Debug, Clone)]
pub struct EmaSmoother {
    alpha: f32,
    prev: Option<Point>,
    velocity: Point,
}

impl EmaSmoother {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            prev: None,
            velocity: Point::default(),
        }
    }
}

impl Smoother for EmaSmoother {
    fn smooth(&mut self, observation: Point) -> Point {
        let next = match self.prev {
            Some(prev) => prev.lerp(observation, self.alpha),
            None => observation,
        };
        self.velocity = match self.prev {
            Some(prev) => Point::new(next.x - prev.x, next.y - prev.y),
            None => Point::default(),
        };
        self.prev = Some(next);
        next
    }

    fn velocity(&self) -> Point {
        self.velocity
    }

    fn reset(&mut self) {
        self.prev = None;
        self.velocity = Point::default();
    }
}

/// Filtro de Kalman de velocidad constante.
///
/// dt = 1 frame; las matrices de transición y observación son fijas. Cada
/// llamada hace predict y luego update con la observación.
#[derive(Debug, Clone)]
pub struct KalmanSmoother {
    state: State,
    covariance: Matrix4,
    process_noise: Matrix4,
    measurement_noise: Matrix2,
    initial_covariance: f32,
    initialized: bool,
}

impl KalmanSmoother {
    pub fn new(process_noise: f32, measurement_noise: f32, initial_covariance: f32) -> Self {
        Self {
            state: State::zeros(),
            covariance: Matrix4::identity() * initial_covariance,
            process_noise: Matrix4::identity() * process_noise,
            measurement_noise: Matrix2::identity() * measurement_noise,
            initial_covariance,
            initialized: false,
        }
    }

    /// ```text
    /// | 1  0  1  0 |
    /// | 0  1  0  1 |
    /// | 0  0  1  0 |
    /// | 0  0  0  1 |
    /// ```
    fn transition_matrix() -> Matrix4 {
        Matrix4::new(
            1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    fn observation_matrix() -> Matrix2x4 {
        Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        )
    }

    fn predict(&mut self) {
        let f = Self::transition_matrix();
        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + self.process_noise;
    }

    fn correct(&mut self, observation: Point) {
        let h = Self::observation_matrix();
        let z = Vector2::new(observation.x, observation.y);

        let innovation = z - h * self.state;
        let s = h * self.covariance * h.transpose() + self.measurement_noise;

        // S es definida positiva mientras R lo sea; si no, se omite la corrección
        let Some(s_inv) = s.try_inverse() else {
            return;
        };
        let k: Matrix4x2 = self.covariance * h.transpose() * s_inv;

        self.state += k * innovation;
        self.covariance = (Matrix4::identity() - k * h) * self.covariance;
    }

    pub fn covariance(&self) -> &Matrix4 {
        &self.covariance
    }
}

impl Smoother for KalmanSmoother {
    fn smooth(&mut self, observation: Point) -> Point {
        if !self.initialized {
            // Sembrar con la primera medida evita arrastrar el cursor desde el origen
            self.state = State::new(observation.x, observation.y, 0.0, 0.0);
            self.initialized = true;
            return observation;
        }

        self.predict();
        self.correct(observation);
        Point::new(self.state[0], self.state[1])
    }

    fn velocity(&self) -> Point {
        Point::new(self.state[2], self.state[3])
    }

    fn reset(&mut self) {
        self.state = State::zeros();
        self.covariance = Matrix4::identity() * self.initial_covariance;
        self.initialized = false;
    }
}

impl SmoothingConfig {
    pub fn build(&self) -> Box<dyn Smoother> {
        match *self {
            SmoothingConfig::Ema { alpha } => Box::new(EmaSmoother::new(alpha)),
            SmoothingConfig::Kalman {
                process_noise,
                measurement_noise,
                initial_covariance,
            } => Box::new(KalmanSmoother::new(
                process_noise,
                measurement_noise,
                initial_covariance,
            )),
        }
    }
}

/// Velocidad a partir de una ventana corta de posiciones crudas
#[derive(Debug, Clone)]
pub struct VelocityEstimator {
    history: VecDeque<Point>,
    window: usize,
}

impl VelocityEstimator {
    pub fn new(window: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(window + 1),
            window: window.max(2),
        }
    }

    /// Añade una posición y devuelve la velocidad media (unidades/frame)
    pub fn push(&mut self, pos: Point) -> f32 {
        self.history.push_back(pos);
        if self.history.len() > self.window {
            self.history.pop_front();
        }
        self.speed()
    }

    pub fn speed(&self) -> f32 {
        match (self.history.front(), self.history.back()) {
            (Some(old), Some(new)) if self.history.len() >= 2 => {
                old.distance(*new) / (self.history.len() - 1) as f32
            }
            _ => 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// Suavizado del cursor con amortiguación adaptativa a la velocidad.
///
/// Por encima de `velocity_threshold` la salida se mezcla con la observación
/// cruda y sigue al objetivo con más ganancia (menos retardo); por debajo solo
/// sigue al valor suavizado con ganancia baja (menos temblor).
pub struct MotionFilter {
    config: FilterConfig,
    smoother: Box<dyn Smoother>,
    velocity: VelocityEstimator,
    output: Option<Point>,
}

impl MotionFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            smoother: config.smoothing.build(),
            velocity: VelocityEstimator::new(config.velocity_window),
            output: None,
            config,
        }
    }

    pub fn smooth(&mut self, observation: Point) -> Point {
        let speed = self.velocity.push(observation);
        let smoothed = self.smoother.smooth(observation);

        let fast = speed > self.config.velocity_threshold;
        let (raw_weight, gain) = if fast {
            (self.config.fast_raw_weight, self.config.fast_gain)
        } else {
            (0.0, self.config.slow_gain)
        };
        let target = smoothed.lerp(observation, raw_weight);

        let next = match self.output {
            Some(prev) => prev.lerp(target, gain),
            None => target,
        };
        self.output = Some(next);
        next
    }

    /// Última posición filtrada
    pub fn position(&self) -> Option<Point> {
        self.output
    }

    pub fn velocity(&self) -> Point {
        self.smoother.velocity()
    }

    pub fn speed(&self) -> f32 {
        self.velocity.speed()
    }

    /// Olvida posición, velocidad, covarianza e historial
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.velocity.clear();
        self.output = None;
    }
}
