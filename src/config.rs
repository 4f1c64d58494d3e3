//! Configuración inmutable del motor.
//!
//! Todos los parámetros de ajuste viven en un único [`EngineConfig`] que se
//! inyecta al construir el controlador. Se puede cargar desde JSON; los campos
//! ausentes toman su valor por defecto.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::types::NUM_LANDMARKS;

/// Tope para cualquier duración configurable
pub const MAX_DURATION_SECS: f32 = 3600.0;

/// Rango admitido para la cadencia del scroll
pub const MIN_CADENCE_HZ: f32 = 1.0;
pub const MAX_CADENCE_HZ: f32 = 1000.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Configuración completa del motor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub calibration: CalibrationConfig,
    pub remap: RemapConfig,
    pub filter: FilterConfig,
    pub gestures: GestureConfig,
    pub scroll: ScrollConfig,
    pub tracking: TrackingConfig,
}

/// Caja de calibración adaptativa
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Tamaño mínimo de la caja por eje (unidades normalizadas)
    pub min_size: f32,
    /// Fracción por frame con la que la caja actual se acerca a la objetivo
    pub interpolation_rate: f32,
    /// Contracción por frame de la caja objetivo hacia el punto observado
    pub decay: f32,
    /// Olvidar la caja cuando se pierde la mano (por defecto persiste toda la sesión)
    pub reset_on_hand_loss: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_size: 0.2,
            interpolation_rate: 0.1,
            decay: 0.0005,
            reset_on_hand_loss: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostSide {
    Below,
    Above,
}

/// Refuerzo multiplicativo para una zona de la pantalla difícil de alcanzar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeBoost {
    pub axis: Axis,
    pub side: BoostSide,
    /// Umbral en unidades calibradas [0, 1]
    pub threshold: f32,
    /// Factor aplicado alrededor del centro
    pub multiplier: f32,
}

/// Mapeo no lineal a unidades de pantalla
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemapConfig {
    pub exponent_x: f32,
    pub exponent_y: f32,
    pub base_sensitivity: f32,
    pub edge_sensitivity: f32,
    /// Pendiente con la que la sensibilidad pasa de base a borde según la distancia al centro
    pub edge_ramp: f32,
    pub boosts: Vec<EdgeBoost>,
    /// Sobrepaso permitido fuera de [0, 1] antes del recorte final
    pub overshoot: f32,
    /// Invertir el eje horizontal (cámara sin espejo)
    pub mirror_x: bool,
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            exponent_x: 1.2,
            exponent_y: 1.5,
            base_sensitivity: 1.2,
            edge_sensitivity: 1.8,
            edge_ramp: 2.5,
            boosts: vec![EdgeBoost {
                axis: Axis::Y,
                side: BoostSide::Above,
                threshold: 0.6,
                multiplier: 1.6,
            }],
            overshoot: 0.05,
            mirror_x: false,
        }
    }
}

/// Estrategia de suavizado
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SmoothingConfig {
    Ema {
        alpha: f32,
    },
    Kalman {
        process_noise: f32,
        measurement_noise: f32,
        initial_covariance: f32,
    },
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        SmoothingConfig::Kalman {
            process_noise: 0.0005,
            measurement_noise: 0.005,
            initial_covariance: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub smoothing: SmoothingConfig,
    /// Frames usados para estimar la velocidad
    pub velocity_window: usize,
    /// Velocidad (unidades/frame) a partir de la cual se prioriza la respuesta
    pub velocity_threshold: f32,
    /// Peso de la observación cruda en régimen rápido
    pub fast_raw_weight: f32,
    pub fast_gain: f32,
    pub slow_gain: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            smoothing: SmoothingConfig::default(),
            velocity_window: 3,
            velocity_threshold: 0.01,
            fast_raw_weight: 0.5,
            fast_gain: 0.85,
            slow_gain: 0.45,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub pinch_threshold: f32,
    /// Distancia máxima punta-muñeca para considerar un puño
    pub enter_threshold: f32,
    /// Margen para extendido / doblado
    pub extension_tolerance: f32,
    pub click_cooldown_secs: f32,
    pub drag_hold_delay_secs: f32,
    pub enter_hold_time_secs: f32,
    pub enter_cooldown_secs: f32,
    pub dictation_hold_time_secs: f32,
    pub dictation_cooldown_secs: f32,
    /// Detiene el dictado automáticamente tras este tiempo (0 = nunca)
    pub dictation_max_secs: f32,
    pub right_click_cooldown_secs: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: 0.05,
            enter_threshold: 0.08,
            extension_tolerance: 0.03,
            click_cooldown_secs: 0.3,
            drag_hold_delay_secs: 0.25,
            enter_hold_time_secs: 0.5,
            enter_cooldown_secs: 1.0,
            dictation_hold_time_secs: 1.0,
            dictation_cooldown_secs: 2.0,
            dictation_max_secs: 30.0,
            right_click_cooldown_secs: 0.5,
        }
    }
}

impl GestureConfig {
    pub fn click_cooldown(&self) -> Duration {
        secs(self.click_cooldown_secs)
    }

    pub fn drag_hold_delay(&self) -> Duration {
        secs(self.drag_hold_delay_secs)
    }

    pub fn enter_hold_time(&self) -> Duration {
        secs(self.enter_hold_time_secs)
    }

    pub fn enter_cooldown(&self) -> Duration {
        secs(self.enter_cooldown_secs)
    }

    pub fn dictation_hold_time(&self) -> Duration {
        secs(self.dictation_hold_time_secs)
    }

    pub fn dictation_cooldown(&self) -> Duration {
        secs(self.dictation_cooldown_secs)
    }

    pub fn dictation_max(&self) -> Option<Duration> {
        (self.dictation_max_secs > 0.0).then(|| secs(self.dictation_max_secs))
    }

    pub fn right_click_cooldown(&self) -> Duration {
        secs(self.right_click_cooldown_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Frecuencia de emisión del scroll continuo
    pub cadence_hz: f32,
    /// Fracción por tick con la que la magnitud se acerca a la velocidad objetivo
    pub ramp_rate: f32,
    /// Velocidad objetivo (líneas por tick)
    pub speed: f32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            cadence_hz: 60.0,
            ramp_rate: 0.1,
            speed: 3.0,
        }
    }
}

impl ScrollConfig {
    pub fn period(&self) -> Duration {
        let hz = if self.cadence_hz.is_finite() {
            self.cadence_hz.clamp(MIN_CADENCE_HZ, MAX_CADENCE_HZ)
        } else {
            MAX_CADENCE_HZ
        };
        secs(1.0 / hz)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Tiempo sin frames válidos tras el que se considera perdida la mano
    pub detection_timeout_secs: f32,
    /// Landmark que guía el cursor (por defecto el nudillo del índice)
    pub cursor_landmark: usize,
    /// Movimiento mínimo en píxeles para volver a emitir `Move`
    pub min_move_px: i32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            detection_timeout_secs: 0.3,
            cursor_landmark: 5,
            min_move_px: 1,
        }
    }
}

impl TrackingConfig {
    pub fn detection_timeout(&self) -> Duration {
        secs(self.detection_timeout_secs)
    }
}

// NaN acaba en cero; el resto se recorta a [0, MAX_DURATION_SECS]
fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.clamp(0.0, MAX_DURATION_SECS)).unwrap_or(Duration::ZERO)
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_unit_rate(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{} must be in (0, 1]", value)))
    }
}

fn check_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{} must be > 0", value)))
    }
}

fn check_duration(field: &'static str, value: f32, allow_zero: bool) -> Result<(), ConfigError> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if value.is_finite() && lower_ok && value <= MAX_DURATION_SECS {
        Ok(())
    } else {
        let lower = if allow_zero { "[0" } else { "(0" };
        Err(invalid(
            field,
            format!("{} must be in {}, {}] seconds", value, lower, MAX_DURATION_SECS),
        ))
    }
}

fn check_non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{} must be >= 0", value)))
    }
}

impl EngineConfig {
    /// Carga la configuración desde un archivo JSON y la valida
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Comprueba rangos; devuelve el primer campo inválido
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cal = &self.calibration;
        check_unit_rate("calibration.min_size", cal.min_size)?;
        check_unit_rate("calibration.interpolation_rate", cal.interpolation_rate)?;
        check_non_negative("calibration.decay", cal.decay)?;

        let remap = &self.remap;
        if !(remap.exponent_x >= 1.0 && remap.exponent_y >= 1.0) {
            return Err(invalid("remap.exponent", "exponents must be >= 1"));
        }
        check_positive("remap.base_sensitivity", remap.base_sensitivity)?;
        check_positive("remap.edge_sensitivity", remap.edge_sensitivity)?;
        check_non_negative("remap.edge_ramp", remap.edge_ramp)?;
        check_non_negative("remap.overshoot", remap.overshoot)?;
        for boost in &remap.boosts {
            check_unit_rate("remap.boosts.threshold", boost.threshold)?;
            check_positive("remap.boosts.multiplier", boost.multiplier)?;
        }

        let filter = &self.filter;
        match filter.smoothing {
            SmoothingConfig::Ema { alpha } => check_unit_rate("filter.smoothing.alpha", alpha)?,
            SmoothingConfig::Kalman {
                process_noise,
                measurement_noise,
                initial_covariance,
            } => {
                check_positive("filter.smoothing.process_noise", process_noise)?;
                check_positive("filter.smoothing.measurement_noise", measurement_noise)?;
                check_positive("filter.smoothing.initial_covariance", initial_covariance)?;
            }
        }
        if filter.velocity_window < 2 {
            return Err(invalid("filter.velocity_window", "needs at least 2 frames"));
        }
        check_non_negative("filter.velocity_threshold", filter.velocity_threshold)?;
        if !(0.0..=1.0).contains(&filter.fast_raw_weight) {
            return Err(invalid("filter.fast_raw_weight", "must be in [0, 1]"));
        }
        check_unit_rate("filter.fast_gain", filter.fast_gain)?;
        check_unit_rate("filter.slow_gain", filter.slow_gain)?;

        let g = &self.gestures;
        check_positive("gestures.pinch_threshold", g.pinch_threshold)?;
        check_positive("gestures.enter_threshold", g.enter_threshold)?;
        check_non_negative("gestures.extension_tolerance", g.extension_tolerance)?;
        check_duration("gestures.click_cooldown_secs", g.click_cooldown_secs, true)?;
        check_duration("gestures.drag_hold_delay_secs", g.drag_hold_delay_secs, false)?;
        check_duration("gestures.enter_hold_time_secs", g.enter_hold_time_secs, false)?;
        check_duration("gestures.enter_cooldown_secs", g.enter_cooldown_secs, true)?;
        check_duration("gestures.dictation_hold_time_secs", g.dictation_hold_time_secs, false)?;
        check_duration("gestures.dictation_cooldown_secs", g.dictation_cooldown_secs, true)?;
        check_duration("gestures.dictation_max_secs", g.dictation_max_secs, true)?;
        check_duration("gestures.right_click_cooldown_secs", g.right_click_cooldown_secs, true)?;

        let hz = self.scroll.cadence_hz;
        if !(MIN_CADENCE_HZ..=MAX_CADENCE_HZ).contains(&hz) {
            return Err(invalid(
                "scroll.cadence_hz",
                format!("{} must be in [{}, {}]", hz, MIN_CADENCE_HZ, MAX_CADENCE_HZ),
            ));
        }
        check_unit_rate("scroll.ramp_rate", self.scroll.ramp_rate)?;
        check_non_negative("scroll.speed", self.scroll.speed)?;

        let t = &self.tracking;
        check_duration("tracking.detection_timeout_secs", t.detection_timeout_secs, false)?;
        if t.cursor_landmark >= NUM_LANDMARKS {
            return Err(invalid(
                "tracking.cursor_landmark",
                format!("{} is not a landmark index", t.cursor_landmark),
            ));
        }
        if t.min_move_px < 1 {
            return Err(invalid("tracking.min_move_px", "must be >= 1"));
        }

        Ok(())
    }
}
