use crate::config::GestureConfig;
use crate::types::{
    FrameError, LandmarkFrame, Point, INDEX_PIP, INDEX_TIP, MIDDLE_MCP, MIDDLE_PIP, MIDDLE_TIP,
    PINKY_PIP, PINKY_TIP, RING_PIP, RING_TIP, THUMB_MCP, THUMB_TIP, WRIST,
};

/// Dedos con su par (punta, articulación de referencia)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// Índices (punta, PIP); el pulgar usa su MCP
    pub fn joints(self) -> (usize, usize) {
        match self {
            Finger::Thumb => (THUMB_TIP, THUMB_MCP),
            Finger::Index => (INDEX_TIP, INDEX_PIP),
            Finger::Middle => (MIDDLE_TIP, MIDDLE_PIP),
            Finger::Ring => (RING_TIP, RING_PIP),
            Finger::Pinky => (PINKY_TIP, PINKY_PIP),
        }
    }
}

/// Predicados booleanos de un frame. `Default` = todo falso.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GesturePredicates {
    pub pinch: bool,
    pub fist: bool,
    pub dictation_pose: bool,
    pub scroll_up: bool,
    pub scroll_down: bool,
    pub right_click_pose: bool,
}

impl GesturePredicates {
    pub fn scroll_pose(&self) -> bool {
        self.scroll_up || self.scroll_down
    }
}

/// Clasificador geométrico sin estado.
///
/// Falla cerrado: sin frame (o con un frame inválido) todos los predicados
/// son falsos.
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    pinch_threshold: f32,
    enter_threshold: f32,
    tolerance: f32,
}

impl GestureClassifier {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            pinch_threshold: config.pinch_threshold,
            enter_threshold: config.enter_threshold,
            tolerance: config.extension_tolerance,
        }
    }

    /// Punta claramente por encima de su articulación
    pub fn extended(&self, frame: &LandmarkFrame, finger: Finger) -> bool {
        let (tip, pip) = finger.joints();
        frame.point(tip).y < frame.point(pip).y - self.tolerance
    }

    /// Punta claramente por debajo de su articulación
    pub fn curled(&self, frame: &LandmarkFrame, finger: Finger) -> bool {
        let (tip, pip) = finger.joints();
        frame.point(tip).y > frame.point(pip).y + self.tolerance
    }

    pub fn pinch(&self, frame: &LandmarkFrame) -> bool {
        frame.point(THUMB_TIP).distance(frame.point(INDEX_TIP)) < self.pinch_threshold
    }

    /// Las cuatro puntas cerca de la muñeca y la palma hacia la cámara
    pub fn fist(&self, frame: &LandmarkFrame) -> bool {
        let wrist = frame.point(WRIST);
        let tips_close = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP]
            .iter()
            .all(|&tip| frame.point(tip).distance(wrist) < self.enter_threshold);
        let palm_facing = wrist.y < frame.point(MIDDLE_MCP).y;
        tips_close && palm_facing
    }

    pub fn classify(&self, frame: Option<&LandmarkFrame>) -> GesturePredicates {
        let Some(frame) = frame else {
            return GesturePredicates::default();
        };

        let ext = |f| self.extended(frame, f);
        let cur = |f| self.curled(frame, f);

        let dictation_pose = ext(Finger::Thumb)
            && ext(Finger::Pinky)
            && cur(Finger::Index)
            && cur(Finger::Middle)
            && cur(Finger::Ring);

        let scroll_base = ext(Finger::Index) && ext(Finger::Middle) && !ext(Finger::Pinky);
        let ring_up = ext(Finger::Ring);

        let right_click_pose =
            ext(Finger::Ring) && ext(Finger::Pinky) && !ext(Finger::Index) && !ext(Finger::Middle);

        GesturePredicates {
            pinch: self.pinch(frame),
            fist: self.fist(frame),
            dictation_pose,
            scroll_up: scroll_base && ring_up,
            scroll_down: scroll_base && !ring_up,
            right_click_pose,
        }
    }

    /// Valida puntos crudos y clasifica; devuelve el error de validación si lo hay
    pub fn classify_raw(
        &self,
        points: Option<&[(f32, f32)]>,
    ) -> Result<GesturePredicates, FrameError> {
        match points {
            None => Ok(GesturePredicates::default()),
            Some(points) => {
                let frame = LandmarkFrame::from_points(points)?;
                Ok(self.classify(Some(&frame)))
            }
        }
    }
}
