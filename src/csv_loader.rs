use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;

use crate::types::NUM_LANDMARKS;

/// Una fila `frame,t_ms,landmark,x,y`. Sin landmark ni coordenadas = sin mano.
#[derive(Debug, Deserialize)]
struct Row {
    frame: usize,
    t_ms: u64,
    landmark: Option<usize>,
    x: Option<f32>,
    y: Option<f32>,
}

/// Un frame de una grabación
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub frame: usize,
    /// Tiempo desde el inicio de la grabación
    pub offset: Duration,
    /// Los 21 puntos en orden de landmark, o None si no había mano
    pub points: Option<Vec<(f32, f32)>>,
}

#[derive(Default)]
struct FrameAccum {
    t_ms: u64,
    no_hand: bool,
    landmarks: BTreeMap<usize, (f32, f32)>,
}

/// Carga una grabación de landmarks ordenada por frame.
pub fn load_recording(path: impl AsRef<Path>) -> Result<Vec<RecordedFrame>> {
    let path = path.as_ref();
    let reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;
    parse_recording(reader).with_context(|| format!("Grabación inválida {:?}", path))
}

/// Igual que [`load_recording`] pero desde memoria
pub fn parse_recording_str(content: &str) -> Result<Vec<RecordedFrame>> {
    let reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    parse_recording(reader)
}

fn parse_recording<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<RecordedFrame>> {
    let mut frames: BTreeMap<usize, FrameAccum> = BTreeMap::new();

    for (row_idx, result) in reader.deserialize::<Row>().enumerate() {
        let line = row_idx + 2;
        let row = result.with_context(|| format!("Fila {} inválida", line))?;
        let entry = frames.entry(row.frame).or_insert_with(|| FrameAccum {
            t_ms: row.t_ms,
            ..FrameAccum::default()
        });
        ensure!(
            entry.t_ms == row.t_ms,
            "Frame {} con dos tiempos distintos ({} y {} ms, fila {})",
            row.frame,
            entry.t_ms,
            row.t_ms,
            line
        );

        match (row.landmark, row.x, row.y) {
            (None, None, None) => entry.no_hand = true,
            (Some(landmark), Some(x), Some(y)) => {
                ensure!(
                    landmark < NUM_LANDMARKS,
                    "Landmark {} fuera de rango (fila {})",
                    landmark,
                    line
                );
                if entry.landmarks.insert(landmark, (x, y)).is_some() {
                    bail!("Landmark {} repetido en frame {} (fila {})", landmark, row.frame, line);
                }
            }
            _ => bail!("Fila {} incompleta: landmark, x e y van juntos", line),
        }
    }

    ensure!(!frames.is_empty(), "La grabación no contiene frames");

    let mut recording = Vec::with_capacity(frames.len());
    let mut last_t = 0;
    for (frame, accum) in frames {
        ensure!(
            accum.t_ms >= last_t,
            "El tiempo retrocede en el frame {} ({} ms)",
            frame,
            accum.t_ms
        );
        last_t = accum.t_ms;

        let points = if accum.no_hand {
            ensure!(
                accum.landmarks.is_empty(),
                "Frame {} marcado sin mano pero con landmarks",
                frame
            );
            None
        } else {
            ensure!(
                accum.landmarks.len() == NUM_LANDMARKS,
                "Frame {} tiene {} landmarks (se esperaban {})",
                frame,
                accum.landmarks.len(),
                NUM_LANDMARKS
            );
            Some(accum.landmarks.into_values().collect())
        };

        recording.push(RecordedFrame {
            frame,
            offset: Duration::from_millis(accum.t_ms),
            points,
        });
    }

    Ok(recording)
}
