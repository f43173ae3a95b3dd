use thiserror::Error;

use crate::input::InputError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no valid pixels: {0}")]
    EmptyData(String),
    #[error("invalid scale value {0}: must be finite and greater than zero")]
    InvalidScale(f64),
    #[error("layout overflow: {rows} rows requested for {samples} samples")]
    LayoutOverflow { rows: usize, samples: usize },
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("render failed: {0}")]
    Render(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("batch cancelled")]
    Cancelled,
}
