//! ONNX Runtime backend for the sequence model.
//!
//! Input tensor is `[1, L, F]` f32; the trend is the first element of the
//! first output.

use std::path::Path;
use std::sync::Mutex;

use common::{Error, Result};
use ndarray::{Array3, ArrayView2};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::model::SequenceModel;

pub struct OnnxSequenceModel {
    // `Session::run` needs `&mut self`; requests share one session.
    session: Mutex<Session>,
}

impl OnnxSequenceModel {
    pub fn from_file(path: &Path) -> Result<Self> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(1))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| Error::artifact(path.display().to_string(), e))?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl SequenceModel for OnnxSequenceModel {
    fn predict(&self, window: ArrayView2<'_, f64>) -> Result<f64> {
        let (rows, cols) = window.dim();
        let input: Array3<f32> = window
            .mapv(|v| v as f32)
            .into_shape_with_order((1, rows, cols))
            .map_err(|e| Error::Model(e.to_string()))?;
        let tensor = Tensor::from_array(input).map_err(|e| Error::Model(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Model("onnx session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| Error::Model(e.to_string()))?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Model(e.to_string()))?;

        data.first()
            .map(|v| f64::from(*v))
            .ok_or_else(|| Error::Model("onnx model returned an empty tensor".into()))
    }
}
