//! Native evaluator for Keras LSTM/Dense stacks exported as JSON.
//!
//! Weight layout follows `layer.get_weights()`: an LSTM carries
//! `kernel` (F×4U), `recurrent_kernel` (U×4U) and `bias` (4U) with gates
//! ordered input, forget, cell, output. Dense layers carry `kernel`
//! (in×out) and `bias` (out).

use std::path::Path;

use common::{Error, Result};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::Deserialize;

use crate::model::SequenceModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }
}

fn default_activation() -> Activation {
    Activation::Linear
}

/// Serialized model, as written by the export script.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerSpec {
    Lstm {
        units: usize,
        kernel: Vec<Vec<f64>>,
        recurrent_kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default)]
        return_sequences: bool,
    },
    Dense {
        kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default = "default_activation")]
        activation: Activation,
    },
    /// Identity at inference time.
    Dropout,
}

#[derive(Debug, Clone)]
struct LstmLayer {
    units: usize,
    kernel: Array2<f64>,
    recurrent_kernel: Array2<f64>,
    bias: Array1<f64>,
    return_sequences: bool,
}

#[derive(Debug, Clone)]
struct DenseLayer {
    kernel: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
}

#[derive(Debug, Clone)]
enum Layer {
    Lstm(LstmLayer),
    Dense(DenseLayer),
}

/// Activations flowing between layers.
enum Signal {
    Sequence(Array2<f64>),
    Vector(Array1<f64>),
}

/// Sequence model evaluated entirely in-process.
#[derive(Debug, Clone)]
pub struct KerasSequenceModel {
    input_features: usize,
    layers: Vec<Layer>,
}

impl KerasSequenceModel {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let spec: ModelSpec = serde_json::from_str(&raw)?;
        Self::from_spec(spec)
    }

    /// Build and shape-check every layer.
    pub fn from_spec(spec: ModelSpec) -> Result<Self> {
        let mut layers = Vec::with_capacity(spec.layers.len());
        let mut input_features: Option<usize> = None;
        // Width of the signal leaving the previous layer, and whether it is
        // still a sequence.
        let mut width: Option<usize> = None;
        let mut sequence = true;

        for (idx, layer) in spec.layers.into_iter().enumerate() {
            match layer {
                LayerSpec::Lstm {
                    units,
                    kernel,
                    recurrent_kernel,
                    bias,
                    return_sequences,
                } => {
                    if !sequence {
                        return Err(Error::Model(format!(
                            "layer {idx}: lstm needs a sequence input"
                        )));
                    }
                    let kernel = to_matrix(&kernel, idx, "kernel")?;
                    let recurrent_kernel = to_matrix(&recurrent_kernel, idx, "recurrent_kernel")?;
                    if units == 0
                        || kernel.ncols() != 4 * units
                        || recurrent_kernel.dim() != (units, 4 * units)
                        || bias.len() != 4 * units
                    {
                        return Err(Error::shape(
                            format!("lstm({units}) weights with 4x{units} gate columns"),
                            format!(
                                "layer {idx}: kernel {:?}, recurrent {:?}, bias {}",
                                kernel.dim(),
                                recurrent_kernel.dim(),
                                bias.len()
                            ),
                        ));
                    }
                    check_width(width, kernel.nrows(), idx)?;
                    input_features.get_or_insert(kernel.nrows());
                    width = Some(units);
                    sequence = return_sequences;
                    layers.push(Layer::Lstm(LstmLayer {
                        units,
                        kernel,
                        recurrent_kernel,
                        bias: Array1::from(bias),
                        return_sequences,
                    }));
                }
                LayerSpec::Dense {
                    kernel,
                    bias,
                    activation,
                } => {
                    if sequence {
                        return Err(Error::Model(format!(
                            "layer {idx}: dense needs a vector input"
                        )));
                    }
                    let kernel = to_matrix(&kernel, idx, "kernel")?;
                    if bias.len() != kernel.ncols() {
                        return Err(Error::shape(
                            format!("{} bias entries", kernel.ncols()),
                            format!("layer {idx}: {}", bias.len()),
                        ));
                    }
                    check_width(width, kernel.nrows(), idx)?;
                    width = Some(kernel.ncols());
                    layers.push(Layer::Dense(DenseLayer {
                        kernel,
                        bias: Array1::from(bias),
                        activation,
                    }));
                }
                LayerSpec::Dropout => {}
            }
        }

        let input_features =
            input_features.ok_or_else(|| Error::Model("model has no lstm layer".into()))?;
        if sequence {
            return Err(Error::Model("model must end in a vector output".into()));
        }
        Ok(Self {
            input_features,
            layers,
        })
    }

    pub fn input_features(&self) -> usize {
        self.input_features
    }

    fn run(&self, window: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if window.ncols() != self.input_features {
            return Err(Error::shape(
                format!("{} input features", self.input_features),
                format!("{}", window.ncols()),
            ));
        }
        if window.nrows() == 0 {
            return Err(Error::InvalidInput("empty input sequence".into()));
        }

        let mut signal = Signal::Sequence(window.to_owned());
        for layer in &self.layers {
            signal = match (layer, signal) {
                (Layer::Lstm(l), Signal::Sequence(seq)) => l.forward(seq.view()),
                (Layer::Dense(d), Signal::Vector(v)) => Signal::Vector(d.forward(&v)),
                _ => return Err(Error::Model("layer received an incompatible input".into())),
            };
        }
        match signal {
            Signal::Vector(v) => Ok(v),
            Signal::Sequence(_) => Err(Error::Model("model produced a sequence".into())),
        }
    }
}

impl SequenceModel for KerasSequenceModel {
    fn predict(&self, window: ArrayView2<'_, f64>) -> Result<f64> {
        let out = self.run(window)?;
        out.first()
            .copied()
            .ok_or_else(|| Error::Model("empty model output".into()))
    }

    fn input_features(&self) -> Option<usize> {
        Some(self.input_features)
    }
}

impl LstmLayer {
    fn forward(&self, input: ArrayView2<'_, f64>) -> Signal {
        let u = self.units;
        let mut h = Array1::<f64>::zeros(u);
        let mut c = Array1::<f64>::zeros(u);
        let mut outputs = Array2::<f64>::zeros((input.nrows(), u));

        for (t, x) in input.axis_iter(Axis(0)).enumerate() {
            let z = x.dot(&self.kernel) + h.dot(&self.recurrent_kernel) + &self.bias;
            let i = z.slice(s![..u]).mapv(sigmoid);
            let f = z.slice(s![u..2 * u]).mapv(sigmoid);
            let g = z.slice(s![2 * u..3 * u]).mapv(f64::tanh);
            let o = z.slice(s![3 * u..]).mapv(sigmoid);
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f64::tanh);
            outputs.row_mut(t).assign(&h);
        }

        if self.return_sequences {
            Signal::Sequence(outputs)
        } else {
            Signal::Vector(h)
        }
    }
}

impl DenseLayer {
    fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        let act = self.activation;
        (input.dot(&self.kernel) + &self.bias).mapv(|x| act.apply(x))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn to_matrix(rows: &[Vec<f64>], layer: usize, name: &str) -> Result<Array2<f64>> {
    let nrows = rows.len();
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if nrows == 0 || ncols == 0 || rows.iter().any(|r| r.len() != ncols) {
        return Err(Error::Model(format!(
            "layer {layer}: {name} must be a non-empty rectangular matrix"
        )));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((nrows, ncols), flat).map_err(|e| Error::Other(e.to_string()))
}

fn check_width(prev: Option<usize>, expected: usize, layer: usize) -> Result<()> {
    match prev {
        Some(w) if w != expected => Err(Error::shape(
            format!("layer {layer} input width {expected}"),
            format!("{w}"),
        )),
        _ => Ok(()),
    }
}
