use std::collections::HashMap;
use std::fs;
use std::path::Path;

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::HealthLabel;

pub const HIDDEN_SIZE: usize = 64;
pub const NUM_LAYERS: usize = 2;
pub const HEAD_SIZE: usize = 32;
/// One logit per health label.
pub const NUM_CLASSES: usize = HealthLabel::COUNT;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serde JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    #[error("Parameter {name} has shape {found:?}, expected {expected:?}")]
    ParameterShape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Exported network parameters keyed by their training-time names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDict(pub HashMap<String, NamedTensor>);

impl StateDict {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn tensor(&self, name: &str, expected: &[usize]) -> Result<&NamedTensor, ModelError> {
        let tensor = self
            .0
            .get(name)
            .ok_or_else(|| ModelError::MissingParameter(name.to_string()))?;
        let numel: usize = expected.iter().product();
        if tensor.shape != expected || tensor.data.len() != numel {
            return Err(ModelError::ParameterShape {
                name: name.to_string(),
                expected: expected.to_vec(),
                found: tensor.shape.clone(),
            });
        }
        Ok(tensor)
    }

    fn matrix(&self, name: &str, rows: usize, cols: usize) -> Result<Array2<f32>, ModelError> {
        let tensor = self.tensor(name, &[rows, cols])?;
        Array2::from_shape_vec((rows, cols), tensor.data.clone()).map_err(|_| {
            ModelError::ParameterShape {
                name: name.to_string(),
                expected: vec![rows, cols],
                found: tensor.shape.clone(),
            }
        })
    }

    fn vector(&self, name: &str, len: usize) -> Result<Array1<f32>, ModelError> {
        Ok(Array1::from_vec(self.tensor(name, &[len])?.data.clone()))
    }
}

#[derive(Debug, Clone)]
struct LstmLayer {
    w_ih: Array2<f32>,
    w_hh: Array2<f32>,
    // b_ih + b_hh
    bias: Array1<f32>,
}

impl LstmLayer {
    fn from_state_dict(dict: &StateDict, layer: usize, input_size: usize) -> Result<Self, ModelError> {
        let gates = 4 * HIDDEN_SIZE;
        let b_ih = dict.vector(&format!("lstm.bias_ih_l{layer}"), gates)?;
        let b_hh = dict.vector(&format!("lstm.bias_hh_l{layer}"), gates)?;
        Ok(Self {
            w_ih: dict.matrix(&format!("lstm.weight_ih_l{layer}"), gates, input_size)?,
            w_hh: dict.matrix(&format!("lstm.weight_hh_l{layer}"), gates, HIDDEN_SIZE)?,
            bias: b_ih + b_hh,
        })
    }

    fn random(rng: &mut impl Rng, input_size: usize) -> Self {
        let bound = 1.0 / (HIDDEN_SIZE as f32).sqrt();
        let gates = 4 * HIDDEN_SIZE;
        Self {
            w_ih: uniform_matrix(rng, gates, input_size, bound),
            w_hh: uniform_matrix(rng, gates, HIDDEN_SIZE, bound),
            bias: uniform_vector(rng, gates, bound) + uniform_vector(rng, gates, bound),
        }
    }

    /// Runs the whole sequence and returns the hidden state of every step.
    fn forward(&self, inputs: ArrayView2<'_, f32>) -> Array2<f32> {
        let h_size = HIDDEN_SIZE;
        let mut h = Array1::<f32>::zeros(h_size);
        let mut c = Array1::<f32>::zeros(h_size);
        let mut outputs = Array2::<f32>::zeros((inputs.nrows(), h_size));

        for (t, x) in inputs.outer_iter().enumerate() {
            let gates = self.w_ih.dot(&x) + self.w_hh.dot(&h) + &self.bias;
            let i = gates.slice(s![0..h_size]).mapv(sigmoid);
            let f = gates.slice(s![h_size..2 * h_size]).mapv(sigmoid);
            let g = gates.slice(s![2 * h_size..3 * h_size]).mapv(f32::tanh);
            let o = gates.slice(s![3 * h_size..4 * h_size]).mapv(sigmoid);
            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f32::tanh);
            outputs.row_mut(t).assign(&h);
        }
        outputs
    }
}

#[derive(Debug, Clone)]
struct Linear {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    fn from_state_dict(dict: &StateDict, prefix: &str, inputs: usize, outputs: usize) -> Result<Self, ModelError> {
        Ok(Self {
            weight: dict.matrix(&format!("{prefix}.weight"), outputs, inputs)?,
            bias: dict.vector(&format!("{prefix}.bias"), outputs)?,
        })
    }

    fn random(rng: &mut impl Rng, inputs: usize, outputs: usize) -> Self {
        let bound = 1.0 / (inputs as f32).sqrt();
        Self {
            weight: uniform_matrix(rng, outputs, inputs, bound),
            bias: uniform_vector(rng, outputs, bound),
        }
    }

    fn forward(&self, x: ArrayView1<'_, f32>) -> Array1<f32> {
        self.weight.dot(&x) + &self.bias
    }
}

/// Stacked LSTM over the sequence, then a two-layer head on the final
/// hidden state of the top layer.
#[derive(Debug, Clone)]
pub struct CropHealthLstm {
    input_size: usize,
    layers: Vec<LstmLayer>,
    hidden: Linear,
    output: Linear,
}

impl CropHealthLstm {
    pub fn from_state_dict(dict: &StateDict, input_size: usize) -> Result<Self, ModelError> {
        let layers = (0..NUM_LAYERS)
            .map(|layer| {
                let layer_input = if layer == 0 { input_size } else { HIDDEN_SIZE };
                LstmLayer::from_state_dict(dict, layer, layer_input)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            input_size,
            layers,
            hidden: Linear::from_state_dict(dict, "classifier.0", HIDDEN_SIZE, HEAD_SIZE)?,
            output: Linear::from_state_dict(dict, "classifier.3", HEAD_SIZE, NUM_CLASSES)?,
        })
    }

    pub fn load(path: &Path, input_size: usize) -> Result<Self, ModelError> {
        Self::from_state_dict(&StateDict::load(path)?, input_size)
    }

    /// Untrained network with the usual uniform initialisation.
    pub fn random(rng: &mut impl Rng, input_size: usize) -> Self {
        let layers = (0..NUM_LAYERS)
            .map(|layer| {
                let layer_input = if layer == 0 { input_size } else { HIDDEN_SIZE };
                LstmLayer::random(&mut *rng, layer_input)
            })
            .collect();
        Self {
            input_size,
            layers,
            hidden: Linear::random(rng, HIDDEN_SIZE, HEAD_SIZE),
            output: Linear::random(rng, HEAD_SIZE, NUM_CLASSES),
        }
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Raw class logits for a `(time, features)` sequence.
    pub fn forward(&self, sequence: ArrayView2<'_, f32>) -> [f32; NUM_CLASSES] {
        let mut activations = sequence.to_owned();
        for layer in &self.layers {
            activations = layer.forward(activations.view());
        }
        let last = activations.nrows().saturating_sub(1);
        let final_hidden = if activations.nrows() == 0 {
            Array1::zeros(HIDDEN_SIZE)
        } else {
            activations.row(last).to_owned()
        };
        let hidden = self.hidden.forward(final_hidden.view()).mapv(|v| v.max(0.0));
        let logits = self.output.forward(hidden.view());

        let mut out = [0.0; NUM_CLASSES];
        for (slot, value) in out.iter_mut().zip(logits.iter()) {
            *slot = *value;
        }
        out
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn uniform_matrix(rng: &mut impl Rng, rows: usize, cols: usize, bound: f32) -> Array2<f32> {
    Array2::from_shape_simple_fn((rows, cols), || rng.random_range(-bound..bound))
}

fn uniform_vector(rng: &mut impl Rng, len: usize, bound: f32) -> Array1<f32> {
    Array1::from_shape_simple_fn(len, || rng.random_range(-bound..bound))
}
