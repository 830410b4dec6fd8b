//! Feed-forward neural network for the price model
//!
//! A small fully connected network trained with per-sample backpropagation
//! plus momentum. Hidden layers use the configured activation; the output
//! layer is always sigmoid so every output lies in (0, 1).
//!
//! The network serializes to JSON through serde (weights, biases, layer
//! sizes and feature lookups), and `from_json` re-validates the shapes so a
//! truncated or hand-edited snapshot is rejected instead of panicking later.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Initial weights are drawn uniformly from `[-INIT_RANGE, INIT_RANGE)`.
const INIT_RANGE: f64 = 0.2;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("invalid network configuration: {0}")]
    InvalidConfig(String),

    #[error("expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no training samples")]
    EmptyTrainingSet,

    #[error("training diverged at iteration {iteration}")]
    Diverged { iteration: usize },

    #[error("network produced a non-finite output")]
    NonFiniteOutput,

    #[error("invalid network snapshot: {0}")]
    InvalidSnapshot(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Sigmoid,
    Tanh,
    Relu,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::Relu => x.max(0.0),
        }
    }

    /// Derivative expressed in terms of the activation's output.
    fn derivative(self, out: f64) -> f64 {
        match self {
            Activation::Sigmoid => out * (1.0 - out),
            Activation::Tanh => 1.0 - out * out,
            Activation::Relu => {
                if out > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub input_size: usize,
    pub hidden_layers: Vec<usize>,
    pub output_size: usize,
    #[serde(default)]
    pub activation: Activation,
}

impl NetworkConfig {
    pub fn new(input_size: usize, hidden_layers: Vec<usize>, output_size: usize) -> Self {
        Self {
            input_size,
            hidden_layers,
            output_size,
            activation: Activation::Sigmoid,
        }
    }

    /// Layer sizes from input to output.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_layers.len() + 2);
        sizes.push(self.input_size);
        sizes.extend(self.hidden_layers.iter().copied());
        sizes.push(self.output_size);
        sizes
    }

    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.input_size == 0 || self.output_size == 0 {
            return Err(NetworkError::InvalidConfig(
                "input and output sizes must be positive".to_string(),
            ));
        }
        if let Some(i) = self.hidden_layers.iter().position(|&n| n == 0) {
            return Err(NetworkError::InvalidConfig(format!(
                "hidden layer {i} has zero neurons"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub iterations: usize,
    pub error_thresh: f64,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Emit a debug event every N iterations; 0 disables progress logging.
    pub log_period: usize,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            iterations: 20_000,
            error_thresh: 0.005,
            learning_rate: 0.3,
            momentum: 0.1,
            log_period: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub input: Vec<f64>,
    pub output: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingStats {
    pub iterations: usize,
    /// Mean squared error over the training set after the last iteration.
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DenseLayer {
    /// Shape `[outputs, inputs]`.
    weights: Array2<f64>,
    biases: Array1<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetwork {
    config: NetworkConfig,
    layers: Vec<DenseLayer>,
    #[serde(default)]
    input_lookup: Vec<String>,
    #[serde(default)]
    output_lookup: Vec<String>,
}

impl NeuralNetwork {
    /// Build a network with weights drawn from a seeded RNG, so the same
    /// config and seed always produce the same untrained network.
    pub fn new(config: NetworkConfig, seed: u64) -> Result<Self, NetworkError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let sizes = config.sizes();

        let layers = sizes
            .windows(2)
            .map(|pair| DenseLayer {
                weights: Array2::from_shape_fn((pair[1], pair[0]), |_| {
                    rng.gen_range(-INIT_RANGE..INIT_RANGE)
                }),
                biases: Array1::from_shape_fn(pair[1], |_| rng.gen_range(-INIT_RANGE..INIT_RANGE)),
            })
            .collect();

        Ok(Self {
            config,
            layers,
            input_lookup: Vec::new(),
            output_lookup: Vec::new(),
        })
    }

    pub fn with_lookups(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
        self.input_lookup = inputs.iter().map(|s| s.to_string()).collect();
        self.output_lookup = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn input_lookup(&self) -> &[String] {
        &self.input_lookup
    }

    pub fn run(&self, input: &[f64]) -> Result<Vec<f64>, NetworkError> {
        if input.len() != self.config.input_size {
            return Err(NetworkError::DimensionMismatch {
                expected: self.config.input_size,
                actual: input.len(),
            });
        }

        let mut activations = self.forward(Array1::from(input.to_vec()));
        let output = activations.pop().unwrap_or_default();
        if output.iter().any(|v| !v.is_finite()) {
            return Err(NetworkError::NonFiniteOutput);
        }
        Ok(output.to_vec())
    }

    pub fn train(
        &mut self,
        samples: &[TrainingSample],
        opts: &TrainingOptions,
    ) -> Result<TrainingStats, NetworkError> {
        if samples.is_empty() {
            return Err(NetworkError::EmptyTrainingSet);
        }
        if !opts.learning_rate.is_finite() || opts.learning_rate <= 0.0 {
            return Err(NetworkError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                opts.learning_rate
            )));
        }
        for sample in samples {
            if sample.input.len() != self.config.input_size {
                return Err(NetworkError::DimensionMismatch {
                    expected: self.config.input_size,
                    actual: sample.input.len(),
                });
            }
            if sample.output.len() != self.config.output_size {
                return Err(NetworkError::DimensionMismatch {
                    expected: self.config.output_size,
                    actual: sample.output.len(),
                });
            }
        }

        let mut changes: Vec<Array2<f64>> = self
            .layers
            .iter()
            .map(|layer| Array2::zeros(layer.weights.raw_dim()))
            .collect();

        let mut error = 1.0;
        let mut iteration = 0;
        while iteration < opts.iterations && error > opts.error_thresh {
            iteration += 1;
            let sum: f64 = samples
                .iter()
                .map(|sample| self.train_sample(sample, opts, &mut changes))
                .sum();
            error = sum / samples.len() as f64;

            if !error.is_finite() {
                return Err(NetworkError::Diverged { iteration });
            }
            if opts.log_period > 0 && iteration % opts.log_period == 0 {
                tracing::debug!(iteration, error, "training progress");
            }
        }

        Ok(TrainingStats {
            iterations: iteration,
            error,
        })
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, NetworkError> {
        let net: NeuralNetwork = serde_json::from_value(value.clone())
            .map_err(|e| NetworkError::InvalidSnapshot(e.to_string()))?;
        net.check_shapes()?;
        Ok(net)
    }

    /// All activations from input to output, input included.
    fn forward(&self, input: Array1<f64>) -> Vec<Array1<f64>> {
        let last = self.layers.len().saturating_sub(1);
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input);

        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.weights.dot(&activations[i]) + &layer.biases;
            let act = if i == last {
                Activation::Sigmoid
            } else {
                self.config.activation
            };
            activations.push(z.mapv(|v| act.apply(v)));
        }
        activations
    }

    /// One backpropagation step; returns the sample's mean squared error.
    fn train_sample(
        &mut self,
        sample: &TrainingSample,
        opts: &TrainingOptions,
        changes: &mut [Array2<f64>],
    ) -> f64 {
        let activations = self.forward(Array1::from(sample.input.clone()));
        let last = self.layers.len();
        let target = Array1::from(sample.output.clone());

        let errors = &target - &activations[last];
        let mse = errors.mapv(|e| e * e).mean().unwrap_or(0.0);
        let mut delta =
            &errors * &activations[last].mapv(|a| Activation::Sigmoid.derivative(a));

        for l in (0..last).rev() {
            // Propagate through the pre-update weights.
            let next_delta = if l > 0 {
                let act = self.config.activation;
                let back = self.layers[l].weights.t().dot(&delta);
                Some(back * &activations[l].mapv(|a| act.derivative(a)))
            } else {
                None
            };

            let grad = delta
                .view()
                .insert_axis(Axis(1))
                .dot(&activations[l].view().insert_axis(Axis(0)));
            let change = grad * opts.learning_rate + &changes[l] * opts.momentum;

            let layer = &mut self.layers[l];
            layer.weights += &change;
            layer.biases.scaled_add(opts.learning_rate, &delta);
            changes[l] = change;

            if let Some(d) = next_delta {
                delta = d;
            }
        }

        mse
    }

    fn check_shapes(&self) -> Result<(), NetworkError> {
        self.config
            .validate()
            .map_err(|e| NetworkError::InvalidSnapshot(e.to_string()))?;

        if self.layers.is_empty() {
            return Err(NetworkError::InvalidSnapshot("no weight layers".to_string()));
        }

        let sizes = self.config.sizes();
        if sizes.len() != self.layers.len() + 1 {
            return Err(NetworkError::InvalidSnapshot(format!(
                "config describes {} layers, snapshot has {}",
                sizes.len() - 1,
                self.layers.len()
            )));
        }

        for (i, (layer, pair)) in self.layers.iter().zip(sizes.windows(2)).enumerate() {
            if layer.weights.dim() != (pair[1], pair[0]) {
                return Err(NetworkError::InvalidSnapshot(format!(
                    "layer {i} weights are {:?}, expected {:?}",
                    layer.weights.dim(),
                    (pair[1], pair[0])
                )));
            }
            if layer.biases.len() != pair[1] {
                return Err(NetworkError::InvalidSnapshot(format!(
                    "layer {i} has {} biases, expected {}",
                    layer.biases.len(),
                    pair[1]
                )));
            }
            if layer.weights.iter().chain(layer.biases.iter()).any(|v| !v.is_finite()) {
                return Err(NetworkError::InvalidSnapshot(format!(
                    "layer {i} contains non-finite weights"
                )));
            }
        }
        Ok(())
    }
}
