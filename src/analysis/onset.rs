// OnsetModel - single hidden layer perceptron scoring "a line starts here"
//
// Architecture: input -> ReLU hidden layer -> sigmoid output. Trained with
// plain per-sample SGD on the binary cross-entropy loss (gradient at the
// output is simply `pred - label`). Inputs are standardized with per-dimension
// mean/std computed over the training corpus and stored with the weights, so
// inference sees the same scale the model was trained on.
//
// The model is a plain value: training returns a new model, prediction is a
// pure function of the model and the input frames. Persistence lives in
// `storage::ModelStore`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::features::FeatureFrame;
use crate::cancel::CancelToken;
use crate::config::TrainingConfig;
use crate::error::ModelError;

/// Smallest standard deviation variance used during normalization
const MIN_VARIANCE: f64 = 1e-9;

/// Cancellation is polled this often inside an epoch
const CANCEL_CHECK_INTERVAL: usize = 256;

/// One labelled corpus record
///
/// Serialized as `{"features":[...],"label":0|1}`; on read any label above
/// zero counts as positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: Vec<f64>,
    #[serde(serialize_with = "serialize_label", deserialize_with = "deserialize_label")]
    pub label: bool,
}

impl TrainingSample {
    pub fn new(features: Vec<f64>, label: bool) -> Self {
        Self { features, label }
    }
}

fn serialize_label<S: Serializer>(label: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*label))
}

fn deserialize_label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    Ok(raw > 0.0)
}

/// Build a training sample from the frame closest to `timestamp_secs`
///
/// This is the "the line starts here" gesture: the user marks a moment while
/// listening, the nearest analysis window becomes a positive (or negative)
/// example. Returns `None` for an empty frame sequence.
pub fn label_frame(
    frames: &[FeatureFrame],
    timestamp_secs: f64,
    label: bool,
) -> Option<TrainingSample> {
    let nearest = frames.iter().min_by(|a, b| {
        let da = (a.timestamp_secs - timestamp_secs).abs();
        let db = (b.timestamp_secs - timestamp_secs).abs();
        da.total_cmp(&db)
    })?;
    Some(TrainingSample::new(nearest.features.to_vec(), label))
}

/// Summary of a completed training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub input_size: usize,
    pub epochs: usize,
    /// Mean cross-entropy over the last epoch
    pub final_loss: f64,
    /// Training-set accuracy at a 0.5 threshold
    pub accuracy: f64,
}

/// Trained onset model weights plus normalization parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnsetModel {
    pub input_size: usize,
    pub hidden_size: usize,
    /// hidden_size x input_size
    pub weights1: Vec<Vec<f64>>,
    pub bias1: Vec<f64>,
    pub weights2: Vec<f64>,
    pub bias2: f64,
    #[serde(default)]
    pub feature_mean: Vec<f64>,
    #[serde(default)]
    pub feature_std: Vec<f64>,
}

impl OnsetModel {
    /// Train a fresh model on `samples`
    ///
    /// # Arguments
    /// * `samples` - Labelled corpus; every vector must have the same length
    /// * `params` - Hidden size, epochs, learning rate, seed, init range
    /// * `cancel` - Checked once per epoch and every 256 samples
    ///
    /// # Errors
    /// `NoTrainingData` for an empty corpus, `InconsistentDimensions` when a
    /// sample's length differs from the first, `InvalidParameters` for
    /// unusable settings, `Cancelled` when `cancel` fires.
    pub fn train(
        samples: &[TrainingSample],
        params: &TrainingConfig,
        cancel: &CancelToken,
    ) -> Result<(OnsetModel, TrainingReport), ModelError> {
        let first = samples.first().ok_or(ModelError::NoTrainingData)?;
        let input_size = first.features.len();
        validate_params(input_size, params)?;

        if let Some((index, sample)) = samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.features.len() != input_size)
        {
            return Err(ModelError::InconsistentDimensions {
                expected: input_size,
                found: sample.features.len(),
                index,
            });
        }

        let (feature_mean, feature_std) = normalization(samples, input_size);
        let inputs: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| standardize(&s.features, &feature_mean, &feature_std))
            .collect();
        let labels: Vec<f64> = samples
            .iter()
            .map(|s| if s.label { 1.0 } else { 0.0 })
            .collect();

        let hidden_size = params.hidden_size;
        let mut rng = StdRng::seed_from_u64(params.seed);
        let half_range = params.init_range / 2.0;
        let mut init = || {
            if half_range > 0.0 {
                rng.gen_range(-half_range..half_range)
            } else {
                0.0
            }
        };

        let weights1: Vec<Vec<f64>> = (0..hidden_size)
            .map(|_| (0..input_size).map(|_| init()).collect())
            .collect();
        let weights2: Vec<f64> = (0..hidden_size).map(|_| init()).collect();

        let mut model = OnsetModel {
            input_size,
            hidden_size,
            weights1,
            bias1: vec![0.0; hidden_size],
            weights2,
            bias2: 0.0,
            feature_mean,
            feature_std,
        };

        let lr = params.learning_rate;
        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut hidden = vec![0.0; hidden_size];
        let mut final_loss = 0.0;

        for epoch in 0..params.epochs {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
            order.shuffle(&mut rng);

            let mut loss_sum = 0.0;
            for (step, &idx) in order.iter().enumerate() {
                if step % CANCEL_CHECK_INTERVAL == 0 && step > 0 && cancel.is_cancelled() {
                    return Err(ModelError::Cancelled);
                }

                let x = &inputs[idx];
                let y = labels[idx];
                let pred = model.forward(x, &mut hidden);
                loss_sum += cross_entropy(pred, y);

                let d = pred - y;
                for i in 0..hidden_size {
                    // ReLU gate uses the pre-update output weight
                    let grad_hidden = if hidden[i] > 0.0 {
                        d * model.weights2[i]
                    } else {
                        0.0
                    };
                    model.weights2[i] -= lr * d * hidden[i];

                    if grad_hidden != 0.0 {
                        for (w, &xj) in model.weights1[i].iter_mut().zip(x.iter()) {
                            *w -= lr * grad_hidden * xj;
                        }
                        model.bias1[i] -= lr * grad_hidden;
                    }
                }
                model.bias2 -= lr * d;
            }

            final_loss = loss_sum / samples.len() as f64;
            tracing::trace!(epoch, loss = final_loss, "onset model epoch complete");
        }

        let correct = inputs
            .iter()
            .zip(labels.iter())
            .filter(|&(x, &y)| {
                let pred = model.forward(x, &mut hidden);
                (pred >= 0.5) == (y >= 0.5)
            })
            .count();

        let report = TrainingReport {
            samples: samples.len(),
            input_size,
            epochs: params.epochs,
            final_loss,
            accuracy: correct as f64 / samples.len() as f64,
        };

        log::info!(
            "[OnsetModel] Trained on {} samples ({} dims, {} epochs): loss={:.4} accuracy={:.3}",
            report.samples,
            report.input_size,
            report.epochs,
            report.final_loss,
            report.accuracy
        );

        Ok((model, report))
    }

    /// Check that all weight shapes agree with the declared sizes
    pub fn validate(&self) -> Result<(), ModelError> {
        let shape_ok = self.input_size > 0
            && self.weights1.len() == self.hidden_size
            && self.weights1.iter().all(|row| row.len() == self.input_size)
            && self.bias1.len() == self.hidden_size
            && self.weights2.len() == self.hidden_size;

        if shape_ok {
            Ok(())
        } else {
            Err(ModelError::Serialization {
                details: format!(
                    "weight shapes do not match input_size={} hidden_size={}",
                    self.input_size, self.hidden_size
                ),
            })
        }
    }

    /// Raw onset probability for one feature vector
    ///
    /// A vector whose length differs from `input_size` scores 0.0.
    pub fn predict_one(&self, features: &[f64]) -> f64 {
        if features.len() != self.input_size {
            return 0.0;
        }
        let x = standardize(features, &self.feature_mean, &self.feature_std);
        let mut hidden = vec![0.0; self.hidden_size];
        self.forward(&x, &mut hidden)
    }

    /// Smoothed onset probability per frame
    pub fn predict(&self, frames: &[FeatureFrame]) -> Vec<f64> {
        let raw: Vec<f64> = frames
            .iter()
            .map(|frame| self.predict_one(&frame.features.to_array()))
            .collect();
        smooth_probabilities(&raw)
    }

    /// Smoothed onset probability per raw vector
    pub fn predict_vectors(&self, vectors: &[Vec<f64>]) -> Vec<f64> {
        let raw: Vec<f64> = vectors.iter().map(|v| self.predict_one(v)).collect();
        smooth_probabilities(&raw)
    }

    fn forward(&self, x: &[f64], hidden: &mut [f64]) -> f64 {
        for ((h, row), &b) in hidden.iter_mut().zip(&self.weights1).zip(&self.bias1) {
            let sum: f64 = row.iter().zip(x.iter()).map(|(w, xi)| w * xi).sum::<f64>() + b;
            *h = sum.max(0.0);
        }
        let z: f64 = self
            .weights2
            .iter()
            .zip(hidden.iter())
            .map(|(w, h)| w * h)
            .sum::<f64>()
            + self.bias2;
        sigmoid(z)
    }
}

/// Three-tap centered moving average; edges average the taps they have
///
/// Sequences shorter than three values are returned unchanged.
pub fn smooth_probabilities(probabilities: &[f64]) -> Vec<f64> {
    let n = probabilities.len();
    if n < 3 {
        return probabilities.to_vec();
    }
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(n - 1);
            let taps = &probabilities[lo..=hi];
            taps.iter().sum::<f64>() / taps.len() as f64
        })
        .collect()
}

fn validate_params(input_size: usize, params: &TrainingConfig) -> Result<(), ModelError> {
    let reason = if input_size == 0 {
        Some("feature vectors are empty".to_string())
    } else if params.hidden_size == 0 {
        Some("hidden_size must be at least 1".to_string())
    } else if !params.learning_rate.is_finite() || params.learning_rate <= 0.0 {
        Some(format!(
            "learning_rate must be positive and finite (got {})",
            params.learning_rate
        ))
    } else if !params.init_range.is_finite() || params.init_range < 0.0 {
        Some(format!("init_range must be >= 0 (got {})", params.init_range))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ModelError::InvalidParameters { reason }),
        None => Ok(()),
    }
}

fn normalization(samples: &[TrainingSample], input_size: usize) -> (Vec<f64>, Vec<f64>) {
    let count = samples.len() as f64;
    let mut mean = vec![0.0; input_size];
    for sample in samples {
        for (m, &x) in mean.iter_mut().zip(&sample.features) {
            *m += x;
        }
    }
    for m in mean.iter_mut() {
        *m /= count;
    }

    let mut variance = vec![0.0; input_size];
    for sample in samples {
        for ((v, &x), &m) in variance.iter_mut().zip(&sample.features).zip(&mean) {
            *v += (x - m) * (x - m);
        }
    }
    let std = variance
        .into_iter()
        .map(|v| (v / count).max(MIN_VARIANCE).sqrt())
        .collect();

    (mean, std)
}

/// Standardize with stored parameters; missing or zero entries act as 0 / 1
fn standardize(features: &[f64], mean: &[f64], std: &[f64]) -> Vec<f64> {
    features
        .iter()
        .enumerate()
        .map(|(j, &x)| {
            let m = mean.get(j).copied().unwrap_or(0.0);
            let s = match std.get(j) {
                Some(&s) if s != 0.0 => s,
                _ => 1.0,
            };
            (x - m) / s
        })
        .collect()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn cross_entropy(pred: f64, label: f64) -> f64 {
    let p = pred.clamp(1e-12, 1.0 - 1e-12);
    -(label * p.ln() + (1.0 - label) * (1.0 - p).ln())
}

#[cfg(test)]
#[path = "onset_tests.rs"]
mod tests;
