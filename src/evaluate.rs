use crate::dataset::LabeledExample;
use crate::error::EngineError;
use crate::explain::GlobalImportanceAccumulator;
use crate::model::{ScoringModel, DEFAULT_THRESHOLD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// ROC threshold grid: 0.00, 0.01, ..., 1.00.
pub const ROC_GRID_POINTS: usize = 101;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_positives: u64,
}

impl ConfusionMatrix {
    pub fn record(&mut self, actual_phishing: bool, predicted_phishing: bool) {
        match (actual_phishing, predicted_phishing) {
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_positives += 1,
            (true, false) => self.false_negatives += 1,
            (true, true) => self.true_positives += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub fpr: f64,
    pub tpr: f64,
}

/// Immutable outcome of one evaluation run over one dataset snapshot and
/// one model snapshot. The serialized field names are a public contract;
/// dashboards consume this document as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub dataset_id: String,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
    pub sample_count: u64,
    pub threshold: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_points: Vec<RocPoint>,
    pub auc: f64,
    pub global_feature_importance: BTreeMap<String, f64>,
}

impl EvaluationReport {
    pub fn write_json(&self, path: &Path) -> Result<(), EngineError> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

/// Batch evaluator. One pass over the examples with running counts only:
/// the headline confusion matrix at the configured threshold, per-grid
/// {tp, fp} tallies for the ROC curve, and the importance accumulator.
/// Memory use is independent of dataset size.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    pub threshold: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Evaluator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn run<I>(
        &self,
        model: &ScoringModel,
        dataset_id: &str,
        examples: I,
    ) -> Result<EvaluationReport, EngineError>
    where
        I: IntoIterator<Item = Result<LabeledExample, EngineError>>,
    {
        let mut confusion = ConfusionMatrix::default();
        let mut grid_tp = [0u64; ROC_GRID_POINTS];
        let mut grid_fp = [0u64; ROC_GRID_POINTS];
        let mut positives = 0u64;
        let mut negatives = 0u64;
        let mut importance = GlobalImportanceAccumulator::new();

        for example in examples {
            let example = example?;
            let probability = model.predict(&example.features);
            confusion.record(example.label, probability > self.threshold);
            if example.label {
                positives += 1;
            } else {
                negatives += 1;
            }
            for (index, threshold) in grid_thresholds() {
                if probability > threshold {
                    if example.label {
                        grid_tp[index] += 1;
                    } else {
                        grid_fp[index] += 1;
                    }
                }
            }
            importance.observe(model, &example.features);
        }

        let sample_count = confusion.total();
        if sample_count == 0 {
            return Err(EngineError::Dataset("empty dataset".to_string()));
        }

        let mut roc_points: Vec<RocPoint> = (0..ROC_GRID_POINTS)
            .map(|index| RocPoint {
                fpr: ratio(grid_fp[index], negatives),
                tpr: ratio(grid_tp[index], positives),
            })
            .collect();
        roc_points.sort_by(|a, b| {
            a.fpr
                .partial_cmp(&b.fpr)
                .unwrap_or(Ordering::Equal)
                .then(a.tpr.partial_cmp(&b.tpr).unwrap_or(Ordering::Equal))
        });
        let auc = trapezoid_auc(&roc_points);

        info!(
            dataset = dataset_id,
            model = model.version(),
            samples = sample_count,
            accuracy = confusion.accuracy(),
            auc,
            "evaluation complete"
        );

        Ok(EvaluationReport {
            dataset_id: dataset_id.to_string(),
            model_version: model.version().to_string(),
            generated_at: Utc::now(),
            sample_count,
            threshold: self.threshold,
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            confusion_matrix: confusion,
            roc_points,
            auc,
            global_feature_importance: importance.finish(),
        })
    }
}

fn grid_thresholds() -> impl Iterator<Item = (usize, f64)> {
    (0..ROC_GRID_POINTS).map(|index| (index, index as f64 / (ROC_GRID_POINTS - 1) as f64))
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Trapezoidal integration over points sorted by ascending FPR.
fn trapezoid_auc(points: &[RocPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| (pair[1].fpr - pair[0].fpr) * (pair[0].tpr + pair[1].tpr) / 2.0)
        .sum()
}
