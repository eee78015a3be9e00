use crate::config::Config;
use crate::error::EngineError;
use crate::explain;
use crate::features::{normalize_url, FeatureExtractor};
use crate::model::{classify, risk_score, ModelHandle, ScoringModel};
use crate::telemetry::{Telemetry, TelemetrySnapshot};
use crate::types::PredictionResult;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Orchestrates extract → score → explain for one URL per call.
///
/// Shareable behind an `Arc` across concurrent requests: the model slot is
/// the only mutable shared state, and it swaps atomically. A request
/// snapshots the model once at entry, so a concurrent hot-swap can never
/// split a single prediction across two weight sets.
pub struct PredictionEngine {
    config: Config,
    extractor: FeatureExtractor,
    models: ModelHandle,
    telemetry: Arc<Telemetry>,
}

impl PredictionEngine {
    /// Fails loudly when a configured artifact cannot be loaded or does not
    /// match the feature schema; a process with a bad model never serves.
    pub async fn new(config: Config) -> Result<Self, EngineError> {
        let model = match &config.model.artifact_path {
            Some(path) => ScoringModel::load(path)?,
            None => {
                info!("no model artifact configured, serving built-in reference weights");
                ScoringModel::reference()
            }
        };
        let extractor = FeatureExtractor::new(config.features.clone()).await?;
        info!(model = %model.version(), "prediction engine ready");
        Ok(Self {
            config,
            extractor,
            models: ModelHandle::new(model),
            telemetry: Arc::new(Telemetry::new()),
        })
    }

    /// Errors only when the input is not syntactically a URL. Everything
    /// else — lookup timeouts, dead pages — degrades to defaults with
    /// warnings, and the call returns within the sum of the configured
    /// extraction timeouts.
    pub async fn handle(&self, raw_url: &str) -> Result<PredictionResult, EngineError> {
        let started = Instant::now();
        let url = match normalize_url(raw_url) {
            Ok(url) => url,
            Err(e) => {
                self.telemetry.record_rejected();
                return Err(e);
            }
        };

        let model = self.models.current();
        let (features, warnings) = self.extractor.extract(&url).await;
        let probability = model.predict(&features);
        let label = classify(probability, self.config.scoring.threshold);
        let top_features = explain::local_explanation(&model, &features, &warnings)
            .into_iter()
            .take(self.config.scoring.top_features)
            .collect();

        let result = PredictionResult {
            request_id: Uuid::new_v4(),
            url: url.into(),
            label,
            probability,
            risk_score: risk_score(probability),
            features,
            top_features,
            extraction_warnings: warnings,
        };
        self.telemetry
            .observe_request(started.elapsed(), &result.extraction_warnings);
        Ok(result)
    }

    /// Validates a new artifact and atomically replaces the served model.
    /// Returns the version that was swapped out. In-flight requests finish
    /// on the snapshot they took at entry.
    pub fn swap_model(&self, path: &Path) -> Result<String, EngineError> {
        let incoming = ScoringModel::load(path)?;
        let incoming_version = incoming.version().to_string();
        let previous = self.models.swap(incoming);
        self.telemetry.record_model_swap();
        info!(from = %previous.version(), to = %incoming_version, "model hot-swapped");
        Ok(previous.version().to_string())
    }

    /// Snapshot of the currently served model, e.g. for an evaluation run.
    pub fn model(&self) -> Arc<ScoringModel> {
        self.models.current()
    }

    pub fn model_version(&self) -> String {
        self.models.current().version().to_string()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }
}
