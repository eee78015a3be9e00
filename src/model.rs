use crate::error::EngineError;
use crate::types::{FeatureVector, Label, FEATURE_COUNT, FEATURE_NAMES, SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Default decision threshold shared by the engine and the evaluator.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// SHA-256 over the newline-joined schema feature names. Stored inside every
/// artifact and re-checked at load time so an artifact trained against a
/// different feature order can never be served.
pub fn feature_order_hash() -> String {
    let mut hasher = Sha256::new();
    for name in FEATURE_NAMES {
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// On-disk model container. Trained offline, consumed read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub feature_order_hash: String,
    pub intercept: f64,
    pub weights: Vec<f64>,
}

/// A validated logistic scoring model. Immutable after construction, so a
/// single instance can be shared across concurrent requests without locks.
#[derive(Debug, Clone)]
pub struct ScoringModel {
    artifact: ModelArtifact,
}

// Hand-tuned logistic weights, one per FEATURE_NAMES entry. Usable without
// any external artifact; a trained artifact supersedes them in production.
const REFERENCE_INTERCEPT: f64 = -1.6;
const REFERENCE_WEIGHTS: [f64; FEATURE_COUNT] = [
    0.015,   // url_length
    -1.2,    // has_https
    0.10,    // num_dots
    0.9,     // has_suspicious_char
    1.6,     // is_ip_host
    0.35,    // num_subdomains
    0.8,     // is_idn_host
    0.25,    // host_entropy
    1.1,     // brand_similarity
    -0.0006, // domain_age_days
    -0.8,    // dns_valid
    -0.5,    // whois_listed
    0.7,     // has_iframe
    1.4,     // js_obfuscation_score
];

impl ScoringModel {
    /// Validates the artifact against the engine's feature schema. Every
    /// loading path goes through here; serving an unvalidated model is not
    /// possible.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, EngineError> {
        if artifact.schema_version != SCHEMA_VERSION {
            return Err(EngineError::SchemaMismatch(format!(
                "artifact is schema v{}, engine expects v{}",
                artifact.schema_version, SCHEMA_VERSION
            )));
        }
        if artifact.feature_names != FEATURE_NAMES {
            return Err(EngineError::SchemaMismatch(
                "artifact feature names or order differ from the engine schema".to_string(),
            ));
        }
        let expected_hash = feature_order_hash();
        if artifact.feature_order_hash != expected_hash {
            return Err(EngineError::SchemaMismatch(format!(
                "feature order hash {} does not match expected {}",
                artifact.feature_order_hash, expected_hash
            )));
        }
        if artifact.weights.len() != FEATURE_COUNT {
            return Err(EngineError::SchemaMismatch(format!(
                "artifact has {} weights, schema has {} features",
                artifact.weights.len(),
                FEATURE_COUNT
            )));
        }
        Ok(Self { artifact })
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| EngineError::ModelLoad(format!("read {}: {}", path.display(), e)))?;
        let artifact: ModelArtifact = serde_json::from_str(&data)
            .map_err(|e| EngineError::ModelLoad(format!("parse {}: {}", path.display(), e)))?;
        let model = Self::from_artifact(artifact)?;
        info!(version = %model.version(), path = %path.display(), "loaded scoring model");
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let data = serde_json::to_string_pretty(&self.artifact)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Built-in reference model.
    pub fn reference() -> Self {
        Self {
            artifact: ModelArtifact {
                schema_version: SCHEMA_VERSION,
                model_version: "reference-v1".to_string(),
                created_at: Utc::now(),
                feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
                feature_order_hash: feature_order_hash(),
                intercept: REFERENCE_INTERCEPT,
                weights: REFERENCE_WEIGHTS.to_vec(),
            },
        }
    }

    /// Phishing probability in (0, 1). Deterministic: same weights and input
    /// always produce the same output, and nothing here draws randomness.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let values = features.as_array();
        let mut z = self.artifact.intercept;
        for (weight, value) in self.artifact.weights.iter().zip(values.iter()) {
            z += weight * value;
        }
        sigmoid(z)
    }

    pub fn version(&self) -> &str {
        &self.artifact.model_version
    }

    pub fn intercept(&self) -> f64 {
        self.artifact.intercept
    }

    pub fn weights(&self) -> &[f64] {
        &self.artifact.weights
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }
}

/// Strict threshold law: phishing iff `probability > threshold`. A score of
/// exactly the threshold stays benign.
pub fn classify(probability: f64, threshold: f64) -> Label {
    if probability > threshold {
        Label::Phishing
    } else {
        Label::Benign
    }
}

/// 0..=100 risk score, monotonic in the probability.
pub fn risk_score(probability: f64) -> u8 {
    (probability.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Shared model slot supporting hot-swap. Readers clone the inner `Arc`
/// under a short read lock, so an in-flight request keeps scoring against
/// the snapshot it started with while a swap installs a replacement.
pub struct ModelHandle {
    current: RwLock<Arc<ScoringModel>>,
}

impl ModelHandle {
    pub fn new(model: ScoringModel) -> Self {
        Self {
            current: RwLock::new(Arc::new(model)),
        }
    }

    pub fn current(&self) -> Arc<ScoringModel> {
        self.current.read().clone()
    }

    /// Atomically replaces the served model, returning the previous one.
    pub fn swap(&self, model: ScoringModel) -> Arc<ScoringModel> {
        let mut slot = self.current.write();
        std::mem::replace(&mut *slot, Arc::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip_login_vector() -> FeatureVector {
        // http://192.168.1.1/login@secure-bank.com/update
        FeatureVector {
            url_length: 47.0,
            has_https: 0.0,
            num_dots: 4.0,
            has_suspicious_char: 1.0,
            is_ip_host: 1.0,
            num_subdomains: 0.0,
            is_idn_host: 0.0,
            host_entropy: 2.3,
            brand_similarity: 0.0,
            domain_age_days: -1.0,
            dns_valid: 0.0,
            whois_listed: 0.0,
            has_iframe: 0.0,
            js_obfuscation_score: 0.0,
        }
    }

    fn established_site_vector() -> FeatureVector {
        // https://www.wikipedia.org with healthy lookups
        FeatureVector {
            url_length: 25.0,
            has_https: 1.0,
            num_dots: 2.0,
            has_suspicious_char: 0.0,
            is_ip_host: 0.0,
            num_subdomains: 1.0,
            is_idn_host: 0.0,
            host_entropy: 3.4,
            brand_similarity: 0.0,
            domain_age_days: 8000.0,
            dns_valid: 1.0,
            whois_listed: 1.0,
            has_iframe: 0.0,
            js_obfuscation_score: 0.0,
        }
    }

    #[test]
    fn predict_is_deterministic() {
        let model = ScoringModel::reference();
        let fv = ip_login_vector();
        let first = model.predict(&fv);
        for _ in 0..10 {
            assert_eq!(model.predict(&fv), first);
        }
    }

    #[test]
    fn reference_model_flags_ip_login_url() {
        let model = ScoringModel::reference();
        let p = model.predict(&ip_login_vector());
        assert!(p > 0.5, "expected phishing-range probability, got {p}");
        assert_eq!(classify(p, DEFAULT_THRESHOLD), Label::Phishing);
    }

    #[test]
    fn reference_model_clears_established_site() {
        let model = ScoringModel::reference();
        let p = model.predict(&established_site_vector());
        assert!(p < 0.1, "expected low probability, got {p}");
        assert_eq!(classify(p, DEFAULT_THRESHOLD), Label::Benign);
    }

    #[test]
    fn probability_stays_in_unit_interval() {
        let model = ScoringModel::reference();
        for fv in [
            FeatureVector::default(),
            ip_login_vector(),
            established_site_vector(),
            FeatureVector {
                url_length: 10_000.0,
                ..Default::default()
            },
        ] {
            let p = model.predict(&fv);
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn threshold_boundary_is_benign() {
        assert_eq!(classify(0.5, 0.5), Label::Benign);
        assert_eq!(classify(0.5 + 1e-12, 0.5), Label::Phishing);
        assert_eq!(classify(0.499, 0.5), Label::Benign);
    }

    #[test]
    fn risk_score_is_monotonic_and_bounded() {
        assert_eq!(risk_score(0.0), 0);
        assert_eq!(risk_score(1.0), 100);
        assert_eq!(risk_score(0.505), 51);
        let mut last = 0;
        for i in 0..=100 {
            let score = risk_score(i as f64 / 100.0);
            assert!(score >= last);
            last = score;
        }
    }

    #[test]
    fn artifact_round_trip_preserves_predictions() {
        let model = ScoringModel::reference();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();
        let reloaded = ScoringModel::load(&path).unwrap();
        for fv in [ip_login_vector(), established_site_vector(), FeatureVector::default()] {
            assert_eq!(model.predict(&fv), reloaded.predict(&fv));
        }
        assert_eq!(model.version(), reloaded.version());
    }

    #[test]
    fn load_rejects_schema_version_mismatch() {
        let mut artifact = ScoringModel::reference().artifact().clone();
        artifact.schema_version = SCHEMA_VERSION + 1;
        let err = ScoringModel::from_artifact(artifact).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch(_)));
    }

    #[test]
    fn load_rejects_feature_order_drift() {
        let mut artifact = ScoringModel::reference().artifact().clone();
        artifact.feature_names.swap(0, 1);
        let err = ScoringModel::from_artifact(artifact).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch(_)));
    }

    #[test]
    fn load_rejects_stale_order_hash() {
        let mut artifact = ScoringModel::reference().artifact().clone();
        artifact.feature_order_hash = "deadbeef".to_string();
        let err = ScoringModel::from_artifact(artifact).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch(_)));
    }

    #[test]
    fn load_rejects_wrong_arity() {
        let mut artifact = ScoringModel::reference().artifact().clone();
        artifact.weights.pop();
        let err = ScoringModel::from_artifact(artifact).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch(_)));
    }

    #[test]
    fn load_rejects_unreadable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = ScoringModel::load(&path).unwrap_err();
        assert!(matches!(err, EngineError::ModelLoad(_)));

        std::fs::write(&path, "not json").unwrap();
        let err = ScoringModel::load(&path).unwrap_err();
        assert!(matches!(err, EngineError::ModelLoad(_)));
    }

    #[test]
    fn handle_swap_keeps_prior_snapshot_alive() {
        let handle = ModelHandle::new(ScoringModel::reference());
        let in_flight = handle.current();

        let mut replacement = ScoringModel::reference().artifact().clone();
        replacement.model_version = "reference-v2".to_string();
        let old = handle.swap(ScoringModel::from_artifact(replacement).unwrap());

        assert_eq!(old.version(), "reference-v1");
        assert_eq!(in_flight.version(), "reference-v1");
        assert_eq!(handle.current().version(), "reference-v2");
        // The in-flight snapshot still scores.
        let _ = in_flight.predict(&FeatureVector::default());
    }
}
