use crate::model::ScoringModel;
use crate::types::{
    ExtractionWarning, FeatureContribution, FeatureVector, FEATURE_COUNT, FEATURE_NAMES,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// Schema indices of the page-content features (has_iframe,
// js_obfuscation_score); these are the ones discounted when the body was
// never inspected.
const CONTENT_FEATURE_INDICES: [usize; 2] = [12, 13];

/// Signed per-feature contributions for one prediction.
///
/// For the logistic family the contribution of feature `i` is
/// `weight[i] * value[i]`, the feature's term in the pre-sigmoid sum.
/// Entries are ordered by descending absolute contribution; ties keep
/// schema declaration order. Reproducible for identical inputs.
///
/// When the warnings say the page body was unavailable, the content
/// features carry defaults rather than observations and are dropped from
/// the ranking.
pub fn local_explanation(
    model: &ScoringModel,
    features: &FeatureVector,
    warnings: &[ExtractionWarning],
) -> Vec<FeatureContribution> {
    let values = features.as_array();
    let content_unavailable = warnings.iter().any(|w| w.content_unavailable());

    let mut ranked: Vec<(usize, f64)> = model
        .weights()
        .iter()
        .zip(values.iter())
        .enumerate()
        .filter(|(index, _)| !(content_unavailable && CONTENT_FEATURE_INDICES.contains(index)))
        .map(|(index, (weight, value))| (index, weight * value))
        .collect();

    ranked.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    ranked
        .into_iter()
        .map(|(index, contribution)| FeatureContribution {
            name: FEATURE_NAMES[index].to_string(),
            contribution,
        })
        .collect()
}

/// Streaming dataset-level importance: mean absolute contribution per
/// feature. Non-negative by construction. Fed example-by-example during an
/// evaluation pass so no per-example state is retained.
#[derive(Debug, Default)]
pub struct GlobalImportanceAccumulator {
    sums: [f64; FEATURE_COUNT],
    count: u64,
}

impl GlobalImportanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, model: &ScoringModel, features: &FeatureVector) {
        let values = features.as_array();
        for (index, (weight, value)) in model.weights().iter().zip(values.iter()).enumerate() {
            self.sums[index] += (weight * value).abs();
        }
        self.count += 1;
    }

    pub fn finish(self) -> BTreeMap<String, f64> {
        FEATURE_NAMES
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let mean = if self.count == 0 {
                    0.0
                } else {
                    self.sums[index] / self.count as f64
                };
                (name.to_string(), mean)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{feature_order_hash, ModelArtifact};
    use crate::types::SCHEMA_VERSION;

    fn model_with_weights(intercept: f64, weights: [f64; FEATURE_COUNT]) -> ScoringModel {
        ScoringModel::from_artifact(ModelArtifact {
            schema_version: SCHEMA_VERSION,
            model_version: "test".to_string(),
            created_at: chrono::Utc::now(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            feature_order_hash: feature_order_hash(),
            intercept,
            weights: weights.to_vec(),
        })
        .unwrap()
    }

    #[test]
    fn contributions_rank_by_absolute_value() {
        let model = ScoringModel::reference();
        let fv = FeatureVector {
            url_length: 100.0, // 100 * 0.015 = 1.5
            is_ip_host: 1.0,   // 1.6
            has_https: 1.0,    // -1.2
            ..Default::default()
        };
        let ranked = local_explanation(&model, &fv, &[]);
        assert_eq!(ranked[0].name, "is_ip_host");
        assert_eq!(ranked[1].name, "url_length");
        assert_eq!(ranked[2].name, "has_https");
        assert!(ranked[2].contribution < 0.0);
        // Every schema feature is present when nothing is discounted.
        assert_eq!(ranked.len(), FEATURE_COUNT);
    }

    #[test]
    fn ties_keep_declaration_order() {
        let mut weights = [0.0; FEATURE_COUNT];
        weights[2] = 1.0; // num_dots
        weights[5] = 1.0; // num_subdomains
        let model = model_with_weights(0.0, weights);
        let fv = FeatureVector {
            num_dots: 3.0,
            num_subdomains: 3.0,
            ..Default::default()
        };
        let ranked = local_explanation(&model, &fv, &[]);
        assert_eq!(ranked[0].name, "num_dots");
        assert_eq!(ranked[1].name, "num_subdomains");
        assert_eq!(ranked[0].contribution, ranked[1].contribution);
    }

    #[test]
    fn unavailable_content_discounts_page_features() {
        let model = ScoringModel::reference();
        let fv = FeatureVector {
            has_iframe: 0.0,
            js_obfuscation_score: 0.0,
            is_ip_host: 1.0,
            ..Default::default()
        };
        let ranked = local_explanation(&model, &fv, &[ExtractionWarning::ContentFetchTimeout]);
        assert!(ranked.iter().all(|c| c.name != "has_iframe"));
        assert!(ranked.iter().all(|c| c.name != "js_obfuscation_score"));
        assert_eq!(ranked.len(), FEATURE_COUNT - 2);

        // A truncated body was still scanned, so nothing is dropped.
        let ranked = local_explanation(&model, &fv, &[ExtractionWarning::ContentTruncated]);
        assert_eq!(ranked.len(), FEATURE_COUNT);
    }

    #[test]
    fn explanation_is_reproducible() {
        let model = ScoringModel::reference();
        let fv = FeatureVector {
            url_length: 63.0,
            num_dots: 5.0,
            brand_similarity: 0.9,
            ..Default::default()
        };
        let a = local_explanation(&model, &fv, &[]);
        let b = local_explanation(&model, &fv, &[]);
        let names_a: Vec<_> = a.iter().map(|c| c.name.clone()).collect();
        let names_b: Vec<_> = b.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names_a, names_b);
    }

    #[test]
    fn global_importance_is_nonnegative_mean() {
        let mut weights = [0.0; FEATURE_COUNT];
        weights[0] = -0.5; // url_length, negative weight still yields positive importance
        let model = model_with_weights(0.0, weights);

        let mut acc = GlobalImportanceAccumulator::new();
        acc.observe(
            &model,
            &FeatureVector {
                url_length: 10.0,
                ..Default::default()
            },
        );
        acc.observe(
            &model,
            &FeatureVector {
                url_length: 30.0,
                ..Default::default()
            },
        );
        let importance = acc.finish();
        assert_eq!(importance["url_length"], 10.0); // mean of |−5| and |−15|
        assert!(importance.values().all(|&v| v >= 0.0));
        assert_eq!(importance.len(), FEATURE_COUNT);
    }

    #[test]
    fn empty_accumulator_reports_zeros() {
        let importance = GlobalImportanceAccumulator::new().finish();
        assert!(importance.values().all(|&v| v == 0.0));
    }
}
