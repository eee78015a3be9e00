use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Version of the feature schema below. Any change to the feature list or
/// its order requires bumping this and retraining the model artifact.
pub const SCHEMA_VERSION: u32 = 1;

pub const FEATURE_COUNT: usize = 14;

/// Canonical feature order. This is the wire contract between the extractor
/// and the model artifact; `ModelArtifact::feature_order_hash` pins it.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "url_length",
    "has_https",
    "num_dots",
    "has_suspicious_char",
    "is_ip_host",
    "num_subdomains",
    "is_idn_host",
    "host_entropy",
    "brand_similarity",
    "domain_age_days",
    "dns_valid",
    "whois_listed",
    "has_iframe",
    "js_obfuscation_score",
];

/// Fixed-arity feature vector. Field order matches [`FEATURE_NAMES`].
///
/// Boolean features are mapped to {0.0, 1.0}. `domain_age_days` uses `-1.0`
/// as the unknown sentinel; every other feature is non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub url_length: f64,
    pub has_https: f64,
    pub num_dots: f64,
    pub has_suspicious_char: f64,
    pub is_ip_host: f64,
    pub num_subdomains: f64,
    pub is_idn_host: f64,
    pub host_entropy: f64,
    pub brand_similarity: f64,
    pub domain_age_days: f64,
    pub dns_valid: f64,
    pub whois_listed: f64,
    pub has_iframe: f64,
    pub js_obfuscation_score: f64,
}

impl FeatureVector {
    /// Values in schema order, aligned with [`FEATURE_NAMES`].
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.url_length,
            self.has_https,
            self.num_dots,
            self.has_suspicious_char,
            self.is_ip_host,
            self.num_subdomains,
            self.is_idn_host,
            self.host_entropy,
            self.brand_similarity,
            self.domain_age_days,
            self.dns_valid,
            self.whois_listed,
            self.has_iframe,
            self.js_obfuscation_score,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Benign,
    Phishing,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Benign => write!(f, "benign"),
            Label::Phishing => write!(f, "phishing"),
        }
    }
}

/// Non-fatal extraction degradations attached to a prediction result.
///
/// Each warning means the corresponding feature(s) carry their documented
/// default instead of an observed value. The snake_case serialization is
/// part of the response contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionWarning {
    DnsLookupTimeout,
    DnsLookupFailed,
    DnsLookupDisabled,
    WhoisLookupTimeout,
    WhoisLookupFailed,
    WhoisLookupDisabled,
    ContentFetchTimeout,
    ContentFetchFailed,
    ContentFetchDisabled,
    ContentTruncated,
}

impl ExtractionWarning {
    /// True when the page body was never inspected, i.e. `has_iframe` and
    /// `js_obfuscation_score` are defaults rather than observations. The
    /// explainer drops those features from its ranking in that case.
    /// `ContentTruncated` does not qualify: a prefix was still scanned.
    pub fn content_unavailable(self) -> bool {
        matches!(
            self,
            ExtractionWarning::ContentFetchTimeout
                | ExtractionWarning::ContentFetchFailed
                | ExtractionWarning::ContentFetchDisabled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionWarning::DnsLookupTimeout => "dns_lookup_timeout",
            ExtractionWarning::DnsLookupFailed => "dns_lookup_failed",
            ExtractionWarning::DnsLookupDisabled => "dns_lookup_disabled",
            ExtractionWarning::WhoisLookupTimeout => "whois_lookup_timeout",
            ExtractionWarning::WhoisLookupFailed => "whois_lookup_failed",
            ExtractionWarning::WhoisLookupDisabled => "whois_lookup_disabled",
            ExtractionWarning::ContentFetchTimeout => "content_fetch_timeout",
            ExtractionWarning::ContentFetchFailed => "content_fetch_failed",
            ExtractionWarning::ContentFetchDisabled => "content_fetch_disabled",
            ExtractionWarning::ContentTruncated => "content_truncated",
        }
    }
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a local explanation: the signed contribution of a single
/// feature to the score of a single prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub name: String,
    pub contribution: f64,
}

/// Outcome of one prediction request. Immutable once constructed; field
/// names are the contract consumed by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub request_id: Uuid,
    /// Normalized form of the input URL that was actually scored.
    pub url: String,
    pub label: Label,
    pub probability: f64,
    /// `round(probability * 100)`, monotonic in the probability.
    pub risk_score: u8,
    pub features: FeatureVector,
    /// Ranked by descending absolute contribution.
    pub top_features: Vec<FeatureContribution>,
    pub extraction_warnings: Vec<ExtractionWarning>,
}
