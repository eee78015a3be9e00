use crate::config::FeatureConfig;
use crate::error::EngineError;
use crate::types::{ExtractionWarning, FeatureVector};
use futures::StreamExt;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use publicsuffix::{List, Psl};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::{Host, Url};

/// Snapshot of the public suffix list covering the common registries. Kept
/// in the binary so registrable-domain splitting never needs a network
/// fetch; unknown TLDs fall back to last-label-is-suffix.
const PSL_SNAPSHOT: &str = "\
// ===BEGIN ICANN DOMAINS===
com
net
org
edu
gov
mil
int
info
biz
name
io
co
me
tv
cc
ws
app
dev
xyz
top
site
online
club
shop
store
icu
live
vip
work
link
click
download
racing
review
science
party
tk
ml
ga
cf
gq
pw
uk
co.uk
org.uk
ac.uk
gov.uk
net.uk
de
fr
it
nl
es
pt
se
no
fi
dk
pl
cz
ch
at
be
ie
ru
ua
cn
com.cn
net.cn
org.cn
gov.cn
jp
co.jp
ne.jp
or.jp
ac.jp
kr
co.kr
in
co.in
net.in
org.in
au
com.au
net.au
org.au
edu.au
br
com.br
net.br
org.br
mx
com.mx
ar
com.ar
ca
us
eu
nz
co.nz
net.nz
org.nz
za
co.za
// ===END ICANN DOMAINS===
";

/// Frequently-impersonated names. Compared against the registrable label
/// (IDNA-decoded, so homoglyph lookalikes land close).
const BRAND_NAMES: [&str; 22] = [
    "google",
    "youtube",
    "facebook",
    "twitter",
    "instagram",
    "linkedin",
    "reddit",
    "wikipedia",
    "amazon",
    "apple",
    "microsoft",
    "netflix",
    "paypal",
    "ebay",
    "yahoo",
    "github",
    "steam",
    "chase",
    "wellsfargo",
    "coinbase",
    "binance",
    "dropbox",
];

/// Similarity below this floor carries no signal and is reported as 0.
const BRAND_SIMILARITY_FLOOR: f64 = 0.75;

/// Normalizes a raw URL string for extraction: trims surrounding
/// whitespace, assumes `http` when no scheme is given, and parses (the
/// `url` crate lower-cases scheme and host and applies IDNA). The only
/// fatal failure in the extraction path.
pub fn normalize_url(raw: &str) -> Result<Url, EngineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidUrl("empty input".to_string()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&candidate)
        .map_err(|e| EngineError::InvalidUrl(format!("{trimmed}: {e}")))?;
    if url.host().is_none() {
        return Err(EngineError::InvalidUrl(format!("{trimmed}: missing host")));
    }
    Ok(url)
}

/// Turns a parsed URL into the fixed-order feature vector.
///
/// Extraction is total: after `normalize_url` has accepted the input,
/// every failure mode (DNS trouble, RDAP trouble, unreachable page)
/// degrades to the feature's documented default and a warning. Nothing in
/// here blocks past its configured timeout.
pub struct FeatureExtractor {
    config: FeatureConfig,
    psl: List,
    resolver: TokioAsyncResolver,
    http: reqwest::Client,
    cache: Arc<RwLock<FeatureCache>>,
}

#[derive(Default)]
struct FeatureCache {
    entries: HashMap<String, CachedEntry>,
}

#[derive(Clone)]
struct CachedEntry {
    features: FeatureVector,
    warnings: Vec<ExtractionWarning>,
    stored_at: Instant,
    ttl: Duration,
}

/// Host-derived facts computed once per extraction.
struct HostParts {
    host: String,
    is_ip: bool,
    is_idn: bool,
    registrable: Option<String>,
    subdomains: usize,
    unicode_sld: Option<String>,
}

enum LookupFailure {
    Timeout,
    Other,
}

impl FeatureExtractor {
    pub async fn new(config: FeatureConfig) -> Result<Self, EngineError> {
        let psl: List = PSL_SNAPSHOT
            .parse()
            .map_err(|e| EngineError::Internal(format!("embedded suffix list: {e}")))?;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.content_timeout())
            .build()
            .map_err(|e| EngineError::Internal(format!("http client: {e}")))?;

        Ok(Self {
            config,
            psl,
            resolver,
            http,
            cache: Arc::new(RwLock::new(FeatureCache::default())),
        })
    }

    pub async fn extract(&self, url: &Url) -> (FeatureVector, Vec<ExtractionWarning>) {
        let key = url.as_str().to_string();
        if let Some((features, warnings)) = self.cache_get(&key).await {
            debug!(url = %key, "feature cache hit");
            return (features, warnings);
        }

        let host = self.host_parts(url);
        let mut warnings = Vec::new();
        let mut features = self.lexical_features(url, &host);

        self.network_features(&host, &mut features, &mut warnings).await;
        self.content_features(url, &mut features, &mut warnings).await;

        self.cache_put(key, &features, &warnings).await;
        (features, warnings)
    }

    fn host_parts(&self, url: &Url) -> HostParts {
        match url.host() {
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => HostParts {
                host: url.host_str().unwrap_or_default().to_string(),
                is_ip: true,
                is_idn: false,
                registrable: None,
                subdomains: 0,
                unicode_sld: None,
            },
            Some(Host::Domain(domain)) => {
                let host = domain.trim_end_matches('.').to_ascii_lowercase();
                let registrable = self
                    .psl
                    .domain(host.as_bytes())
                    .and_then(|d| std::str::from_utf8(d.as_bytes()).ok())
                    .map(str::to_string)
                    .or_else(|| fallback_registrable(&host));
                let subdomains = registrable
                    .as_deref()
                    .map(|root| subdomain_count(&host, root))
                    .unwrap_or(0);
                let is_idn = host.split('.').any(|label| label.starts_with("xn--"));
                let unicode_sld = registrable.as_deref().map(|root| {
                    let (unicode, _) = idna::domain_to_unicode(root);
                    unicode
                        .split('.')
                        .next()
                        .unwrap_or(&unicode)
                        .to_string()
                });
                HostParts {
                    host,
                    is_ip: false,
                    is_idn,
                    registrable,
                    subdomains,
                    unicode_sld,
                }
            }
            None => HostParts {
                host: String::new(),
                is_ip: false,
                is_idn: false,
                registrable: None,
                subdomains: 0,
                unicode_sld: None,
            },
        }
    }

    fn lexical_features(&self, url: &Url, host: &HostParts) -> FeatureVector {
        let text = url.as_str();
        FeatureVector {
            url_length: text.len() as f64,
            has_https: flag(url.scheme() == "https"),
            num_dots: text.matches('.').count() as f64,
            has_suspicious_char: flag(text.contains('@') || text.contains('-')),
            is_ip_host: flag(host.is_ip),
            num_subdomains: host.subdomains as f64,
            is_idn_host: flag(host.is_idn),
            host_entropy: shannon_entropy(&host.host),
            brand_similarity: host
                .unicode_sld
                .as_deref()
                .map(brand_similarity)
                .unwrap_or(0.0),
            domain_age_days: -1.0,
            dns_valid: 0.0,
            whois_listed: 0.0,
            has_iframe: 0.0,
            js_obfuscation_score: 0.0,
        }
    }

    async fn network_features(
        &self,
        host: &HostParts,
        features: &mut FeatureVector,
        warnings: &mut Vec<ExtractionWarning>,
    ) {
        if host.is_ip {
            // An address literal resolves to itself, and registry data does
            // not apply; domain_age_days stays at the unknown sentinel.
            features.dns_valid = 1.0;
            return;
        }

        let target = host
            .registrable
            .clone()
            .unwrap_or_else(|| host.host.clone());

        if !self.config.check_dns {
            warnings.push(ExtractionWarning::DnsLookupDisabled);
        } else {
            match tokio::time::timeout(
                self.config.dns_timeout(),
                self.resolver.lookup_ip(target.as_str()),
            )
            .await
            {
                Ok(Ok(lookup)) => {
                    features.dns_valid = flag(lookup.iter().next().is_some());
                }
                Ok(Err(e)) => match e.kind() {
                    // NXDOMAIN is an answer, not a failure: the domain does
                    // not resolve and dns_valid legitimately stays 0.
                    ResolveErrorKind::NoRecordsFound { .. } => {
                        debug!(domain = %target, "no dns records");
                    }
                    _ => {
                        debug!(domain = %target, error = %e, "dns lookup failed");
                        warnings.push(ExtractionWarning::DnsLookupFailed);
                    }
                },
                Err(_) => {
                    warn!(domain = %target, "dns lookup timed out");
                    warnings.push(ExtractionWarning::DnsLookupTimeout);
                }
            }
        }

        if !self.config.check_domain_age {
            warnings.push(ExtractionWarning::WhoisLookupDisabled);
        } else {
            match self.domain_age_days(&target).await {
                Ok(Some(days)) => {
                    features.domain_age_days = days as f64;
                }
                Ok(None) => {
                    debug!(domain = %target, "rdap record has no registration event");
                    warnings.push(ExtractionWarning::WhoisLookupFailed);
                }
                Err(LookupFailure::Timeout) => {
                    warn!(domain = %target, "rdap lookup timed out");
                    warnings.push(ExtractionWarning::WhoisLookupTimeout);
                }
                Err(LookupFailure::Other) => {
                    warnings.push(ExtractionWarning::WhoisLookupFailed);
                }
            }
        }

        features.whois_listed = flag(features.domain_age_days > 0.0);
    }

    async fn domain_age_days(&self, domain: &str) -> Result<Option<i64>, LookupFailure> {
        let endpoint = format!(
            "{}/domain/{}",
            self.config.rdap_endpoint.trim_end_matches('/'),
            domain
        );
        let request = async {
            let response = self
                .http
                .get(&endpoint)
                .timeout(self.config.whois_timeout())
                .send()
                .await?
                .error_for_status()?;
            response.json::<RdapDomain>().await
        };
        match tokio::time::timeout(self.config.whois_timeout(), request).await {
            Err(_) => Err(LookupFailure::Timeout),
            Ok(Err(e)) if e.is_timeout() => Err(LookupFailure::Timeout),
            Ok(Err(e)) => {
                debug!(domain, error = %e, "rdap lookup failed");
                Err(LookupFailure::Other)
            }
            Ok(Ok(record)) => {
                let registered = record
                    .events
                    .iter()
                    .filter(|event| event.event_action == "registration")
                    .filter_map(|event| {
                        chrono::DateTime::parse_from_rfc3339(&event.event_date).ok()
                    })
                    .next();
                Ok(registered.map(|date| {
                    (chrono::Utc::now() - date.with_timezone(&chrono::Utc))
                        .num_days()
                        .max(0)
                }))
            }
        }
    }

    async fn content_features(
        &self,
        url: &Url,
        features: &mut FeatureVector,
        warnings: &mut Vec<ExtractionWarning>,
    ) {
        if !self.config.fetch_content {
            warnings.push(ExtractionWarning::ContentFetchDisabled);
            return;
        }
        if url.scheme() != "http" && url.scheme() != "https" {
            warnings.push(ExtractionWarning::ContentFetchFailed);
            return;
        }
        match self.fetch_page(url).await {
            Ok((body, truncated)) => {
                let body = body.to_lowercase();
                features.has_iframe = flag(body.contains("<iframe"));
                features.js_obfuscation_score = js_obfuscation_score(&body);
                if truncated {
                    warnings.push(ExtractionWarning::ContentTruncated);
                }
            }
            Err(LookupFailure::Timeout) => {
                warn!(url = %url, "content fetch timed out");
                warnings.push(ExtractionWarning::ContentFetchTimeout);
            }
            Err(LookupFailure::Other) => {
                warnings.push(ExtractionWarning::ContentFetchFailed);
            }
        }
    }

    /// Streams the body up to `max_content_bytes` and cuts off there, so a
    /// hostile page can neither stall (timeout) nor balloon (cap) the
    /// extraction.
    async fn fetch_page(&self, url: &Url) -> Result<(String, bool), LookupFailure> {
        let request = async {
            let response = self
                .http
                .get(url.as_str())
                .send()
                .await?
                .error_for_status()?;
            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut truncated = false;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if buffer.len() + chunk.len() > self.config.max_content_bytes {
                    let room = self.config.max_content_bytes - buffer.len();
                    buffer.extend_from_slice(&chunk[..room]);
                    truncated = true;
                    break;
                }
                buffer.extend_from_slice(&chunk);
            }
            Ok::<(String, bool), reqwest::Error>((
                String::from_utf8_lossy(&buffer).into_owned(),
                truncated,
            ))
        };
        match tokio::time::timeout(self.config.content_timeout(), request).await {
            Err(_) => Err(LookupFailure::Timeout),
            Ok(Err(e)) if e.is_timeout() => Err(LookupFailure::Timeout),
            Ok(Err(e)) => {
                debug!(url = %url, error = %e, "content fetch failed");
                Err(LookupFailure::Other)
            }
            Ok(Ok(result)) => Ok(result),
        }
    }

    async fn cache_get(&self, key: &str) -> Option<(FeatureVector, Vec<ExtractionWarning>)> {
        let cache = self.cache.read().await;
        cache.entries.get(key).and_then(|entry| {
            if entry.stored_at.elapsed() < entry.ttl {
                Some((entry.features, entry.warnings.clone()))
            } else {
                None
            }
        })
    }

    async fn cache_put(
        &self,
        key: String,
        features: &FeatureVector,
        warnings: &[ExtractionWarning],
    ) {
        let mut cache = self.cache.write().await;
        cache.entries.insert(
            key,
            CachedEntry {
                features: *features,
                warnings: warnings.to_vec(),
                stored_at: Instant::now(),
                ttl: Duration::from_secs(self.config.cache_ttl_secs),
            },
        );
        if cache.entries.len() > self.config.cache_max_entries {
            let cutoff = Duration::from_secs(self.config.cache_ttl_secs);
            cache.entries.retain(|_, entry| entry.stored_at.elapsed() < cutoff);
        }
    }
}

#[derive(Debug, Deserialize)]
struct RdapDomain {
    #[serde(default)]
    events: Vec<RdapEvent>,
}

#[derive(Debug, Deserialize)]
struct RdapEvent {
    #[serde(rename = "eventAction")]
    event_action: String,
    #[serde(rename = "eventDate")]
    event_date: String,
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn fallback_registrable(host: &str) -> Option<String> {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        Some(labels[labels.len() - 2..].join("."))
    } else {
        Some(host.to_string())
    }
}

fn subdomain_count(host: &str, registrable: &str) -> usize {
    if host.len() > registrable.len() {
        host[..host.len() - registrable.len()]
            .trim_end_matches('.')
            .split('.')
            .filter(|label| !label.is_empty())
            .count()
    } else {
        0
    }
}

fn shannon_entropy(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<u8, usize> = HashMap::new();
    for byte in text.bytes() {
        *counts.entry(byte).or_insert(0) += 1;
    }
    let len = text.len() as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Best Jaro-Winkler similarity against the brand list. An exact match is
/// the brand itself and carries no lookalike signal; sub-floor scores are
/// flattened to 0 so unrelated names do not add noise.
fn brand_similarity(sld: &str) -> f64 {
    let mut best = 0.0f64;
    for brand in BRAND_NAMES {
        if sld == brand {
            return 0.0;
        }
        let score = strsim::jaro_winkler(sld, brand);
        if score > best {
            best = score;
        }
    }
    if best >= BRAND_SIMILARITY_FLOOR {
        best
    } else {
        0.0
    }
}

/// Additive heuristic over classic obfuscation markers, capped at 1.0.
/// Expects a lower-cased body.
fn js_obfuscation_score(body: &str) -> f64 {
    let mut score: f64 = 0.0;
    if body.contains("eval(") {
        score += 0.3;
    }
    if body.contains("unescape(") {
        score += 0.2;
    }
    if body.contains("fromcharcode") {
        score += 0.25;
    }
    if body.contains("atob(") {
        score += 0.15;
    }
    let hex_escapes = body.matches("\\x").count();
    if hex_escapes >= 20 {
        score += 0.3;
    } else if hex_escapes >= 5 {
        score += 0.15;
    }
    score.min(1.0)
}
