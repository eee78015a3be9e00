//! URL phishing classification engine.
//!
//! A raw URL is normalized, turned into a fixed-order feature vector by the
//! [`features::FeatureExtractor`] (lexical, host, DNS/RDAP, and page-content
//! features with bounded timeouts), scored by a [`model::ScoringModel`]
//! loaded from a versioned artifact, and explained per prediction. The
//! [`evaluate::Evaluator`] produces the confusion-matrix / ROC / AUC report
//! consumed by dashboards. Transport is a caller concern: everything here is
//! data in, data out.
//!
//! ```no_run
//! use osprey_engine::{Config, PredictionEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), osprey_engine::EngineError> {
//!     let engine = PredictionEngine::new(Config::load()?).await?;
//!     let result = engine.handle("https://example.com/login").await?;
//!     println!("{} ({:.3})", result.label, result.probability);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod explain;
pub mod features;
pub mod model;
pub mod telemetry;
pub mod types;

pub use config::Config;
pub use dataset::LabeledExample;
pub use engine::PredictionEngine;
pub use error::EngineError;
pub use evaluate::{EvaluationReport, Evaluator};
pub use model::{ModelArtifact, ScoringModel};
pub use types::{FeatureVector, Label, PredictionResult};
