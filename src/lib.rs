//! casedup - Exact and near-duplicate detection for test-case catalogs
//!
//! Cases from a CSV or JSON export are normalized into one canonical text each.
//! Byte-identical texts form exact-duplicate groups; embeddings, nearest
//! neighbors and step-level matching find pairs that say the same thing in
//! different words. Results become reviewable work lists proposing which case
//! to keep and which to archive.
//!
//! ```no_run
//! use casedup::{analyze_catalog, load_embedder, Config, Outputs};
//! use std::path::Path;
//!
//! let config = Config::default();
//! let embedder = load_embedder(&config.embedding);
//! let analysis = analyze_catalog(Path::new("cases.csv"), &config, &*embedder)?;
//! analysis
//!     .artifacts(&config.thresholds, Outputs::All)?
//!     .write_to(Path::new("out"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod case;
pub mod catalog;
pub mod config;
pub mod embed;
pub mod error;
pub mod exact;
pub mod neighbors;
pub mod normalize;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pairs;
pub mod pipeline;
pub mod report;
pub mod similarity;
pub mod steps;
pub mod worklist;

pub use case::{build_cases, CanonicalCase, RawCaseRecord};
pub use catalog::load_catalog;
pub use config::{Config, Thresholds};
pub use embed::{load_embedder, Embedder, HashingEmbedder};
pub use error::{DedupError, Result};
pub use exact::{find_exact_duplicates, DuplicateGroup};
pub use normalize::normalize;
pub use pairs::{compute_similar_pairs, Relation, SimilarPair};
pub use pipeline::{analyze, analyze_catalog, Analysis, Outputs};
pub use worklist::{build_work_lists, WorkLists};
