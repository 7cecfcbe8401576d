//! # Scoring configuration
//!
//! Weights, keyword families and domain lists for the scoring engine.
//! Built once at startup (built-in seed, or a TOML file) and then passed
//! around by reference; nothing here changes while the worker runs.
//!
//! TOML shape (every table optional, missing keys take the seed values):
//!
//! ```toml
//! [weights]
//! popularity = 0.55
//! relevance = 0.25
//! credibility = 0.15
//! novelty = 0.05
//!
//! [relevance]
//! tag_weight = 0.2
//! tag_markers = ["llm", "ml", "ai"]
//!
//! [[relevance.families]]
//! name = "llm"
//! weight = 0.3
//! keywords = ["llm", "transformer"]
//!
//! [credibility]
//! allow = ["arxiv.org"]
//! deny = ["medium.com"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{collections::HashSet, fs, path::Path};
use tracing::info;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Component weights of the final score. Must be non-negative and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub popularity: f64,
    pub relevance: f64,
    pub credibility: f64,
    pub novelty: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            popularity: 0.55,
            relevance: 0.25,
            credibility: 0.15,
            novelty: 0.05,
        }
    }
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.popularity + self.relevance + self.credibility + self.novelty
    }

    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("popularity", self.popularity),
            ("relevance", self.relevance),
            ("credibility", self.credibility),
            ("novelty", self.novelty),
        ] {
            if !w.is_finite() || w < 0.0 {
                bail!("weight `{name}` must be a non-negative number, got {w}");
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!("weights must sum to 1.0, got {sum}");
        }
        Ok(())
    }
}

/// A named keyword list; every keyword found in the text adds `weight`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeywordFamily {
    pub name: String,
    pub weight: f64,
    pub keywords: Vec<String>,
}

impl KeywordFamily {
    fn new(name: &str, weight: f64, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            weight,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    pub families: Vec<KeywordFamily>,
    /// Added once per summary tag containing any marker.
    pub tag_weight: f64,
    pub tag_markers: Vec<String>,
    /// Score when nothing matched at all.
    pub baseline: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            families: vec![
                KeywordFamily::new(
                    "llm",
                    0.3,
                    &[
                        "llm",
                        "transformer",
                        "rag",
                        "prompt",
                        "inference",
                        "fine-tune",
                        "gpt",
                        "gemini",
                        "llama",
                        "mistral",
                    ],
                ),
                KeywordFamily::new(
                    "mlops",
                    0.25,
                    &[
                        "mlops",
                        "deployment",
                        "monitoring",
                        "drift",
                        "kubernetes",
                        "kubeflow",
                        "airflow",
                        "feature store",
                    ],
                ),
                KeywordFamily::new(
                    "cv",
                    0.2,
                    &["computer vision", "yolo", "segmentation", "detection", "opencv"],
                ),
            ],
            tag_weight: 0.2,
            tag_markers: vec!["llm".into(), "ml".into(), "ai".into()],
            baseline: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CredibilityConfig {
    pub allow: HashSet<String>,
    pub deny: HashSet<String>,
}

impl Default for CredibilityConfig {
    fn default() -> Self {
        let allow = [
            "openai.com",
            "ai.googleblog.com",
            "deepmind.google",
            "arxiv.org",
            "acm.org",
            "ieee.org",
            "github.com",
            "docs.github.com",
        ];
        Self {
            allow: allow.iter().map(|d| d.to_string()).collect(),
            deny: ["medium.com".to_string()].into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: Weights,
    pub relevance: RelevanceConfig,
    pub credibility: CredibilityConfig,
}

impl ScoringConfig {
    /// Parse and validate a TOML document. Keywords, markers and domains
    /// are lower-cased so matching stays case-insensitive.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: ScoringConfig = toml::from_str(s).context("parsing scoring config")?;
        cfg.weights.validate()?;
        for fam in &mut cfg.relevance.families {
            if !fam.weight.is_finite() || fam.weight < 0.0 {
                bail!("keyword family `{}` has a negative weight", fam.name);
            }
            fam.keywords = fam.keywords.iter().map(|k| k.to_lowercase()).collect();
        }
        cfg.relevance.tag_markers = cfg
            .relevance
            .tag_markers
            .iter()
            .map(|m| m.to_lowercase())
            .collect();
        cfg.credibility.allow = lower_set(&cfg.credibility.allow);
        cfg.credibility.deny = lower_set(&cfg.credibility.deny);
        Ok(cfg)
    }

    /// Load from a TOML file. A missing file means the built-in seed; a file
    /// that exists but does not validate is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => {
                let cfg = Self::from_toml_str(&s)
                    .with_context(|| format!("invalid scoring config {}", path.display()))?;
                info!(path = %path.display(), "scoring config loaded");
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no scoring config, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

fn lower_set(set: &HashSet<String>) -> HashSet<String> {
    set.iter().map(|d| d.trim().to_ascii_lowercase()).collect()
}
