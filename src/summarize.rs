//! Extractive summaries: leading sentences, a canned "why it matters"
//! line per topic, and topic tags.

use chrono::{DateTime, Utc};

use crate::models::{Item, Summary, SUMMARY_METHOD_EXTRACTIVE};

const MIN_SENTENCE_CHARS: usize = 20;
const TLDR_SENTENCES: usize = 3;
const FALLBACK_CHARS: usize = 200;
pub const DEFAULT_TAG: &str = "general_ai";

const WHY_LLM: &str = "This development could impact how AI engineers build and deploy language models, potentially affecting inference costs, model architecture choices, and RAG system design.";
const WHY_MLOPS: &str = "For ML engineers, this addresses critical production challenges around model deployment, monitoring, and maintaining model performance in real-world environments.";
const WHY_CV: &str = "Advances in computer vision directly impact applications in autonomous systems, medical imaging, and industrial automation, requiring engineers to stay updated on state-of-the-art techniques.";
const WHY_RETRIEVAL: &str = "This could improve how AI systems access and utilize external knowledge, which is crucial for building more capable and accurate AI applications.";
const WHY_DEFAULT: &str = "Staying informed about AI/ML developments helps engineers make better technical decisions, adopt new tools and techniques, and understand the evolving landscape of machine learning.";

/// Checked in order; first hit wins.
const WHY_RULES: &[(&[&str], &str)] = &[
    (&["llm", "transformer", "gpt"], WHY_LLM),
    (&["mlops", "deployment"], WHY_MLOPS),
    (&["computer vision", "detection"], WHY_CV),
    (&["rag", "retrieval"], WHY_RETRIEVAL),
];

/// Ordered topic → keywords table used for tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicTable {
    pub topics: Vec<(String, Vec<String>)>,
}

impl Default for TopicTable {
    fn default() -> Self {
        let seed: &[(&str, &[&str])] = &[
            (
                "llm",
                &["llm", "transformer", "gpt", "gemini", "llama", "mistral", "language model"],
            ),
            ("nlp", &["nlp", "natural language", "text processing", "sentiment"]),
            (
                "computer_vision",
                &["computer vision", "cv", "yolo", "segmentation", "detection", "opencv"],
            ),
            (
                "mlops",
                &["mlops", "deployment", "monitoring", "drift", "kubernetes", "kubeflow"],
            ),
            ("data", &["data", "dataset", "data pipeline", "etl"]),
            ("cloud", &["aws", "gcp", "azure", "cloud", "s3", "lambda"]),
            ("security", &["security", "privacy", "encryption", "adversarial"]),
            (
                "general_ai",
                &["ai", "artificial intelligence", "machine learning", "deep learning"],
            ),
        ];
        Self {
            topics: seed
                .iter()
                .map(|(t, kws)| (t.to_string(), kws.iter().map(|k| k.to_string()).collect()))
                .collect(),
        }
    }
}

impl TopicTable {
    /// Topics with at least one keyword in `lowered`, in table order.
    pub fn tags_for(&self, lowered: &str) -> Vec<String> {
        let tags: Vec<String> = self
            .topics
            .iter()
            .filter(|(_, kws)| kws.iter().any(|k| lowered.contains(k.as_str())))
            .map(|(t, _)| t.clone())
            .collect();
        if tags.is_empty() {
            vec![DEFAULT_TAG.to_string()]
        } else {
            tags
        }
    }
}

/// Split on `.`, `!`, `?` (terminator kept) and drop short fragments.
pub fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.trim().chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            out.push(current.trim().to_string());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out.retain(|s| s.chars().count() > MIN_SENTENCE_CHARS);
    out
}

fn tldr(text: &str) -> String {
    let s = sentences(text);
    if !s.is_empty() {
        return s.into_iter().take(TLDR_SENTENCES).collect::<Vec<_>>().join(" ");
    }
    let text = text.trim();
    if text.chars().count() > FALLBACK_CHARS {
        format!("{}...", text.chars().take(FALLBACK_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

pub fn why_it_matters(lowered: &str) -> &'static str {
    WHY_RULES
        .iter()
        .find(|(kws, _)| kws.iter().any(|k| lowered.contains(k)))
        .map(|(_, why)| *why)
        .unwrap_or(WHY_DEFAULT)
}

pub fn summarize(item: &Item, topics: &TopicTable, now: DateTime<Utc>) -> Summary {
    let text = match item.excerpt.as_deref() {
        Some(ex) if !ex.is_empty() => format!("{} {}", item.title, ex),
        _ => item.title.clone(),
    };
    let lowered = text.to_lowercase();

    Summary {
        item_id: item.id,
        tldr: tldr(&text),
        why_it_matters: why_it_matters(&lowered).to_string(),
        tags: topics.tags_for(&lowered),
        method: SUMMARY_METHOD_EXTRACTIVE.to_string(),
        created_at: now,
    }
}
