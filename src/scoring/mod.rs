//! Heuristic item scoring: engagement ("hot"), keyword relevance, domain
//! credibility and recency, combined by [`Weights`].
//!
//! All components live in `[0, 1]`. Ages are measured against an explicit
//! `now` so scores are reproducible in tests.

pub mod config;

pub use config::{CredibilityConfig, KeywordFamily, RelevanceConfig, ScoringConfig, Weights};

use chrono::{DateTime, Utc};

use crate::models::{Item, Score, Signal, Summary};

/// Engagement at which `hot` saturates: 1000 points and 500 comments.
pub const HOT_SATURATION: f64 = 1000.0 * 10.0 + 500.0 * 5.0;
pub const HOT_DECAY_HOURS: f64 = 48.0;
pub const NOVELTY_WINDOW_HOURS: f64 = 168.0;
pub const NOVELTY_FLOOR: f64 = 0.1;

/// Hours between `published_at` and `now`; future dates count as zero.
pub fn age_hours(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let ms = (now - published_at).num_milliseconds();
    (ms.max(0) as f64) / 3_600_000.0
}

pub fn hot_score(signal: Option<&Signal>, age_h: f64) -> f64 {
    let Some(sig) = signal else {
        return 0.0;
    };
    let points = sig.points.unwrap_or(0).max(0) as f64;
    let comments = sig.comments.unwrap_or(0).max(0) as f64;
    let engagement = ((points * 10.0 + comments * 5.0) / HOT_SATURATION).min(1.0);
    engagement * (-age_h.max(0.0) / HOT_DECAY_HOURS).exp()
}

/// Substring scan of `title + excerpt` over the keyword families, plus a
/// bonus for each marker-bearing summary tag. Capped at 1; `baseline` when
/// nothing matched.
pub fn relevance_score(title: &str, excerpt: Option<&str>, tags: &[String], cfg: &RelevanceConfig) -> f64 {
    let mut text = title.to_lowercase();
    if let Some(ex) = excerpt {
        text.push(' ');
        text.push_str(&ex.to_lowercase());
    }

    let mut score = 0.0;
    let mut matches = 0usize;

    for fam in &cfg.families {
        for kw in &fam.keywords {
            if !kw.is_empty() && text.contains(kw.as_str()) {
                score += fam.weight;
                matches += 1;
            }
        }
    }

    for tag in tags {
        let tag = tag.to_lowercase();
        if cfg.tag_markers.iter().any(|m| tag.contains(m.as_str())) {
            score += cfg.tag_weight;
            matches += 1;
        }
    }

    if matches == 0 {
        return cfg.baseline;
    }
    score.min(1.0)
}

pub fn credibility_score(domain: &str, cfg: &CredibilityConfig) -> f64 {
    let d = domain.trim().to_ascii_lowercase();
    if cfg.allow.contains(&d) {
        1.0
    } else if cfg.deny.contains(&d) {
        0.2
    } else {
        0.5
    }
}

/// Linear decay from 1.0 to the floor over a week, then pinned.
pub fn novelty_score(age_h: f64) -> f64 {
    if age_h >= NOVELTY_WINDOW_HOURS {
        return NOVELTY_FLOOR;
    }
    let n = 1.0 - (age_h.max(0.0) / NOVELTY_WINDOW_HOURS) * (1.0 - NOVELTY_FLOOR);
    n.max(NOVELTY_FLOOR)
}

/// Score one item from its latest signal and summary.
pub fn compute_score(
    item: &Item,
    signal: Option<&Signal>,
    summary: Option<&Summary>,
    cfg: &ScoringConfig,
    now: DateTime<Utc>,
) -> Score {
    let age = age_hours(item.published_at, now);
    let tags: &[String] = summary.map(|s| s.tags.as_slice()).unwrap_or(&[]);

    let hot = hot_score(signal, age);
    let relevance = relevance_score(&item.title, item.excerpt.as_deref(), tags, &cfg.relevance);
    let credibility = credibility_score(&item.domain, &cfg.credibility);
    let novelty = novelty_score(age);

    let w = &cfg.weights;
    let final_score = (w.popularity * hot
        + w.relevance * relevance
        + w.credibility * credibility
        + w.novelty * novelty)
        .clamp(0.0, 1.0);

    Score {
        item_id: item.id,
        hot,
        relevance,
        credibility,
        novelty,
        final_score,
        computed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn item(title: &str, domain: &str, published_at: DateTime<Utc>) -> Item {
        Item {
            id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            title: title.to_string(),
            url: format!("https://{domain}/x"),
            published_at,
            fingerprint: "f".into(),
            domain: domain.to_string(),
            category: "news".into(),
            excerpt: None,
            created_at: published_at,
        }
    }

    fn signal(points: i64, comments: i64) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            points: Some(points),
            comments: Some(comments),
            rank: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn future_publish_date_counts_as_fresh() {
        let now = Utc::now();
        assert_eq!(age_hours(now + Duration::hours(5), now), 0.0);
        assert_eq!(novelty_score(age_hours(now + Duration::hours(5), now)), 1.0);
    }

    #[test]
    fn hot_without_signal_is_zero_and_saturates() {
        assert_eq!(hot_score(None, 0.0), 0.0);
        assert_eq!(hot_score(Some(&signal(5_000, 5_000)), 0.0), 1.0);
        let half = hot_score(Some(&signal(500, 250)), 0.0);
        assert!((half - 0.5).abs() < 1e-12);
    }

    #[test]
    fn relevance_counts_every_keyword_hit() {
        let cfg = RelevanceConfig::default();
        // "llm" + "inference" from the llm family
        let r = relevance_score("LLM inference tricks", None, &[], &cfg);
        assert!((r - 0.6).abs() < 1e-12);
        assert_eq!(relevance_score("Gardening tips", None, &[], &cfg), 0.1);
        let capped = relevance_score(
            "LLM transformer RAG prompt inference GPT",
            Some("kubernetes drift"),
            &["llm".into()],
            &cfg,
        );
        assert_eq!(capped, 1.0);
    }

    #[test]
    fn marker_tags_add_to_relevance() {
        let cfg = RelevanceConfig::default();
        let r = relevance_score("Gardening tips", None, &["general_ai".into(), "data".into()], &cfg);
        assert!((r - 0.2).abs() < 1e-12);
    }

    #[test]
    fn final_is_the_weighted_sum() {
        let now = Utc::now();
        let cfg = ScoringConfig::default();
        let it = item("Gardening tips", "example.com", now);
        let s = compute_score(&it, None, None, &cfg, now);
        // hot 0, relevance 0.1, credibility 0.5, novelty 1.0
        let want = 0.25 * 0.1 + 0.15 * 0.5 + 0.05 * 1.0;
        assert!((s.final_score - want).abs() < 1e-12);
        assert_eq!(s.item_id, it.id);
        assert_eq!(s.computed_at, now);
    }
}
