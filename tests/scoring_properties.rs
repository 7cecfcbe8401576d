// tests/scoring_properties.rs
use chrono::{Duration, Utc};
use feed_radar::models::{Item, Signal, Summary};
use feed_radar::scoring::{
    compute_score, credibility_score, hot_score, novelty_score, relevance_score,
    CredibilityConfig, RelevanceConfig, ScoringConfig,
};
use uuid::Uuid;

fn item(title: &str, domain: &str, age_h: i64) -> Item {
    let now = Utc::now();
    Item {
        id: Uuid::new_v4(),
        source_id: Uuid::new_v4(),
        title: title.into(),
        url: format!("https://{domain}/x"),
        published_at: now - Duration::hours(age_h),
        fingerprint: Uuid::new_v4().to_string(),
        domain: domain.into(),
        category: "news".into(),
        excerpt: None,
        created_at: now,
    }
}

fn signal(points: i64, comments: i64) -> Signal {
    Signal {
        id: Uuid::new_v4(),
        item_id: Uuid::new_v4(),
        points: Some(points),
        comments: Some(comments),
        rank: Some(1),
        fetched_at: Utc::now(),
    }
}

#[test]
fn final_score_stays_in_unit_interval() {
    let cfg = ScoringConfig::default();
    let loud = signal(1_000_000, 1_000_000);
    let summary = Summary {
        item_id: Uuid::new_v4(),
        tldr: String::new(),
        why_it_matters: String::new(),
        tags: vec!["llm".into(), "mlops".into(), "general_ai".into()],
        method: "extractive".into(),
        created_at: Utc::now(),
    };
    for (title, domain, age) in [
        ("LLM RAG GPT transformer kubernetes yolo deployment", "openai.com", 0),
        ("gardening tips", "medium.com", 10_000),
        ("", "unknown.test", -5),
    ] {
        let it = item(title, domain, age);
        for sig in [None, Some(&loud)] {
            let s = compute_score(&it, sig, Some(&summary), &cfg, Utc::now());
            assert!((0.0..=1.0).contains(&s.final_score), "{title}: {}", s.final_score);
            for c in [s.hot, s.relevance, s.credibility, s.novelty] {
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }
}

#[test]
fn hot_grows_with_engagement_and_decays_with_age() {
    let small = signal(10, 2);
    let big = signal(300, 80);
    assert!(hot_score(Some(&big), 1.0) > hot_score(Some(&small), 1.0));
    assert!(hot_score(Some(&big), 1.0) > hot_score(Some(&big), 24.0));
    assert_eq!(hot_score(None, 0.0), 0.0);
    // saturates at 1 for a brand-new viral story
    assert_eq!(hot_score(Some(&signal(5_000, 5_000)), 0.0), 1.0);
}

#[test]
fn novelty_decays_linearly_to_its_floor() {
    assert_eq!(novelty_score(0.0), 1.0);
    assert!((novelty_score(84.0) - 0.55).abs() < 1e-9);
    assert_eq!(novelty_score(168.0), 0.1);
    assert_eq!(novelty_score(10_000.0), 0.1);
}

#[test]
fn credibility_is_exact_for_listed_domains() {
    let cfg = CredibilityConfig::default();
    assert_eq!(credibility_score("arxiv.org", &cfg), 1.0);
    assert_eq!(credibility_score("OpenAI.com", &cfg), 1.0);
    assert_eq!(credibility_score("medium.com", &cfg), 0.2);
    assert_eq!(credibility_score("blog.example", &cfg), 0.5);
}

#[test]
fn relevance_uses_baseline_when_nothing_matches() {
    let cfg = RelevanceConfig::default();
    assert_eq!(relevance_score("Sourdough starters", None, &[], &cfg), 0.1);
    let r = relevance_score("Fine-tune an LLM", Some("cheap inference"), &[], &cfg);
    assert!((r - 0.9).abs() < 1e-9, "{r}");
    let capped = relevance_score(
        "llm rag gpt transformer",
        None,
        &["llm".to_string()],
        &cfg,
    );
    assert_eq!(capped, 1.0);
}

#[test]
fn weights_from_file_change_the_blend() {
    let cfg = ScoringConfig::from_toml_str(
        r#"
        [weights]
        popularity = 0.0
        relevance = 0.0
        credibility = 1.0
        novelty = 0.0
        "#,
    )
    .unwrap();
    let s = compute_score(&item("x", "arxiv.org", 1), None, None, &cfg, Utc::now());
    assert_eq!(s.final_score, 1.0);
}
