// src/lib.rs
//! Ingestion and ranking pipeline for an AI/ML news feed.
//!
//! Sources (syndication feeds, JSON APIs, the Hacker News API and arXiv) are
//! fetched through an SSRF guard, parsed into a common item shape,
//! deduplicated by content fingerprint, summarized and scored. The worker
//! binary drives [`ingest::Ingestor`] on an interval; everything here is also
//! usable as a library with the in-memory store.

pub mod cancel;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod scoring;
pub mod store;
pub mod summarize;

pub use crate::cancel::{CancelHandle, Cancellation};
pub use crate::error::{ErrorCode, FetchError, SourceError};
pub use crate::ingest::sources::SourceService;
pub use crate::ingest::{Ingestor, RunReport};
