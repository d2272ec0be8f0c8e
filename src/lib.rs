//! ragserve — streaming chat service with web-search grounding, queued
//! document ingestion, and job-record polling.
//!
//! The HTTP layer ([`api`]) serves chat as server-sent events produced by
//! the pipeline in [`chat`], while document embedding runs as background
//! jobs ([`queue`]) whose records live in a pluggable store ([`store`]).

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod queue;
pub mod search;
pub mod store;
