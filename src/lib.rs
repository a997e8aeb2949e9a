//! Company Valuation API Library
//!
//! Enriches Norwegian companies from public registries and the web, and values
//! them through an AI-assisted pathway with a deterministic fallback.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Domain logic and shared errors/models.
//! - `integrations`: External data sources and the text generator.
//! - `ai_valuation`: Prompt building and the repair gate for generated valuations.
//! - `analytics`: Pure financial helpers (trends, debt, working capital).
//! - `cache_validator`: Checksum envelope for in-memory cache entries.
//! - `circuit_breaker`: Circuit breaker around the generator.
//! - `config`: Configuration management.
//! - `db`: Database connection and schema.
//! - `enrichment`: Enrichment orchestrator.
//! - `enrichment_cache`: Postgres and in-memory enrichment caches.
//! - `errors`: Error handling types.
//! - `extraction`: Regex and generative field extraction.
//! - `handlers`: HTTP request handlers.
//! - `industry`: Industry keys, multiples and defaults.
//! - `llm_client`: OpenAI-compatible chat client.
//! - `merge`: Priority merge of source records.
//! - `models`: Identity, source and enrichment models.
//! - `rate_limit`: Per-IP quotas.
//! - `registry_sources` / `web_sources` / `sources`: Source adapters.
//! - `sanitize`: Valuation input validation.
//! - `valuation`: Deterministic calculator.
//! - `valuation_models`: Valuation input, result and record types.
//! - `valuation_service`: Valuation workflow with fallbacks.
//! - `valuation_store`: Valuation persistence.

pub mod api;
pub mod core;
pub mod integrations;

pub mod ai_valuation;
pub mod analytics;
pub mod cache_validator;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod enrichment_cache;
pub mod errors;
pub mod extraction;
pub mod handlers;
pub mod industry;
pub mod llm_client;
pub mod merge;
pub mod models;
pub mod rate_limit;
pub mod registry_sources;
pub mod sanitize;
pub mod sources;
pub mod valuation;
pub mod valuation_models;
pub mod valuation_service;
pub mod valuation_store;
pub mod web_sources;
