//! # docrag
//!
//! Multi-tenant retrieval-augmented document question answering.
//!
//! ## Overview
//!
//! `docrag` ingests documents per tenant into a semantic vector index,
//! retrieves the passages most relevant to a question, and composes a
//! grounded prompt for a language-model backend — with a relevance gate
//! that falls back to a plain conversational answer when retrieval is not
//! confident enough to trust.
//!
//! Each tenant is fully isolated: its own index, configuration, and
//! model backend, persisted under its own directory. [`TenantManager`]
//! constructs tenants lazily with single-flight semantics, and
//! [`RagService`] is the facade a bot front-end or HTTP layer calls.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docrag::{ApiProviderFactory, RagService, TenantConfig};
//!
//! let service = RagService::new("./data", Arc::new(ApiProviderFactory));
//! service.create_tenant("acme", &TenantConfig::default())?;
//!
//! service.ingest_text("acme", "Paris is the capital of France.", Default::default()).await?;
//! service.save("acme").await?;
//!
//! let answer = service.ask("acme", "What is the capital of France?", &[]).await?;
//! println!("{} (grounded: {})", answer.text, answer.used_context);
//! ```
//!
//! ## Capabilities
//!
//! Embedding and generation are abstract capabilities
//! ([`EmbeddingProvider`], [`LanguageModel`]) resolved once per tenant by
//! a [`ProviderFactory`]. Shipped backends:
//!
//! - [`OpenAiEmbeddings`] / [`OpenAiLm`] — the OpenAI API, or any
//!   OpenAI-compatible server
//! - [`OpenRouterLm`] — gateway-routed models via OpenRouter
//! - [`mock`] — deterministic offline implementations for tests

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod mock;
pub mod openai;
pub mod openrouter;
pub mod pipeline;
pub mod retriever;
pub mod service;
pub mod tenant;

pub use chunking::{Chunker, FixedSizeChunker};
pub use config::{LmProvider, TenantConfig, TenantConfigBuilder};
pub use document::{ChatMessage, Chunk, Document, RetrievalResult, Role};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generate::Generator;
pub use index::{SharedIndex, VectorIndex};
pub use ingest::{DocumentIngestor, IngestFailure, IngestReport};
pub use llm::LanguageModel;
pub use openai::{OpenAiEmbeddings, OpenAiLm};
pub use openrouter::OpenRouterLm;
pub use pipeline::{Answer, RagPipeline};
pub use retriever::Retriever;
pub use service::RagService;
pub use tenant::{ApiProviderFactory, ProviderFactory, Tenant, TenantManager};
