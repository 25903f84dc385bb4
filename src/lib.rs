//! # floridify-core
//!
//! Storage and search substrate for a versioned, multi-provider
//! dictionary/lexicon platform.
//!
//! - Append-only, content-addressed version chains with an inline/external
//!   content split and a two-tier (memory + blob store) cache.
//! - Corpora linked into parent/child trees with vocabulary-hash-based
//!   staleness detection for their dependent indices.
//! - A cascading search engine: exact, prefix, fuzzy, and semantic.
//! - A progress-streaming pipeline for multi-stage work.

pub mod cache;
pub mod codec;
pub mod config;
pub mod corpus;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod search;
pub mod storage;
pub mod text;
pub mod version;

pub use cache::{Cache, CacheNamespace, CacheStats};
pub use config::Config;
pub use corpus::{Corpus, CorpusTree, CorpusTreeNode, CorpusType};
pub use dedup::DedupGate;
pub use embedding::{Embedder, StaticEmbedder};
#[cfg(feature = "embeddings-openai")]
pub use embedding::openai::OpenAiEmbedder;
pub use error::{FloridifyError, Result};
pub use pipeline::{create_streaming_response, PipelineState, StateTracker, StreamEvent, StreamerConfig};
pub use provider::{DictionaryEntry, NullProvider, Provider, ProviderCache};
pub use registry::{ModelRegistry, ResourceSchema};
pub use search::{MethodHint, SearchFacade, SearchIndex, SearchMethod, SearchResult};
pub use storage::BlobStore;
pub use version::{ContentLocation, KeyProvider, ResourceKey, ResourceType, SaveConfig, VersionInfo, VersionRecord, VersionStore};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
