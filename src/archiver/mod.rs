//! Archiver module for Reddit Archiver
//! Contains the ingestion pipeline, persistence layer, and scheduling loop

pub mod config;
pub mod download;
pub mod extract;
pub mod layout;
pub mod lock;
pub mod pipeline;
pub mod reddit;
pub mod resolve;
pub mod scheduler;
pub mod store;

// Re-export commonly used types for convenience
pub use config::{AppConfig, ConfigError, ConfigResult};

pub use store::{NewMediaAsset, Store, StoreError, StoreResult};

pub use reddit::{
    Comment, ContentItem, ItemSource, Post, RedditClient, RedditError, RedditResult,
};

pub use extract::extract_urls;

pub use resolve::{
    MediaType, Resolution, ResolveError, ResolveResult, Resolver, WebResolver,
};

pub use download::{
    DownloadError, DownloadResult, Fetcher, HttpFetcher, ThumbError, ThumbResult,
    REMOVED_SENTINEL_BYTES,
};

pub use layout::{Layout, UserLog};

pub use lock::{InstanceLock, LockError};

pub use pipeline::{IngestPipeline, PipelineError, PipelineResult};

pub use scheduler::Scheduler;
