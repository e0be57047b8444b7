//! # javadoc-store
//!
//! Loads class documentation from a directory of javadoc archives, resolves
//! short and fully-qualified class names across libraries, and keeps the
//! index in step with the directory while it is being read.
//!
//! ## Architecture
//!
//! - **model**: Class, method and parameter documentation types
//! - **error**: Error types for archives, lookups and the watcher
//! - **archive**: Archive reader, library metadata and documentation URLs
//! - **parse**: Class documentation XML parsing
//! - **registry**: Name index with case-insensitive and short-name resolution
//! - **catalog**: Loaded archives plus the registry, with rejection bookkeeping
//! - **scan**: Archive discovery in the watched directory
//! - **incremental**: Fingerprint-based change detection for polling
//! - **store**: The `DocStore` lookup trait and the uncached store
//! - **cache**: Cached store with lazily parsed, generation-keyed documents
//! - **watcher**: Debounced directory watching with a polling fallback
//! - **config**: Store configuration and directory resolution

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod incremental;
pub mod model;
pub mod parse;
pub mod registry;
pub mod scan;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod testing;
