//! Built-in stage handlers
//!
//! These give pipelines their basic vocabulary: `seed` emits configured URLs,
//! `fetch` retrieves them, `parse` extracts links and metadata, `log` is a
//! debugging sink. Anything beyond that is registered by the embedding
//! application.

mod fetch;
mod log;
mod parse;
mod seed;

pub use fetch::FetchHandler;
pub use log::LogHandler;
pub use parse::ParseHandler;
pub use seed::SeedHandler;

use crate::registry::Registry;
use crate::storage::SharedCrawlStore;
use std::sync::Arc;

/// Registers the built-in ops under their canonical names
pub fn register_builtin(registry: &mut Registry, crawls: SharedCrawlStore) {
    registry.register_handler("seed", Arc::new(SeedHandler));
    registry.register_handler("fetch", Arc::new(FetchHandler::new(crawls)));
    registry.register_handler("parse", Arc::new(ParseHandler));
    registry.register_handler("log", Arc::new(LogHandler));
}
