use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::{
    ContentHandler, EventsFeedHandler, NewsArchiveHandler, RouterError, StandardHandler,
    StaticFileHandler,
};
use crate::application::repos::{ArticlesRepo, EventsRepo, MediaRepo};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("content type `{0}` is already registered")]
    Duplicate(String),
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Repositories the built-in handlers read from.
#[derive(Clone)]
pub struct ContentRepos {
    pub articles: Arc<dyn ArticlesRepo>,
    pub events: Arc<dyn EventsRepo>,
    pub media: Arc<dyn MediaRepo>,
}

/// Content-type identifier to handler, fixed after start-up.
#[derive(Default)]
pub struct ContentRegistry {
    handlers: HashMap<&'static str, Arc<dyn ContentHandler>>,
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in content type.
    pub fn standard(repos: ContentRepos) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(StandardHandler::new(repos.articles.clone())?))?;
        registry.register(Arc::new(NewsArchiveHandler::new(repos.articles)?))?;
        registry.register(Arc::new(EventsFeedHandler::new(repos.events)?))?;
        registry.register(Arc::new(StaticFileHandler::new(repos.media)?))?;
        Ok(registry)
    }

    pub fn register(&mut self, handler: Arc<dyn ContentHandler>) -> Result<(), RegistryError> {
        let content_type = handler.content_type();
        if self.handlers.contains_key(content_type) {
            return Err(RegistryError::Duplicate(content_type.to_string()));
        }
        self.handlers.insert(content_type, handler);
        Ok(())
    }

    pub fn lookup(&self, content_type: &str) -> Option<Arc<dyn ContentHandler>> {
        self.handlers.get(content_type).cloned()
    }

    pub fn content_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::InMemoryRepositories;

    fn repos() -> ContentRepos {
        let store = Arc::new(InMemoryRepositories::new());
        ContentRepos {
            articles: store.clone(),
            events: store.clone(),
            media: store,
        }
    }

    #[test]
    fn standard_registry_holds_builtin_types() {
        let registry = ContentRegistry::standard(repos()).expect("registry");
        assert_eq!(
            registry.content_types(),
            vec!["events_feed", "news_archive", "standard", "static_file"]
        );
        let handler = registry.lookup("news_archive").expect("news handler");
        assert_eq!(handler.content_type(), "news_archive");
        assert!(registry.lookup("gallery").is_none());
    }

    #[test]
    fn duplicate_content_types_are_rejected() {
        let mut registry = ContentRegistry::standard(repos()).expect("registry");
        let store = Arc::new(InMemoryRepositories::new());
        let handler = StandardHandler::new(store).expect("valid routes");
        assert!(matches!(
            registry.register(Arc::new(handler)),
            Err(RegistryError::Duplicate(content_type)) if content_type == "standard"
        ));
    }
}
