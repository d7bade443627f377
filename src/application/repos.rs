//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::entities::{
    ArticleRecord, CachedResourceRecord, EventRecord, MediaFileRecord, MediaFolderRecord,
    PageRecord,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePageParams {
    pub parent_id: Option<Uuid>,
    pub slug: String,
    pub title: String,
    pub short_title: Option<String>,
    pub is_homepage: bool,
    pub content_type: String,
    pub content_settings: serde_json::Value,
    pub is_online: bool,
}

#[async_trait]
pub trait PagesRepo: Send + Sync {
    /// Every page, online or not. Dispatch builds its tree from this.
    async fn list_pages(&self) -> Result<Vec<PageRecord>, RepoError>;

    async fn find_page(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError>;
}

#[async_trait]
pub trait PagesWriteRepo: Send + Sync {
    /// Appends the page after its existing siblings.
    async fn create_page(&self, params: CreatePageParams) -> Result<PageRecord, RepoError>;

    /// Exchange the order indexes of two pages in one transaction.
    async fn swap_page_order(&self, first: Uuid, second: Uuid) -> Result<(), RepoError>;

    /// Delete a page together with all of its descendants. Returns the number
    /// of pages removed.
    async fn delete_page(&self, id: Uuid) -> Result<u64, RepoError>;
}

/// Filter for published articles, newest first.
#[derive(Debug, Clone)]
pub struct ArticleQuery {
    pub page_id: Option<Uuid>,
    /// Only articles published at or before this instant.
    pub published_before: OffsetDateTime,
    pub year: Option<i32>,
    pub month: Option<u8>,
}

impl ArticleQuery {
    pub fn published(page_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            page_id: Some(page_id),
            published_before: now,
            year: None,
            month: None,
        }
    }
}

#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>, RepoError>;

    /// Published articles across all archives, featured first, then newest.
    async fn latest_articles(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ArticleRecord>, RepoError>;

    async fn find_article(
        &self,
        page_id: Uuid,
        url_title: &str,
    ) -> Result<Option<ArticleRecord>, RepoError>;

    async fn find_article_by_id(&self, id: Uuid) -> Result<Option<ArticleRecord>, RepoError>;
}

/// Filter for online events, earliest start first.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub page_id: Option<Uuid>,
    pub starting_from: Option<Date>,
    pub year: Option<i32>,
    pub month: Option<u8>,
}

#[async_trait]
pub trait EventsRepo: Send + Sync {
    async fn list_events(&self, query: &EventQuery) -> Result<Vec<EventRecord>, RepoError>;

    async fn find_event(
        &self,
        page_id: Uuid,
        url_title: &str,
    ) -> Result<Option<EventRecord>, RepoError>;

    async fn find_event_by_id(&self, id: Uuid) -> Result<Option<EventRecord>, RepoError>;
}

#[async_trait]
pub trait MediaRepo: Send + Sync {
    async fn find_file(&self, id: Uuid) -> Result<Option<MediaFileRecord>, RepoError>;

    async fn find_folder(&self, id: Uuid) -> Result<Option<MediaFolderRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct StoreResourceParams {
    pub url: String,
    pub payload: Vec<u8>,
    pub status: u16,
    pub fetched_at: OffsetDateTime,
    pub prefetch_expires_at: OffsetDateTime,
}

#[async_trait]
pub trait CachedResourcesRepo: Send + Sync {
    async fn find_resource(&self, url: &str) -> Result<Option<CachedResourceRecord>, RepoError>;

    /// Insert or replace the record for `params.url`, keeping its id.
    async fn upsert_resource(
        &self,
        params: StoreResourceParams,
    ) -> Result<CachedResourceRecord, RepoError>;

    /// Replace payload, status and fetch time in place and reset the
    /// prefetch expiry.
    async fn refresh_resource(
        &self,
        id: Uuid,
        payload: Vec<u8>,
        status: u16,
        fetched_at: OffsetDateTime,
        prefetch_expires_at: OffsetDateTime,
    ) -> Result<(), RepoError>;

    async fn renew_prefetch(
        &self,
        id: Uuid,
        prefetch_expires_at: OffsetDateTime,
    ) -> Result<(), RepoError>;

    /// Every stored record, oldest fetch first.
    async fn list_resources(&self) -> Result<Vec<CachedResourceRecord>, RepoError>;
}
