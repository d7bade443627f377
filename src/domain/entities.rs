//! Domain records mirrored from persistent storage.

use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Node in the page tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub slug: String,
    pub title: String,
    pub short_title: Option<String>,
    pub order_index: i32,
    pub is_homepage: bool,
    pub content_type: String,
    /// Handler-specific settings, always a JSON object.
    pub content_settings: serde_json::Value,
    pub is_online: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PageRecord {
    /// Title used in breadcrumbs and navigation.
    pub fn navigation_title(&self) -> &str {
        self.short_title
            .as_deref()
            .filter(|short| !short.trim().is_empty())
            .unwrap_or(&self.title)
    }

    pub fn setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.content_settings.get(key)
    }

    pub fn setting_u64(&self, key: &str) -> Option<u64> {
        self.setting(key).and_then(serde_json::Value::as_u64)
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.setting(key).and_then(serde_json::Value::as_str)
    }
}

/// News item owned by a news-archive page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRecord {
    pub id: Uuid,
    pub page_id: Uuid,
    pub url_title: String,
    pub title: String,
    pub summary: String,
    pub body_html: String,
    pub is_featured: bool,
    pub publication_date: OffsetDateTime,
    pub is_online: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Event owned by an events-feed page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub page_id: Uuid,
    pub url_title: String,
    pub title: String,
    pub summary: String,
    pub body_html: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub is_online: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFolderRecord {
    pub id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFileRecord {
    pub id: Uuid,
    pub folder_id: Option<Uuid>,
    pub title: String,
    /// Public URL of the stored file.
    pub file_url: String,
    pub created_at: OffsetDateTime,
}

/// Persisted copy of a remote response, one per URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedResourceRecord {
    pub id: Uuid,
    pub url: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub status: u16,
    pub fetched_at: OffsetDateTime,
    pub prefetch_expires_at: OffsetDateTime,
}

impl CachedResourceRecord {
    pub fn is_stale(&self, now: OffsetDateTime, ttl: time::Duration) -> bool {
        now - self.fetched_at > ttl
    }

    /// Abandoned records are skipped by batch prefetch.
    pub fn is_prefetch_expired(&self, now: OffsetDateTime) -> bool {
        self.prefetch_expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn page(short_title: Option<&str>) -> PageRecord {
        PageRecord {
            id: Uuid::new_v4(),
            parent_id: None,
            slug: "about".to_string(),
            title: "About the society".to_string(),
            short_title: short_title.map(str::to_string),
            order_index: 0,
            is_homepage: false,
            content_type: "standard".to_string(),
            content_settings: serde_json::json!({ "articles_per_page": 5, "file_id": "x" }),
            is_online: true,
            created_at: datetime!(2024-01-01 00:00 UTC),
            updated_at: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[test]
    fn navigation_title_prefers_short_title() {
        assert_eq!(page(Some("About")).navigation_title(), "About");
        assert_eq!(page(Some("  ")).navigation_title(), "About the society");
        assert_eq!(page(None).navigation_title(), "About the society");
    }

    #[test]
    fn settings_are_read_by_type() {
        let page = page(None);
        assert_eq!(page.setting_u64("articles_per_page"), Some(5));
        assert_eq!(page.setting_u64("file_id"), None);
        assert_eq!(page.setting_str("file_id"), Some("x"));
        assert!(page.setting("missing").is_none());
    }

    #[test]
    fn staleness_uses_elapsed_time() {
        let record = CachedResourceRecord {
            id: Uuid::new_v4(),
            url: "https://example.org/feed".to_string(),
            payload: Vec::new(),
            status: 200,
            fetched_at: datetime!(2024-05-01 12:00 UTC),
            prefetch_expires_at: datetime!(2024-05-08 12:00 UTC),
        };
        let ttl = time::Duration::hours(1);

        assert!(!record.is_stale(datetime!(2024-05-01 13:00 UTC), ttl));
        assert!(record.is_stale(datetime!(2024-05-01 13:00:01 UTC), ttl));
        assert!(!record.is_prefetch_expired(datetime!(2024-05-08 12:00 UTC)));
        assert!(record.is_prefetch_expired(datetime!(2024-05-08 12:00:01 UTC)));
    }
}
