//! Shared identifiers for content types and addressable objects.

use serde::{Deserialize, Serialize};

pub const CONTENT_STANDARD: &str = "standard";
pub const CONTENT_NEWS_ARCHIVE: &str = "news_archive";
pub const CONTENT_EVENTS_FEED: &str = "events_feed";
pub const CONTENT_STATIC_FILE: &str = "static_file";

/// Object kinds addressable through `/r/{kind}/{id}/` permalinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Page,
    Article,
    Event,
    MediaFile,
    MediaFolder,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Page => "page",
            ObjectKind::Article => "article",
            ObjectKind::Event => "event",
            ObjectKind::MediaFile => "media_file",
            ObjectKind::MediaFolder => "media_folder",
        }
    }
}

impl TryFrom<&str> for ObjectKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "page" => Ok(ObjectKind::Page),
            "article" => Ok(ObjectKind::Article),
            "event" => Ok(ObjectKind::Event),
            "media_file" => Ok(ObjectKind::MediaFile),
            "media_folder" => Ok(ObjectKind::MediaFolder),
            _ => Err(()),
        }
    }
}

/// Syndicated item streams, one per feed-capable content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    News,
    Events,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedKind::News => "news",
            FeedKind::Events => "events",
        }
    }

    /// Content type a page must have to publish this feed.
    pub fn content_type(self) -> &'static str {
        match self {
            FeedKind::News => CONTENT_NEWS_ARCHIVE,
            FeedKind::Events => CONTENT_EVENTS_FEED,
        }
    }

    pub fn url_for(self, page_id: uuid::Uuid) -> String {
        format!("/feed/{}/{page_id}/", self.as_str())
    }
}

impl TryFrom<&str> for FeedKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "news" => Ok(FeedKind::News),
            "events" => Ok(FeedKind::Events),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_kinds_round_trip_through_their_names() {
        for kind in [
            ObjectKind::Page,
            ObjectKind::Article,
            ObjectKind::Event,
            ObjectKind::MediaFile,
            ObjectKind::MediaFolder,
        ] {
            assert_eq!(ObjectKind::try_from(kind.as_str()), Ok(kind));
        }
        assert!(ObjectKind::try_from("user").is_err());
    }

    #[test]
    fn feed_urls_embed_the_page_id() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            FeedKind::Events.url_for(id),
            "/feed/events/00000000-0000-0000-0000-000000000000/"
        );
        assert_eq!(FeedKind::try_from("news"), Ok(FeedKind::News));
        assert_eq!(FeedKind::News.content_type(), CONTENT_NEWS_ARCHIVE);
    }
}
