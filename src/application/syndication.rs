//! RSS 2.0 feeds for news-archive and events-feed pages.
//!
//! Each feed-capable page publishes its own channel under
//! `/feed/{kind}/{page_id}/`; the HTTP layer only maps errors and sets the
//! content type.

use std::sync::Arc;

use time::{OffsetDateTime, format_description::well_known::Rfc2822};
use uuid::Uuid;

use crate::application::content::{article_path, event_path};
use crate::application::error::AppError;
use crate::application::repos::{ArticleQuery, ArticlesRepo, EventQuery, EventsRepo, PagesRepo};
use crate::domain::entities::PageRecord;
use crate::domain::pages::PageTree;
use crate::domain::types::FeedKind;

/// Most items a single channel lists.
pub const FEED_ITEM_LIMIT: usize = 50;

#[derive(Clone)]
pub struct SyndicationService {
    pages: Arc<dyn PagesRepo>,
    articles: Arc<dyn ArticlesRepo>,
    events: Arc<dyn EventsRepo>,
    site_name: String,
    base_url: String,
}

struct FeedItem {
    title: String,
    link: String,
    guid: String,
    pub_date: String,
    description: String,
}

impl SyndicationService {
    pub fn new(
        pages: Arc<dyn PagesRepo>,
        articles: Arc<dyn ArticlesRepo>,
        events: Arc<dyn EventsRepo>,
        site_name: impl Into<String>,
        base_url: &str,
    ) -> Self {
        Self {
            pages,
            articles,
            events,
            site_name: site_name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn feed(&self, kind: &str, page_id: &str) -> Result<String, AppError> {
        self.feed_at(kind, page_id, OffsetDateTime::now_utc()).await
    }

    /// Build the channel for `page_id` as of `now`.
    pub async fn feed_at(
        &self,
        kind: &str,
        page_id: &str,
        now: OffsetDateTime,
    ) -> Result<String, AppError> {
        let kind = FeedKind::try_from(kind)
            .map_err(|_| AppError::not_found(format!("unknown feed `{kind}`")))?;
        let page_id = Uuid::parse_str(page_id)
            .map_err(|_| AppError::not_found(format!("`{page_id}` is not a page id")))?;

        let tree = PageTree::build(self.pages.list_pages().await?)?;
        let (page, page_url) = tree
            .get(page_id)
            .filter(|page| page.content_type == kind.content_type())
            .filter(|page| tree.is_visible(page.id))
            .and_then(|page| Some((page, tree.url(page.id)?)))
            .ok_or_else(|| {
                AppError::not_found(format!("page `{page_id}` has no {} feed", kind.as_str()))
            })?;
        let page_url = format!("{}{page_url}", self.base_url);

        let items = match kind {
            FeedKind::News => self.news_items(page, &page_url, now).await?,
            FeedKind::Events => self.event_items(page, &page_url, now).await?,
        };
        Ok(self.channel(page, &page_url, &items))
    }

    async fn news_items(
        &self,
        page: &PageRecord,
        page_url: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<FeedItem>, AppError> {
        let articles = self
            .articles
            .list_articles(&ArticleQuery::published(page.id, now))
            .await?;

        Ok(articles
            .into_iter()
            .take(FEED_ITEM_LIMIT)
            .map(|article| {
                let link = format!("{page_url}{}", article_path(&article));
                FeedItem {
                    title: article.title,
                    guid: link.clone(),
                    link,
                    pub_date: rfc2822(article.publication_date),
                    description: article.summary,
                }
            })
            .collect())
    }

    async fn event_items(
        &self,
        page: &PageRecord,
        page_url: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<FeedItem>, AppError> {
        let query = EventQuery {
            page_id: Some(page.id),
            starting_from: Some(now.date()),
            ..EventQuery::default()
        };
        let events = self.events.list_events(&query).await?;

        Ok(events
            .into_iter()
            .take(FEED_ITEM_LIMIT)
            .map(|event| {
                let link = format!("{page_url}{}", event_path(&event));
                FeedItem {
                    title: event.title,
                    guid: link.clone(),
                    link,
                    pub_date: rfc2822(event.start_date.midnight().assume_utc()),
                    description: event.summary,
                }
            })
            .collect())
    }

    fn channel(&self, page: &PageRecord, page_url: &str, items: &[FeedItem]) -> String {
        let mut rendered = String::new();
        for item in items {
            rendered.push_str(&format!(
                "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid>{}</guid>\n      <pubDate>{}</pubDate>\n      <description><![CDATA[{}]]></description>\n    </item>\n",
                xml_escape(&item.title),
                xml_escape(&item.link),
                xml_escape(&item.guid),
                item.pub_date,
                cdata_safe(&item.description),
            ));
        }

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n{}  </channel>\n</rss>\n",
            xml_escape(&format!("{}: {}", self.site_name, page.title)),
            xml_escape(page_url),
            xml_escape(&page.title),
            rendered
        )
    }
}

fn rfc2822(at: OffsetDateTime) -> String {
    at.format(&Rfc2822).unwrap_or_else(|_| at.to_string())
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn cdata_safe(input: &str) -> String {
    input.replace("]]>", "]]]]><![CDATA[>")
}
