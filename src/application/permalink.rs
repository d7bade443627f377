//! Canonical URLs for stored objects, addressed by `(content type, id)`.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::content::{article_path, event_path};
use crate::application::error::AppError;
use crate::application::repos::{ArticlesRepo, EventsRepo, MediaRepo, PagesRepo};
use crate::domain::pages::PageTree;
use crate::domain::types::ObjectKind;

#[derive(Clone)]
pub struct PermalinkService {
    pages: Arc<dyn PagesRepo>,
    articles: Arc<dyn ArticlesRepo>,
    events: Arc<dyn EventsRepo>,
    media: Arc<dyn MediaRepo>,
}

impl PermalinkService {
    pub fn new(
        pages: Arc<dyn PagesRepo>,
        articles: Arc<dyn ArticlesRepo>,
        events: Arc<dyn EventsRepo>,
        media: Arc<dyn MediaRepo>,
    ) -> Self {
        Self {
            pages,
            articles,
            events,
            media,
        }
    }

    /// Canonical URL of the object, or `NotFound` when the kind is unknown,
    /// the object is missing or hidden, or the kind has no URL of its own.
    pub async fn resolve(&self, content_type: &str, object_id: &str) -> Result<String, AppError> {
        let kind = ObjectKind::try_from(content_type)
            .map_err(|_| AppError::not_found(format!("unknown content type `{content_type}`")))?;
        let id = Uuid::parse_str(object_id)
            .map_err(|_| AppError::not_found(format!("`{object_id}` is not an object id")))?;

        let url = match kind {
            ObjectKind::Page => {
                let tree = self.tree().await?;
                visible_url(&tree, id)
            }
            ObjectKind::Article => match self.articles.find_article_by_id(id).await? {
                Some(article)
                    if article.is_online
                        && article.publication_date <= OffsetDateTime::now_utc() =>
                {
                    let tree = self.tree().await?;
                    visible_url(&tree, article.page_id)
                        .map(|archive| format!("{archive}{}", article_path(&article)))
                }
                _ => None,
            },
            ObjectKind::Event => match self.events.find_event_by_id(id).await? {
                Some(event) if event.is_online => {
                    let tree = self.tree().await?;
                    visible_url(&tree, event.page_id)
                        .map(|feed| format!("{feed}{}", event_path(&event)))
                }
                _ => None,
            },
            ObjectKind::MediaFile => self.media.find_file(id).await?.map(|file| file.file_url),
            ObjectKind::MediaFolder => None,
        };

        url.ok_or_else(|| {
            AppError::not_found(format!("{} `{id}` has no canonical URL", kind.as_str()))
        })
    }

    async fn tree(&self) -> Result<PageTree, AppError> {
        Ok(PageTree::build(self.pages.list_pages().await?)?)
    }
}

fn visible_url(tree: &PageTree, page_id: Uuid) -> Option<String> {
    if !tree.is_visible(page_id) {
        return None;
    }
    tree.url(page_id)
}
