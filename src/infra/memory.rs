//! In-process repositories.
//!
//! Used by tests and by `serve` when no database URL is configured. All state
//! sits behind one `tokio::sync::RwLock`, so every repository call is atomic
//! with respect to the others.

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::repos::{
    ArticleQuery, ArticlesRepo, CachedResourcesRepo, CreatePageParams, EventQuery, EventsRepo,
    MediaRepo, PagesRepo, PagesWriteRepo, RepoError, StoreResourceParams,
};
use crate::domain::entities::{
    ArticleRecord, CachedResourceRecord, EventRecord, MediaFileRecord, MediaFolderRecord,
    PageRecord,
};
use crate::domain::slug::{ensure_url_slug, generate_unique_slug};

#[derive(Debug, Default)]
struct State {
    pages: Vec<PageRecord>,
    articles: Vec<ArticleRecord>,
    events: Vec<EventRecord>,
    folders: Vec<MediaFolderRecord>,
    files: Vec<MediaFileRecord>,
    resources: Vec<CachedResourceRecord>,
}

/// Article to seed; `url_title` is derived from the title when absent.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub page_id: Uuid,
    pub title: String,
    pub url_title: Option<String>,
    pub summary: String,
    pub body_html: String,
    pub is_featured: bool,
    pub publication_date: OffsetDateTime,
    pub is_online: bool,
}

/// Event to seed; `url_title` is derived from the title when absent.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub page_id: Uuid,
    pub title: String,
    pub url_title: Option<String>,
    pub summary: String,
    pub body_html: String,
    pub start_date: Date,
    pub end_date: Option<Date>,
    pub is_online: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryRepositories {
    state: RwLock<State>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_article(&self, article: NewArticle) -> Result<ArticleRecord, RepoError> {
        let mut state = self.state.write().await;
        let url_title = unique_url_title(
            article.url_title.as_deref(),
            &article.title,
            state
                .articles
                .iter()
                .filter(|existing| existing.page_id == article.page_id)
                .map(|existing| existing.url_title.as_str()),
        )?;
        let now = OffsetDateTime::now_utc();
        let record = ArticleRecord {
            id: Uuid::new_v4(),
            page_id: article.page_id,
            url_title,
            title: article.title,
            summary: article.summary,
            body_html: article.body_html,
            is_featured: article.is_featured,
            publication_date: article.publication_date,
            is_online: article.is_online,
            created_at: now,
            updated_at: now,
        };
        state.articles.push(record.clone());
        Ok(record)
    }

    pub async fn insert_event(&self, event: NewEvent) -> Result<EventRecord, RepoError> {
        let mut state = self.state.write().await;
        let url_title = unique_url_title(
            event.url_title.as_deref(),
            &event.title,
            state
                .events
                .iter()
                .filter(|existing| existing.page_id == event.page_id)
                .map(|existing| existing.url_title.as_str()),
        )?;
        let now = OffsetDateTime::now_utc();
        let record = EventRecord {
            id: Uuid::new_v4(),
            page_id: event.page_id,
            url_title,
            title: event.title,
            summary: event.summary,
            body_html: event.body_html,
            start_date: event.start_date,
            end_date: event.end_date,
            is_online: event.is_online,
            created_at: now,
            updated_at: now,
        };
        state.events.push(record.clone());
        Ok(record)
    }

    pub async fn insert_folder(&self, name: &str) -> MediaFolderRecord {
        let record = MediaFolderRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.state.write().await.folders.push(record.clone());
        record
    }

    pub async fn insert_file(
        &self,
        folder_id: Option<Uuid>,
        title: &str,
        file_url: &str,
    ) -> MediaFileRecord {
        let record = MediaFileRecord {
            id: Uuid::new_v4(),
            folder_id,
            title: title.to_string(),
            file_url: file_url.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.state.write().await.files.push(record.clone());
        record
    }
}

fn unique_url_title<'a>(
    explicit: Option<&str>,
    title: &str,
    taken: impl Iterator<Item = &'a str>,
) -> Result<String, RepoError> {
    let taken: Vec<&str> = taken.collect();
    match explicit {
        Some(url_title) => {
            ensure_url_slug(url_title).map_err(|err| RepoError::InvalidInput {
                message: err.to_string(),
            })?;
            if taken.contains(&url_title) {
                return Err(RepoError::Duplicate {
                    constraint: "url_title".to_string(),
                });
            }
            Ok(url_title.to_string())
        }
        None => generate_unique_slug(title, |candidate| !taken.contains(&candidate)).map_err(
            |err| RepoError::InvalidInput {
                message: err.to_string(),
            },
        ),
    }
}

fn in_month(date: Date, year: Option<i32>, month: Option<u8>) -> bool {
    year.is_none_or(|year| date.year() == year)
        && month.is_none_or(|month| u8::from(date.month()) == month)
}

#[async_trait]
impl PagesRepo for InMemoryRepositories {
    async fn list_pages(&self) -> Result<Vec<PageRecord>, RepoError> {
        Ok(self.state.read().await.pages.clone())
    }

    async fn find_page(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.pages.iter().find(|page| page.id == id).cloned())
    }
}

#[async_trait]
impl PagesWriteRepo for InMemoryRepositories {
    async fn create_page(&self, params: CreatePageParams) -> Result<PageRecord, RepoError> {
        let mut state = self.state.write().await;

        if params.is_homepage {
            if params.parent_id.is_some() {
                return Err(RepoError::InvalidInput {
                    message: "the homepage cannot have a parent".to_string(),
                });
            }
            if state.pages.iter().any(|page| page.is_homepage) {
                return Err(RepoError::Duplicate {
                    constraint: "pages_single_homepage".to_string(),
                });
            }
        } else {
            ensure_url_slug(&params.slug).map_err(|err| RepoError::InvalidInput {
                message: err.to_string(),
            })?;
        }

        if let Some(parent_id) = params.parent_id
            && !state.pages.iter().any(|page| page.id == parent_id)
        {
            return Err(RepoError::Integrity {
                message: format!("parent page `{parent_id}` does not exist"),
            });
        }

        let siblings: Vec<&PageRecord> = state
            .pages
            .iter()
            .filter(|page| page.parent_id == params.parent_id)
            .collect();
        if params.parent_id.is_some() && siblings.iter().any(|page| page.slug == params.slug) {
            return Err(RepoError::Duplicate {
                constraint: "pages_parent_slug_key".to_string(),
            });
        }
        let order_index = siblings
            .iter()
            .map(|page| page.order_index + 1)
            .max()
            .unwrap_or(0);

        let now = OffsetDateTime::now_utc();
        let record = PageRecord {
            id: Uuid::new_v4(),
            parent_id: params.parent_id,
            slug: params.slug,
            title: params.title,
            short_title: params.short_title,
            order_index,
            is_homepage: params.is_homepage,
            content_type: params.content_type,
            content_settings: params.content_settings,
            is_online: params.is_online,
            created_at: now,
            updated_at: now,
        };
        state.pages.push(record.clone());
        Ok(record)
    }

    async fn swap_page_order(&self, first: Uuid, second: Uuid) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        let first_index = state
            .pages
            .iter()
            .position(|page| page.id == first)
            .ok_or(RepoError::NotFound)?;
        let second_index = state
            .pages
            .iter()
            .position(|page| page.id == second)
            .ok_or(RepoError::NotFound)?;

        let first_order = state.pages[first_index].order_index;
        let second_order = state.pages[second_index].order_index;
        let now = OffsetDateTime::now_utc();
        state.pages[first_index].order_index = second_order;
        state.pages[first_index].updated_at = now;
        state.pages[second_index].order_index = first_order;
        state.pages[second_index].updated_at = now;
        Ok(())
    }

    async fn delete_page(&self, id: Uuid) -> Result<u64, RepoError> {
        let mut state = self.state.write().await;
        if !state.pages.iter().any(|page| page.id == id) {
            return Err(RepoError::NotFound);
        }

        let mut doomed = vec![id];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let parent = doomed[cursor];
            doomed.extend(
                state
                    .pages
                    .iter()
                    .filter(|page| page.parent_id == Some(parent))
                    .map(|page| page.id),
            );
            cursor += 1;
        }

        state.pages.retain(|page| !doomed.contains(&page.id));
        state
            .articles
            .retain(|article| !doomed.contains(&article.page_id));
        state.events.retain(|event| !doomed.contains(&event.page_id));
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl ArticlesRepo for InMemoryRepositories {
    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>, RepoError> {
        let state = self.state.read().await;
        let mut articles: Vec<ArticleRecord> = state
            .articles
            .iter()
            .filter(|article| article.is_online)
            .filter(|article| article.publication_date <= query.published_before)
            .filter(|article| query.page_id.is_none_or(|page_id| article.page_id == page_id))
            .filter(|article| in_month(article.publication_date.date(), query.year, query.month))
            .cloned()
            .collect();
        articles.sort_by(|a, b| b.publication_date.cmp(&a.publication_date));
        Ok(articles)
    }

    async fn latest_articles(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ArticleRecord>, RepoError> {
        let state = self.state.read().await;
        let mut articles: Vec<ArticleRecord> = state
            .articles
            .iter()
            .filter(|article| article.is_online && article.publication_date <= now)
            .cloned()
            .collect();
        articles.sort_by(|a, b| {
            b.is_featured
                .cmp(&a.is_featured)
                .then_with(|| b.publication_date.cmp(&a.publication_date))
        });
        articles.truncate(limit as usize);
        Ok(articles)
    }

    async fn find_article(
        &self,
        page_id: Uuid,
        url_title: &str,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .articles
            .iter()
            .find(|article| article.page_id == page_id && article.url_title == url_title)
            .cloned())
    }

    async fn find_article_by_id(&self, id: Uuid) -> Result<Option<ArticleRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.articles.iter().find(|article| article.id == id).cloned())
    }
}

#[async_trait]
impl EventsRepo for InMemoryRepositories {
    async fn list_events(&self, query: &EventQuery) -> Result<Vec<EventRecord>, RepoError> {
        let state = self.state.read().await;
        let mut events: Vec<EventRecord> = state
            .events
            .iter()
            .filter(|event| event.is_online)
            .filter(|event| query.page_id.is_none_or(|page_id| event.page_id == page_id))
            .filter(|event| query.starting_from.is_none_or(|from| event.start_date >= from))
            .filter(|event| in_month(event.start_date, query.year, query.month))
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(events)
    }

    async fn find_event(
        &self,
        page_id: Uuid,
        url_title: &str,
    ) -> Result<Option<EventRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .find(|event| event.page_id == page_id && event.url_title == url_title)
            .cloned())
    }

    async fn find_event_by_id(&self, id: Uuid) -> Result<Option<EventRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.events.iter().find(|event| event.id == id).cloned())
    }
}

#[async_trait]
impl MediaRepo for InMemoryRepositories {
    async fn find_file(&self, id: Uuid) -> Result<Option<MediaFileRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.files.iter().find(|file| file.id == id).cloned())
    }

    async fn find_folder(&self, id: Uuid) -> Result<Option<MediaFolderRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.folders.iter().find(|folder| folder.id == id).cloned())
    }
}

#[async_trait]
impl CachedResourcesRepo for InMemoryRepositories {
    async fn find_resource(&self, url: &str) -> Result<Option<CachedResourceRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .resources
            .iter()
            .find(|resource| resource.url == url)
            .cloned())
    }

    async fn upsert_resource(
        &self,
        params: StoreResourceParams,
    ) -> Result<CachedResourceRecord, RepoError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .resources
            .iter_mut()
            .find(|resource| resource.url == params.url)
        {
            existing.payload = params.payload;
            existing.status = params.status;
            existing.fetched_at = params.fetched_at;
            existing.prefetch_expires_at = params.prefetch_expires_at;
            return Ok(existing.clone());
        }

        let record = CachedResourceRecord {
            id: Uuid::new_v4(),
            url: params.url,
            payload: params.payload,
            status: params.status,
            fetched_at: params.fetched_at,
            prefetch_expires_at: params.prefetch_expires_at,
        };
        state.resources.push(record.clone());
        Ok(record)
    }

    async fn refresh_resource(
        &self,
        id: Uuid,
        payload: Vec<u8>,
        status: u16,
        fetched_at: OffsetDateTime,
        prefetch_expires_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        let record = state
            .resources
            .iter_mut()
            .find(|resource| resource.id == id)
            .ok_or(RepoError::NotFound)?;
        record.payload = payload;
        record.status = status;
        record.fetched_at = fetched_at;
        record.prefetch_expires_at = prefetch_expires_at;
        Ok(())
    }

    async fn renew_prefetch(
        &self,
        id: Uuid,
        prefetch_expires_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        let record = state
            .resources
            .iter_mut()
            .find(|resource| resource.id == id)
            .ok_or(RepoError::NotFound)?;
        record.prefetch_expires_at = prefetch_expires_at;
        Ok(())
    }

    async fn list_resources(&self) -> Result<Vec<CachedResourceRecord>, RepoError> {
        let state = self.state.read().await;
        let mut resources = state.resources.clone();
        resources.sort_by(|a, b| a.fetched_at.cmp(&b.fetched_at));
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;

    fn page_params(parent_id: Option<Uuid>, slug: &str) -> CreatePageParams {
        CreatePageParams {
            parent_id,
            slug: slug.to_string(),
            title: slug.to_string(),
            short_title: None,
            is_homepage: parent_id.is_none(),
            content_type: "standard".to_string(),
            content_settings: serde_json::json!({}),
            is_online: true,
        }
    }

    #[tokio::test]
    async fn create_page_appends_to_siblings() {
        let repos = InMemoryRepositories::new();
        let home = repos.create_page(page_params(None, "")).await.expect("home");
        let first = repos
            .create_page(page_params(Some(home.id), "first"))
            .await
            .expect("first");
        let second = repos
            .create_page(page_params(Some(home.id), "second"))
            .await
            .expect("second");

        assert_eq!(first.order_index, 0);
        assert_eq!(second.order_index, 1);

        let duplicate = repos
            .create_page(page_params(Some(home.id), "first"))
            .await;
        assert!(matches!(duplicate, Err(RepoError::Duplicate { .. })));

        let second_home = repos.create_page(page_params(None, "")).await;
        assert!(matches!(second_home, Err(RepoError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn delete_page_cascades() {
        let repos = InMemoryRepositories::new();
        let home = repos.create_page(page_params(None, "")).await.expect("home");
        let section = repos
            .create_page(page_params(Some(home.id), "section"))
            .await
            .expect("section");
        repos
            .create_page(page_params(Some(section.id), "child"))
            .await
            .expect("child");

        assert_eq!(repos.delete_page(section.id).await.expect("delete"), 2);
        assert_eq!(repos.list_pages().await.expect("list").len(), 1);
        assert!(matches!(
            repos.delete_page(section.id).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn article_url_titles_are_unique_per_archive() {
        let repos = InMemoryRepositories::new();
        let page_id = Uuid::new_v4();
        let article = |title: &str| NewArticle {
            page_id,
            title: title.to_string(),
            url_title: None,
            summary: String::new(),
            body_html: String::new(),
            is_featured: false,
            publication_date: datetime!(2024-03-01 09:00 UTC),
            is_online: true,
        };

        let first = repos.insert_article(article("Spring Fair")).await.expect("first");
        let second = repos.insert_article(article("Spring Fair")).await.expect("second");

        assert_eq!(first.url_title, "spring-fair");
        assert_eq!(second.url_title, "spring-fair-2");
    }

    #[tokio::test]
    async fn events_filter_by_start_date() {
        let repos = InMemoryRepositories::new();
        let page_id = Uuid::new_v4();
        for (title, start) in [("Past", date!(2024-01-10)), ("Future", date!(2024-09-01))] {
            repos
                .insert_event(NewEvent {
                    page_id,
                    title: title.to_string(),
                    url_title: None,
                    summary: String::new(),
                    body_html: String::new(),
                    start_date: start,
                    end_date: None,
                    is_online: true,
                })
                .await
                .expect("event");
        }

        let upcoming = repos
            .list_events(&EventQuery {
                page_id: Some(page_id),
                starting_from: Some(date!(2024-06-01)),
                ..EventQuery::default()
            })
            .await
            .expect("list");
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].title, "Future");

        let january = repos
            .list_events(&EventQuery {
                page_id: Some(page_id),
                year: Some(2024),
                month: Some(1),
                ..EventQuery::default()
            })
            .await
            .expect("list");
        assert_eq!(january[0].url_title, "past");
    }
}
