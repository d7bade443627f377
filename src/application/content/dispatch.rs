use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error};

use super::{
    ContentHandler, ContentRegistry, ContentResponse, PageContext, QueryParams, RouteMatch,
};
use crate::application::error::AppError;
use crate::application::repos::PagesRepo;
use crate::domain::{entities::PageRecord, pages::PageTree};
use crate::presentation::views::{BreadcrumbView, ErrorPageView, PageBody, RenderedPage};

const SOURCE: &str = "application::content::dispatch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Redirect `/a/b` to `/a/b/` when only the latter resolves.
    pub append_slash: bool,
    /// Query-string key carrying the 1-based page number.
    pub pagination_key: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            append_slash: true,
            pagination_key: "page".to_string(),
        }
    }
}

/// Dispatch error together with the error page to show for it, if one could
/// be built.
#[derive(Debug)]
pub struct DispatchFailure {
    pub error: AppError,
    pub error_page: Option<RenderedPage>,
}

/// Where the walk through the page tree currently stands.
struct Position<'t> {
    page: &'t PageRecord,
    page_url: String,
    ancestors: Vec<BreadcrumbView>,
}

impl<'t> Position<'t> {
    fn root(page: &'t PageRecord) -> Self {
        Self {
            page,
            page_url: "/".to_string(),
            ancestors: Vec::new(),
        }
    }
}

struct Located<'t> {
    position: Position<'t>,
    handler: Arc<dyn ContentHandler>,
    route: RouteMatch,
}

enum WalkError<'t> {
    NoHomepage,
    /// Nothing below `Position` claims the remaining path.
    Unresolved(Position<'t>),
    Unregistered(Position<'t>),
}

pub struct DispatchService {
    pages: Arc<dyn PagesRepo>,
    registry: Arc<ContentRegistry>,
    settings: DispatchSettings,
}

impl DispatchService {
    pub fn new(
        pages: Arc<dyn PagesRepo>,
        registry: Arc<ContentRegistry>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            pages,
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub async fn dispatch(
        &self,
        path: &str,
        query: &QueryParams,
    ) -> Result<ContentResponse, DispatchFailure> {
        self.dispatch_at(path, query, OffsetDateTime::now_utc()).await
    }

    /// Resolve `path` (leading slash included) against the page tree as of
    /// `now`.
    pub async fn dispatch_at(
        &self,
        path: &str,
        query: &QueryParams,
        now: OffsetDateTime,
    ) -> Result<ContentResponse, DispatchFailure> {
        let tree = match self.load_tree().await {
            Ok(tree) => tree,
            Err(err) => return Err(self.bare_failure(path, err)),
        };
        let sub_path = path.strip_prefix('/').unwrap_or(path);

        let unresolved = match self.locate(&tree, sub_path) {
            Ok(located) => {
                debug!(
                    target = SOURCE,
                    path,
                    page = %located.position.page.id,
                    route = located.route.name,
                    "path resolved"
                );
                return self.render(&tree, located, query, now).await;
            }
            Err(WalkError::NoHomepage) => {
                return Err(self.bare_failure(path, AppError::not_found("no homepage")));
            }
            Err(WalkError::Unregistered(position)) => {
                let err = AppError::unexpected(format!(
                    "content type `{}` of page `{}` is not registered",
                    position.page.content_type, position.page.id
                ));
                return Err(self.failure(&tree, None, err, query, now).await);
            }
            Err(WalkError::Unresolved(position)) => position,
        };

        if self.settings.append_slash
            && !path.ends_with('/')
            && self.locate(&tree, &format!("{sub_path}/")).is_ok()
        {
            let location = match query.raw() {
                Some(raw) => format!("{path}/?{raw}"),
                None => format!("{path}/"),
            };
            return Ok(ContentResponse::Redirect {
                location,
                permanent: true,
            });
        }

        let err = AppError::not_found(format!("no page matches `{path}`"));
        Err(self.failure(&tree, Some(unresolved), err, query, now).await)
    }

    async fn load_tree(&self) -> Result<PageTree, AppError> {
        let pages = self.pages.list_pages().await?;
        Ok(PageTree::build(pages)?)
    }

    /// Walk from the homepage, letting each page's router claim the rest of
    /// the path before descending into an online child.
    fn locate<'t>(
        &self,
        tree: &'t PageTree,
        sub_path: &str,
    ) -> Result<Located<'t>, WalkError<'t>> {
        let home = tree.homepage().ok_or(WalkError::NoHomepage)?;
        let mut position = Position::root(home);
        if !home.is_online {
            return Err(WalkError::Unresolved(position));
        }

        let mut remaining = sub_path;
        loop {
            let Some(handler) = self.registry.lookup(&position.page.content_type) else {
                return Err(WalkError::Unregistered(position));
            };
            if let Some(route) = handler.resolve(remaining) {
                return Ok(Located {
                    position,
                    handler,
                    route,
                });
            }

            let next = remaining.split_once('/').and_then(|(segment, rest)| {
                tree.child_by_slug(position.page.id, segment)
                    .filter(|child| child.is_online)
                    .map(|child| (child, rest))
            });
            let Some((child, rest)) = next else {
                return Err(WalkError::Unresolved(position));
            };

            position.ancestors.push(BreadcrumbView::new(
                position.page.navigation_title(),
                position.page_url.clone(),
            ));
            position.page_url = format!("{}{}/", position.page_url, child.slug);
            position.page = child;
            remaining = rest;
        }
    }

    async fn render(
        &self,
        tree: &PageTree,
        located: Located<'_>,
        query: &QueryParams,
        now: OffsetDateTime,
    ) -> Result<ContentResponse, DispatchFailure> {
        let Located {
            position,
            handler,
            route,
        } = located;
        let page = position.page;
        let ctx = PageContext {
            tree,
            page,
            page_url: position.page_url,
            ancestors: position.ancestors,
            query,
            pagination_key: &self.settings.pagination_key,
            now,
        };

        match handler.render(&ctx, &route).await {
            Ok(ContentResponse::Page(mut rendered)) => {
                handler.decorate(&ctx, &mut rendered);
                Ok(ContentResponse::Page(rendered))
            }
            Ok(redirect) => Ok(redirect),
            Err(err) => {
                let position = Position {
                    page,
                    page_url: ctx.page_url,
                    ancestors: ctx.ancestors,
                };
                Err(self.failure(tree, Some(position), err, query, now).await)
            }
        }
    }

    /// Error page decorated by the handler of `at`, or of the homepage when
    /// `at` is absent or its content type is unknown.
    async fn failure(
        &self,
        tree: &PageTree,
        at: Option<Position<'_>>,
        error: AppError,
        query: &QueryParams,
        now: OffsetDateTime,
    ) -> DispatchFailure {
        let target = at
            .and_then(|position| {
                let handler = self.registry.lookup(&position.page.content_type)?;
                Some((position, handler))
            })
            .or_else(|| {
                let home = tree.homepage()?;
                let handler = self.registry.lookup(&home.content_type)?;
                Some((Position::root(home), handler))
            });

        let Some((position, handler)) = target else {
            error!(
                target = SOURCE,
                error = %error,
                "no page available to render the error page"
            );
            return DispatchFailure {
                error,
                error_page: None,
            };
        };

        let view = if error.is_not_found() {
            ErrorPageView::not_found()
        } else {
            ErrorPageView::server_error()
        };
        let title = view.title.clone();
        let mut rendered = RenderedPage::new(PageBody::Error(view)).titled(title.clone(), title);

        let ctx = PageContext {
            tree,
            page: position.page,
            page_url: position.page_url,
            ancestors: position.ancestors,
            query,
            pagination_key: &self.settings.pagination_key,
            now,
        };
        handler.decorate(&ctx, &mut rendered);

        DispatchFailure {
            error,
            error_page: Some(rendered),
        }
    }

    fn bare_failure(&self, path: &str, error: AppError) -> DispatchFailure {
        error!(
            target = SOURCE,
            path,
            error = %error,
            "page tree unavailable"
        );
        DispatchFailure {
            error,
            error_page: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::content::ContentRepos;
    use crate::application::repos::{CreatePageParams, PagesWriteRepo};
    use crate::domain::types::{CONTENT_NEWS_ARCHIVE, CONTENT_STANDARD};
    use crate::infra::memory::{InMemoryRepositories, NewArticle};
    use axum::http::StatusCode;
    use serde_json::json;
    use time::macros::datetime;
    use uuid::Uuid;

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    fn params(parent: Option<Uuid>, slug: &str, content_type: &str) -> CreatePageParams {
        CreatePageParams {
            parent_id: parent,
            slug: slug.to_string(),
            title: format!("{slug} title"),
            short_title: None,
            is_homepage: parent.is_none(),
            content_type: content_type.to_string(),
            content_settings: json!({ "body_html": format!("<p>{slug}</p>") }),
            is_online: true,
        }
    }

    struct Site {
        store: Arc<InMemoryRepositories>,
        service: DispatchService,
    }

    async fn site() -> Site {
        let store = Arc::new(InMemoryRepositories::new());
        let home = store
            .create_page(CreatePageParams {
                title: "Home".to_string(),
                ..params(None, "", CONTENT_STANDARD)
            })
            .await
            .expect("home");
        let about = store
            .create_page(params(Some(home.id), "about", CONTENT_STANDARD))
            .await
            .expect("about");
        store
            .create_page(params(Some(about.id), "team", CONTENT_STANDARD))
            .await
            .expect("team");
        let news = store
            .create_page(params(Some(home.id), "news", CONTENT_NEWS_ARCHIVE))
            .await
            .expect("news");
        store
            .create_page(CreatePageParams {
                is_online: false,
                ..params(Some(home.id), "drafts", CONTENT_STANDARD)
            })
            .await
            .expect("drafts");
        store
            .insert_article(NewArticle {
                page_id: news.id,
                title: "Spring Fair".to_string(),
                url_title: None,
                summary: String::new(),
                body_html: String::new(),
                is_featured: false,
                publication_date: datetime!(2024-03-05 09:00 UTC),
                is_online: true,
            })
            .await
            .expect("article");

        let registry = ContentRegistry::standard(ContentRepos {
            articles: store.clone(),
            events: store.clone(),
            media: store.clone(),
        })
        .expect("registry");
        let service = DispatchService::new(
            store.clone(),
            Arc::new(registry),
            DispatchSettings::default(),
        );
        Site { store, service }
    }

    async fn page(service: &DispatchService, path: &str) -> RenderedPage {
        match service
            .dispatch_at(path, &QueryParams::default(), NOW)
            .await
        {
            Ok(ContentResponse::Page(page)) => *page,
            Ok(other) => panic!("unexpected response for {path}: {other:?}"),
            Err(failure) => panic!("dispatch of {path} failed: {}", failure.error),
        }
    }

    async fn failure(service: &DispatchService, path: &str) -> DispatchFailure {
        match service
            .dispatch_at(path, &QueryParams::default(), NOW)
            .await
        {
            Ok(response) => panic!("expected failure for {path}, got {response:?}"),
            Err(failure) => failure,
        }
    }

    #[tokio::test]
    async fn nested_pages_carry_breadcrumbs() {
        let site = site().await;

        let home = page(&site.service, "/").await;
        assert_eq!(home.title.as_deref(), Some("Home"));
        assert_eq!(home.breadcrumbs.as_deref().map(<[_]>::len), Some(0));

        let team = page(&site.service, "/about/team/").await;
        assert_eq!(team.title.as_deref(), Some("team title"));
        let crumbs = team.breadcrumbs.expect("breadcrumbs");
        let urls: Vec<_> = crumbs.iter().map(|crumb| crumb.url.as_str()).collect();
        assert_eq!(urls, vec!["/", "/about/"]);
    }

    #[tokio::test]
    async fn handler_routes_claim_the_remaining_path() {
        let site = site().await;

        let detail = page(&site.service, "/news/2024/3/spring-fair/").await;
        assert_eq!(detail.title.as_deref(), Some("Spring Fair"));
        assert!(detail.feed_url.is_some_and(|url| url.starts_with("/feed/news/")));

        let err = failure(&site.service, "/news/2024/3/unknown/").await;
        assert!(err.error.is_not_found());
    }

    #[tokio::test]
    async fn missing_trailing_slash_redirects_permanently() {
        let site = site().await;
        let query = QueryParams::parse(Some("page=2"));

        let response = site
            .service
            .dispatch_at("/about", &query, NOW)
            .await
            .expect("redirect");
        match response {
            ContentResponse::Redirect {
                location,
                permanent,
            } => {
                assert_eq!(location, "/about/?page=2");
                assert!(permanent);
            }
            other => panic!("unexpected response {other:?}"),
        }

        let err = failure(&site.service, "/missing").await;
        assert!(err.error.is_not_found());
    }

    #[tokio::test]
    async fn redirect_can_be_disabled() {
        let site = site().await;
        let registry = ContentRegistry::standard(ContentRepos {
            articles: site.store.clone(),
            events: site.store.clone(),
            media: site.store.clone(),
        })
        .expect("registry");
        let service = DispatchService::new(
            site.store.clone(),
            Arc::new(registry),
            DispatchSettings {
                append_slash: false,
                ..DispatchSettings::default()
            },
        );

        let err = failure(&service, "/about").await;
        assert!(err.error.is_not_found());
    }

    #[tokio::test]
    async fn not_found_page_uses_last_resolved_page() {
        let site = site().await;

        let err = failure(&site.service, "/about/team/members/").await;
        assert_eq!(err.error.status_code(), StatusCode::NOT_FOUND);
        let error_page = err.error_page.expect("error page");
        assert_eq!(error_page.title.as_deref(), Some("Page Not Found"));
        let crumbs = error_page.breadcrumbs.expect("breadcrumbs");
        let urls: Vec<_> = crumbs.iter().map(|crumb| crumb.url.as_str()).collect();
        assert_eq!(urls, vec!["/", "/about/"]);

        let err = failure(&site.service, "/news/2030/14/").await;
        let error_page = err.error_page.expect("error page");
        assert!(error_page.feed_url.is_some());
    }

    #[tokio::test]
    async fn offline_pages_are_invisible() {
        let site = site().await;
        let err = failure(&site.service, "/drafts/").await;
        assert!(err.error.is_not_found());
        assert!(err.error_page.is_some());
    }

    #[tokio::test]
    async fn unregistered_content_type_is_internal() {
        let site = site().await;
        let home = site
            .store
            .list_pages()
            .await
            .expect("pages")
            .into_iter()
            .find(|page| page.is_homepage)
            .expect("homepage");
        site.store
            .create_page(params(Some(home.id), "gallery", "gallery"))
            .await
            .expect("gallery");

        let err = failure(&site.service, "/gallery/").await;
        assert_eq!(err.error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let error_page = err.error_page.expect("error page");
        assert_eq!(error_page.title.as_deref(), Some("Server Error"));
    }

    #[tokio::test]
    async fn empty_site_fails_without_error_page() {
        let store = Arc::new(InMemoryRepositories::new());
        let registry = ContentRegistry::new();
        let service =
            DispatchService::new(store, Arc::new(registry), DispatchSettings::default());

        let err = failure(&service, "/").await;
        assert!(err.error.is_not_found());
        assert!(err.error_page.is_none());
    }
}
