//! `news_archive` pages: a paginated article index with year and month
//! archives and one detail view per article.

use std::sync::Arc;

use async_trait::async_trait;
use time::Month;

use super::{
    ContentHandler, ContentResponse, ContentRouter, PageContext, RouteMatch, RouterError,
    archive_month, archive_year,
};
use crate::application::error::AppError;
use crate::application::pagination::{DEFAULT_PER_PAGE, paginate};
use crate::application::repos::{ArticleQuery, ArticlesRepo};
use crate::domain::entities::{ArticleRecord, PageRecord};
use crate::domain::types::{CONTENT_NEWS_ARCHIVE, FeedKind};
use crate::presentation::views::{
    ArticleCard, ArticleDetailView, ArticleListView, BreadcrumbView, PageBody, RenderedPage,
    human_date, iso_date,
};
use crate::util::iteration::cache;

const PER_PAGE_SETTING: &str = "articles_per_page";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NewsView {
    Index,
    Year,
    Month,
    Detail,
}

/// Sub-path of an article below its archive page: `YYYY/M/url-title/`.
pub fn article_path(article: &ArticleRecord) -> String {
    let date = article.publication_date.date();
    format!(
        "{}/{}/{}/",
        date.year(),
        u8::from(date.month()),
        article.url_title
    )
}

pub struct NewsArchiveHandler {
    articles: Arc<dyn ArticlesRepo>,
    router: ContentRouter<NewsView>,
}

impl NewsArchiveHandler {
    pub fn new(articles: Arc<dyn ArticlesRepo>) -> Result<Self, RouterError> {
        let router = ContentRouter::new()
            .route("index", r"^$", NewsView::Index)?
            .route("year_archive", r"^(\d+)/$", NewsView::Year)?
            .route("month_archive", r"^(\d+)/(\d+)/$", NewsView::Month)?
            .route(
                "article_detail",
                r"^(\d+)/(\d+)/([a-zA-Z0-9_\-]+)/$",
                NewsView::Detail,
            )?;
        Ok(Self { articles, router })
    }

    fn link(&self, ctx: &PageContext<'_>, name: &str, args: &[&str]) -> String {
        match self.router.reverse(name, args) {
            Some(sub_path) => format!("{}{sub_path}", ctx.page_url),
            None => ctx.page_url.clone(),
        }
    }

    fn year_crumb(&self, ctx: &PageContext<'_>, year: i32) -> BreadcrumbView {
        let year = year.to_string();
        let url = self.link(ctx, "year_archive", &[year.as_str()]);
        BreadcrumbView::new(year, url)
    }

    fn month_crumb(&self, ctx: &PageContext<'_>, year: i32, month: Month) -> BreadcrumbView {
        let args = [year.to_string(), u8::from(month).to_string()];
        BreadcrumbView::new(
            month.to_string(),
            self.link(ctx, "month_archive", &[args[0].as_str(), args[1].as_str()]),
        )
    }

    async fn listing(
        &self,
        ctx: &PageContext<'_>,
        query: ArticleQuery,
        url: &str,
        heading: String,
    ) -> Result<ArticleListView, AppError> {
        let articles = self.articles.list_articles(&query).await?;
        let window = paginate(
            &mut cache(articles),
            per_page(ctx.page),
            ctx.page_number(),
        )?;
        let pager = ctx.pager(url, window.number, window.num_pages);

        Ok(ArticleListView {
            heading,
            articles: window
                .items
                .iter()
                .map(|article| article_card(&ctx.page_url, article))
                .collect(),
            pager,
        })
    }

    async fn index(&self, ctx: &PageContext<'_>) -> Result<RenderedPage, AppError> {
        let query = ArticleQuery::published(ctx.page.id, ctx.now);
        let view = self
            .listing(ctx, query, &ctx.page_url, ctx.page.title.clone())
            .await?;
        Ok(RenderedPage::new(PageBody::ArticleList(view)))
    }

    async fn year_archive(
        &self,
        ctx: &PageContext<'_>,
        route: &RouteMatch,
    ) -> Result<RenderedPage, AppError> {
        let year = archive_year(route.arg(0).unwrap_or_default())?;
        let query = ArticleQuery {
            year: Some(year),
            ..ArticleQuery::published(ctx.page.id, ctx.now)
        };
        let title = format!("Archive for {year}");
        let url = self.year_crumb(ctx, year).url;
        let view = self.listing(ctx, query, &url, title.clone()).await?;

        Ok(RenderedPage::new(PageBody::ArticleList(view))
            .titled(title, year.to_string())
            .with_breadcrumbs(ctx.trail()))
    }

    async fn month_archive(
        &self,
        ctx: &PageContext<'_>,
        route: &RouteMatch,
    ) -> Result<RenderedPage, AppError> {
        let year = archive_year(route.arg(0).unwrap_or_default())?;
        let month = archive_month(route.arg(1).unwrap_or_default())?;
        let query = ArticleQuery {
            year: Some(year),
            month: Some(u8::from(month)),
            ..ArticleQuery::published(ctx.page.id, ctx.now)
        };
        let title = format!("Archive for {month} {year}");
        let url = self.month_crumb(ctx, year, month).url;
        let view = self.listing(ctx, query, &url, title.clone()).await?;

        let mut breadcrumbs = ctx.trail();
        breadcrumbs.push(self.year_crumb(ctx, year));
        Ok(RenderedPage::new(PageBody::ArticleList(view))
            .titled(title, month.to_string())
            .with_breadcrumbs(breadcrumbs))
    }

    async fn detail(
        &self,
        ctx: &PageContext<'_>,
        route: &RouteMatch,
    ) -> Result<RenderedPage, AppError> {
        let year = archive_year(route.arg(0).unwrap_or_default())?;
        let month = archive_month(route.arg(1).unwrap_or_default())?;
        let url_title = route.arg(2).unwrap_or_default();

        let article = self
            .articles
            .find_article(ctx.page.id, url_title)
            .await?
            .filter(|article| article.is_online && article.publication_date <= ctx.now)
            .filter(|article| {
                let date = article.publication_date.date();
                date.year() == year && date.month() == month
            })
            .ok_or_else(|| AppError::not_found(format!("no article `{url_title}`")))?;

        let mut breadcrumbs = ctx.trail();
        breadcrumbs.push(self.year_crumb(ctx, year));
        breadcrumbs.push(self.month_crumb(ctx, year, month));

        let date = article.publication_date.date();
        let view = ArticleDetailView {
            title: article.title.clone(),
            summary: article.summary,
            body_html: article.body_html,
            published: human_date(date),
            iso_date: iso_date(date),
        };
        Ok(RenderedPage::new(PageBody::ArticleDetail(view))
            .titled(article.title.clone(), article.title)
            .with_breadcrumbs(breadcrumbs))
    }
}

#[async_trait]
impl ContentHandler for NewsArchiveHandler {
    fn content_type(&self) -> &'static str {
        CONTENT_NEWS_ARCHIVE
    }

    fn resolve(&self, sub_path: &str) -> Option<RouteMatch> {
        self.router.resolve(sub_path)
    }

    async fn render(
        &self,
        ctx: &PageContext<'_>,
        route: &RouteMatch,
    ) -> Result<ContentResponse, AppError> {
        let view = self
            .router
            .view(route)
            .ok_or_else(|| AppError::unexpected(format!("unknown news route `{}`", route.name)))?;
        let rendered = match view {
            NewsView::Index => self.index(ctx).await?,
            NewsView::Year => self.year_archive(ctx, route).await?,
            NewsView::Month => self.month_archive(ctx, route).await?,
            NewsView::Detail => self.detail(ctx, route).await?,
        };
        Ok(ContentResponse::page(rendered))
    }

    fn feed_url(&self, page: &PageRecord) -> Option<String> {
        Some(FeedKind::News.url_for(page.id))
    }
}

fn per_page(page: &PageRecord) -> usize {
    page.setting_u64(PER_PAGE_SETTING)
        .filter(|count| *count > 0)
        .and_then(|count| usize::try_from(count).ok())
        .unwrap_or(DEFAULT_PER_PAGE)
}

pub(crate) fn article_card(archive_url: &str, article: &ArticleRecord) -> ArticleCard {
    let date = article.publication_date.date();
    ArticleCard {
        title: article.title.clone(),
        url: format!("{archive_url}{}", article_path(article)),
        summary: article.summary.clone(),
        published: human_date(date),
        iso_date: iso_date(date),
        is_featured: article.is_featured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::content::QueryParams;
    use crate::domain::pages::{PageTree, tests::page};
    use crate::infra::memory::{InMemoryRepositories, NewArticle};
    use serde_json::json;
    use time::{OffsetDateTime, macros::datetime};
    use uuid::Uuid;

    const NEWS: u128 = 2;

    fn tree() -> PageTree {
        let mut news = page(NEWS, Some(1), "news", 0);
        news.content_type = CONTENT_NEWS_ARCHIVE.to_string();
        news.content_settings = json!({ "articles_per_page": 2 });
        PageTree::build(vec![page(1, None, "home", 0), news]).expect("valid tree")
    }

    fn article(title: &str, published: OffsetDateTime, is_online: bool) -> NewArticle {
        NewArticle {
            page_id: Uuid::from_u128(NEWS),
            title: title.to_string(),
            url_title: None,
            summary: format!("{title} summary"),
            body_html: format!("<p>{title}</p>"),
            is_featured: false,
            publication_date: published,
            is_online,
        }
    }

    async fn handler() -> NewsArchiveHandler {
        let repos = Arc::new(InMemoryRepositories::new());
        for seed in [
            article("Spring Fair", datetime!(2024-03-05 09:00 UTC), true),
            article("March Notes", datetime!(2024-03-20 09:00 UTC), true),
            article("New Year", datetime!(2024-01-10 09:00 UTC), true),
            article("Hidden", datetime!(2024-03-06 09:00 UTC), false),
            article("Tomorrow", datetime!(2030-01-01 09:00 UTC), true),
        ] {
            repos.insert_article(seed).await.expect("seed article");
        }
        NewsArchiveHandler::new(repos).expect("valid routes")
    }

    fn context<'a>(tree: &'a PageTree, query: &'a QueryParams) -> PageContext<'a> {
        PageContext {
            tree,
            page: tree.get(Uuid::from_u128(NEWS)).expect("news page"),
            page_url: "/news/".to_string(),
            ancestors: vec![BreadcrumbView::new("HOME", "/")],
            query,
            pagination_key: "page",
            now: datetime!(2024-06-01 12:00 UTC),
        }
    }

    async fn render(
        handler: &NewsArchiveHandler,
        ctx: &PageContext<'_>,
        sub_path: &str,
    ) -> Result<RenderedPage, AppError> {
        let route = handler.resolve(sub_path).expect("route matches");
        match handler.render(ctx, &route).await? {
            ContentResponse::Page(page) => Ok(*page),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn article_path_uses_unpadded_month() {
        let record = ArticleRecord {
            id: Uuid::nil(),
            page_id: Uuid::nil(),
            url_title: "spring-fair".to_string(),
            title: "Spring Fair".to_string(),
            summary: String::new(),
            body_html: String::new(),
            is_featured: false,
            publication_date: datetime!(2024-03-05 09:00 UTC),
            is_online: true,
            created_at: datetime!(2024-03-05 09:00 UTC),
            updated_at: datetime!(2024-03-05 09:00 UTC),
        };
        assert_eq!(article_path(&record), "2024/3/spring-fair/");
    }

    #[tokio::test]
    async fn index_lists_published_articles_in_pages() {
        let handler = handler().await;
        let tree = tree();
        let query = QueryParams::default();
        let ctx = context(&tree, &query);

        let rendered = render(&handler, &ctx, "").await.expect("index");
        let PageBody::ArticleList(view) = rendered.body else {
            panic!("expected article list");
        };
        let titles: Vec<_> = view.articles.iter().map(|card| card.title.as_str()).collect();
        assert_eq!(titles, vec!["March Notes", "Spring Fair"]);
        assert_eq!(view.articles[1].url, "/news/2024/3/spring-fair/");
        assert_eq!(view.pager.num_pages, 2);
        assert_eq!(view.pager.next_url.as_deref(), Some("/news/?page=2"));
        assert!(rendered.title.is_none());

        let query = QueryParams::parse(Some("page=3"));
        let ctx = context(&tree, &query);
        let err = render(&handler, &ctx, "").await.expect_err("beyond last page");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn month_archive_adds_year_breadcrumb() {
        let handler = handler().await;
        let tree = tree();
        let query = QueryParams::default();
        let ctx = context(&tree, &query);

        let rendered = render(&handler, &ctx, "2024/3/").await.expect("month");
        assert_eq!(rendered.title.as_deref(), Some("Archive for March 2024"));
        assert_eq!(rendered.short_title.as_deref(), Some("March"));
        let crumbs = rendered.breadcrumbs.expect("breadcrumbs");
        let urls: Vec<_> = crumbs.iter().map(|crumb| crumb.url.as_str()).collect();
        assert_eq!(urls, vec!["/", "/news/", "/news/2024/"]);

        let err = render(&handler, &ctx, "2024/13/").await.expect_err("bad month");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn detail_requires_matching_date_and_publication() {
        let handler = handler().await;
        let tree = tree();
        let query = QueryParams::default();
        let ctx = context(&tree, &query);

        let rendered = render(&handler, &ctx, "2024/3/spring-fair/")
            .await
            .expect("detail");
        assert_eq!(rendered.title.as_deref(), Some("Spring Fair"));
        let crumbs = rendered.breadcrumbs.expect("breadcrumbs");
        let titles: Vec<_> = crumbs.iter().map(|crumb| crumb.title.as_str()).collect();
        assert_eq!(titles, vec!["HOME", "NEWS", "2024", "March"]);

        for missing in ["2024/4/spring-fair/", "2024/3/hidden/", "2030/1/tomorrow/"] {
            let err = render(&handler, &ctx, missing).await.expect_err(missing);
            assert!(err.is_not_found(), "{missing}");
        }
    }

    #[tokio::test]
    async fn decorate_sets_feed_url() {
        let handler = handler().await;
        let tree = tree();
        let query = QueryParams::default();
        let ctx = context(&tree, &query);

        let mut rendered = render(&handler, &ctx, "").await.expect("index");
        handler.decorate(&ctx, &mut rendered);
        assert_eq!(rendered.title.as_deref(), Some("NEWS"));
        assert_eq!(
            rendered.feed_url,
            Some(format!("/feed/news/{}/", Uuid::from_u128(NEWS)))
        );
    }
}
