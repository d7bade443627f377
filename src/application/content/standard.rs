use std::sync::Arc;

use async_trait::async_trait;

use super::news::article_card;
use super::{
    ContentHandler, ContentResponse, ContentRouter, PageContext, RouteMatch, RouterError,
};
use crate::application::error::AppError;
use crate::application::repos::ArticlesRepo;
use crate::domain::types::CONTENT_STANDARD;
use crate::presentation::views::{ArticleCard, PageBody, RenderedPage, StandardPageView};

const BODY_SETTING: &str = "body_html";
const LATEST_NEWS_SETTING: &str = "latest_news";

/// Plain pages: stored HTML, optionally followed by the latest news.
pub struct StandardHandler {
    articles: Arc<dyn ArticlesRepo>,
    router: ContentRouter<()>,
}

impl StandardHandler {
    pub fn new(articles: Arc<dyn ArticlesRepo>) -> Result<Self, RouterError> {
        let router = ContentRouter::new().route("page", r"^$", ())?;
        Ok(Self { articles, router })
    }

    async fn latest_news(
        &self,
        ctx: &PageContext<'_>,
        count: u64,
    ) -> Result<Vec<ArticleCard>, AppError> {
        let limit = u32::try_from(count).unwrap_or(u32::MAX);
        let articles = self.articles.latest_articles(ctx.now, limit).await?;

        Ok(articles
            .iter()
            .filter(|article| ctx.tree.is_visible(article.page_id))
            .filter_map(|article| {
                let archive_url = ctx.tree.url(article.page_id)?;
                Some(article_card(&archive_url, article))
            })
            .collect())
    }
}

#[async_trait]
impl ContentHandler for StandardHandler {
    fn content_type(&self) -> &'static str {
        CONTENT_STANDARD
    }

    fn resolve(&self, sub_path: &str) -> Option<RouteMatch> {
        self.router.resolve(sub_path)
    }

    async fn render(
        &self,
        ctx: &PageContext<'_>,
        _route: &RouteMatch,
    ) -> Result<ContentResponse, AppError> {
        let latest_news = match ctx.page.setting_u64(LATEST_NEWS_SETTING) {
            Some(count) if count > 0 => self.latest_news(ctx, count).await?,
            _ => Vec::new(),
        };
        let view = StandardPageView {
            body_html: ctx
                .page
                .setting_str(BODY_SETTING)
                .unwrap_or_default()
                .to_string(),
            latest_news,
        };
        Ok(ContentResponse::page(RenderedPage::new(PageBody::Standard(
            view,
        ))))
    }
}
