use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    ContentHandler, ContentResponse, ContentRouter, PageContext, RouteMatch, RouterError,
};
use crate::application::error::AppError;
use crate::application::repos::MediaRepo;
use crate::domain::types::CONTENT_STATIC_FILE;

const FILE_SETTING: &str = "file_id";

/// `static_file` pages redirect to the media file named by their settings.
pub struct StaticFileHandler {
    media: Arc<dyn MediaRepo>,
    router: ContentRouter<()>,
}

impl StaticFileHandler {
    pub fn new(media: Arc<dyn MediaRepo>) -> Result<Self, RouterError> {
        let router = ContentRouter::new().route("file", r"^$", ())?;
        Ok(Self { media, router })
    }
}

#[async_trait]
impl ContentHandler for StaticFileHandler {
    fn content_type(&self) -> &'static str {
        CONTENT_STATIC_FILE
    }

    fn resolve(&self, sub_path: &str) -> Option<RouteMatch> {
        self.router.resolve(sub_path)
    }

    async fn render(
        &self,
        ctx: &PageContext<'_>,
        _route: &RouteMatch,
    ) -> Result<ContentResponse, AppError> {
        let file_id = ctx
            .page
            .setting_str(FILE_SETTING)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| AppError::not_found(format!("page `{}` has no file", ctx.page.id)))?;

        let file = self
            .media
            .find_file(file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("media file `{file_id}` is missing")))?;
        Ok(ContentResponse::found(file.file_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::content::QueryParams;
    use crate::domain::pages::{PageTree, tests::page};
    use crate::infra::memory::InMemoryRepositories;
    use serde_json::json;
    use time::macros::datetime;

    async fn render(
        settings: serde_json::Value,
        repos: Arc<InMemoryRepositories>,
    ) -> Result<ContentResponse, AppError> {
        let mut file_page = page(3, Some(1), "brochure", 0);
        file_page.content_type = CONTENT_STATIC_FILE.to_string();
        file_page.content_settings = settings;
        let tree = PageTree::build(vec![page(1, None, "home", 0), file_page]).expect("tree");
        let query = QueryParams::default();
        let ctx = PageContext {
            tree: &tree,
            page: tree.get(Uuid::from_u128(3)).expect("file page"),
            page_url: "/brochure/".to_string(),
            ancestors: Vec::new(),
            query: &query,
            pagination_key: "page",
            now: datetime!(2024-06-01 00:00 UTC),
        };

        let handler = StaticFileHandler::new(repos).expect("valid routes");
        let route = handler.resolve("").expect("index route");
        assert!(handler.resolve("extra/").is_none());
        handler.render(&ctx, &route).await
    }

    #[tokio::test]
    async fn redirects_to_file_url() {
        let repos = Arc::new(InMemoryRepositories::new());
        let folder = repos.insert_folder("Downloads").await;
        let file = repos
            .insert_file(Some(folder.id), "Brochure", "/media/brochure.pdf")
            .await;

        let response = render(json!({ "file_id": file.id.to_string() }), repos)
            .await
            .expect("redirect");
        match response {
            ContentResponse::Redirect {
                location,
                permanent,
            } => {
                assert_eq!(location, "/media/brochure.pdf");
                assert!(!permanent);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let repos = Arc::new(InMemoryRepositories::new());
        let err = render(json!({ "file_id": Uuid::new_v4().to_string() }), repos.clone())
            .await
            .expect_err("missing file");
        assert!(err.is_not_found());

        let err = render(json!({}), repos).await.expect_err("no setting");
        assert!(err.is_not_found());
    }
}
