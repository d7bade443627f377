//! Page-content dispatch.
//!
//! Every page names a content type. The [`ContentRegistry`] maps content
//! types to [`ContentHandler`]s, each of which owns a private URL space below
//! its page (a [`ContentRouter`]). [`DispatchService`] walks the page tree one
//! path segment at a time until some handler's router claims the rest.

mod dispatch;
mod events;
mod media;
mod news;
mod registry;
mod router;
mod standard;

use async_trait::async_trait;
use time::{Month, OffsetDateTime};

use crate::application::error::AppError;
use crate::domain::{entities::PageRecord, pages::PageTree};
use crate::presentation::views::{BreadcrumbView, PagerView, RenderedPage};

pub use dispatch::{DispatchFailure, DispatchService, DispatchSettings};
pub use events::{EventsFeedHandler, event_path};
pub use media::StaticFileHandler;
pub use news::{NewsArchiveHandler, article_path};
pub use registry::{ContentRegistry, ContentRepos, RegistryError};
pub use router::{ContentRouter, RouteMatch, RouterError};
pub use standard::StandardHandler;

/// Decoded query string, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    raw: Option<String>,
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(raw: Option<&str>) -> Self {
        let raw = raw.filter(|query| !query.is_empty());
        let pairs = raw
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        Self {
            raw: raw.map(str::to_string),
            pairs,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    /// Original query string, without the leading `?`.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// The query with `key` replaced by `value`, other pairs kept in order.
    pub fn with(&self, key: &str, value: &str) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        let mut replaced = false;
        for (candidate, existing) in &self.pairs {
            if candidate == key {
                if !replaced {
                    serializer.append_pair(key, value);
                    replaced = true;
                }
            } else {
                serializer.append_pair(candidate, existing);
            }
        }
        if !replaced {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

/// Everything a handler knows about the page it is serving.
pub struct PageContext<'a> {
    pub tree: &'a PageTree,
    pub page: &'a PageRecord,
    /// Public URL of `page`, always slash-terminated.
    pub page_url: String,
    /// Pages passed through on the way to `page`, outermost first.
    pub ancestors: Vec<BreadcrumbView>,
    pub query: &'a QueryParams,
    pub pagination_key: &'a str,
    pub now: OffsetDateTime,
}

impl PageContext<'_> {
    pub fn page_number(&self) -> Option<&str> {
        self.query.get(self.pagination_key)
    }

    /// Ancestors plus the page itself, for views nested below the page.
    pub fn trail(&self) -> Vec<BreadcrumbView> {
        let mut trail = self.ancestors.clone();
        trail.push(BreadcrumbView::new(
            self.page.navigation_title(),
            self.page_url.clone(),
        ));
        trail
    }

    /// Pager links for `url`, keeping the rest of the query string.
    pub fn pager(&self, url: &str, number: usize, num_pages: usize) -> PagerView {
        let link = |target: usize| {
            format!(
                "{url}?{}",
                self.query.with(self.pagination_key, &target.to_string())
            )
        };
        PagerView {
            number,
            num_pages,
            previous_url: (number > 1).then(|| link(number - 1)),
            next_url: (number < num_pages).then(|| link(number + 1)),
        }
    }
}

/// Parse a year captured by an archive route.
pub(crate) fn archive_year(raw: &str) -> Result<i32, AppError> {
    raw.parse::<i32>()
        .ok()
        .filter(|year| (1..=9999).contains(year))
        .ok_or_else(|| AppError::not_found(format!("`{raw}` is not a valid year")))
}

/// Parse a 1-12 month captured by an archive route.
pub(crate) fn archive_month(raw: &str) -> Result<Month, AppError> {
    raw.parse::<u8>()
        .ok()
        .and_then(|number| Month::try_from(number).ok())
        .ok_or_else(|| AppError::not_found(format!("`{raw}` is not a valid month")))
}

#[derive(Debug, Clone)]
pub enum ContentResponse {
    Page(Box<RenderedPage>),
    Redirect { location: String, permanent: bool },
}

impl ContentResponse {
    pub fn page(page: RenderedPage) -> Self {
        Self::Page(Box::new(page))
    }

    pub fn found(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            permanent: false,
        }
    }
}

/// Behavior of one content type.
#[async_trait]
pub trait ContentHandler: Send + Sync {
    /// Registry key stored in `pages.content_type`.
    fn content_type(&self) -> &'static str;

    /// Match the page's remaining sub-path against the handler's routes.
    fn resolve(&self, sub_path: &str) -> Option<RouteMatch>;

    async fn render(
        &self,
        ctx: &PageContext<'_>,
        route: &RouteMatch,
    ) -> Result<ContentResponse, AppError>;

    fn feed_url(&self, _page: &PageRecord) -> Option<String> {
        None
    }

    /// Fill page-scoped context the view left unset.
    fn decorate(&self, ctx: &PageContext<'_>, rendered: &mut RenderedPage) {
        if rendered.title.is_none() {
            rendered.title = Some(ctx.page.title.clone());
        }
        if rendered.short_title.is_none() {
            rendered.short_title = Some(ctx.page.navigation_title().to_string());
        }
        if rendered.breadcrumbs.is_none() {
            rendered.breadcrumbs = Some(ctx.ancestors.clone());
        }
        if rendered.feed_url.is_none() {
            rendered.feed_url = self.feed_url(ctx.page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_decode_and_replace() {
        let query = QueryParams::parse(Some("tag=a%20b&page=2&sort=new"));
        assert_eq!(query.get("tag"), Some("a b"));
        assert_eq!(query.get("page"), Some("2"));
        assert_eq!(query.raw(), Some("tag=a%20b&page=2&sort=new"));
        assert_eq!(query.with("page", "3"), "tag=a+b&page=3&sort=new");

        let empty = QueryParams::parse(Some(""));
        assert_eq!(empty.raw(), None);
        assert_eq!(empty.with("page", "2"), "page=2");
    }

    #[test]
    fn archive_segments_are_validated() {
        assert_eq!(archive_year("2024").expect("year"), 2024);
        assert!(archive_year("0").is_err());
        assert!(archive_year("99999999999").is_err());
        assert_eq!(archive_month("03").expect("month"), Month::March);
        assert!(archive_month("13").expect_err("month").is_not_found());
        assert!(archive_month("0").is_err());
    }
}
