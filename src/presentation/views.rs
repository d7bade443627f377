use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{Date, format_description::FormatItem, macros::format_description};

use crate::application::error::HttpError;

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year]");
pub const ISO_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Render a decorated page with the template matching its body.
pub fn render_page_response(page: RenderedPage, site_name: &str, status: StatusCode) -> Response {
    let RenderedPage {
        title,
        short_title,
        breadcrumbs,
        feed_url,
        body,
    } = page;

    let title = title.unwrap_or_default();
    let chrome = PageChrome {
        site_name: site_name.to_string(),
        short_title: short_title.unwrap_or_else(|| title.clone()),
        title,
        breadcrumbs: breadcrumbs.unwrap_or_default(),
        feed_url,
    };

    match body {
        PageBody::Standard(content) => render_template_response(
            PageTemplate {
                view: LayoutContext { chrome, content },
            },
            status,
        ),
        PageBody::ArticleList(content) => render_template_response(
            ArticleListTemplate {
                view: LayoutContext { chrome, content },
            },
            status,
        ),
        PageBody::ArticleDetail(content) => render_template_response(
            ArticleDetailTemplate {
                view: LayoutContext { chrome, content },
            },
            status,
        ),
        PageBody::EventList(content) => render_template_response(
            EventListTemplate {
                view: LayoutContext { chrome, content },
            },
            status,
        ),
        PageBody::EventDetail(content) => render_template_response(
            EventDetailTemplate {
                view: LayoutContext { chrome, content },
            },
            status,
        ),
        PageBody::Error(content) => render_template_response(
            ErrorTemplate {
                view: LayoutContext { chrome, content },
            },
            status,
        ),
    }
}

pub fn human_date(date: Date) -> String {
    date.format(HUMAN_DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

pub fn iso_date(date: Date) -> String {
    date.format(ISO_DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreadcrumbView {
    pub title: String,
    pub url: String,
}

impl BreadcrumbView {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Output of a content view before the owning handler decorates it.
///
/// Page-scoped fields left as `None` are filled from the page during
/// decoration; values set by the view win.
#[derive(Clone, Debug)]
pub struct RenderedPage {
    pub title: Option<String>,
    pub short_title: Option<String>,
    pub breadcrumbs: Option<Vec<BreadcrumbView>>,
    pub feed_url: Option<String>,
    pub body: PageBody,
}

impl RenderedPage {
    pub fn new(body: PageBody) -> Self {
        Self {
            title: None,
            short_title: None,
            breadcrumbs: None,
            feed_url: None,
            body,
        }
    }

    pub fn titled(mut self, title: impl Into<String>, short_title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self.short_title = Some(short_title.into());
        self
    }

    pub fn with_breadcrumbs(mut self, breadcrumbs: Vec<BreadcrumbView>) -> Self {
        self.breadcrumbs = Some(breadcrumbs);
        self
    }
}

#[derive(Clone, Debug)]
pub enum PageBody {
    Standard(StandardPageView),
    ArticleList(ArticleListView),
    ArticleDetail(ArticleDetailView),
    EventList(EventListView),
    EventDetail(EventDetailView),
    Error(ErrorPageView),
}

#[derive(Clone, Debug)]
pub struct PageChrome {
    pub site_name: String,
    pub title: String,
    pub short_title: String,
    pub breadcrumbs: Vec<BreadcrumbView>,
    pub feed_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LayoutContext<T> {
    pub chrome: PageChrome,
    pub content: T,
}

#[derive(Clone, Debug)]
pub struct ArticleCard {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published: String,
    pub iso_date: String,
    pub is_featured: bool,
}

#[derive(Clone, Debug)]
pub struct EventCard {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub dates: String,
    pub iso_date: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagerView {
    pub number: usize,
    pub num_pages: usize,
    pub previous_url: Option<String>,
    pub next_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct StandardPageView {
    pub body_html: String,
    pub latest_news: Vec<ArticleCard>,
}

#[derive(Template)]
#[template(path = "page.html")]
pub struct PageTemplate {
    pub view: LayoutContext<StandardPageView>,
}

#[derive(Clone, Debug)]
pub struct ArticleListView {
    pub heading: String,
    pub articles: Vec<ArticleCard>,
    pub pager: PagerView,
}

#[derive(Template)]
#[template(path = "article_list.html")]
pub struct ArticleListTemplate {
    pub view: LayoutContext<ArticleListView>,
}

#[derive(Clone, Debug)]
pub struct ArticleDetailView {
    pub title: String,
    pub summary: String,
    pub body_html: String,
    pub published: String,
    pub iso_date: String,
}

#[derive(Template)]
#[template(path = "article_detail.html")]
pub struct ArticleDetailTemplate {
    pub view: LayoutContext<ArticleDetailView>,
}

#[derive(Clone, Debug)]
pub struct EventListView {
    pub heading: String,
    pub events: Vec<EventCard>,
    pub pager: PagerView,
}

#[derive(Template)]
#[template(path = "event_list.html")]
pub struct EventListTemplate {
    pub view: LayoutContext<EventListView>,
}

#[derive(Clone, Debug)]
pub struct EventDetailView {
    pub title: String,
    pub summary: String,
    pub body_html: String,
    pub dates: String,
    pub iso_date: String,
}

#[derive(Template)]
#[template(path = "event_detail.html")]
pub struct EventDetailTemplate {
    pub view: LayoutContext<EventDetailView>,
}

#[derive(Clone, Debug)]
pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist.".to_string(),
        }
    }

    pub fn server_error() -> Self {
        Self {
            title: "Server Error".to_string(),
            message: "Something went wrong while building this page.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
