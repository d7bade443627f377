//! `events_feed` pages: upcoming events, year and month archives keyed by
//! start date, and event detail views.

use std::sync::Arc;

use async_trait::async_trait;
use time::{Date, Month};

use super::{
    ContentHandler, ContentResponse, ContentRouter, PageContext, RouteMatch, RouterError,
    archive_month, archive_year,
};
use crate::application::error::AppError;
use crate::application::pagination::{DEFAULT_PER_PAGE, paginate};
use crate::application::repos::{EventQuery, EventsRepo};
use crate::domain::entities::{EventRecord, PageRecord};
use crate::domain::types::{CONTENT_EVENTS_FEED, FeedKind};
use crate::presentation::views::{
    BreadcrumbView, EventCard, EventDetailView, EventListView, PageBody, RenderedPage,
    human_date, iso_date,
};
use crate::util::iteration::cache;

const PER_PAGE_SETTING: &str = "events_per_page";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventsView {
    Upcoming,
    Year,
    Month,
    Detail,
}

/// Sub-path of an event below its feed page, keyed by start date.
pub fn event_path(event: &EventRecord) -> String {
    format!(
        "{}/{}/{}/",
        event.start_date.year(),
        u8::from(event.start_date.month()),
        event.url_title
    )
}

/// Human-readable date span of an event.
pub fn event_dates(start: Date, end: Option<Date>) -> String {
    match end {
        Some(end) if end > start => format!("{} to {}", human_date(start), human_date(end)),
        _ => human_date(start),
    }
}

pub struct EventsFeedHandler {
    events: Arc<dyn EventsRepo>,
    router: ContentRouter<EventsView>,
}

impl EventsFeedHandler {
    pub fn new(events: Arc<dyn EventsRepo>) -> Result<Self, RouterError> {
        let router = ContentRouter::new()
            .route("upcoming", r"^$", EventsView::Upcoming)?
            .route("year_archive", r"^(\d+)/$", EventsView::Year)?
            .route("month_archive", r"^(\d+)/(\d+)/$", EventsView::Month)?
            .route(
                "event_detail",
                r"^(\d+)/(\d+)/([a-zA-Z0-9_\-]+)/$",
                EventsView::Detail,
            )?;
        Ok(Self { events, router })
    }

    fn year_crumb(&self, ctx: &PageContext<'_>, year: i32) -> BreadcrumbView {
        let year = year.to_string();
        let sub_path = self
            .router
            .reverse("year_archive", &[year.as_str()])
            .unwrap_or_default();
        BreadcrumbView::new(year, format!("{}{sub_path}", ctx.page_url))
    }

    fn month_crumb(&self, ctx: &PageContext<'_>, year: i32, month: Month) -> BreadcrumbView {
        let (year, number) = (year.to_string(), u8::from(month).to_string());
        let sub_path = self
            .router
            .reverse("month_archive", &[year.as_str(), number.as_str()])
            .unwrap_or_default();
        BreadcrumbView::new(month.to_string(), format!("{}{sub_path}", ctx.page_url))
    }

    async fn listing(
        &self,
        ctx: &PageContext<'_>,
        query: EventQuery,
        url: &str,
        heading: String,
    ) -> Result<EventListView, AppError> {
        let events = self.events.list_events(&query).await?;
        let window = paginate(&mut cache(events), per_page(ctx.page), ctx.page_number())?;

        Ok(EventListView {
            heading,
            events: window
                .items
                .iter()
                .map(|event| event_card(&ctx.page_url, event))
                .collect(),
            pager: ctx.pager(url, window.number, window.num_pages),
        })
    }

    async fn upcoming(&self, ctx: &PageContext<'_>) -> Result<RenderedPage, AppError> {
        let query = EventQuery {
            page_id: Some(ctx.page.id),
            starting_from: Some(ctx.now.date()),
            ..EventQuery::default()
        };
        let view = self
            .listing(ctx, query, &ctx.page_url, ctx.page.title.clone())
            .await?;
        Ok(RenderedPage::new(PageBody::EventList(view)))
    }

    async fn year_archive(
        &self,
        ctx: &PageContext<'_>,
        route: &RouteMatch,
    ) -> Result<RenderedPage, AppError> {
        let year = archive_year(route.arg(0).unwrap_or_default())?;
        let query = EventQuery {
            page_id: Some(ctx.page.id),
            year: Some(year),
            ..EventQuery::default()
        };
        let title = format!("Archive for {year}");
        let url = self.year_crumb(ctx, year).url;
        let view = self.listing(ctx, query, &url, title.clone()).await?;

        Ok(RenderedPage::new(PageBody::EventList(view))
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
        let query = EventQuery {
            page_id: Some(ctx.page.id),
            year: Some(year),
            month: Some(u8::from(month)),
            ..EventQuery::default()
        };
        let title = format!("Archive for {month} {year}");
        let url = self.month_crumb(ctx, year, month).url;
        let view = self.listing(ctx, query, &url, title.clone()).await?;

        let mut breadcrumbs = ctx.trail();
        breadcrumbs.push(self.year_crumb(ctx, year));
        Ok(RenderedPage::new(PageBody::EventList(view))
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

        let event = self
            .events
            .find_event(ctx.page.id, url_title)
            .await?
            .filter(|event| event.is_online)
            .filter(|event| event.start_date.year() == year && event.start_date.month() == month)
            .ok_or_else(|| AppError::not_found(format!("no event `{url_title}`")))?;

        let mut breadcrumbs = ctx.trail();
        breadcrumbs.push(self.year_crumb(ctx, year));
        breadcrumbs.push(self.month_crumb(ctx, year, month));

        let view = EventDetailView {
            title: event.title.clone(),
            summary: event.summary,
            body_html: event.body_html,
            dates: event_dates(event.start_date, event.end_date),
            iso_date: iso_date(event.start_date),
        };
        Ok(RenderedPage::new(PageBody::EventDetail(view))
            .titled(event.title.clone(), event.title)
            .with_breadcrumbs(breadcrumbs))
    }
}

#[async_trait]
impl ContentHandler for EventsFeedHandler {
    fn content_type(&self) -> &'static str {
        CONTENT_EVENTS_FEED
    }

    fn resolve(&self, sub_path: &str) -> Option<RouteMatch> {
        self.router.resolve(sub_path)
    }

    async fn render(
        &self,
        ctx: &PageContext<'_>,
        route: &RouteMatch,
    ) -> Result<ContentResponse, AppError> {
        let Some(view) = self.router.view(route) else {
            return Err(AppError::unexpected(format!(
                "unknown events route `{}`",
                route.name
            )));
        };
        let rendered = match view {
            EventsView::Upcoming => self.upcoming(ctx).await?,
            EventsView::Year => self.year_archive(ctx, route).await?,
            EventsView::Month => self.month_archive(ctx, route).await?,
            EventsView::Detail => self.detail(ctx, route).await?,
        };
        Ok(ContentResponse::page(rendered))
    }

    fn feed_url(&self, page: &PageRecord) -> Option<String> {
        Some(FeedKind::Events.url_for(page.id))
    }
}

fn per_page(page: &PageRecord) -> usize {
    page.setting_u64(PER_PAGE_SETTING)
        .filter(|count| *count > 0)
        .and_then(|count| usize::try_from(count).ok())
        .unwrap_or(DEFAULT_PER_PAGE)
}

fn event_card(feed_url: &str, event: &EventRecord) -> EventCard {
    EventCard {
        title: event.title.clone(),
        url: format!("{feed_url}{}", event_path(event)),
        summary: event.summary.clone(),
        dates: event_dates(event.start_date, event.end_date),
        iso_date: iso_date(event.start_date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::content::QueryParams;
    use crate::domain::pages::{PageTree, tests::page};
    use crate::infra::memory::{InMemoryRepositories, NewEvent};
    use time::macros::{date, datetime};
    use uuid::Uuid;

    const EVENTS: u128 = 5;

    fn tree() -> PageTree {
        let mut events = page(EVENTS, Some(1), "events", 0);
        events.content_type = CONTENT_EVENTS_FEED.to_string();
        PageTree::build(vec![page(1, None, "home", 0), events]).expect("valid tree")
    }

    fn event(title: &str, start: Date, end: Option<Date>) -> NewEvent {
        NewEvent {
            page_id: Uuid::from_u128(EVENTS),
            title: title.to_string(),
            url_title: None,
            summary: String::new(),
            body_html: format!("<p>{title}</p>"),
            start_date: start,
            end_date: end,
            is_online: true,
        }
    }

    async fn handler() -> EventsFeedHandler {
        let repos = Arc::new(InMemoryRepositories::new());
        for seed in [
            event("Winter Gala", date!(2024-01-20), None),
            event("Summer Camp", date!(2024-07-01), Some(date!(2024-07-05))),
            event("Open Day", date!(2024-06-01), None),
        ] {
            repos.insert_event(seed).await.expect("seed event");
        }
        EventsFeedHandler::new(repos).expect("valid routes")
    }

    fn context<'a>(tree: &'a PageTree, query: &'a QueryParams) -> PageContext<'a> {
        PageContext {
            tree,
            page: tree.get(Uuid::from_u128(EVENTS)).expect("events page"),
            page_url: "/events/".to_string(),
            ancestors: vec![BreadcrumbView::new("HOME", "/")],
            query,
            pagination_key: "page",
            now: datetime!(2024-06-01 08:00 UTC),
        }
    }

    async fn render(
        handler: &EventsFeedHandler,
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
    fn date_spans_are_readable() {
        assert_eq!(event_dates(date!(2024-07-01), None), "1 July 2024");
        assert_eq!(
            event_dates(date!(2024-07-01), Some(date!(2024-07-05))),
            "1 July 2024 to 5 July 2024"
        );
        assert_eq!(
            event_dates(date!(2024-07-01), Some(date!(2024-07-01))),
            "1 July 2024"
        );
    }

    #[tokio::test]
    async fn index_lists_events_starting_today_or_later() {
        let handler = handler().await;
        let tree = tree();
        let query = QueryParams::default();
        let ctx = context(&tree, &query);

        let rendered = render(&handler, &ctx, "").await.expect("upcoming");
        let PageBody::EventList(view) = rendered.body else {
            panic!("expected event list");
        };
        let titles: Vec<_> = view.events.iter().map(|card| card.title.as_str()).collect();
        assert_eq!(titles, vec!["Open Day", "Summer Camp"]);
        assert_eq!(view.events[1].url, "/events/2024/7/summer-camp/");
        assert_eq!(view.events[1].dates, "1 July 2024 to 5 July 2024");
    }

    #[tokio::test]
    async fn archives_include_past_events() {
        let handler = handler().await;
        let tree = tree();
        let query = QueryParams::default();
        let ctx = context(&tree, &query);

        let rendered = render(&handler, &ctx, "2024/").await.expect("year");
        assert_eq!(rendered.title.as_deref(), Some("Archive for 2024"));
        let PageBody::EventList(view) = rendered.body else {
            panic!("expected event list");
        };
        assert_eq!(view.events.len(), 3);

        let rendered = render(&handler, &ctx, "2024/1/").await.expect("month");
        assert_eq!(rendered.short_title.as_deref(), Some("January"));
        let crumbs = rendered.breadcrumbs.expect("breadcrumbs");
        assert_eq!(
            crumbs.last().map(|crumb| crumb.url.as_str()),
            Some("/events/2024/")
        );
    }

    #[tokio::test]
    async fn detail_adds_year_and_month_breadcrumbs() {
        let handler = handler().await;
        let tree = tree();
        let query = QueryParams::default();
        let ctx = context(&tree, &query);

        let rendered = render(&handler, &ctx, "2024/1/winter-gala/")
            .await
            .expect("detail");
        assert_eq!(rendered.title.as_deref(), Some("Winter Gala"));
        let crumbs = rendered.breadcrumbs.expect("breadcrumbs");
        let titles: Vec<_> = crumbs.iter().map(|crumb| crumb.title.as_str()).collect();
        assert_eq!(titles, vec!["HOME", "EVENTS", "2024", "January"]);
        assert_eq!(crumbs[3].url, "/events/2024/1/");

        let err = render(&handler, &ctx, "2024/2/winter-gala/")
            .await
            .expect_err("wrong month");
        assert!(err.is_not_found());
        let err = render(&handler, &ctx, "2024/1/unknown/")
            .await
            .expect_err("unknown slug");
        assert!(err.is_not_found());
    }
}
