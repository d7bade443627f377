use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use canopy::application::content::{
    ContentRegistry, ContentRepos, DispatchService, DispatchSettings,
};
use canopy::application::permalink::PermalinkService;
use canopy::application::repos::{CreatePageParams, PagesWriteRepo};
use canopy::application::syndication::SyndicationService;
use canopy::domain::entities::{ArticleRecord, EventRecord, MediaFileRecord, PageRecord};
use canopy::domain::types::{
    CONTENT_EVENTS_FEED, CONTENT_NEWS_ARCHIVE, CONTENT_STANDARD, CONTENT_STATIC_FILE,
};
use canopy::infra::http::{HttpState, build_router};
use canopy::infra::memory::{InMemoryRepositories, NewArticle, NewEvent};
use http_body_util::BodyExt;
use serde_json::json;
use time::macros::{date, datetime};
use tower::ServiceExt;
use uuid::Uuid;

struct Site {
    router: Router,
    news: PageRecord,
    article: ArticleRecord,
    event: EventRecord,
    file: MediaFileRecord,
}

fn page(
    parent: Option<Uuid>,
    slug: &str,
    title: &str,
    content_type: &str,
    settings: serde_json::Value,
) -> CreatePageParams {
    CreatePageParams {
        parent_id: parent,
        slug: slug.to_string(),
        title: title.to_string(),
        short_title: None,
        is_homepage: parent.is_none(),
        content_type: content_type.to_string(),
        content_settings: settings,
        is_online: true,
    }
}

async fn site(settings: DispatchSettings) -> Site {
    let store = Arc::new(InMemoryRepositories::new());

    let home = store
        .create_page(page(None, "", "Home", CONTENT_STANDARD, json!({})))
        .await
        .expect("home");
    let about = store
        .create_page(page(
            Some(home.id),
            "about",
            "About us",
            CONTENT_STANDARD,
            json!({ "body_html": "<p>We look after the river.</p>" }),
        ))
        .await
        .expect("about");
    store
        .create_page(page(
            Some(about.id),
            "team",
            "Our team",
            CONTENT_STANDARD,
            json!({}),
        ))
        .await
        .expect("team");
    let news = store
        .create_page(page(
            Some(home.id),
            "news",
            "News",
            CONTENT_NEWS_ARCHIVE,
            json!({ "articles_per_page": 1 }),
        ))
        .await
        .expect("news");
    let events = store
        .create_page(page(
            Some(home.id),
            "events",
            "Events",
            CONTENT_EVENTS_FEED,
            json!({}),
        ))
        .await
        .expect("events");

    let article = store
        .insert_article(NewArticle {
            page_id: news.id,
            title: "Spring Fair".to_string(),
            url_title: None,
            summary: "Stalls & music".to_string(),
            body_html: "<p>See you there.</p>".to_string(),
            is_featured: false,
            publication_date: datetime!(2024-03-05 09:00 UTC),
            is_online: true,
        })
        .await
        .expect("article");
    store
        .insert_article(NewArticle {
            page_id: news.id,
            title: "Winter Walk".to_string(),
            url_title: None,
            summary: String::new(),
            body_html: String::new(),
            is_featured: false,
            publication_date: datetime!(2024-01-10 09:00 UTC),
            is_online: true,
        })
        .await
        .expect("article");
    let event = store
        .insert_event(NewEvent {
            page_id: events.id,
            title: "Open Day".to_string(),
            url_title: None,
            summary: String::new(),
            body_html: String::new(),
            start_date: date!(2099-10-12),
            end_date: None,
            is_online: true,
        })
        .await
        .expect("event");

    let folder = store.insert_folder("Downloads").await;
    let file = store
        .insert_file(Some(folder.id), "River map", "/media/river-map.pdf")
        .await;
    store
        .create_page(page(
            Some(home.id),
            "map",
            "River map",
            CONTENT_STATIC_FILE,
            json!({ "file_id": file.id.to_string() }),
        ))
        .await
        .expect("map");

    let registry = ContentRegistry::standard(ContentRepos {
        articles: store.clone(),
        events: store.clone(),
        media: store.clone(),
    })
    .expect("registry");

    let state = HttpState {
        dispatch: Arc::new(DispatchService::new(
            store.clone(),
            Arc::new(registry),
            settings,
        )),
        permalinks: Arc::new(PermalinkService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        )),
        syndication: Arc::new(SyndicationService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            "Canopy",
            "https://example.org",
        )),
        site_name: Arc::from("Canopy"),
        db: None,
    };

    Site {
        router: build_router(state),
        news,
        article,
        event,
        file,
    }
}

async fn get(router: &Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn renders_homepage_and_nested_pages() {
    let site = site(DispatchSettings::default()).await;

    let response = get(&site.router, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("<title>Home | Canopy</title>"), "{body}");

    let response = get(&site.router, "/about/team/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("<title>Our team | Canopy</title>"), "{body}");
    assert!(body.contains(">Home</a>"));
    assert!(body.contains(">About us</a>"));
    assert!(body.contains("<li aria-current=\"page\">Our team</li>"));

    let body = body_text(get(&site.router, "/about/").await).await;
    assert!(body.contains("<p>We look after the river.</p>"));
}

#[tokio::test]
async fn appends_missing_slash_with_permanent_redirect() {
    let site = site(DispatchSettings::default()).await;

    let response = get(&site.router, "/about/team").await;
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(location(&response), Some("/about/team/"));

    let response = get(&site.router, "/news?page=2").await;
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(location(&response), Some("/news/?page=2"));
}

#[tokio::test]
async fn missing_slash_is_not_found_when_redirect_disabled() {
    let site = site(DispatchSettings {
        append_slash: false,
        ..DispatchSettings::default()
    })
    .await;

    let response = get(&site.router, "/about").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let feed = format!("/feed/news/{}", site.news.id);
    let response = get(&site.router, &feed).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_paths_render_error_page() {
    let site = site(DispatchSettings::default()).await;

    let response = get(&site.router, "/about/nobody/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_text(response).await;
    assert!(body.contains("<title>Page Not Found | Canopy</title>"), "{body}");
    assert!(body.contains(">Home</a>"));
}

#[tokio::test]
async fn out_of_range_page_number_is_not_found() {
    let site = site(DispatchSettings::default()).await;

    let response = get(&site.router, "/news/?page=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Winter Walk"));
    assert!(!body.contains("Spring Fair"));

    for uri in ["/news/?page=9", "/news/?page=zero"] {
        let response = get(&site.router, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        let body = body_text(response).await;
        assert!(body.contains("Page Not Found"));
        assert!(body.contains(&site.news.id.to_string()), "feed link on {uri}");
    }
}

#[tokio::test]
async fn renders_article_and_event_details() {
    let site = site(DispatchSettings::default()).await;

    let response = get(&site.router, "/news/2024/3/spring-fair/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("<h1>Spring Fair</h1>"), "{body}");
    assert!(body.contains("Stalls &amp; music"));

    let response = get(&site.router, "/news/2024/4/spring-fair/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&site.router, "/events/2099/10/open-day/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("<h1>Open Day</h1>"));

    let body = body_text(get(&site.router, "/events/").await).await;
    assert!(body.contains("Open Day"));
}

#[tokio::test]
async fn permalinks_redirect_to_canonical_urls() {
    let site = site(DispatchSettings::default()).await;

    let cases = [
        (
            format!("/r/article/{}/", site.article.id),
            "/news/2024/3/spring-fair/",
        ),
        (
            format!("/r/event/{}/", site.event.id),
            "/events/2099/10/open-day/",
        ),
        (format!("/r/page/{}/", site.news.id), "/news/"),
        (
            format!("/r/media_file/{}/", site.file.id),
            "/media/river-map.pdf",
        ),
    ];
    for (uri, expected) in cases {
        let response = get(&site.router, &uri).await;
        assert_eq!(response.status(), StatusCode::FOUND, "{uri}");
        assert_eq!(location(&response), Some(expected));
    }

    let response = get(&site.router, &format!("/r/article/{}/", Uuid::new_v4())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&site.router, &format!("/r/article/{}", site.article.id)).await;
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
}

#[tokio::test]
async fn serves_news_feed() {
    let site = site(DispatchSettings::default()).await;

    let response = get(&site.router, &format!("/feed/news/{}/", site.news.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("application/rss+xml"));

    let body = body_text(response).await;
    assert!(body.contains("<link>https://example.org/news/2024/3/spring-fair/</link>"));
    assert!(body.contains("<title>Canopy: News</title>"));

    let response = get(&site.router, &format!("/feed/events/{}/", site.news.id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn static_file_pages_redirect_to_the_file() {
    let site = site(DispatchSettings::default()).await;

    let response = get(&site.router, "/map/").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/media/river-map.pdf"));
}

#[tokio::test]
async fn health_check_without_database_is_ok() {
    let site = site(DispatchSettings::default()).await;

    let response = get(&site.router, "/_health").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
