use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ArticleQuery, ArticlesRepo, RepoError},
    domain::entities::ArticleRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const ARTICLE_COLUMNS: &str = "id, page_id, url_title, title, summary, body_html, is_featured, \
     publication_date, is_online, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: Uuid,
    page_id: Uuid,
    url_title: String,
    title: String,
    summary: String,
    body_html: String,
    is_featured: bool,
    publication_date: OffsetDateTime,
    is_online: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            page_id: row.page_id,
            url_title: row.url_title,
            title: row.title,
            summary: row.summary,
            body_html: row.body_html,
            is_featured: row.is_featured,
            publication_date: row.publication_date,
            is_online: row.is_online,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    fn push_published_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, now: OffsetDateTime) {
        qb.push(" AND is_online AND publication_date <= ");
        qb.push_bind(now);
    }
}

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE 1=1 "
        ));
        Self::push_published_filter(&mut qb, query.published_before);

        if let Some(page_id) = query.page_id {
            qb.push(" AND page_id = ");
            qb.push_bind(page_id);
        }
        if let Some(year) = query.year {
            qb.push(" AND EXTRACT(YEAR FROM publication_date AT TIME ZONE 'UTC')::int = ");
            qb.push_bind(year);
        }
        if let Some(month) = query.month {
            qb.push(" AND EXTRACT(MONTH FROM publication_date AT TIME ZONE 'UTC')::int = ");
            qb.push_bind(i32::from(month));
        }
        qb.push(" ORDER BY publication_date DESC, id");

        let rows = qb
            .build_query_as::<ArticleRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ArticleRecord::from).collect())
    }

    async fn latest_articles(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ArticleRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE 1=1 "
        ));
        Self::push_published_filter(&mut qb, now);
        qb.push(" ORDER BY is_featured DESC, publication_date DESC, id LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<ArticleRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ArticleRecord::from).collect())
    }

    async fn find_article(
        &self,
        page_id: Uuid,
        url_title: &str,
    ) -> Result<Option<ArticleRecord>, RepoError> {
        let sql =
            format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE page_id = $1 AND url_title = $2");
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(page_id)
            .bind(url_title)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ArticleRecord::from))
    }

    async fn find_article_by_id(&self, id: Uuid) -> Result<Option<ArticleRecord>, RepoError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1");
        let row = sqlx::query_as::<_, ArticleRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(ArticleRecord::from))
    }
}
