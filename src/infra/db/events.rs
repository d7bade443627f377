use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{
    application::repos::{EventQuery, EventsRepo, RepoError},
    domain::entities::EventRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const EVENT_COLUMNS: &str = "id, page_id, url_title, title, summary, body_html, start_date, \
     end_date, is_online, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    page_id: Uuid,
    url_title: String,
    title: String,
    summary: String,
    body_html: String,
    start_date: Date,
    end_date: Option<Date>,
    is_online: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            page_id: row.page_id,
            url_title: row.url_title,
            title: row.title,
            summary: row.summary,
            body_html: row.body_html,
            start_date: row.start_date,
            end_date: row.end_date,
            is_online: row.is_online,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl EventsRepo for PostgresRepositories {
    async fn list_events(&self, query: &EventQuery) -> Result<Vec<EventRecord>, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE is_online "));

        if let Some(page_id) = query.page_id {
            qb.push(" AND page_id = ");
            qb.push_bind(page_id);
        }
        if let Some(from) = query.starting_from {
            qb.push(" AND start_date >= ");
            qb.push_bind(from);
        }
        if let Some(year) = query.year {
            qb.push(" AND EXTRACT(YEAR FROM start_date)::int = ");
            qb.push_bind(year);
        }
        if let Some(month) = query.month {
            qb.push(" AND EXTRACT(MONTH FROM start_date)::int = ");
            qb.push_bind(i32::from(month));
        }
        qb.push(" ORDER BY start_date, title");

        let rows = qb
            .build_query_as::<EventRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EventRecord::from).collect())
    }

    async fn find_event(
        &self,
        page_id: Uuid,
        url_title: &str,
    ) -> Result<Option<EventRecord>, RepoError> {
        let sql =
            format!("SELECT {EVENT_COLUMNS} FROM events WHERE page_id = $1 AND url_title = $2");
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(page_id)
            .bind(url_title)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(EventRecord::from))
    }

    async fn find_event_by_id(&self, id: Uuid) -> Result<Option<EventRecord>, RepoError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(EventRecord::from))
    }
}
