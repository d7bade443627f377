use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreatePageParams, PagesRepo, PagesWriteRepo, RepoError},
    domain::{entities::PageRecord, slug::ensure_url_slug},
};

use super::{PostgresRepositories, map_sqlx_error};

const PAGE_COLUMNS: &str = "id, parent_id, slug, title, short_title, order_index, is_homepage, \
     content_type, content_settings, is_online, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PageRow {
    id: Uuid,
    parent_id: Option<Uuid>,
    slug: String,
    title: String,
    short_title: Option<String>,
    order_index: i32,
    is_homepage: bool,
    content_type: String,
    content_settings: Json<serde_json::Value>,
    is_online: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PageRow> for PageRecord {
    fn from(row: PageRow) -> Self {
        Self {
            id: row.id,
            parent_id: row.parent_id,
            slug: row.slug,
            title: row.title,
            short_title: row.short_title,
            order_index: row.order_index,
            is_homepage: row.is_homepage,
            content_type: row.content_type,
            content_settings: row.content_settings.0,
            is_online: row.is_online,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl PagesRepo for PostgresRepositories {
    async fn list_pages(&self) -> Result<Vec<PageRecord>, RepoError> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM pages ORDER BY parent_id NULLS FIRST, order_index, id"
        );
        let rows = sqlx::query_as::<_, PageRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PageRecord::from).collect())
    }

    async fn find_page(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = $1");
        let row = sqlx::query_as::<_, PageRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PageRecord::from))
    }
}

#[async_trait]
impl PagesWriteRepo for PostgresRepositories {
    async fn create_page(&self, params: CreatePageParams) -> Result<PageRecord, RepoError> {
        if params.is_homepage {
            if params.parent_id.is_some() {
                return Err(RepoError::InvalidInput {
                    message: "the homepage cannot have a parent".to_string(),
                });
            }
        } else {
            ensure_url_slug(&params.slug).map_err(|err| RepoError::InvalidInput {
                message: err.to_string(),
            })?;
        }
        if !params.content_settings.is_object() {
            return Err(RepoError::InvalidInput {
                message: "content settings must be a JSON object".to_string(),
            });
        }

        let sql = format!(
            "INSERT INTO pages (id, parent_id, slug, title, short_title, order_index, is_homepage, \
                 content_type, content_settings, is_online) \
             SELECT $1, $2, $3, $4, $5, \
                 COALESCE((SELECT MAX(order_index) + 1 FROM pages \
                           WHERE parent_id IS NOT DISTINCT FROM $2), 0), \
                 $6, $7, $8, $9 \
             RETURNING {PAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PageRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.parent_id)
            .bind(&params.slug)
            .bind(&params.title)
            .bind(&params.short_title)
            .bind(params.is_homepage)
            .bind(&params.content_type)
            .bind(Json(&params.content_settings))
            .bind(params.is_online)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(PageRecord::from(row))
    }

    async fn swap_page_order(&self, first: Uuid, second: Uuid) -> Result<(), RepoError> {
        let mut tx = self.begin().await?;

        let orders: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT id, order_index FROM pages WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(vec![first, second])
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let order_of = |id: Uuid| {
            orders
                .iter()
                .find(|(candidate, _)| *candidate == id)
                .map(|(_, order)| *order)
                .ok_or(RepoError::NotFound)
        };
        let first_order = order_of(first)?;
        let second_order = order_of(second)?;

        for (id, order_index) in [(first, second_order), (second, first_order)] {
            sqlx::query("UPDATE pages SET order_index = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(order_index)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_page(&self, id: Uuid) -> Result<u64, RepoError> {
        let mut tx = self.begin().await?;

        let (count,): (i64,) = sqlx::query_as(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT id FROM pages WHERE id = $1
                UNION ALL
                SELECT child.id FROM pages child
                INNER JOIN subtree parent ON child.parent_id = parent.id
            )
            SELECT COUNT(*) FROM subtree
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if count == 0 {
            return Err(RepoError::NotFound);
        }

        // Descendants, articles and events go with the row via ON DELETE CASCADE.
        sqlx::query("DELETE FROM pages WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Self::convert_count(count)
    }
}
