use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CachedResourcesRepo, RepoError, StoreResourceParams},
    domain::entities::CachedResourceRecord,
};

use super::{
    PostgresRepositories, map_sqlx_error,
    util::{status_from_db, status_to_db},
};

const RESOURCE_COLUMNS: &str = "id, url, payload, status, fetched_at, prefetch_expires_at";

#[derive(sqlx::FromRow)]
struct CachedResourceRow {
    id: Uuid,
    url: String,
    payload: Vec<u8>,
    status: i16,
    fetched_at: OffsetDateTime,
    prefetch_expires_at: OffsetDateTime,
}

impl TryFrom<CachedResourceRow> for CachedResourceRecord {
    type Error = RepoError;

    fn try_from(row: CachedResourceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            url: row.url,
            payload: row.payload,
            status: status_from_db(row.status)?,
            fetched_at: row.fetched_at,
            prefetch_expires_at: row.prefetch_expires_at,
        })
    }
}

#[async_trait]
impl CachedResourcesRepo for PostgresRepositories {
    async fn find_resource(&self, url: &str) -> Result<Option<CachedResourceRecord>, RepoError> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM cached_resources WHERE url = $1");
        let row = sqlx::query_as::<_, CachedResourceRow>(&sql)
            .bind(url)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(CachedResourceRecord::try_from).transpose()
    }

    async fn upsert_resource(
        &self,
        params: StoreResourceParams,
    ) -> Result<CachedResourceRecord, RepoError> {
        let sql = format!(
            "INSERT INTO cached_resources \
                 (id, url, payload, status, fetched_at, prefetch_expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (url) DO UPDATE SET \
                 payload = EXCLUDED.payload, \
                 status = EXCLUDED.status, \
                 fetched_at = EXCLUDED.fetched_at, \
                 prefetch_expires_at = EXCLUDED.prefetch_expires_at \
             RETURNING {RESOURCE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CachedResourceRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&params.url)
            .bind(&params.payload)
            .bind(status_to_db(params.status)?)
            .bind(params.fetched_at)
            .bind(params.prefetch_expires_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        CachedResourceRecord::try_from(row)
    }

    async fn refresh_resource(
        &self,
        id: Uuid,
        payload: Vec<u8>,
        status: u16,
        fetched_at: OffsetDateTime,
        prefetch_expires_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE cached_resources \
             SET payload = $2, status = $3, fetched_at = $4, prefetch_expires_at = $5 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(payload)
        .bind(status_to_db(status)?)
        .bind(fetched_at)
        .bind(prefetch_expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn renew_prefetch(
        &self,
        id: Uuid,
        prefetch_expires_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let result =
            sqlx::query("UPDATE cached_resources SET prefetch_expires_at = $2 WHERE id = $1")
                .bind(id)
                .bind(prefetch_expires_at)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_resources(&self) -> Result<Vec<CachedResourceRecord>, RepoError> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM cached_resources ORDER BY fetched_at, id");
        let rows = sqlx::query_as::<_, CachedResourceRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(CachedResourceRecord::try_from)
            .collect()
    }
}
