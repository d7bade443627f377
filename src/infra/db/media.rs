use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{MediaRepo, RepoError},
    domain::entities::{MediaFileRecord, MediaFolderRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct MediaFileRow {
    id: Uuid,
    folder_id: Option<Uuid>,
    title: String,
    file_url: String,
    created_at: OffsetDateTime,
}

impl From<MediaFileRow> for MediaFileRecord {
    fn from(row: MediaFileRow) -> Self {
        Self {
            id: row.id,
            folder_id: row.folder_id,
            title: row.title,
            file_url: row.file_url,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MediaFolderRow {
    id: Uuid,
    name: String,
    created_at: OffsetDateTime,
}

impl From<MediaFolderRow> for MediaFolderRecord {
    fn from(row: MediaFolderRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl MediaRepo for PostgresRepositories {
    async fn find_file(&self, id: Uuid) -> Result<Option<MediaFileRecord>, RepoError> {
        let row = sqlx::query_as::<_, MediaFileRow>(
            "SELECT id, folder_id, title, file_url, created_at FROM media_files WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(MediaFileRecord::from))
    }

    async fn find_folder(&self, id: Uuid) -> Result<Option<MediaFolderRecord>, RepoError> {
        let row = sqlx::query_as::<_, MediaFolderRow>(
            "SELECT id, name, created_at FROM media_folders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(MediaFolderRecord::from))
    }
}
