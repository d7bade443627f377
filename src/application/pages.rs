//! Page tree maintenance: sibling reordering and cascading deletion.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::repos::{PagesRepo, PagesWriteRepo};
use crate::domain::entities::PageRecord;
use crate::domain::error::DomainError;

const SOURCE: &str = "application::pages";

#[derive(Clone)]
pub struct PageMaintenanceService {
    reader: Arc<dyn PagesRepo>,
    writer: Arc<dyn PagesWriteRepo>,
}

impl PageMaintenanceService {
    pub fn new(reader: Arc<dyn PagesRepo>, writer: Arc<dyn PagesWriteRepo>) -> Self {
        Self { reader, writer }
    }

    /// Exchange the positions of two sibling pages.
    pub async fn swap_order(&self, first: Uuid, second: Uuid) -> Result<(), AppError> {
        if first == second {
            return Err(DomainError::validation("cannot swap a page with itself").into());
        }
        let first_page = self.load(first).await?;
        let second_page = self.load(second).await?;
        if first_page.parent_id != second_page.parent_id {
            return Err(DomainError::validation(format!(
                "pages `{first}` and `{second}` are not siblings"
            ))
            .into());
        }

        self.writer.swap_page_order(first, second).await?;
        info!(target = SOURCE, %first, %second, "page order swapped");
        Ok(())
    }

    /// Delete a page with all of its descendants. Returns how many pages
    /// were removed.
    pub async fn delete(&self, id: Uuid) -> Result<u64, AppError> {
        let page = self.load(id).await?;
        if page.is_homepage {
            return Err(DomainError::protected("page", "the homepage cannot be deleted").into());
        }

        let removed = self.writer.delete_page(id).await?;
        info!(target = SOURCE, %id, removed, "page deleted");
        Ok(removed)
    }

    async fn load(&self, id: Uuid) -> Result<PageRecord, AppError> {
        self.reader
            .find_page(id)
            .await?
            .ok_or_else(|| DomainError::not_found("page").into())
    }
}
