pub mod memory;
pub mod supabase;

use crate::audit::AuditRecord;
use crate::draft::DraftListing;
use crate::models::{BuilderEntity, CategoryEntity, NewBuilder};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("write returned no record")]
    EmptyWrite,
}

/// Catalog lookups and writes the pipeline depends on. Name matching is
/// case-insensitive in every implementation.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_builder_by_name(&self, name: &str) -> Result<Option<BuilderEntity>, StoreError>;

    async fn create_builder(&self, builder: NewBuilder) -> Result<BuilderEntity, StoreError>;

    async fn find_category_by_name(&self, name: &str)
    -> Result<Option<CategoryEntity>, StoreError>;

    /// First category whose name contains `keyword`.
    async fn find_category_by_keyword(
        &self,
        keyword: &str,
    ) -> Result<Option<CategoryEntity>, StoreError>;

    async fn find_any_category(&self) -> Result<Option<CategoryEntity>, StoreError>;

    /// Persist a draft listing and return its catalog id.
    async fn create_listing_draft(&self, draft: &DraftListing) -> Result<String, StoreError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError>;
}
