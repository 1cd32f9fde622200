use crate::audit::AuditRecord;
use crate::draft::{DraftListing, slugify};
use crate::models::{BuilderEntity, CategoryEntity, NewBuilder};
use crate::store::{AuditStore, CatalogStore, StoreError};
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

const DEFAULT_CATEGORIES: &[&str] = &["Apartment", "Villa", "Plot", "Commercial"];

/// Process-local catalog and audit log. Used when no Supabase project is
/// configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    builders: Mutex<Vec<BuilderEntity>>,
    categories: Mutex<Vec<CategoryEntity>>,
    listings: Mutex<Vec<(String, DraftListing)>>,
    audit: Mutex<Vec<AuditRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_categories() -> Self {
        Self::with_categories(DEFAULT_CATEGORIES)
    }

    pub fn with_categories(names: &[&str]) -> Self {
        let categories = names
            .iter()
            .map(|name| CategoryEntity {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                slug: Some(slugify(name)),
            })
            .collect();
        Self {
            categories: Mutex::new(categories),
            ..Self::default()
        }
    }

    pub async fn insert_builder(&self, title: &str) -> BuilderEntity {
        let builder = BuilderEntity {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            slug: slugify(title),
            logo: None,
            image: None,
            description: None,
            available: true,
        };
        self.builders.lock().await.push(builder.clone());
        builder
    }

    pub async fn builders(&self) -> Vec<BuilderEntity> {
        self.builders.lock().await.clone()
    }

    pub async fn listings(&self) -> Vec<(String, DraftListing)> {
        self.listings.lock().await.clone()
    }

    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.lock().await.clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_builder_by_name(&self, name: &str) -> Result<Option<BuilderEntity>, StoreError> {
        let needle = name.trim().to_lowercase();
        Ok(self
            .builders
            .lock()
            .await
            .iter()
            .find(|b| b.title.trim().to_lowercase() == needle)
            .cloned())
    }

    async fn create_builder(&self, builder: NewBuilder) -> Result<BuilderEntity, StoreError> {
        let created = BuilderEntity {
            id: Uuid::new_v4().to_string(),
            title: builder.title,
            slug: builder.slug,
            logo: Some(builder.logo),
            image: Some(builder.image),
            description: Some(builder.description),
            available: builder.available,
        };
        self.builders.lock().await.push(created.clone());
        Ok(created)
    }

    async fn find_category_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CategoryEntity>, StoreError> {
        let needle = name.trim().to_lowercase();
        Ok(self
            .categories
            .lock()
            .await
            .iter()
            .find(|c| c.name.trim().to_lowercase() == needle)
            .cloned())
    }

    async fn find_category_by_keyword(
        &self,
        keyword: &str,
    ) -> Result<Option<CategoryEntity>, StoreError> {
        let needle = keyword.trim().to_lowercase();
        Ok(self
            .categories
            .lock()
            .await
            .iter()
            .find(|c| c.name.to_lowercase().contains(&needle))
            .cloned())
    }

    async fn find_any_category(&self) -> Result<Option<CategoryEntity>, StoreError> {
        Ok(self.categories.lock().await.first().cloned())
    }

    async fn create_listing_draft(&self, draft: &DraftListing) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.listings.lock().await.push((id.clone(), draft.clone()));
        Ok(id)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.audit.lock().await.push(record.clone());
        Ok(())
    }
}
