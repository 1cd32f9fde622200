use crate::audit::AuditRecord;
use crate::draft::DraftListing;
use crate::http::{build_client, default_timeout};
use crate::models::{BuilderEntity, CategoryEntity, NewBuilder, catalog_id};
use crate::store::{AuditStore, CatalogStore, StoreError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

const BUILDERS: &str = "builders";
const CATEGORIES: &str = "categories";
const PROJECTS: &str = "projects";
const AUDIT_LOG: &str = "ai_generation_logs";

/// Catalog and audit log stored in Supabase tables, accessed over PostgREST
/// with the service-role key.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    #[serde(deserialize_with = "catalog_id")]
    id: String,
}

impl SupabaseStore {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()?;
        Some(Self::new(base_url, service_key))
    }

    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            http: build_client(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    async fn select_first<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Option<T>, StoreError> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".into()), ("limit", "1".into())];
        query.extend(filters.iter().cloned());
        let response = self
            .http
            .get(self.table_url(table))
            .query(&query)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .timeout(default_timeout())
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Request(format!("HTTP {}", response.status())));
        }

        let mut rows: Vec<T> = response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T, StoreError> {
        let response = self
            .http
            .post(self.table_url(table))
            .header("apikey", &self.service_key)
            .header("Prefer", "return=representation")
            .bearer_auth(&self.service_key)
            .timeout(default_timeout())
            .json(body)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(StoreError::Request(format!("HTTP {status}: {detail}")));
        }

        let mut rows: Vec<T> = response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        debug!(target = "estate.catalog", table, rows = rows.len(), "rows_inserted");
        rows.pop().ok_or(StoreError::EmptyWrite)
    }
}

/// `ilike` pattern matching `value` literally (case-insensitive equality).
fn ilike_exact(value: &str) -> String {
    format!("ilike.{}", escape_pattern(value.trim()))
}

fn ilike_contains(value: &str) -> String {
    format!("ilike.*{}*", escape_pattern(value.trim()))
}

fn escape_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            '*' => out.push_str("\\*"),
            _ => out.push(ch),
        }
    }
    out
}

#[async_trait]
impl CatalogStore for SupabaseStore {
    async fn find_builder_by_name(&self, name: &str) -> Result<Option<BuilderEntity>, StoreError> {
        self.select_first(BUILDERS, &[("title", ilike_exact(name))])
            .await
    }

    async fn create_builder(&self, builder: NewBuilder) -> Result<BuilderEntity, StoreError> {
        self.insert(BUILDERS, &builder).await
    }

    async fn find_category_by_name(
        &self,
        name: &str,
    ) -> Result<Option<CategoryEntity>, StoreError> {
        self.select_first(CATEGORIES, &[("name", ilike_exact(name))])
            .await
    }

    async fn find_category_by_keyword(
        &self,
        keyword: &str,
    ) -> Result<Option<CategoryEntity>, StoreError> {
        self.select_first(CATEGORIES, &[("name", ilike_contains(keyword))])
            .await
    }

    async fn find_any_category(&self) -> Result<Option<CategoryEntity>, StoreError> {
        self.select_first(CATEGORIES, &[("order", "name.asc".to_string())])
            .await
    }

    async fn create_listing_draft(&self, draft: &DraftListing) -> Result<String, StoreError> {
        let row: IdRow = self.insert(PROJECTS, draft).await?;
        Ok(row.id)
    }
}

#[async_trait]
impl AuditStore for SupabaseStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let _: IdRow = self.insert(AUDIT_LOG, record).await?;
        Ok(())
    }
}
