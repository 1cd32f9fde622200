use crate::draft::{PlaceholderMedia, slugify};
use crate::models::{BuilderEntity, CategoryEntity, NewBuilder};
use crate::store::{CatalogStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Builder name used when the model found none in the source.
pub const UNKNOWN_BUILDER: &str = "Unknown Builder";

/// When the model's category contains `trigger`, use the first catalog category
/// whose name contains `lookup`. Rules are tried in order.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub trigger: &'static str,
    pub lookup: &'static str,
}

pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        trigger: "plot",
        lookup: "plot",
    },
    CategoryRule {
        trigger: "villa",
        lookup: "villa",
    },
    CategoryRule {
        trigger: "apartment",
        lookup: "apartment",
    },
];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("catalog has no categories")]
    NoCategories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryMatch {
    Exact,
    Keyword,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct BuilderResolution {
    pub builder: BuilderEntity,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct CategoryResolution {
    pub category: CategoryEntity,
    pub matched_by: CategoryMatch,
}

/// Case-insensitive exact match on the builder title, otherwise create a
/// placeholder builder.
///
/// Find-then-create is not atomic: two concurrent requests naming the same new
/// builder can both create it.
pub async fn resolve_builder(
    catalog: &dyn CatalogStore,
    name: Option<&str>,
    media: &PlaceholderMedia,
) -> Result<BuilderResolution, ResolveError> {
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty() && !n.eq_ignore_ascii_case("tbd"))
        .unwrap_or(UNKNOWN_BUILDER);

    if let Some(builder) = catalog.find_builder_by_name(name).await? {
        return Ok(BuilderResolution {
            builder,
            created: false,
        });
    }

    let slug = Some(slugify(name))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("builder-{}", &Uuid::new_v4().simple().to_string()[..8]));
    let builder = catalog
        .create_builder(NewBuilder {
            title: name.to_string(),
            slug,
            logo: media.url("400x400", &format!("{name} Logo")),
            image: media.url("1200x800", name),
            description: format!("{name} is a real estate developer."),
            available: true,
        })
        .await?;
    info!(
        target = "estate.catalog",
        builder_id = %builder.id,
        title = %builder.title,
        "builder_created"
    );
    Ok(BuilderResolution {
        builder,
        created: true,
    })
}

/// Exact (case-insensitive) name, then the keyword rules, then the first
/// category in the catalog, so every draft gets a category.
pub async fn resolve_category(
    catalog: &dyn CatalogStore,
    name: Option<&str>,
) -> Result<CategoryResolution, ResolveError> {
    let name = name.map(str::trim).filter(|n| !n.is_empty());

    if let Some(name) = name {
        if let Some(category) = catalog.find_category_by_name(name).await? {
            return Ok(CategoryResolution {
                category,
                matched_by: CategoryMatch::Exact,
            });
        }

        let lower = name.to_lowercase();
        for rule in CATEGORY_RULES.iter().filter(|r| lower.contains(r.trigger)) {
            if let Some(category) = catalog.find_category_by_keyword(rule.lookup).await? {
                return Ok(CategoryResolution {
                    category,
                    matched_by: CategoryMatch::Keyword,
                });
            }
        }
    }

    let category = catalog
        .find_any_category()
        .await?
        .ok_or(ResolveError::NoCategories)?;
    info!(
        target = "estate.catalog",
        requested = name.unwrap_or_default(),
        category = %category.name,
        "category_fallback"
    );
    Ok(CategoryResolution {
        category,
        matched_by: CategoryMatch::Fallback,
    })
}
