use crate::draft::models::{DraftListing, MediaItem};
use crate::draft::normalize::{
    ListingStatus, accommodation, faqs, feature_groups, number_or_zero, optional_text, slugify,
    string_list, text_or_tbd,
};
use crate::models::{BuilderEntity, CategoryEntity};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Generates placeholder image URLs until real media is uploaded.
#[derive(Debug, Clone)]
pub struct PlaceholderMedia {
    base_url: String,
}

impl PlaceholderMedia {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("PLACEHOLDER_IMAGE_BASE")
                .unwrap_or_else(|_| "https://placehold.co".to_string()),
        )
    }

    pub fn url(&self, size: &str, label: &str) -> String {
        format!(
            "{}/{size}?text={}",
            self.base_url,
            urlencoding::encode(label)
        )
    }

    fn item(&self, size: &str, label: String) -> MediaItem {
        MediaItem {
            url: self.url(size, &label),
            alt: label,
        }
    }
}

/// Build the catalog payload from the merged stage output and the resolved
/// entities. Never fails: missing fields take their defaults.
pub fn assemble(
    merged: &Map<String, Value>,
    builder: &BuilderEntity,
    category: &CategoryEntity,
    media: &PlaceholderMedia,
    source_url: Option<&str>,
) -> DraftListing {
    let title = text_or_tbd(merged, "title");
    let status = optional_text(merged, "status")
        .map(|raw| ListingStatus::normalize(&raw))
        .unwrap_or_default();

    let min_price = number_or_zero(merged, "minPrice");
    let max_price = number_or_zero(merged, "maxPrice").max(min_price);

    let slug = optional_text(merged, "href")
        .map(|href| slugify(&href))
        .filter(|slug| !slug.is_empty())
        .or_else(|| Some(slugify(&title)).filter(|slug| !slug.is_empty() && title != "TBD"))
        .unwrap_or_else(|| format!("project-{}", &Uuid::new_v4().simple().to_string()[..8]));

    let accommodation = accommodation(merged, "accommodation");
    let floor_plans = if accommodation.is_empty() {
        vec![media.item("800x600", format!("{title} Floor Plan"))]
    } else {
        accommodation
            .iter()
            .map(|row| media.item("800x600", format!("{title} {} Floor Plan", row.unit)))
            .collect()
    };

    DraftListing {
        subtitle: text_or_tbd(merged, "subtitle"),
        slug,
        builder: builder.id.clone(),
        category: category.id.clone(),
        location: text_or_tbd(merged, "location"),
        status,
        min_price,
        max_price,
        description: text_or_tbd(merged, "description"),
        builder_description: text_or_tbd(merged, "builderDescription"),
        meta_title: optional_text(merged, "metaTitle").unwrap_or_else(|| title.clone()),
        meta_description: text_or_tbd(merged, "metaDescription"),
        meta_keywords: meta_keywords(merged),
        bedrooms: string_list(merged, "bedrooms"),
        areas: string_list(merged, "areas"),
        expert_opinions: string_list(merged, "expertOpinions"),
        features: feature_groups(merged, "features"),
        faqs: faqs(merged, "faqs"),
        accommodation,
        master_plan: media.item("1200x800", format!("{title} Master Plan")),
        gallery: (1..=3)
            .map(|n| media.item("1200x800", format!("{title} Gallery {n}")))
            .collect(),
        floor_plans,
        source_url: source_url.map(str::to_string),
        available: false,
        title,
    }
}

/// Models answer with either a comma-separated string or an array.
fn meta_keywords(merged: &Map<String, Value>) -> String {
    let keywords = string_list(merged, "metaKeywords");
    if keywords.is_empty() {
        "TBD".to_string()
    } else {
        keywords.join(", ")
    }
}
