use crate::draft::normalize::ListingStatus;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftListing {
    pub title: String,
    pub subtitle: String,
    pub slug: String,
    /// Catalog id of the resolved builder.
    pub builder: String,
    /// Catalog id of the resolved category.
    pub category: String,
    pub location: String,
    pub status: ListingStatus,
    pub min_price: f64,
    pub max_price: f64,
    pub description: String,
    pub builder_description: String,
    pub meta_title: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub bedrooms: Vec<String>,
    pub areas: Vec<String>,
    pub expert_opinions: Vec<String>,
    pub features: BTreeMap<String, Vec<String>>,
    pub faqs: Vec<Faq>,
    pub accommodation: Vec<AccommodationRow>,
    pub master_plan: MediaItem,
    pub gallery: Vec<MediaItem>,
    pub floor_plans: Vec<MediaItem>,
    pub source_url: Option<String>,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccommodationRow {
    pub unit: String,
    pub area: String,
    pub price: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub url: String,
    pub alt: String,
}
