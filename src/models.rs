use crate::draft::DraftListing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub preview: bool,
}

/// The single input a generation works from, picked by precedence
/// url > rawText > projectName. Blank strings count as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationInput {
    Url(String),
    RawText(String),
    Name {
        name: String,
        location: Option<String>,
    },
}

impl GenerationInput {
    pub fn from_request(request: &GenerationRequest) -> Option<Self> {
        if let Some(url) = non_blank(&request.url) {
            return Some(Self::Url(url));
        }
        if let Some(text) = non_blank(&request.raw_text) {
            return Some(Self::RawText(text));
        }
        non_blank(&request.project_name).map(|name| Self::Name {
            name,
            location: non_blank(&request.location),
        })
    }

    /// Short human-readable label stored with the audit record.
    pub fn label(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::RawText(text) => {
                let head: String = text.chars().take(80).collect();
                if text.chars().count() > 80 {
                    format!("text: {head}…")
                } else {
                    format!("text: {head}")
                }
            }
            Self::Name {
                name,
                location: Some(location),
            } => format!("{name}, {location}"),
            Self::Name {
                name,
                location: None,
            } => name.clone(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub message: String,
    pub project_id: Option<String>,
    pub data: DraftListing,
    pub builder_data: BuilderEntity,
    pub category_data: CategoryEntity,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub error: Option<String>,
    pub stage: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuilderEntity {
    #[serde(deserialize_with = "catalog_id")]
    pub id: String,
    pub title: String,
    pub slug: String,
    pub logo: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub available: bool,
}

/// Fields for a builder the pipeline creates when no catalog match exists.
#[derive(Debug, Clone, Serialize)]
pub struct NewBuilder {
    pub title: String,
    pub slug: String,
    pub logo: String,
    pub image: String,
    pub description: String,
    pub available: bool,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryEntity {
    #[serde(deserialize_with = "catalog_id")]
    pub id: String,
    pub name: String,
    pub slug: Option<String>,
}

/// Catalog ids are uuid strings or integer identity columns depending on how
/// the table was created; both are carried as text.
pub fn catalog_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Unsigned(id) => id.to_string(),
        RawId::Signed(id) => id.to_string(),
    })
}
