use crate::draft::models::{AccommodationRow, Faq};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const TBD: &str = "TBD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ListingStatus {
    #[default]
    #[serde(rename = "Pre Launch")]
    PreLaunch,
    #[serde(rename = "Launch")]
    Launch,
    #[serde(rename = "Under Construction")]
    UnderConstruction,
    #[serde(rename = "Ready to Move In")]
    ReadyToMoveIn,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::PreLaunch => "Pre Launch",
            ListingStatus::Launch => "Launch",
            ListingStatus::UnderConstruction => "Under Construction",
            ListingStatus::ReadyToMoveIn => "Ready to Move In",
        }
    }

    /// Map free text onto the four catalog statuses. Canonical strings pass
    /// through; everything else is matched by substring in priority order and
    /// defaults to `Pre Launch`.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        for status in [
            Self::PreLaunch,
            Self::Launch,
            Self::UnderConstruction,
            Self::ReadyToMoveIn,
        ] {
            if trimmed == status.as_str() {
                return status;
            }
        }

        let lower = trimmed.to_lowercase();
        if lower.contains("ready") {
            Self::ReadyToMoveIn
        } else if lower.contains("construction") {
            Self::UnderConstruction
        } else if ["pre-launch", "pre launch", "prelaunch"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            Self::PreLaunch
        } else if lower.contains("launch") {
            Self::Launch
        } else {
            Self::PreLaunch
        }
    }
}

/// Trimmed string field, `TBD` when missing or blank. Numbers are rendered as text.
pub fn text_or_tbd(map: &Map<String, Value>, key: &str) -> String {
    optional_text(map, key).unwrap_or_else(|| TBD.to_string())
}

pub fn optional_text(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric field; accepts numbers and numeric strings with separators. Anything
/// else is `0`.
pub fn number_or_zero(map: &Map<String, Value>, key: &str) -> f64 {
    let parsed = match map.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | ' ' | '_'))
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0)
}

/// List of strings; a comma-separated string is split, scalars inside arrays
/// are rendered as text.
pub fn string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// `{"group": ["item", ...]}`. A flat array is filed under `Highlights`.
pub fn feature_groups(map: &Map<String, Value>, key: &str) -> BTreeMap<String, Vec<String>> {
    let mut groups = BTreeMap::new();
    match map.get(key) {
        Some(Value::Object(raw)) => {
            for (group, items) in raw {
                let items = match items {
                    Value::Array(values) => values.iter().filter_map(scalar_text).collect(),
                    other => scalar_text(other).into_iter().collect::<Vec<_>>(),
                };
                if !items.is_empty() {
                    groups.insert(group.trim().to_string(), items);
                }
            }
        }
        Some(Value::Array(values)) => {
            let items: Vec<String> = values.iter().filter_map(scalar_text).collect();
            if !items.is_empty() {
                groups.insert("Highlights".to_string(), items);
            }
        }
        _ => {}
    }
    groups
}

/// FAQ entries. Models answer with `questions` (plural) or `question`.
pub fn faqs(map: &Map<String, Value>, key: &str) -> Vec<Faq> {
    let Some(Value::Array(items)) = map.get(key) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|entry| {
            let question =
                optional_text(entry, "questions").or_else(|| optional_text(entry, "question"))?;
            Some(Faq {
                question,
                answer: text_or_tbd(entry, "answer"),
            })
        })
        .collect()
}

pub fn accommodation(map: &Map<String, Value>, key: &str) -> Vec<AccommodationRow> {
    let Some(Value::Array(items)) = map.get(key) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|row| AccommodationRow {
            unit: text_or_tbd(row, "unit"),
            area: text_or_tbd(row, "area"),
            price: text_or_tbd(row, "price"),
        })
        .filter(|row| row.unit != TBD || row.area != TBD || row.price != TBD)
        .collect()
}

/// Lowercase ASCII slug with single dashes.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
