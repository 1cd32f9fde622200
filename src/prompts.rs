use crate::context::Context;
use serde_json::{Map, Value};

pub const IDENTITY_SYSTEM: &str = r#"
You are a real estate catalog analyst. From the project information you are given, extract the core
listing facts. Respond with a single valid JSON object and nothing else.
The builder/developer name must be copied exactly as it appears in the information. Never invent a
builder; use an empty string when none is mentioned. Prices are numbers in the local currency's base
unit (no symbols). Use "TBD" for text you cannot determine.
"#;

pub const CONTENT_SYSTEM: &str = r#"
You are a senior real estate copywriter. Write accurate, specific, long-form listing content grounded
in the project facts and source information you are given. Do not contradict the facts.
Respond with a single valid JSON object and nothing else.
"#;

pub const DETAILS_SYSTEM: &str = r#"
You are a real estate data specialist. Produce structured listing details (features, FAQs and unit
pricing) grounded in the project facts and source information you are given.
Respond with a single valid JSON object and nothing else.
"#;

const IDENTITY_SHAPE: &str = r#"{
  "title": "project name",
  "subtitle": "one-line positioning statement",
  "builder": "builder/developer name exactly as written in the source",
  "location": "locality, city",
  "category": "Apartment | Villa | Plot | Commercial | ...",
  "status": "Pre Launch | Launch | Under Construction | Ready to Move In",
  "minPrice": 0,
  "maxPrice": 0,
  "href": "url-friendly-slug",
  "metaTitle": "SEO title under 60 characters",
  "metaDescription": "SEO description under 160 characters",
  "metaKeywords": "comma, separated, keywords",
  "bedrooms": ["2 BHK"],
  "areas": ["950 sqft"]
}"#;

const CONTENT_SHAPE: &str = r#"{
  "description": "at least 250 words about the project",
  "builderDescription": "at least 80 words about the builder",
  "expertOpinions": ["exactly 5 entries of at least 40 words each"]
}"#;

const DETAILS_SHAPE: &str = r#"{
  "features": {"Amenities": ["..."], "Security": ["..."]},
  "faqs": [{"questions": "a buyer question", "answer": "at least 50 words"}],
  "accommodation": [{"unit": "2 BHK", "area": "950 sqft", "price": "85 Lakh"}]
}"#;

pub fn identity_prompt(context: &Context) -> String {
    format!(
        "{block}\n\nReturn JSON with exactly this shape:\n{IDENTITY_SHAPE}",
        block = context.prompt_block(),
    )
}

pub fn content_prompt(context: &Context, identity: &Map<String, Value>) -> String {
    format!(
        "Project facts:\n{facts}\n\n{block}\n\nReturn JSON with exactly this shape:\n{CONTENT_SHAPE}",
        facts = facts_json(identity),
        block = context.prompt_block(),
    )
}

pub fn details_prompt(context: &Context, identity: &Map<String, Value>) -> String {
    format!(
        "Project facts:\n{facts}\n\n{block}\n\nReturn JSON with exactly this shape:\n{DETAILS_SHAPE}",
        facts = facts_json(identity),
        block = context.prompt_block(),
    )
}

fn facts_json(identity: &Map<String, Value>) -> String {
    serde_json::to_string_pretty(identity).unwrap_or_else(|_| "{}".into())
}
