use crate::audit::{self, AuditRecord};
use crate::context::Context;
use crate::draft::{DraftListing, PlaceholderMedia};
use crate::llm::{CompletionModel, LlmConfig, OpenAiClient};
use crate::models::{
    BuilderEntity, CategoryEntity, GenerateResponse, GenerationInput, GenerationRequest,
    StageReport,
};
use crate::scrape::{HttpPageFetcher, PageFetcher};
use crate::store::{AuditStore, CatalogStore, MemoryStore, SupabaseStore};
use serde_json::{Map, Value};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct Pipeline {
    llm: Arc<dyn CompletionModel>,
    fetcher: Arc<dyn PageFetcher>,
    catalog: Arc<dyn CatalogStore>,
    audit: Arc<dyn AuditStore>,
    media: PlaceholderMedia,
}

/// What an attempt produced before it finished, kept for the audit record.
#[derive(Default)]
struct Attempt {
    merged: Option<Map<String, Value>>,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn CompletionModel>,
        fetcher: Arc<dyn PageFetcher>,
        catalog: Arc<dyn CatalogStore>,
        audit: Arc<dyn AuditStore>,
        media: PlaceholderMedia,
    ) -> Self {
        Self {
            llm,
            fetcher,
            catalog,
            audit,
            media,
        }
    }

    pub fn from_env() -> Self {
        let llm = OpenAiClient::new(LlmConfig::from_env());
        if !llm.is_configured() {
            warn!(
                target = "estate.pipeline",
                "OPENAI_API_KEY is not set; generation requests will fail"
            );
        }
        let (catalog, audit) = match SupabaseStore::from_env() {
            Some(store) => {
                let store = Arc::new(store);
                (
                    store.clone() as Arc<dyn CatalogStore>,
                    store as Arc<dyn AuditStore>,
                )
            }
            None => {
                warn!(
                    target = "estate.pipeline",
                    "SUPABASE_URL not set; using in-memory catalog and audit log"
                );
                let store = Arc::new(MemoryStore::with_default_categories());
                (
                    store.clone() as Arc<dyn CatalogStore>,
                    store as Arc<dyn AuditStore>,
                )
            }
        };
        Self::new(
            Arc::new(llm),
            Arc::new(HttpPageFetcher::from_env()),
            catalog,
            audit,
            PlaceholderMedia::from_env(),
        )
    }

    /// Generate a draft listing and record the attempt.
    ///
    /// Requests without any usable input are rejected before an attempt starts
    /// and leave no audit record. Every other outcome is audited exactly once.
    pub async fn run(&self, request: GenerationRequest) -> Result<GenerateResponse, PipelineError> {
        let Some(input) = GenerationInput::from_request(&request) else {
            return Err(PipelineError::invalid_input(
                "validate_input",
                "Provide a projectName, rawText, or url",
            ));
        };

        let label = input.label();
        let started = Instant::now();
        let mut attempt = Attempt::default();
        let outcome = self.generate(&input, request.preview, &mut attempt).await;

        let record = match &outcome {
            Ok(response) => {
                info!(
                    target = "estate.pipeline",
                    input = %label,
                    preview = request.preview,
                    project_id = response.project_id.as_deref().unwrap_or("-"),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generation_succeeded"
                );
                crate::metrics::generation_finished(None);
                AuditRecord::success(label, &attempt.merged.unwrap_or_default())
            }
            Err(err) => {
                error!(
                    target = "estate.pipeline",
                    input = %label,
                    stage = err.stage(),
                    kind = err.kind().as_str(),
                    error = %err.detail(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generation_failed"
                );
                crate::metrics::generation_finished(Some(err.kind().as_str()));
                AuditRecord::failure(label, err, attempt.merged.as_ref())
            }
        };
        audit::record(self.audit.as_ref(), record).await;

        outcome
    }

    /// Run the attempt on its own task. A panic inside it surfaces as an
    /// `Internal` error and is audited like any other failure.
    pub async fn run_supervised(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerateResponse, PipelineError> {
        let label = GenerationInput::from_request(&request).map(|input| input.label());
        let pipeline = self.clone();
        match tokio::spawn(async move { pipeline.run(request).await }).await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                let err = PipelineError::internal("generate", join_err.to_string());
                error!(
                    target = "estate.pipeline",
                    input = label.as_deref().unwrap_or("-"),
                    error = %join_err,
                    "generation_task_aborted"
                );
                crate::metrics::generation_finished(Some(err.kind().as_str()));
                if let Some(label) = label {
                    audit::record(self.audit.as_ref(), AuditRecord::failure(label, &err, None))
                        .await;
                }
                Err(err)
            }
        }
    }

    async fn generate(
        &self,
        input: &GenerationInput,
        preview: bool,
        attempt: &mut Attempt,
    ) -> Result<GenerateResponse, PipelineError> {
        if !self.llm.is_configured() {
            return Err(PipelineError::configuration(
                "configure",
                "OPENAI_API_KEY is not configured",
            ));
        }

        let mut stages = Vec::new();
        let llm = self.llm.as_ref();

        let context = self
            .capture_stage(
                "normalize_context",
                &mut stages,
                stages::normalize_context(input, self.fetcher.as_ref()),
            )
            .await?;

        let identity = self
            .capture_stage("identity", &mut stages, stages::identity(&context, llm))
            .await?;
        let content = self
            .capture_stage(
                "content",
                &mut stages,
                stages::content(&context, &identity, llm),
            )
            .await?;
        let details = self
            .capture_stage(
                "details",
                &mut stages,
                stages::details(&context, &identity, llm),
            )
            .await?;

        let merged = merge_stage_results([identity, content, details]);
        attempt.merged = Some(merged.clone());

        let builder = self
            .capture_stage(
                "resolve_builder",
                &mut stages,
                stages::resolve_builder(&merged, self.catalog.as_ref(), &self.media),
            )
            .await?;
        let category = self
            .capture_stage(
                "resolve_category",
                &mut stages,
                stages::resolve_category(&merged, self.catalog.as_ref()),
            )
            .await?;
        let draft = self
            .capture_stage(
                "assemble_draft",
                &mut stages,
                stages::assemble_draft(
                    &merged,
                    &builder,
                    &category,
                    &self.media,
                    context.source_url.as_deref(),
                ),
            )
            .await?;

        if preview {
            return Ok(GenerateResponse {
                message: "Project draft generated (preview only, nothing saved)".into(),
                project_id: None,
                data: draft,
                builder_data: builder,
                category_data: category,
                stages,
            });
        }

        let project_id = self
            .capture_stage(
                "persist_draft",
                &mut stages,
                stages::persist_draft(&draft, self.catalog.as_ref()),
            )
            .await?;

        Ok(GenerateResponse {
            message: "Project draft generated and saved for review".into(),
            project_id: Some(project_id),
            data: draft,
            builder_data: builder,
            category_data: category,
            stages,
        })
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

/// Shallow key union of the stage objects. Stages own disjoint keys; if one
/// repeats a key anyway, the earlier stage's value stays.
pub fn merge_stage_results(
    results: impl IntoIterator<Item = Map<String, Value>>,
) -> Map<String, Value> {
    let mut merged = Map::new();
    for result in results {
        for (key, value) in result {
            merged.entry(key).or_insert(value);
        }
    }
    merged
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
    raw_output: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Configuration,
    Upstream,
    Parse,
    Persistence,
    Internal,
}

impl PipelineErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineErrorKind::InvalidInput => "invalid_input",
            PipelineErrorKind::Configuration => "configuration",
            PipelineErrorKind::Upstream => "upstream",
            PipelineErrorKind::Parse => "parse",
            PipelineErrorKind::Persistence => "persistence",
            PipelineErrorKind::Internal => "internal",
        }
    }
}

impl PipelineError {
    fn with_kind(stage: &'static str, message: impl Into<String>, kind: PipelineErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
            raw_output: None,
        }
    }

    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::InvalidInput)
    }

    pub fn configuration(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::Configuration)
    }

    pub fn upstream(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::Upstream)
    }

    /// Model output that could not be turned into a JSON object; `raw` is kept
    /// verbatim for the audit trail.
    pub fn parse(stage: &'static str, message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            raw_output: Some(raw.into()),
            ..Self::with_kind(stage, message, PipelineErrorKind::Parse)
        }
    }

    pub fn persistence(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::Persistence)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::Internal)
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }

    pub fn raw_output(&self) -> Option<&str> {
        self.raw_output.as_deref()
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

pub mod stages {
    use super::*;
    use crate::context;
    use crate::draft::{self, normalize::optional_text};
    use crate::llm::{LlmError, extract_object};
    use crate::prompts;
    use crate::resolve::{self, ResolveError};
    use serde_json::json;

    pub async fn normalize_context(
        input: &GenerationInput,
        fetcher: &dyn PageFetcher,
    ) -> Result<StageOutcome<Context>, PipelineError> {
        let context = context::normalize(input, fetcher).await;
        let output = json!({
            "kind": context.kind,
            "chars": context.text.chars().count(),
            "has_content": context.has_content(),
            "source_url": context.source_url,
        });
        Ok(StageOutcome::new(context, output))
    }

    /// Stage 1: identity, pricing and SEO facts.
    pub async fn identity(
        context: &Context,
        llm: &dyn CompletionModel,
    ) -> Result<StageOutcome<Map<String, Value>>, PipelineError> {
        complete_json(
            "identity",
            llm,
            prompts::IDENTITY_SYSTEM,
            &prompts::identity_prompt(context),
        )
        .await
    }

    /// Stage 2: long-form prose, written against the stage 1 facts.
    pub async fn content(
        context: &Context,
        identity: &Map<String, Value>,
        llm: &dyn CompletionModel,
    ) -> Result<StageOutcome<Map<String, Value>>, PipelineError> {
        complete_json(
            "content",
            llm,
            prompts::CONTENT_SYSTEM,
            &prompts::content_prompt(context, identity),
        )
        .await
    }

    /// Stage 3: features, FAQs and unit pricing rows.
    pub async fn details(
        context: &Context,
        identity: &Map<String, Value>,
        llm: &dyn CompletionModel,
    ) -> Result<StageOutcome<Map<String, Value>>, PipelineError> {
        complete_json(
            "details",
            llm,
            prompts::DETAILS_SYSTEM,
            &prompts::details_prompt(context, identity),
        )
        .await
    }

    async fn complete_json(
        stage: &'static str,
        llm: &dyn CompletionModel,
        system: &str,
        prompt: &str,
    ) -> Result<StageOutcome<Map<String, Value>>, PipelineError> {
        let raw = llm.complete(system, prompt).await.map_err(|err| match err {
            LlmError::MissingCredential => PipelineError::configuration(stage, err.to_string()),
            other => PipelineError::upstream(stage, other.to_string()),
        })?;
        let object = extract_object(&raw)
            .map_err(|err| PipelineError::parse(stage, err.to_string(), raw.as_str()))?;
        let output = json!({
            "model": llm.model_name(),
            "keys": object.keys().collect::<Vec<_>>(),
            "raw_chars": raw.chars().count(),
        });
        Ok(StageOutcome::new(object, output))
    }

    pub async fn resolve_builder(
        merged: &Map<String, Value>,
        catalog: &dyn CatalogStore,
        media: &PlaceholderMedia,
    ) -> Result<StageOutcome<BuilderEntity>, PipelineError> {
        let requested = optional_text(merged, "builder");
        let resolution = resolve::resolve_builder(catalog, requested.as_deref(), media)
            .await
            .map_err(|err| resolve_error("resolve_builder", err))?;
        let output = json!({
            "requested": requested,
            "builder_id": resolution.builder.id,
            "title": resolution.builder.title,
            "created": resolution.created,
        });
        Ok(StageOutcome::new(resolution.builder, output))
    }

    pub async fn resolve_category(
        merged: &Map<String, Value>,
        catalog: &dyn CatalogStore,
    ) -> Result<StageOutcome<CategoryEntity>, PipelineError> {
        let requested = optional_text(merged, "category");
        let resolution = resolve::resolve_category(catalog, requested.as_deref())
            .await
            .map_err(|err| resolve_error("resolve_category", err))?;
        let output = json!({
            "requested": requested,
            "category_id": resolution.category.id,
            "name": resolution.category.name,
            "matched_by": resolution.matched_by,
        });
        Ok(StageOutcome::new(resolution.category, output))
    }

    pub async fn assemble_draft(
        merged: &Map<String, Value>,
        builder: &BuilderEntity,
        category: &CategoryEntity,
        media: &PlaceholderMedia,
        source_url: Option<&str>,
    ) -> Result<StageOutcome<DraftListing>, PipelineError> {
        let listing = draft::assemble(merged, builder, category, media, source_url);
        let output = json!({
            "title": listing.title,
            "slug": listing.slug,
            "status": listing.status,
            "min_price": listing.min_price,
            "max_price": listing.max_price,
            "feature_groups": listing.features.len(),
            "faq_count": listing.faqs.len(),
            "accommodation_rows": listing.accommodation.len(),
        });
        Ok(StageOutcome::new(listing, output))
    }

    pub async fn persist_draft(
        listing: &DraftListing,
        catalog: &dyn CatalogStore,
    ) -> Result<StageOutcome<String>, PipelineError> {
        let project_id = catalog
            .create_listing_draft(listing)
            .await
            .map_err(|err| PipelineError::persistence("persist_draft", err.to_string()))?;
        info!(
            target = "estate.catalog",
            project_id = %project_id,
            slug = %listing.slug,
            "draft_listing_created"
        );
        let output = json!({
            "project_id": project_id,
            "available": listing.available,
        });
        Ok(StageOutcome::new(project_id, output))
    }

    fn resolve_error(stage: &'static str, err: ResolveError) -> PipelineError {
        PipelineError::persistence(stage, err.to_string())
    }
}
