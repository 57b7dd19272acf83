//! The stage orchestrator: owns every live pipeline run and executes
//! the fan-out batches against the upstream services.
//!
//! Each run lives behind its own mutex; fan-out batches capture their
//! inputs under the lock, run the sequential per-key loop without it,
//! and write results back at the end, so snapshot reads stay cheap
//! while a batch is in flight. One batch at a time per run, enforced
//! by a processing flag.
//!
//! Failure isolation is per combination: a failed key records an empty
//! cell (model generation, which has no source image) or a single
//! fallback variant carrying the source image and the error (try-on,
//! background, tagging). Only a batch with zero successes fails the
//! stage.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use lookbook_clients::{
    BackgroundRequest, JobError, ModelGenerationRequest, TaggingRequest, TryOnRequest,
};
use lookbook_core::error::CoreError;
use lookbook_core::garment::GarmentInfo;
use lookbook_core::normalize::UrlPolicy;
use lookbook_core::settings::{
    BackgroundParameters, GenerationSettings, TaggingParameters, TryOnParameters,
};
use lookbook_core::stage::Stage;
use lookbook_core::types::{CombinationKey, Variant};

use crate::error::PipelineError;
use crate::run::{PipelineRun, RunSnapshot, TagOutcome};
use crate::services::Services;

// ---------------------------------------------------------------------------
// RunHandle
// ---------------------------------------------------------------------------

/// One live run: its state plus batch bookkeeping that must stay
/// readable while the state lock is held by a writer.
struct RunHandle {
    state: Mutex<PipelineRun>,
    processing: AtomicBool,
    /// Progress of the batch in flight, as f64 bits.
    progress: AtomicU64,
}

impl RunHandle {
    fn new(run: PipelineRun) -> Self {
        Self {
            state: Mutex::new(run),
            processing: AtomicBool::new(false),
            progress: AtomicU64::new(0),
        }
    }

    /// Claim the processing flag for a batch.
    fn begin(&self) -> Result<(), PipelineError> {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::Busy)?;
        self.set_progress(0.0);
        Ok(())
    }

    fn finish(&self) {
        self.processing.store(false, Ordering::Release);
    }

    fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Reject state mutations while a batch is in flight.
    fn ensure_idle(&self) -> Result<(), PipelineError> {
        if self.is_processing() {
            Err(PipelineError::Busy)
        } else {
            Ok(())
        }
    }

    fn set_progress(&self, value: f64) {
        self.progress.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Progress sink for one slot of an N-slot batch. Each job reports
    /// its own 0-100 estimate; scaling it into the slot keeps the
    /// run-level value monotone across keys.
    fn slot_sink(&self, slot: usize, slots: usize) -> impl Fn(f64) + Send + Sync + '_ {
        let slots = slots.max(1) as f64;
        let slot = slot as f64;
        move |p: f64| self.set_progress((slot + p / 100.0) / slots * 100.0)
    }

    fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// StageOrchestrator
// ---------------------------------------------------------------------------

pub struct StageOrchestrator {
    runs: RwLock<HashMap<Uuid, Arc<RunHandle>>>,
    services: Services,
    url_policy: UrlPolicy,
}

impl StageOrchestrator {
    pub fn new(services: Services, url_policy: UrlPolicy) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            services,
            url_policy,
        }
    }

    async fn handle(&self, id: Uuid) -> Result<Arc<RunHandle>, PipelineError> {
        self.runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(PipelineError::RunNotFound(id))
    }

    async fn snapshot_of(handle: &RunHandle) -> RunSnapshot {
        RunSnapshot {
            run: handle.state.lock().await.clone(),
            is_processing: handle.is_processing(),
            progress: handle.progress(),
        }
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Create a run at the upload stage. `try_on_seed` seeds the
    /// try-on parameters; the caller decides whether it is random.
    pub async fn create_run(&self, garment: GarmentInfo, try_on_seed: u32) -> RunSnapshot {
        let run = PipelineRun::new(garment, try_on_seed);
        let id = run.id;
        let handle = Arc::new(RunHandle::new(run));
        self.runs.write().await.insert(id, handle.clone());
        tracing::info!(run_id = %id, "pipeline run created");
        Self::snapshot_of(&handle).await
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        Ok(Self::snapshot_of(&handle).await)
    }

    /// Replace the garment. Only valid on the upload stage (reachable
    /// again through back-navigation).
    pub async fn update_garment(
        &self,
        id: Uuid,
        garment: GarmentInfo,
    ) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        handle.ensure_idle()?;
        {
            let mut run = handle.state.lock().await;
            if run.stage != Stage::UploadGarment {
                return Err(PipelineError::WrongStage(
                    "The garment can only be edited on the upload stage".to_string(),
                ));
            }
            run.garment = garment;
            run.error = None;
        }
        Ok(Self::snapshot_of(&handle).await)
    }

    // -- Navigation --------------------------------------------------------

    pub async fn advance(&self, id: Uuid) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        handle.ensure_idle()?;
        handle.state.lock().await.advance()?;
        Ok(Self::snapshot_of(&handle).await)
    }

    pub async fn retreat(&self, id: Uuid) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        handle.ensure_idle()?;
        handle.state.lock().await.retreat()?;
        Ok(Self::snapshot_of(&handle).await)
    }

    /// Record a selection on the given selection stage.
    pub async fn select(
        &self,
        id: Uuid,
        stage: Stage,
        key: CombinationKey,
        image_url: String,
    ) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        handle.ensure_idle()?;
        {
            let mut run = handle.state.lock().await;
            if run.stage != stage {
                return Err(PipelineError::WrongStage(format!(
                    "Selection for {} is not open on the {} stage",
                    stage.title(),
                    run.stage.title()
                )));
            }
            let grid = run.grid_for_mut(stage).ok_or_else(|| {
                PipelineError::WrongStage(format!("{} is not a selection stage", stage.title()))
            })?;
            grid.select(key, image_url);
        }
        Ok(Self::snapshot_of(&handle).await)
    }

    // -- Model generation --------------------------------------------------

    /// Stage-1 fan-out: for each of the 9 combinations, request
    /// `num_variations` single-image generations. Failed keys record
    /// empty cells; any success advances to selection.
    pub async fn generate_models(
        &self,
        id: Uuid,
        settings: GenerationSettings,
    ) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        let garment = {
            let mut run = handle.state.lock().await;
            Self::expect_stage(&run, Stage::GenerateModels)?;
            run.garment.validate_ready()?;
            settings.validate()?;
            run.generation_settings = settings.clone();
            run.error = None;
            run.garment.clone()
        };
        handle.begin()?;
        let result = self.model_batch(&handle, &settings, &garment).await;
        handle.finish();
        result?;
        Ok(Self::snapshot_of(&handle).await)
    }

    async fn model_batch(
        &self,
        handle: &RunHandle,
        settings: &GenerationSettings,
        garment: &GarmentInfo,
    ) -> Result<(), PipelineError> {
        let keys = CombinationKey::grid();
        let total = keys.len();
        let variations = settings.num_variations.max(1) as usize;
        let slots = total * variations;
        let mut updates: Vec<(CombinationKey, Vec<Variant>)> = Vec::with_capacity(total);
        let mut pending: BTreeMap<CombinationKey, String> = BTreeMap::new();
        let mut last_error: Option<String> = None;

        for (index, key) in keys.iter().enumerate() {
            handle.set_progress((index * variations) as f64 / slots as f64 * 100.0);
            let request = ModelGenerationRequest::for_combination(settings, garment, *key);
            let mut urls: Vec<String> = Vec::new();
            for variation in 0..settings.num_variations {
                let sink = handle.slot_sink(index * variations + variation as usize, slots);
                match self
                    .services
                    .model_generation
                    .generate(&request, &sink)
                    .await
                {
                    Ok(images) => match images.into_iter().next() {
                        Some(first) => urls.push(first),
                        None => {
                            tracing::warn!(%key, variation, "generation returned no images");
                        }
                    },
                    Err(JobError::Timeout { job_id }) => {
                        tracing::warn!(%key, job_id, "model generation timed out, resumable");
                        pending.insert(*key, job_id);
                        last_error =
                            Some(format!("Generation for {} timed out", key.label()));
                        break;
                    }
                    Err(err) => {
                        tracing::error!(%key, error = %err, "model generation failed");
                        last_error = Some(format!(
                            "Failed to generate {} models: {err}",
                            key.label()
                        ));
                        break;
                    }
                }
            }
            let canonical = self.url_policy.canonicalize_all(&urls);
            updates.push((
                *key,
                canonical
                    .into_iter()
                    .map(|url| Variant::new(url, *key))
                    .collect(),
            ));
        }

        let mut run = handle.state.lock().await;
        for (key, variants) in updates {
            run.models.add_variants(key, variants);
        }
        run.pending_model_jobs = pending;
        if run.models.all_empty() {
            let message = last_error.unwrap_or_else(|| "No models were generated".to_string());
            run.error = Some(message.clone());
            return Err(PipelineError::BatchFailed(message));
        }
        run.error = last_error;
        run.stage = Stage::SelectModels;
        handle.set_progress(100.0);
        Ok(())
    }

    /// Shortcut: populate every combination with the given example
    /// URLs, exactly as a successful generation would, and advance.
    pub async fn load_example_models(
        &self,
        id: Uuid,
        urls: Vec<String>,
    ) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        handle.ensure_idle()?;
        {
            let mut run = handle.state.lock().await;
            Self::expect_stage(&run, Stage::GenerateModels)?;
            if urls.is_empty() {
                return Err(CoreError::Validation(
                    "At least one example image URL is required".to_string(),
                )
                .into());
            }
            let canonical = self.url_policy.canonicalize_all(&urls);
            for key in CombinationKey::grid() {
                let variants = canonical
                    .iter()
                    .map(|url| Variant::new(url.clone(), key))
                    .collect();
                run.models.add_variants(key, variants);
            }
            run.pending_model_jobs.clear();
            run.error = None;
            run.stage = Stage::SelectModels;
        }
        handle.set_progress(100.0);
        Ok(Self::snapshot_of(&handle).await)
    }

    /// Keep waiting on model generation jobs that timed out, one more
    /// polling budget each.
    pub async fn resume_models(&self, id: Uuid) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        let pending = {
            let run = handle.state.lock().await;
            // A partially successful batch has already advanced to
            // selection; resuming is legal from either stage.
            if run.stage != Stage::GenerateModels && run.stage != Stage::SelectModels {
                return Err(PipelineError::WrongStage(format!(
                    "This operation requires the {} stage (currently {})",
                    Stage::GenerateModels.title(),
                    run.stage.title()
                )));
            }
            if run.pending_model_jobs.is_empty() {
                return Err(CoreError::Guard(
                    "No timed-out generation jobs to resume".to_string(),
                )
                .into());
            }
            run.pending_model_jobs.clone()
        };
        handle.begin()?;
        let result = self.resume_batch(&handle, pending).await;
        handle.finish();
        result?;
        Ok(Self::snapshot_of(&handle).await)
    }

    async fn resume_batch(
        &self,
        handle: &RunHandle,
        pending: BTreeMap<CombinationKey, String>,
    ) -> Result<(), PipelineError> {
        let total = pending.len();
        let mut updates: Vec<(CombinationKey, Vec<Variant>)> = Vec::new();
        let mut still_pending: BTreeMap<CombinationKey, String> = BTreeMap::new();
        let mut last_error: Option<String> = None;

        for (index, (key, job_id)) in pending.into_iter().enumerate() {
            handle.set_progress(index as f64 / total as f64 * 100.0);
            let sink = handle.slot_sink(index, total);
            match self.services.model_generation.resume(&job_id, &sink).await {
                Ok(urls) => {
                    let canonical = self.url_policy.canonicalize_all(&urls);
                    updates.push((
                        key,
                        canonical
                            .into_iter()
                            .map(|url| Variant::new(url, key))
                            .collect(),
                    ));
                }
                Err(JobError::Timeout { job_id }) => {
                    tracing::warn!(%key, job_id, "resumed job timed out again");
                    still_pending.insert(key, job_id);
                    last_error = Some(format!("Generation for {} timed out", key.label()));
                }
                Err(err) => {
                    tracing::error!(%key, error = %err, "resumed job failed");
                    last_error =
                        Some(format!("Failed to generate {} models: {err}", key.label()));
                }
            }
        }

        let mut run = handle.state.lock().await;
        for (key, variants) in updates {
            run.models.add_variants(key, variants);
        }
        run.pending_model_jobs = still_pending;
        run.error = last_error;
        if !run.models.all_empty() {
            run.stage = Stage::SelectModels;
        }
        handle.set_progress(100.0);
        Ok(())
    }

    // -- Try-on ------------------------------------------------------------

    /// Stage-3 fan-out: apply the garment to every selected model. A
    /// failed key records one fallback variant with the source model
    /// image and the error.
    pub async fn run_try_on(
        &self,
        id: Uuid,
        parameters: Option<TryOnParameters>,
    ) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        let (garment, gender, params, selections) = {
            let mut run = handle.state.lock().await;
            Self::expect_stage(&run, Stage::TryOn)?;
            if let Some(params) = parameters {
                params.validate()?;
                run.try_on_parameters = params;
            }
            run.garment.validate_ready()?;
            let selections: Vec<(CombinationKey, String)> = run
                .models
                .selections()
                .map(|(key, url)| (key, url.to_string()))
                .collect();
            if selections.is_empty() {
                return Err(CoreError::Guard(
                    "No models selected for try-on".to_string(),
                )
                .into());
            }
            run.error = None;
            (
                run.garment.clone(),
                run.generation_settings.gender.clone(),
                run.try_on_parameters.clone(),
                selections,
            )
        };
        handle.begin()?;
        let result = self
            .try_on_batch(&handle, &garment, gender, params, selections)
            .await;
        handle.finish();
        result?;
        Ok(Self::snapshot_of(&handle).await)
    }

    async fn try_on_batch(
        &self,
        handle: &RunHandle,
        garment: &GarmentInfo,
        gender: String,
        params: TryOnParameters,
        selections: Vec<(CombinationKey, String)>,
    ) -> Result<(), PipelineError> {
        let clothing_remote = self.url_policy.to_remote(garment.image_url()?);
        let total = selections.len();
        let mut updates: Vec<(CombinationKey, Vec<Variant>)> = Vec::with_capacity(total);
        let mut successes = 0usize;
        let mut last_error: Option<String> = None;

        for (index, (key, model_url)) in selections.into_iter().enumerate() {
            handle.set_progress(index as f64 / total as f64 * 100.0);
            let sink = handle.slot_sink(index, total);
            let request = TryOnRequest {
                model_image_url: self.url_policy.to_remote(&model_url),
                clothing_image_url: clothing_remote.clone(),
                clothing_type: garment.wear_type.as_str().to_string(),
                gender: gender.clone(),
                parameters: params.clone(),
            };
            match self.services.try_on.try_on(&request, &sink).await {
                Ok(urls) if !urls.is_empty() => {
                    successes += 1;
                    let canonical = self.url_policy.canonicalize_all(&urls);
                    updates.push((
                        key,
                        canonical
                            .into_iter()
                            .map(|url| Variant::new(url, key))
                            .collect(),
                    ));
                }
                Ok(_) => {
                    tracing::warn!(%key, "try-on returned no images");
                    last_error = Some(format!("Try-on for {} returned no images", key.label()));
                    updates.push((
                        key,
                        vec![Variant::fallback(
                            model_url,
                            key,
                            "Try-on returned no images",
                        )],
                    ));
                }
                Err(err) => {
                    tracing::error!(%key, error = %err, "try-on failed");
                    last_error = Some(format!("Try-on for {} failed: {err}", key.label()));
                    updates.push((key, vec![Variant::fallback(model_url, key, err.to_string())]));
                }
            }
        }

        let mut run = handle.state.lock().await;
        for (key, variants) in updates {
            run.try_on.add_variants(key, variants);
        }
        if successes == 0 {
            let message =
                last_error.unwrap_or_else(|| "No try-on results were generated".to_string());
            run.error = Some(message.clone());
            return Err(PipelineError::BatchFailed(message));
        }
        run.error = last_error;
        run.stage = Stage::SelectTryOn;
        handle.set_progress(100.0);
        Ok(())
    }

    // -- Background --------------------------------------------------------

    /// Stage-5 fan-out: replace the background behind every selected
    /// try-on result. Source images are repaired to public URLs first.
    pub async fn run_background(
        &self,
        id: Uuid,
        parameters: BackgroundParameters,
    ) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        let selections = {
            let mut run = handle.state.lock().await;
            Self::expect_stage(&run, Stage::GenerateBackground)?;
            parameters.validate()?;
            run.background_parameters = parameters.clone();
            let selections: Vec<(CombinationKey, String)> = run
                .try_on
                .selections()
                .map(|(key, url)| (key, url.to_string()))
                .collect();
            if selections.is_empty() {
                return Err(CoreError::Guard(
                    "No try-on results selected for background generation".to_string(),
                )
                .into());
            }
            run.error = None;
            selections
        };
        handle.begin()?;
        let result = self.background_batch(&handle, parameters, selections).await;
        handle.finish();
        result?;
        Ok(Self::snapshot_of(&handle).await)
    }

    async fn background_batch(
        &self,
        handle: &RunHandle,
        params: BackgroundParameters,
        selections: Vec<(CombinationKey, String)>,
    ) -> Result<(), PipelineError> {
        let total = selections.len();
        let mut updates: Vec<(CombinationKey, Vec<Variant>)> = Vec::with_capacity(total);
        let mut successes = 0usize;
        let mut last_error: Option<String> = None;

        for (index, (key, source_url)) in selections.into_iter().enumerate() {
            handle.set_progress(index as f64 / total as f64 * 100.0);
            let result = self
                .background_for_key(&key, &source_url, &params)
                .await;
            match result {
                Ok(urls) if !urls.is_empty() => {
                    successes += 1;
                    updates.push((
                        key,
                        urls.into_iter().map(|url| Variant::new(url, key)).collect(),
                    ));
                }
                Ok(_) => {
                    tracing::warn!(%key, "background generation returned no results");
                    last_error = Some(format!(
                        "No background variations generated for {}",
                        key.label()
                    ));
                    updates.push((
                        key,
                        vec![Variant::fallback(
                            source_url,
                            key,
                            "No background variations generated",
                        )],
                    ));
                }
                Err(err) => {
                    tracing::error!(%key, error = %err, "background generation failed");
                    last_error = Some(format!(
                        "Background generation for {} failed: {err}",
                        key.label()
                    ));
                    updates.push((
                        key,
                        vec![Variant::fallback(source_url, key, err.to_string())],
                    ));
                }
            }
        }

        let mut run = handle.state.lock().await;
        for (key, variants) in updates {
            run.backgrounds.add_variants(key, variants);
        }
        if successes == 0 {
            let message =
                last_error.unwrap_or_else(|| "No backgrounds were generated".to_string());
            run.error = Some(message.clone());
            return Err(PipelineError::BatchFailed(message));
        }
        run.error = last_error;
        run.stage = Stage::SelectBackground;
        handle.set_progress(100.0);
        Ok(())
    }

    /// Repair the source to a public URL, then generate; canonical
    /// URLs out.
    async fn background_for_key(
        &self,
        key: &CombinationKey,
        source_url: &str,
        params: &BackgroundParameters,
    ) -> Result<Vec<String>, JobError> {
        let public_url = self
            .services
            .upload
            .ensure_public_url(source_url, &format!("bg-source-{key}"))
            .await?;
        let request = BackgroundRequest::new(public_url, params);
        let urls = self.services.background.generate(&request).await?;
        Ok(self.url_policy.canonicalize_all(&urls))
    }

    // -- Tagging -----------------------------------------------------------

    /// Stage-7 fan-out: run retail tagging over every selected
    /// background image. Per-key failures are recorded as outcomes and
    /// the run still reaches review.
    pub async fn run_tagging(
        &self,
        id: Uuid,
        parameters: Option<TaggingParameters>,
    ) -> Result<RunSnapshot, PipelineError> {
        let handle = self.handle(id).await?;
        let (params, selections) = {
            let mut run = handle.state.lock().await;
            Self::expect_stage(&run, Stage::TagImages)?;
            if let Some(params) = parameters {
                run.tagging_parameters = params;
            }
            let selections: Vec<(CombinationKey, String)> = run
                .backgrounds
                .selections()
                .map(|(key, url)| (key, url.to_string()))
                .collect();
            if selections.is_empty() {
                return Err(CoreError::Guard(
                    "No background images selected for tagging".to_string(),
                )
                .into());
            }
            run.error = None;
            (run.tagging_parameters.clone(), selections)
        };
        handle.begin()?;
        let result = self.tagging_batch(&handle, params, selections).await;
        handle.finish();
        result?;
        Ok(Self::snapshot_of(&handle).await)
    }

    async fn tagging_batch(
        &self,
        handle: &RunHandle,
        params: TaggingParameters,
        selections: Vec<(CombinationKey, String)>,
    ) -> Result<(), PipelineError> {
        let total = selections.len();
        let mut outcomes: BTreeMap<CombinationKey, TagOutcome> = BTreeMap::new();
        let mut successes = 0usize;

        for (index, (key, source_url)) in selections.into_iter().enumerate() {
            handle.set_progress(index as f64 / total as f64 * 100.0);
            match self.tag_for_key(&key, &source_url, &params).await {
                Ok(outcome) => {
                    successes += 1;
                    outcomes.insert(key, outcome);
                }
                Err(err) => {
                    tracing::error!(%key, error = %err, "tagging failed");
                    outcomes.insert(
                        key,
                        TagOutcome {
                            image_url: source_url,
                            success: false,
                            analysis: None,
                            visualization: None,
                            error: Some(err.to_string()),
                        },
                    );
                }
            }
        }

        let mut run = handle.state.lock().await;
        run.tagging = outcomes;
        run.tagging_attempted = true;
        if successes == 0 {
            run.error = Some("No images were tagged successfully".to_string());
        }
        // Failures stay visible on review; the stage advances either way.
        run.stage = Stage::Review;
        handle.set_progress(100.0);
        Ok(())
    }

    async fn tag_for_key(
        &self,
        key: &CombinationKey,
        source_url: &str,
        params: &TaggingParameters,
    ) -> Result<TagOutcome, JobError> {
        let public_url = self
            .services
            .upload
            .ensure_public_url(source_url, &format!("tag-source-{key}"))
            .await?;
        let request = TaggingRequest {
            image_url: public_url.clone(),
            model: params.model.clone(),
        };
        let analysis = self.services.tagging.tag(&request).await?;
        Ok(TagOutcome {
            image_url: public_url,
            success: true,
            analysis: analysis.analysis,
            visualization: analysis.visualization,
            error: None,
        })
    }

    // -- Helpers -----------------------------------------------------------

    fn expect_stage(run: &PipelineRun, expected: Stage) -> Result<(), PipelineError> {
        if run.stage == expected {
            Ok(())
        } else {
            Err(PipelineError::WrongStage(format!(
                "This operation requires the {} stage (currently {})",
                expected.title(),
                run.stage.title()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    use lookbook_clients::job::ProgressSink;
    use lookbook_clients::{
        BackgroundService, ModelGenerationService, TagAnalysis, TaggingService, TryOnService,
        UploadService,
    };
    use lookbook_core::garment::{ModelType, WearType};
    use lookbook_core::normalize;

    // -- Mock services --

    #[derive(Default)]
    struct MockModelGen {
        counter: AtomicUsize,
        /// Fail requests whose prompt contains this fragment.
        fail_matching: Option<String>,
        /// Time out requests whose prompt contains this fragment.
        timeout_matching: Option<String>,
    }

    #[async_trait]
    impl ModelGenerationService for MockModelGen {
        async fn generate(
            &self,
            request: &ModelGenerationRequest,
            on_progress: ProgressSink<'_>,
        ) -> Result<Vec<String>, JobError> {
            on_progress(50.0);
            if let Some(fragment) = &self.fail_matching {
                if request.prompt.contains(fragment) {
                    return Err(JobError::Upstream("synthetic failure".to_string()));
                }
            }
            if let Some(fragment) = &self.timeout_matching {
                if request.prompt.contains(fragment) {
                    return Err(JobError::Timeout {
                        job_id: format!("job-{}", self.counter.fetch_add(1, Ordering::SeqCst)),
                    });
                }
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![format!("http://mock/model-{n}.png")])
        }

        async fn resume(
            &self,
            job_id: &str,
            _on_progress: ProgressSink<'_>,
        ) -> Result<Vec<String>, JobError> {
            Ok(vec![format!("http://mock/resumed-{job_id}.png")])
        }
    }

    #[derive(Default)]
    struct MockTryOn {
        counter: AtomicUsize,
        /// Fail the first N calls.
        fail_first: usize,
    }

    #[async_trait]
    impl TryOnService for MockTryOn {
        async fn try_on(
            &self,
            _request: &TryOnRequest,
            _on_progress: ProgressSink<'_>,
        ) -> Result<Vec<String>, JobError> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(JobError::Upstream("provider rejected".to_string()));
            }
            Ok(vec![
                format!("http://mock/tryon-{n}-a.png"),
                format!("http://mock/tryon-{n}-b.png"),
            ])
        }
    }

    #[derive(Default)]
    struct MockBackground {
        counter: AtomicUsize,
    }

    #[async_trait]
    impl BackgroundService for MockBackground {
        async fn generate(&self, request: &BackgroundRequest) -> Result<Vec<String>, JobError> {
            // The orchestrator must hand over repaired public URLs.
            assert!(request.image_url.starts_with("https://public/"));
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![format!("http://mock/bg-{n}.png")])
        }
    }

    #[derive(Default)]
    struct MockTagging {
        fail: bool,
    }

    #[async_trait]
    impl TaggingService for MockTagging {
        async fn tag(&self, request: &TaggingRequest) -> Result<TagAnalysis, JobError> {
            if self.fail {
                return Err(JobError::Upstream("no garment found".to_string()));
            }
            Ok(TagAnalysis {
                success: true,
                analysis: Some(json!({"caption": format!("tagged {}", request.image_url)})),
                visualization: None,
                error: None,
            })
        }
    }

    struct MockUpload;

    #[async_trait]
    impl UploadService for MockUpload {
        async fn ensure_public_url(&self, url: &str, name: &str) -> Result<String, JobError> {
            if normalize::needs_public_url(url) {
                Ok(format!("https://public/{name}.png"))
            } else {
                Ok(url.to_string())
            }
        }
    }

    fn services(
        model_generation: MockModelGen,
        try_on: MockTryOn,
        tagging: MockTagging,
    ) -> Services {
        Services {
            model_generation: Arc::new(model_generation),
            try_on: Arc::new(try_on),
            background: Arc::new(MockBackground::default()),
            tagging: Arc::new(tagging),
            upload: Arc::new(MockUpload),
        }
    }

    fn orchestrator(services: Services) -> StageOrchestrator {
        StageOrchestrator::new(services, UrlPolicy::new("http://localhost:8000"))
    }

    fn ready_garment() -> GarmentInfo {
        GarmentInfo {
            image_url: Some("https://example.com/dress.png".to_string()),
            model_type: ModelType::FullBody,
            wear_type: WearType::LongDress,
            name: "dress".to_string(),
        }
    }

    fn settings() -> GenerationSettings {
        GenerationSettings {
            prompt: "studio model".to_string(),
            num_variations: 2,
            ..Default::default()
        }
    }

    /// Select the first variant of every populated key on the given
    /// selection stage.
    async fn select_all(
        orch: &StageOrchestrator,
        id: Uuid,
        stage: Stage,
        pick: impl Fn(&RunSnapshot, &CombinationKey) -> Option<String>,
    ) {
        let snapshot = orch.snapshot(id).await.unwrap();
        for key in CombinationKey::grid() {
            if let Some(url) = pick(&snapshot, &key) {
                orch.select(id, stage, key, url).await.unwrap();
            }
        }
    }

    fn first_model_url(snapshot: &RunSnapshot, key: &CombinationKey) -> Option<String> {
        snapshot
            .run
            .models
            .variants(key)
            .and_then(|v| v.first())
            .map(|v| v.image_url.clone())
    }

    // -- Progress --

    #[test]
    fn job_progress_lands_in_its_batch_slot() {
        let handle = RunHandle::new(PipelineRun::new(GarmentInfo::default(), 1));
        // Slot 4 of 9, job half done: the run-level value sits
        // mid-slot instead of jumping to the job's own 50%.
        let sink = handle.slot_sink(4, 9);
        sink(50.0);
        assert!((handle.progress() - 50.0).abs() < 1e-9);
        // An early report from the next slot stays past the previous
        // slot's end, so the run-level value never moves backwards
        // between keys.
        let sink = handle.slot_sink(5, 9);
        sink(10.0);
        assert!(handle.progress() > 5.0 / 9.0 * 100.0 - 1e-9);
        assert!(handle.progress() < 6.0 / 9.0 * 100.0);
    }

    // -- End to end --

    #[tokio::test]
    async fn full_pipeline_reaches_review() {
        let orch = orchestrator(services(
            MockModelGen::default(),
            MockTryOn::default(),
            MockTagging::default(),
        ));
        let id = orch.create_run(ready_garment(), 42).await.run.id;

        orch.advance(id).await.unwrap();
        let snapshot = orch.generate_models(id, settings()).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::SelectModels);
        assert_eq!(snapshot.run.models.total_variant_count(), 18);
        // Every stored URL is canonical.
        let key = CombinationKey::grid()[0];
        let first = &snapshot.run.models.variants(&key).unwrap()[0];
        assert!(first.image_url.starts_with("/api/proxy?url="));

        select_all(&orch, id, Stage::SelectModels, first_model_url).await;
        orch.advance(id).await.unwrap();

        let snapshot = orch.run_try_on(id, None).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::SelectTryOn);
        assert_eq!(snapshot.run.try_on.selectable_keys().len(), 9);

        select_all(&orch, id, Stage::SelectTryOn, |s, k| {
            s.run.try_on.variants(k).and_then(|v| v.first()).map(|v| v.image_url.clone())
        })
        .await;
        orch.advance(id).await.unwrap();

        let params = BackgroundParameters {
            prompt: "sunlit studio".to_string(),
            ..Default::default()
        };
        let snapshot = orch.run_background(id, params).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::SelectBackground);

        select_all(&orch, id, Stage::SelectBackground, |s, k| {
            s.run.backgrounds.variants(k).and_then(|v| v.first()).map(|v| v.image_url.clone())
        })
        .await;
        orch.advance(id).await.unwrap();

        let snapshot = orch.run_tagging(id, None).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::Review);
        assert_eq!(snapshot.run.tagging.len(), 9);
        assert!(snapshot.run.tagging.values().all(|o| o.success));
        assert!(!snapshot.is_processing);
        assert_eq!(snapshot.progress, 100.0);
    }

    #[tokio::test]
    async fn one_failed_key_still_reaches_selection() {
        let orch = orchestrator(services(
            MockModelGen {
                fail_matching: Some("plus-size body, dark skin".to_string()),
                ..Default::default()
            },
            MockTryOn::default(),
            MockTagging::default(),
        ));
        let id = orch.create_run(ready_garment(), 42).await.run.id;
        orch.advance(id).await.unwrap();

        let snapshot = orch.generate_models(id, settings()).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::SelectModels);
        // 8 keys populated, the failed key holds an empty cell.
        assert_eq!(snapshot.run.models.selectable_keys().len(), 8);
        let failed: CombinationKey = "plus-size-dark".parse().unwrap();
        assert_eq!(snapshot.run.models.variants(&failed).unwrap().len(), 0);
        assert!(snapshot.run.error.as_deref().unwrap().contains("Plus-size, dark skin"));
    }

    #[tokio::test]
    async fn total_failure_keeps_the_stage() {
        let orch = orchestrator(services(
            MockModelGen {
                // The empty fragment matches every prompt.
                fail_matching: Some(String::new()),
                ..Default::default()
            },
            MockTryOn::default(),
            MockTagging::default(),
        ));
        let id = orch.create_run(ready_garment(), 42).await.run.id;
        orch.advance(id).await.unwrap();

        let err = orch.generate_models(id, settings()).await.unwrap_err();
        assert_matches!(err, PipelineError::BatchFailed(_));
        let snapshot = orch.snapshot(id).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::GenerateModels);
        assert!(snapshot.run.error.is_some());
        // The stage may be re-run after a total failure.
        assert!(!snapshot.is_processing);
    }

    #[tokio::test]
    async fn timed_out_jobs_are_resumable() {
        let orch = orchestrator(services(
            MockModelGen {
                timeout_matching: Some(String::new()),
                ..Default::default()
            },
            MockTryOn::default(),
            MockTagging::default(),
        ));
        let id = orch.create_run(ready_garment(), 42).await.run.id;
        orch.advance(id).await.unwrap();

        let err = orch.generate_models(id, settings()).await.unwrap_err();
        assert_matches!(err, PipelineError::BatchFailed(_));
        let snapshot = orch.snapshot(id).await.unwrap();
        assert_eq!(snapshot.run.pending_model_jobs.len(), 9);

        let snapshot = orch.resume_models(id).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::SelectModels);
        assert!(snapshot.run.pending_model_jobs.is_empty());
        assert_eq!(snapshot.run.models.selectable_keys().len(), 9);
    }

    #[tokio::test]
    async fn example_models_populate_the_whole_grid() {
        let orch = orchestrator(services(
            MockModelGen::default(),
            MockTryOn::default(),
            MockTagging::default(),
        ));
        let id = orch.create_run(ready_garment(), 42).await.run.id;
        orch.advance(id).await.unwrap();

        let urls = vec![
            "https://example.com/a.jpg".to_string(),
            "https://example.com/b.jpg".to_string(),
        ];
        let snapshot = orch.load_example_models(id, urls).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::SelectModels);
        assert_eq!(snapshot.run.models.total_variant_count(), 18);
        for key in CombinationKey::grid() {
            let cell = snapshot.run.models.variants(&key).unwrap();
            assert!(cell[0].image_url.starts_with("/api/proxy?url="));
        }
    }

    #[tokio::test]
    async fn failed_try_on_key_gets_a_fallback_variant() {
        let orch = orchestrator(services(
            MockModelGen::default(),
            MockTryOn {
                fail_first: 1,
                ..Default::default()
            },
            MockTagging::default(),
        ));
        let id = orch.create_run(ready_garment(), 42).await.run.id;
        orch.advance(id).await.unwrap();
        orch.generate_models(id, settings()).await.unwrap();
        select_all(&orch, id, Stage::SelectModels, first_model_url).await;
        orch.advance(id).await.unwrap();

        let snapshot = orch.run_try_on(id, None).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::SelectTryOn);

        let fallbacks: Vec<&Variant> = CombinationKey::grid()
            .iter()
            .filter_map(|k| snapshot.run.try_on.variants(k))
            .flatten()
            .filter(|v| v.error.is_some())
            .collect();
        assert_eq!(fallbacks.len(), 1);
        // The fallback shows the selected model image, not a result.
        assert!(fallbacks[0].image_url.starts_with("/api/proxy?url="));
        assert!(snapshot.run.error.as_deref().unwrap().contains("provider rejected"));
    }

    #[tokio::test]
    async fn tagging_failures_still_reach_review() {
        let orch = orchestrator(services(
            MockModelGen::default(),
            MockTryOn::default(),
            MockTagging { fail: true },
        ));
        let id = orch.create_run(ready_garment(), 42).await.run.id;
        orch.advance(id).await.unwrap();
        orch.generate_models(id, settings()).await.unwrap();
        select_all(&orch, id, Stage::SelectModels, first_model_url).await;
        orch.advance(id).await.unwrap();
        orch.run_try_on(id, None).await.unwrap();
        select_all(&orch, id, Stage::SelectTryOn, |s, k| {
            s.run.try_on.variants(k).and_then(|v| v.first()).map(|v| v.image_url.clone())
        })
        .await;
        orch.advance(id).await.unwrap();
        let params = BackgroundParameters {
            prompt: "sunlit studio".to_string(),
            ..Default::default()
        };
        orch.run_background(id, params).await.unwrap();
        select_all(&orch, id, Stage::SelectBackground, |s, k| {
            s.run.backgrounds.variants(k).and_then(|v| v.first()).map(|v| v.image_url.clone())
        })
        .await;
        orch.advance(id).await.unwrap();

        let snapshot = orch.run_tagging(id, None).await.unwrap();
        assert_eq!(snapshot.run.stage, Stage::Review);
        assert!(snapshot.run.tagging.values().all(|o| !o.success));
        assert_eq!(
            snapshot.run.error.as_deref(),
            Some("No images were tagged successfully")
        );
    }

    #[tokio::test]
    async fn selection_on_the_wrong_stage_is_rejected() {
        let orch = orchestrator(services(
            MockModelGen::default(),
            MockTryOn::default(),
            MockTagging::default(),
        ));
        let id = orch.create_run(ready_garment(), 42).await.run.id;
        let key = CombinationKey::grid()[0];
        let err = orch
            .select(id, Stage::SelectModels, key, "http://a/1.png".to_string())
            .await
            .unwrap_err();
        assert_matches!(err, PipelineError::WrongStage(_));
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let orch = orchestrator(services(
            MockModelGen::default(),
            MockTryOn::default(),
            MockTagging::default(),
        ));
        let err = orch.snapshot(Uuid::new_v4()).await.unwrap_err();
        assert_matches!(err, PipelineError::RunNotFound(_));
    }
}
