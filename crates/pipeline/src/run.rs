//! The pipeline run aggregate: everything one photoshoot accumulates
//! as it moves through the nine stages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use lookbook_core::error::CoreError;
use lookbook_core::garment::GarmentInfo;
use lookbook_core::settings::{
    BackgroundParameters, GenerationSettings, TaggingParameters, TryOnParameters,
};
use lookbook_core::stage::{self, GuardContext, Stage};
use lookbook_core::types::CombinationKey;
use lookbook_core::variants::VariantGrid;

/// Tagging result for one combination. Failures are recorded, not
/// dropped, so the review stage can show which keys need attention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagOutcome {
    pub image_url: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One photoshoot from garment upload to review.
///
/// The aggregate is only ever mutated behind the orchestrator's run
/// lock; handlers observe it through [`RunSnapshot`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub stage: Stage,
    /// Most recent batch error, soft or hard. Cleared on navigation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub garment: GarmentInfo,
    pub generation_settings: GenerationSettings,
    pub try_on_parameters: TryOnParameters,
    pub background_parameters: BackgroundParameters,
    pub tagging_parameters: TaggingParameters,
    pub models: VariantGrid,
    pub try_on: VariantGrid,
    pub backgrounds: VariantGrid,
    pub tagging: BTreeMap<CombinationKey, TagOutcome>,
    /// True once the tagging fan-out has run, successes or not.
    pub tagging_attempted: bool,
    /// Timed-out model generation jobs, resumable per combination.
    pub pending_model_jobs: BTreeMap<CombinationKey, String>,
}

impl PipelineRun {
    pub fn new(garment: GarmentInfo, try_on_seed: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            stage: Stage::UploadGarment,
            error: None,
            garment,
            generation_settings: GenerationSettings::default(),
            try_on_parameters: TryOnParameters::with_seed(try_on_seed),
            background_parameters: BackgroundParameters::default(),
            tagging_parameters: TaggingParameters::default(),
            models: VariantGrid::new(),
            try_on: VariantGrid::new(),
            backgrounds: VariantGrid::new(),
            tagging: BTreeMap::new(),
            tagging_attempted: false,
            pending_model_jobs: BTreeMap::new(),
        }
    }

    /// The view the stage guards evaluate.
    pub fn guard_context(&self) -> GuardContext<'_> {
        GuardContext {
            garment_ready: self.garment.validate_ready().is_ok(),
            models: &self.models,
            try_on: &self.try_on,
            backgrounds: &self.backgrounds,
            tagging_attempted: self.tagging_attempted,
        }
    }

    /// Advance one stage if the current stage's exit guard passes.
    pub fn advance(&mut self) -> Result<(), CoreError> {
        {
            let ctx = self.guard_context();
            stage::can_advance(self.stage, &ctx)?;
        }
        if let Some(next) = self.stage.next() {
            self.stage = next;
            self.error = None;
        }
        Ok(())
    }

    /// Step back one stage. Always allowed except at the first stage;
    /// never discards accumulated state.
    pub fn retreat(&mut self) -> Result<(), CoreError> {
        match self.stage.previous() {
            Some(previous) => {
                self.stage = previous;
                self.error = None;
                Ok(())
            }
            None => Err(CoreError::Guard("Already at the first stage".to_string())),
        }
    }

    /// The variant grid a selection stage operates on.
    pub fn grid_for_mut(&mut self, stage: Stage) -> Option<&mut VariantGrid> {
        match stage {
            Stage::SelectModels => Some(&mut self.models),
            Stage::SelectTryOn => Some(&mut self.try_on),
            Stage::SelectBackground => Some(&mut self.backgrounds),
            _ => None,
        }
    }
}

/// Read-only view handed to API handlers: the run plus the live
/// processing flag and progress estimate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    #[serde(flatten)]
    pub run: PipelineRun,
    pub is_processing: bool,
    /// 0–100 estimate for the batch in flight, 100 when idle after
    /// success.
    pub progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookbook_core::garment::{ModelType, WearType};
    use lookbook_core::types::Variant;

    fn ready_garment() -> GarmentInfo {
        GarmentInfo {
            image_url: Some("http://example.com/dress.png".to_string()),
            model_type: ModelType::FullBody,
            wear_type: WearType::LongDress,
            name: "dress".to_string(),
        }
    }

    #[test]
    fn fresh_run_starts_at_upload() {
        let mut run = PipelineRun::new(GarmentInfo::default(), 7);
        assert_eq!(run.stage, Stage::UploadGarment);
        assert!(run.advance().is_err(), "empty garment must not advance");
    }

    #[test]
    fn ready_garment_advances_to_generation() {
        let mut run = PipelineRun::new(ready_garment(), 7);
        run.advance().unwrap();
        assert_eq!(run.stage, Stage::GenerateModels);
    }

    #[test]
    fn retreat_keeps_state() {
        let mut run = PipelineRun::new(ready_garment(), 7);
        run.advance().unwrap();
        let key = CombinationKey::grid()[0];
        run.models
            .add_variants(key, vec![Variant::new("http://a/1.png", key)]);
        run.retreat().unwrap();
        assert_eq!(run.stage, Stage::UploadGarment);
        assert_eq!(run.models.total_variant_count(), 1);
        assert!(run.retreat().is_err());
    }

    #[test]
    fn snapshot_flattens_the_run() {
        let run = PipelineRun::new(ready_garment(), 7);
        let snapshot = RunSnapshot {
            run,
            is_processing: false,
            progress: 0.0,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["stage"], "upload-garment");
        assert_eq!(json["isProcessing"], false);
        assert!(json["id"].is_string());
    }
}
