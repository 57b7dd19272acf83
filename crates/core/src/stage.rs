//! The nine-stage photoshoot wizard state machine.
//!
//! Stages alternate between fan-out (generate variants per combination)
//! and fan-in (user selects exactly one variant per combination). The
//! stage index only advances when the *next* stage's entry guard is
//! satisfied; "previous" is always allowed and never discards state.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::CombinationKey;
use crate::variants::VariantGrid;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One step of the wizard, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    UploadGarment,
    GenerateModels,
    SelectModels,
    TryOn,
    SelectTryOn,
    GenerateBackground,
    SelectBackground,
    TagImages,
    Review,
}

impl Stage {
    /// All stages in order.
    pub const ALL: [Stage; 9] = [
        Stage::UploadGarment,
        Stage::GenerateModels,
        Stage::SelectModels,
        Stage::TryOn,
        Stage::SelectTryOn,
        Stage::GenerateBackground,
        Stage::SelectBackground,
        Stage::TagImages,
        Stage::Review,
    ];

    /// Zero-based position in the wizard.
    pub fn index(&self) -> usize {
        Stage::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Stage> {
        Stage::ALL.get(index).copied()
    }

    pub fn next(&self) -> Option<Stage> {
        Stage::from_index(self.index() + 1)
    }

    pub fn previous(&self) -> Option<Stage> {
        self.index().checked_sub(1).and_then(Stage::from_index)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::UploadGarment => "Upload Garment",
            Stage::GenerateModels => "Generate Models",
            Stage::SelectModels => "Select Models",
            Stage::TryOn => "Try-On",
            Stage::SelectTryOn => "Select Try-On",
            Stage::GenerateBackground => "Background",
            Stage::SelectBackground => "Select Background",
            Stage::TagImages => "Tagging",
            Stage::Review => "Review & Save",
        }
    }

    /// Stages that submit generation jobs.
    pub fn is_fan_out(&self) -> bool {
        matches!(
            self,
            Stage::GenerateModels | Stage::TryOn | Stage::GenerateBackground | Stage::TagImages
        )
    }

    /// Stages that block on a per-key user selection.
    pub fn is_selection(&self) -> bool {
        matches!(
            self,
            Stage::SelectModels | Stage::SelectTryOn | Stage::SelectBackground
        )
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Read-only view of the run state that stage guards inspect.
pub struct GuardContext<'a> {
    pub garment_ready: bool,
    pub models: &'a VariantGrid,
    pub try_on: &'a VariantGrid,
    pub backgrounds: &'a VariantGrid,
    /// True once the tagging fan-out has been attempted (success or not).
    pub tagging_attempted: bool,
}

impl GuardContext<'_> {
    /// Keys the try-on and background stages inherit: the model
    /// selections made in SelectModels.
    pub fn inherited_keys(&self) -> Vec<CombinationKey> {
        self.models.selections().map(|(k, _)| k).collect()
    }

    /// Keys the tagging stage inherits: the try-on selections.
    pub fn try_on_keys(&self) -> Vec<CombinationKey> {
        self.try_on.selections().map(|(k, _)| k).collect()
    }
}

/// How far a selection stage is from completion, for "3 of 9 selected"
/// style messaging. `None` for non-selection stages.
pub fn selection_deficit(stage: Stage, ctx: &GuardContext<'_>) -> Option<(usize, usize)> {
    match stage {
        Stage::SelectModels => Some((ctx.models.selection_count(), CombinationKey::grid().len())),
        Stage::SelectTryOn => Some((ctx.try_on.selection_count(), ctx.inherited_keys().len())),
        Stage::SelectBackground => Some((
            ctx.backgrounds.selection_count(),
            ctx.try_on_keys().len(),
        )),
        _ => None,
    }
}

/// Check whether the wizard may advance out of `from`.
///
/// Returns the guard violation as an error so callers can surface the
/// reason directly.
pub fn can_advance(from: Stage, ctx: &GuardContext<'_>) -> Result<(), CoreError> {
    match from {
        Stage::UploadGarment => {
            if ctx.garment_ready {
                Ok(())
            } else {
                Err(CoreError::Guard(
                    "Upload a garment and choose its wear type first".to_string(),
                ))
            }
        }
        Stage::GenerateModels => {
            if ctx.models.all_empty() {
                Err(CoreError::Guard(
                    "Generate models before selecting them".to_string(),
                ))
            } else {
                Ok(())
            }
        }
        Stage::SelectModels => {
            let required = CombinationKey::grid();
            if ctx.models.is_complete(&required) {
                Ok(())
            } else {
                Err(CoreError::Guard(format!(
                    "{} of {} models selected",
                    ctx.models.selection_count(),
                    required.len()
                )))
            }
        }
        Stage::TryOn => {
            if ctx.try_on.all_empty() {
                Err(CoreError::Guard(
                    "Run the try-on process before selecting results".to_string(),
                ))
            } else {
                Ok(())
            }
        }
        Stage::SelectTryOn => {
            let required = ctx.inherited_keys();
            if required.is_empty() {
                return Err(CoreError::Guard("No models were selected".to_string()));
            }
            if ctx.try_on.is_complete(&required) {
                Ok(())
            } else {
                Err(CoreError::Guard(format!(
                    "{} of {} try-on results selected",
                    ctx.try_on.selection_count(),
                    required.len()
                )))
            }
        }
        Stage::GenerateBackground => {
            if ctx.backgrounds.all_empty() {
                Err(CoreError::Guard(
                    "Generate backgrounds before selecting them".to_string(),
                ))
            } else {
                Ok(())
            }
        }
        Stage::SelectBackground => {
            let required = ctx.try_on_keys();
            if required.is_empty() {
                return Err(CoreError::Guard("No try-on results were selected".to_string()));
            }
            if ctx.backgrounds.is_complete(&required) {
                Ok(())
            } else {
                Err(CoreError::Guard(format!(
                    "{} of {} backgrounds selected",
                    ctx.backgrounds.selection_count(),
                    required.len()
                )))
            }
        }
        Stage::TagImages => {
            if ctx.tagging_attempted {
                Ok(())
            } else {
                Err(CoreError::Guard(
                    "Run tagging before reviewing the results".to_string(),
                ))
            }
        }
        Stage::Review => Err(CoreError::Guard("Already at the final stage".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Variant;

    fn populated_grid(keys: &[CombinationKey], select: bool) -> VariantGrid {
        let mut grid = VariantGrid::new();
        for key in keys {
            grid.add_variants(*key, vec![Variant::new("http://a/1.png", *key)]);
            if select {
                grid.select(*key, "http://a/1.png");
            }
        }
        grid
    }

    fn empty_ctx<'a>(
        models: &'a VariantGrid,
        try_on: &'a VariantGrid,
        backgrounds: &'a VariantGrid,
    ) -> GuardContext<'a> {
        GuardContext {
            garment_ready: true,
            models,
            try_on,
            backgrounds,
            tagging_attempted: false,
        }
    }

    // -- Ordering --

    #[test]
    fn stages_are_ordered_and_indexed() {
        assert_eq!(Stage::UploadGarment.index(), 0);
        assert_eq!(Stage::Review.index(), 8);
        assert_eq!(Stage::UploadGarment.next(), Some(Stage::GenerateModels));
        assert_eq!(Stage::Review.next(), None);
        assert_eq!(Stage::UploadGarment.previous(), None);
        assert_eq!(Stage::Review.previous(), Some(Stage::TagImages));
    }

    // -- Guards --

    #[test]
    fn garment_guard_blocks_until_ready() {
        let empty = VariantGrid::new();
        let mut ctx = empty_ctx(&empty, &empty, &empty);
        ctx.garment_ready = false;
        assert!(can_advance(Stage::UploadGarment, &ctx).is_err());
        ctx.garment_ready = true;
        assert!(can_advance(Stage::UploadGarment, &ctx).is_ok());
    }

    #[test]
    fn select_models_requires_all_nine_selections() {
        let all = CombinationKey::grid();
        let mut models = populated_grid(&all, false);
        let empty = VariantGrid::new();
        for key in all.iter().take(8) {
            models.select(*key, "http://a/1.png");
        }
        {
            let ctx = empty_ctx(&models, &empty, &empty);
            let err = can_advance(Stage::SelectModels, &ctx).unwrap_err();
            assert!(err.to_string().contains("8 of 9"));
        }
        models.select(all[8], "http://a/1.png");
        let ctx = empty_ctx(&models, &empty, &empty);
        assert!(can_advance(Stage::SelectModels, &ctx).is_ok());
    }

    #[test]
    fn downstream_cardinality_is_inherited_from_model_selections() {
        let all = CombinationKey::grid();
        // Only 3 models selected; try-on must complete exactly those 3.
        let models = populated_grid(&all[..3], true);
        let try_on = populated_grid(&all[..3], true);
        let empty = VariantGrid::new();
        let ctx = empty_ctx(&models, &try_on, &empty);
        assert_eq!(ctx.inherited_keys().len(), 3);
        assert!(can_advance(Stage::SelectTryOn, &ctx).is_ok());
    }

    #[test]
    fn select_try_on_blocks_on_partial_selection() {
        let all = CombinationKey::grid();
        let models = populated_grid(&all[..3], true);
        let try_on = populated_grid(&all[..2], true);
        let empty = VariantGrid::new();
        let ctx = empty_ctx(&models, &try_on, &empty);
        assert!(can_advance(Stage::SelectTryOn, &ctx).is_err());
    }

    #[test]
    fn fan_out_stages_block_until_anything_generated() {
        let empty = VariantGrid::new();
        let ctx = empty_ctx(&empty, &empty, &empty);
        assert!(can_advance(Stage::GenerateModels, &ctx).is_err());
        assert!(can_advance(Stage::TryOn, &ctx).is_err());
        assert!(can_advance(Stage::GenerateBackground, &ctx).is_err());
    }

    #[test]
    fn tagging_advances_even_after_failures() {
        // tagging_attempted covers both success and per-key failure.
        let empty = VariantGrid::new();
        let mut ctx = empty_ctx(&empty, &empty, &empty);
        assert!(can_advance(Stage::TagImages, &ctx).is_err());
        ctx.tagging_attempted = true;
        assert!(can_advance(Stage::TagImages, &ctx).is_ok());
    }

    #[test]
    fn deficit_reports_selected_over_required() {
        let all = CombinationKey::grid();
        let mut models = populated_grid(&all, false);
        for key in all.iter().take(3) {
            models.select(*key, "http://a/1.png");
        }
        let empty = VariantGrid::new();
        let ctx = empty_ctx(&models, &empty, &empty);
        assert_eq!(selection_deficit(Stage::SelectModels, &ctx), Some((3, 9)));
        assert_eq!(selection_deficit(Stage::Review, &ctx), None);
    }
}
