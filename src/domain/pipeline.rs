//! Static pipeline definition
//!
//! A pipeline is an ordered list of macro stages. Each stage is backed by one or
//! more leaf steps reported by the backend; a stage flagged `parallel` runs
//! alongside its immediate predecessor (presentation only).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::domain::errors::PipelineError;

/// One caller-visible pipeline phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Stage {
    pub id: String,
    pub label: String,
    /// Leaf step ids attributed to this stage, in declaration order
    #[serde(default)]
    pub leaf_step_ids: Vec<String>,
    /// Runs concurrently with the previous stage
    #[serde(default)]
    pub parallel: bool,
}

impl Stage {
    /// Create a stage backed by a single leaf step with the same id
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            leaf_step_ids: vec![id.clone()],
            id,
            label: label.into(),
            parallel: false,
        }
    }

    /// Replace the leaf steps. An empty list falls back to `[id]`.
    #[must_use]
    pub fn with_leaf_steps<I, S>(mut self, leaf_step_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let leaves: Vec<String> = leaf_step_ids
            .into_iter()
            .map(Into::into)
            .filter(|leaf| seen.insert(leaf.clone()))
            .collect();

        self.leaf_step_ids = if leaves.is_empty() {
            vec![self.id.clone()]
        } else {
            leaves
        };
        self
    }

    #[must_use]
    pub const fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Leaf steps backing this stage; `[id]` when none are listed
    pub fn leaf_steps(&self) -> &[String] {
        if self.leaf_step_ids.is_empty() {
            std::slice::from_ref(&self.id)
        } else {
            &self.leaf_step_ids
        }
    }

    /// Whether an event for `step_id` counts toward this stage
    pub fn owns_step(&self, step_id: &str) -> bool {
        self.leaf_steps().iter().any(|leaf| leaf == step_id)
    }
}

/// Ordered, immutable list of stages plus the designated terminal stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PipelineFile")]
pub struct PipelineDefinition {
    stages: Vec<Stage>,
    terminal_stage_id: String,
}

/// Unvalidated on-disk form; deserialization goes through the constructors
#[derive(Deserialize)]
struct PipelineFile {
    stages: Vec<Stage>,
    #[serde(default)]
    terminal_stage_id: Option<String>,
}

impl TryFrom<PipelineFile> for PipelineDefinition {
    type Error = PipelineError;

    fn try_from(file: PipelineFile) -> Result<Self, Self::Error> {
        match file.terminal_stage_id {
            Some(terminal) => Self::with_terminal_stage(file.stages, terminal),
            None => Self::new(file.stages),
        }
    }
}

impl PipelineDefinition {
    /// Build a pipeline whose terminal stage is the last one
    pub fn new(stages: Vec<Stage>) -> Result<Self, PipelineError> {
        let terminal = stages
            .last()
            .map(|stage| stage.id.clone())
            .ok_or(PipelineError::Empty)?;
        Self::with_terminal_stage(stages, terminal)
    }

    /// Build a pipeline with an explicitly designated terminal stage
    pub fn with_terminal_stage(
        stages: Vec<Stage>,
        terminal_stage_id: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let terminal_stage_id = terminal_stage_id.into();

        let Some(first) = stages.first() else {
            return Err(PipelineError::Empty);
        };
        if first.parallel {
            return Err(PipelineError::LeadingParallelStage(first.id.clone()));
        }

        let mut ids = HashSet::new();
        for stage in &stages {
            if !ids.insert(stage.id.as_str()) {
                return Err(PipelineError::DuplicateStage(stage.id.clone()));
            }
        }
        if !ids.contains(terminal_stage_id.as_str()) {
            return Err(PipelineError::UnknownTerminalStage(terminal_stage_id));
        }

        let stages = stages
            .into_iter()
            .map(|stage| {
                if stage.leaf_step_ids.is_empty() {
                    let leaves = vec![stage.id.clone()];
                    stage.with_leaf_steps(leaves)
                } else {
                    stage
                }
            })
            .collect();

        Ok(Self {
            stages,
            terminal_stage_id,
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn terminal_stage_id(&self) -> &str {
        &self.terminal_stage_id
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.id == id)
    }

    pub fn terminal_stage(&self) -> &Stage {
        // Constructors guarantee the terminal id is present
        self.stage(&self.terminal_stage_id)
            .unwrap_or_else(|| &self.stages[self.stages.len() - 1])
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Stage ids of the reference drawing-analysis pipeline
pub mod drawing_stages {
    pub const UPLOAD: &str = "upload";
    pub const YOLO: &str = "yolo";
    pub const OCR: &str = "ocr";
    pub const EDGNET: &str = "edgnet";
    pub const TOLERANCE: &str = "tolerance";
    pub const BOM: &str = "bom";
    pub const COMPLETE: &str = "complete";
}

/// The reference drawing-analysis pipeline shown by the dashboard
///
/// `ocr` and `edgnet` run side by side after detection. The OCR stage is backed
/// by the dimension and title-block readers, which report separately.
pub fn drawing_analysis_pipeline() -> PipelineDefinition {
    use drawing_stages::{BOM, COMPLETE, EDGNET, OCR, TOLERANCE, UPLOAD, YOLO};

    let stages = vec![
        Stage::new(UPLOAD, "Drawing upload"),
        Stage::new(YOLO, "Symbol detection (YOLO)"),
        Stage::new(OCR, "OCR analysis").with_leaf_steps([OCR, "ocr_dimensions", "ocr_title_block"]),
        Stage::new(EDGNET, "Segmentation (EDGNet)").parallel(),
        Stage::new(TOLERANCE, "Tolerance prediction"),
        Stage::new(BOM, "BOM aggregation"),
        Stage::new(COMPLETE, "Complete"),
    ];

    // Fixed stage list; the only way this fails is a programming error above
    match PipelineDefinition::new(stages) {
        Ok(pipeline) => pipeline,
        Err(e) => unreachable!("reference pipeline is invalid: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_defaults_to_own_id_as_leaf() {
        let stage = Stage::new("yolo", "YOLO");
        assert_eq!(stage.leaf_step_ids, vec!["yolo".to_string()]);
        assert!(!stage.parallel);
        assert!(stage.owns_step("yolo"));
        assert!(!stage.owns_step("ocr"));
    }

    #[test]
    fn test_empty_leaf_list_falls_back_to_id() {
        let stage = Stage::new("ocr", "OCR").with_leaf_steps(Vec::<String>::new());
        assert_eq!(stage.leaf_step_ids, vec!["ocr".to_string()]);
    }

    #[test]
    fn test_duplicate_leaves_are_collapsed() {
        let stage = Stage::new("ocr", "OCR").with_leaf_steps(["a", "b", "a"]);
        assert_eq!(stage.leaf_step_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_pipeline_validation() {
        assert_eq!(PipelineDefinition::new(vec![]), Err(PipelineError::Empty));

        let duplicated = vec![Stage::new("a", "A"), Stage::new("a", "A again")];
        assert_eq!(
            PipelineDefinition::new(duplicated),
            Err(PipelineError::DuplicateStage("a".into()))
        );

        let leading_parallel = vec![Stage::new("a", "A").parallel()];
        assert_eq!(
            PipelineDefinition::new(leading_parallel),
            Err(PipelineError::LeadingParallelStage("a".into()))
        );

        let unknown = PipelineDefinition::with_terminal_stage(vec![Stage::new("a", "A")], "zzz");
        assert_eq!(unknown, Err(PipelineError::UnknownTerminalStage("zzz".into())));
    }

    #[test]
    fn test_terminal_stage_defaults_to_last() {
        let pipeline =
            PipelineDefinition::new(vec![Stage::new("a", "A"), Stage::new("b", "B")]).unwrap();
        assert_eq!(pipeline.terminal_stage_id(), "b");
        assert_eq!(pipeline.terminal_stage().label, "B");
    }

    #[test]
    fn test_deserialization_is_validated() {
        let json = r#"{"stages":[{"id":"a","label":"A","leaf_step_ids":[],"parallel":false}]}"#;
        let pipeline: PipelineDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(pipeline.terminal_stage_id(), "a");
        assert_eq!(pipeline.stages()[0].leaf_step_ids, vec!["a".to_string()]);

        let bad = r#"{"stages":[],"terminal_stage_id":null}"#;
        assert!(serde_json::from_str::<PipelineDefinition>(bad).is_err());
    }

    #[test]
    fn test_reference_pipeline_shape() {
        let pipeline = drawing_analysis_pipeline();
        assert_eq!(pipeline.len(), 7);
        assert_eq!(pipeline.terminal_stage_id(), drawing_stages::COMPLETE);

        let edgnet = pipeline.stage(drawing_stages::EDGNET).unwrap();
        assert!(edgnet.parallel);

        let ocr = pipeline.stage(drawing_stages::OCR).unwrap();
        assert!(ocr.owns_step("ocr_title_block"));
    }
}
