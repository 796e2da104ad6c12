use serde::{Deserialize, Serialize};

use crate::application::services::generation_service::{
    GenerationRequest, GenerationSession, GenerationSummary,
};
use crate::domain::entities::GenerationManifestItem;
use crate::domain::value_objects::{Category, UnknownCategory};

#[derive(Debug, Deserialize)]
pub struct StartGenerationRequestDto {
    pub instruction: String,
    #[serde(default)]
    pub default_category: Option<String>,
    #[serde(default)]
    pub context_categories: Vec<String>,
}

impl StartGenerationRequestDto {
    /// Resolve category names (aliases accepted) into a generation request
    pub fn into_request(self) -> Result<GenerationRequest, UnknownCategory> {
        let default_category = self
            .default_category
            .as_deref()
            .map(str::parse::<Category>)
            .transpose()?;
        let context_categories = self
            .context_categories
            .iter()
            .map(|c| c.parse::<Category>())
            .collect::<Result<Vec<_>, _>>()?;

        let request = GenerationRequest::new(self.instruction).with_context_categories(context_categories);
        Ok(match default_category {
            Some(category) => request.with_default_category(category),
            None => request,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestItemDto {
    pub name: String,
    pub category: String,
}

impl From<&GenerationManifestItem> for ManifestItemDto {
    fn from(item: &GenerationManifestItem) -> Self {
        Self {
            name: item.name.clone(),
            category: item.category.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRunResponseDto {
    pub run_id: String,
    pub project_id: String,
    pub instruction: String,
    pub state: String,
    pub current_index: Option<usize>,
    pub progress: f32,
    pub manifest: Vec<ManifestItemDto>,
    pub completed_count: usize,
    pub generated_count: usize,
    pub failed_count: usize,
    pub cancelled: bool,
    pub errors: Vec<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl From<GenerationSession> for GenerationRunResponseDto {
    fn from(s: GenerationSession) -> Self {
        Self {
            run_id: s.run_id.to_string(),
            project_id: s.project_id.to_string(),
            instruction: s.instruction,
            state: s.state.as_str().to_string(),
            current_index: s.state.item_index(),
            progress: s.progress,
            manifest: s.manifest.iter().map(ManifestItemDto::from).collect(),
            completed_count: s.completed_count,
            generated_count: s.generated_count,
            failed_count: s.failed_count,
            cancelled: s.cancelled,
            errors: s.errors.iter().map(|e| e.to_string()).collect(),
            started_at: s.started_at.to_rfc3339(),
            finished_at: s.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummaryDto {
    pub run_id: String,
    pub state: String,
    pub elements_generated: usize,
    pub items_completed: usize,
    pub items_failed: usize,
    pub errors: Vec<String>,
}

impl From<GenerationSummary> for GenerationSummaryDto {
    fn from(s: GenerationSummary) -> Self {
        Self {
            run_id: s.run_id.to_string(),
            state: s.state.as_str().to_string(),
            elements_generated: s.elements_generated,
            items_completed: s.items_completed,
            items_failed: s.items_failed,
            errors: s.errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_request_resolves_aliases() {
        let dto = StartGenerationRequestDto {
            instruction: "harbours".to_string(),
            default_category: Some("場所".to_string()),
            context_categories: vec!["history".to_string(), "rule".to_string()],
        };

        let request = dto.into_request().unwrap();

        assert_eq!(request.default_category, Some(Category::Place));
        assert_eq!(
            request.context_categories,
            vec![Category::HistoryLegend, Category::Rule]
        );
    }

    #[test]
    fn test_into_request_rejects_unknown_category() {
        let dto = StartGenerationRequestDto {
            instruction: "harbours".to_string(),
            default_category: Some("spaceship".to_string()),
            context_categories: Vec::new(),
        };

        assert!(dto.into_request().is_err());
    }
}
