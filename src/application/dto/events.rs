use serde::{Deserialize, Serialize};

use super::generation::GenerationSummaryDto;

/// Events delivered to presentation-layer subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    GenerationProgress {
        run_id: String,
        project_id: String,
        progress: f32,
        current_item: Option<String>,
        index: usize,
        total: usize,
    },
    CategoryUpdated {
        run_id: String,
        project_id: String,
        category: String,
    },
    GenerationItemFailed {
        run_id: String,
        project_id: String,
        item_name: String,
        category: String,
        reason: String,
    },
    VerificationWarning {
        run_id: String,
        project_id: String,
        element_id: String,
        element_name: String,
        category: String,
    },
    GenerationCompleted {
        project_id: String,
        summary: GenerationSummaryDto,
    },
    GenerationCancelled {
        project_id: String,
        summary: GenerationSummaryDto,
    },
    GenerationFailed {
        project_id: String,
        summary: GenerationSummaryDto,
        error: String,
    },
}

impl AppEvent {
    /// The project this event concerns
    pub fn project_id(&self) -> &str {
        match self {
            Self::GenerationProgress { project_id, .. }
            | Self::CategoryUpdated { project_id, .. }
            | Self::GenerationItemFailed { project_id, .. }
            | Self::VerificationWarning { project_id, .. }
            | Self::GenerationCompleted { project_id, .. }
            | Self::GenerationCancelled { project_id, .. }
            | Self::GenerationFailed { project_id, .. } => project_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_with_type_tag() {
        let event = AppEvent::CategoryUpdated {
            run_id: "r".to_string(),
            project_id: "p".to_string(),
            category: "place".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "category_updated");
        assert_eq!(json["category"], "place");
        assert_eq!(event.project_id(), "p");
    }
}
