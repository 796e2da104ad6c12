//! Generation Event Publisher - Maps GenerationEvents to AppEvents
//!
//! This service listens to the GenerationEvent channel and publishes
//! corresponding AppEvents through the event bus.

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::application::dto::{AppEvent, GenerationSummaryDto};
use crate::application::ports::outbound::{EventBusError, EventBusPort};
use crate::application::services::generation_service::GenerationEvent;

/// Publisher that converts GenerationEvents to AppEvents
pub struct GenerationEventPublisher {
    event_bus: Arc<dyn EventBusPort<AppEvent>>,
}

impl GenerationEventPublisher {
    /// Create a new publisher
    pub fn new(event_bus: Arc<dyn EventBusPort<AppEvent>>) -> Self {
        Self { event_bus }
    }

    /// Run the publisher, consuming generation events and publishing app events
    ///
    /// This should be spawned as a background task
    pub async fn run(self, mut generation_event_rx: UnboundedReceiver<GenerationEvent>) {
        while let Some(event) = generation_event_rx.recv().await {
            let app_event = map_to_app_event(event);
            match self.event_bus.publish(app_event).await {
                Ok(()) => {}
                Err(EventBusError::NoSubscribers) => {
                    tracing::debug!("No subscribers for generation event");
                }
            }
        }
        tracing::info!("Generation event publisher shutting down");
    }
}

/// Map a GenerationEvent to an AppEvent
fn map_to_app_event(event: GenerationEvent) -> AppEvent {
    match event {
        GenerationEvent::Progress {
            run_id,
            project_id,
            progress,
            current_item,
            index,
            total,
        } => AppEvent::GenerationProgress {
            run_id: run_id.to_string(),
            project_id: project_id.to_string(),
            progress,
            current_item,
            index,
            total,
        },
        GenerationEvent::CategoryUpdated {
            run_id,
            project_id,
            category,
        } => AppEvent::CategoryUpdated {
            run_id: run_id.to_string(),
            project_id: project_id.to_string(),
            category: category.to_string(),
        },
        GenerationEvent::ItemFailed {
            run_id,
            project_id,
            item_name,
            category,
            reason,
        } => AppEvent::GenerationItemFailed {
            run_id: run_id.to_string(),
            project_id: project_id.to_string(),
            item_name,
            category: category.to_string(),
            reason,
        },
        GenerationEvent::VerificationWarning {
            run_id,
            project_id,
            element_id,
            element_name,
            category,
        } => AppEvent::VerificationWarning {
            run_id: run_id.to_string(),
            project_id: project_id.to_string(),
            element_id: element_id.to_string(),
            element_name,
            category: category.to_string(),
        },
        GenerationEvent::Completed { summary } => AppEvent::GenerationCompleted {
            project_id: summary.project_id.to_string(),
            summary: GenerationSummaryDto::from(summary),
        },
        GenerationEvent::Cancelled { summary } => AppEvent::GenerationCancelled {
            project_id: summary.project_id.to_string(),
            summary: GenerationSummaryDto::from(summary),
        },
        GenerationEvent::Failed { summary, error } => AppEvent::GenerationFailed {
            project_id: summary.project_id.to_string(),
            summary: GenerationSummaryDto::from(summary),
            error: error.to_string(),
        },
    }
}
