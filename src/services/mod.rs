//! Recommendation pipeline and plan services.
//!
//! Retrieval, prompting, the model client and validation are composed by
//! [`RecommendationService`] for new plans and by
//! [`RegenerationOrchestrator`] for single-slot replacements.

pub mod ai_client;
pub mod assembler;
pub mod budget;
pub mod candidates;
pub mod plan_editor;
pub mod plan_lock;
pub mod prompt;
pub mod recommendation;
pub mod regeneration;
pub mod validator;

use std::sync::Arc;

use crate::store::{PlanStore, ReservationStore, ResourceIndex};

pub use ai_client::RecommendationClient;
pub use plan_editor::PlanEditor;
pub use plan_lock::PlanLock;
pub use recommendation::RecommendationService;
pub use regeneration::RegenerationOrchestrator;

/// Services shared by every request handler.
#[derive(Clone)]
pub struct Services {
    pub recommendations: RecommendationService,
    pub regeneration: RegenerationOrchestrator,
    pub plans: PlanEditor,
    pub plan_lock: Arc<dyn PlanLock>,
}

impl Services {
    pub fn new(
        index: Arc<dyn ResourceIndex>,
        plans: Arc<dyn PlanStore>,
        reservations: Arc<dyn ReservationStore>,
        client: RecommendationClient,
        plan_lock: Arc<dyn PlanLock>,
    ) -> Self {
        Self {
            recommendations: RecommendationService::new(
                Arc::clone(&plans),
                Arc::clone(&index),
                client.clone(),
            ),
            regeneration: RegenerationOrchestrator::new(
                Arc::clone(&plans),
                Arc::clone(&reservations),
                Arc::clone(&index),
                client,
                Arc::clone(&plan_lock),
            ),
            plans: PlanEditor::new(plans, reservations, index, Arc::clone(&plan_lock)),
            plan_lock,
        }
    }
}
