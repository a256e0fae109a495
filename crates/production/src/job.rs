use serde::Serialize;

use bagforge_core::{JobId, OrderId};

use crate::component::Component;

/// A job card: production work recorded against an order.
///
/// The job's components carry the consumption that gets posted to the
/// inventory ledger; `job_number` is the human reference printed on the card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub order_id: OrderId,
    pub job_number: String,
    pub components: Vec<Component>,
}

impl Job {
    pub fn new(id: JobId, order_id: OrderId, job_number: impl Into<String>) -> Self {
        Self {
            id,
            order_id,
            job_number: job_number.into(),
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Components that draw stock: they reference a material.
    pub fn material_components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.material_id().is_some())
    }
}
