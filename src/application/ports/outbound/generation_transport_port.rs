//! Generation transport port - The two-phase remote generation protocol
//!
//! Authentication, provider selection and HTTP details live behind this port.
//! Timeouts are the implementation's concern and surface as ordinary errors.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::entities::Element;
use crate::domain::value_objects::Category;

#[async_trait]
pub trait GenerationTransportPort: Send + Sync {
    /// Phase 1: ask for the list of records to generate.
    ///
    /// The raw reply is expected to contain a JSON array of `{name, category}`.
    async fn request_manifest(&self, instruction: &str, context: &[Element]) -> Result<String>;

    /// Phase 2: ask for the full record of one manifest item
    async fn request_detail(
        &self,
        item_name: &str,
        category: Category,
        instruction: &str,
        context: &[Element],
    ) -> Result<String>;
}
