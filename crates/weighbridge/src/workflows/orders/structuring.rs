//! Contract for the external collaborator that turns raw order text into
//! a structured payload. The engine never parses free text itself; it
//! consumes whatever implementation of this trait the host wires in.

use async_trait::async_trait;

use crate::workflows::orders::domain::StructuredOrder;

#[derive(Debug, thiserror::Error)]
pub enum StructuringError {
    #[error("structuring backend failed: {0}")]
    Backend(String),
    #[error("structuring backend returned an unusable payload: {0}")]
    InvalidPayload(String),
}

/// Turns raw order text into a [`StructuredOrder`].
#[async_trait]
pub trait StructuringGateway: Send + Sync {
    async fn structure(&self, raw_text: &str) -> Result<StructuredOrder, StructuringError>;
}
