use crate::types::ItemId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Nothing to slice: no eligible items")]
    EmptyWorkSet,

    #[error("Unknown work item: {0}")]
    UnknownItem(ItemId),

    #[error("Validation failed: {0}")]
    Validation(String),
}
