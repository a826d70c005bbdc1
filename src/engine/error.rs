use crate::model::Ts;
use crate::ports::CollaboratorError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AvailabilityError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("missing product id")]
    MissingProduct,
    #[error("refresh queue closed")]
    SchedulerClosed,
    #[error("window too wide: {0}s")]
    WindowTooWide(Ts),
}
