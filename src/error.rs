use crate::native::OsError;
use crate::state::MutationStep;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    #[error("no window handle could be resolved for the host window")]
    ResolutionFailure,
    #[error("{step} failed: {code}")]
    AttributeMutation { step: MutationStep, code: OsError },
    #[error("{operation} ignored: overlay is not enabled")]
    GuardViolation { operation: &'static str },
    #[error("{operation} ignored: window handle is not set")]
    MissingHandle { operation: &'static str },
    #[error("{operation} skipped: overlay state is busy")]
    Busy { operation: &'static str },
    #[error("failed to install global keyboard hook: {0}")]
    HookInstall(String),
}
