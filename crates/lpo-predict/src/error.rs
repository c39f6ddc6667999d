use lpo_math::MathError;
use lpo_schemas::{ActionKind, Address};

pub type PredictResult<T> = std::result::Result<T, PredictError>;

/// Why a prediction could not be produced.
///
/// A predictor refusing an action does not mean the ledger will revert; it
/// means the before-state cannot lead to a successful execution of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    Math(MathError),
    /// A touched account has no before-snapshot in the input.
    MissingUser { address: Address },
    /// The action handed to a predictor is not of the kind it handles.
    KindMismatch {
        expected: ActionKind,
        got: ActionKind,
    },
    /// The before-state cannot support the action (no debt to repay,
    /// withdrawal above balance, ...).
    InvalidAction { kind: ActionKind, reason: String },
}

impl std::fmt::Display for PredictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictError::Math(e) => write!(f, "prediction arithmetic failed: {e}"),
            PredictError::MissingUser { address } => {
                write!(f, "no before-snapshot for touched account {address}")
            }
            PredictError::KindMismatch { expected, got } => {
                write!(f, "predictor for '{expected}' received a '{got}' action")
            }
            PredictError::InvalidAction { kind, reason } => {
                write!(f, "cannot predict '{kind}': {reason}")
            }
        }
    }
}

impl std::error::Error for PredictError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PredictError::Math(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MathError> for PredictError {
    fn from(e: MathError) -> Self {
        PredictError::Math(e)
    }
}

pub(crate) fn invalid(kind: ActionKind, reason: impl Into<String>) -> PredictError {
    PredictError::InvalidAction {
        kind,
        reason: reason.into(),
    }
}
