//! lpo-schemas
//!
//! Pure data shared by the predictor, comparator and orchestrator:
//! reserve and user snapshots, the action vocabulary and account identity.
//! No behavior beyond construction and parsing.

mod action;
mod address;
pub mod dec_u256;
mod snapshot;

pub use action::{Action, ActionKind, AmountRequest, RateMode, RateModeParseError};
pub use address::{Address, AddressParseError};
pub use snapshot::{ReserveSnapshot, UserReserveSnapshot};

pub use primitive_types::U256;
