//! Domain types for the residual reconciliation engine.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Primitives: TimeMs, MerchantId, PayoutMonth
//! - Status vocabularies and their validators
//! - Participant normalization over legacy field names
//! - ResidualEvent, Deal, Payout and audit records

pub mod audit;
pub mod deal;
pub mod decimal;
pub mod event;
pub mod participant;
pub mod payout;
pub mod primitives;
pub mod status;

pub use audit::{AuditEntry, AuditSubject, NewAuditEntry};
pub use deal::{Deal, DealDraft, DEFAULT_PAYOUT_TYPE};
pub use decimal::Decimal;
pub use event::ResidualEvent;
pub use participant::{normalize_participant, Participant, RawParticipant};
pub use payout::{Payout, PayoutSource};
pub use primitives::{MerchantId, PayoutMonth, PayoutMonthParseError, TimeMs};
pub use status::{
    try_assignment_status, try_paid_status, validate_assignment_status, validate_paid_status,
    AssignmentStatus, InvalidStatus, PaidStatus,
};
