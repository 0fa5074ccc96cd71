//! Pure computation engine(s): no store access, deterministic for a given input.

pub mod adjustments;
pub mod confirmation;
pub mod reconstruction;

pub use adjustments::{count_batches, group_batches, AdjustmentBatch, BatchCounts, BatchKey};
pub use confirmation::{plan_payouts, resolve_payout_type, IncompleteDealError, PlanError};
pub use reconstruction::reconstruct_deals;
