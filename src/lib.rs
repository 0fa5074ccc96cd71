pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{CsvIngestor, HttpPartnerDirectory, MockPartnerDirectory, PartnerDirectory};
pub use db::{init_db, Repository};
pub use domain::{
    AssignmentStatus, Deal, Decimal, MerchantId, PaidStatus, Participant, Payout, PayoutMonth,
    ResidualEvent, TimeMs,
};
pub use error::{AppError, EngineError};
