//! Input boundaries: residual CSV reports and the external partner directory.

pub mod partner_directory;
pub mod residual_csv;

pub use partner_directory::{
    fetch_all_partners, DirectoryError, DirectoryPage, HttpPartnerDirectory,
    MockPartnerDirectory, PartnerDirectory, PartnerRecord, UnconfiguredDirectory,
};
pub use residual_csv::{CsvIngestor, ParseOptions, ParseOutcome, ParsedRow, RowError};
