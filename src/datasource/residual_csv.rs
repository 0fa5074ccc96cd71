//! Parsing processor residual reports (CSV) into residual-event rows.
//!
//! Headers are lower-cased, trimmed and folded through a fixed synonym table
//! before rows are read. Blank/footer rows (no merchant id) are skipped; bad
//! dates drop the row with an error; bad money degrades to zero. One bad row
//! never stops the rest of the file.

use crate::config::DedupHashMode;
use crate::domain::{Decimal, MerchantId, PayoutMonth};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

/// Canonical column names.
pub mod column {
    pub const MID: &str = "mid";
    pub const MERCHANT_NAME: &str = "merchant_name";
    pub const VOLUME: &str = "volume";
    pub const FEES: &str = "fees";
    pub const ADJUSTMENTS: &str = "adjustments";
    pub const CHARGEBACKS: &str = "chargebacks";
    pub const DATE: &str = "date";
    pub const PAYOUT_MONTH: &str = "payout_month";
    pub const PAYOUT_TYPE: &str = "payout_type";
}

/// Header synonym table. Keys are already lower-cased and trimmed.
///
/// Part of the re-import contract: changing an entry changes which column a
/// file's values land in, and therefore its dedup hashes.
const HEADER_SYNONYMS: &[(&str, &str)] = &[
    ("mid", column::MID),
    ("merchant id", column::MID),
    ("merchant_id", column::MID),
    ("merchantid", column::MID),
    ("merchant number", column::MID),
    ("merchant #", column::MID),
    ("merchant name", column::MERCHANT_NAME),
    ("merchant_name", column::MERCHANT_NAME),
    ("dba", column::MERCHANT_NAME),
    ("business name", column::MERCHANT_NAME),
    ("volume", column::VOLUME),
    ("amount", column::VOLUME),
    ("sales volume", column::VOLUME),
    ("total volume", column::VOLUME),
    ("processing volume", column::VOLUME),
    ("fees", column::FEES),
    ("fee", column::FEES),
    ("commission", column::FEES),
    ("total fees", column::FEES),
    ("adjustments", column::ADJUSTMENTS),
    ("adjustment", column::ADJUSTMENTS),
    ("adj", column::ADJUSTMENTS),
    ("chargebacks", column::CHARGEBACKS),
    ("chargeback", column::CHARGEBACKS),
    ("cb", column::CHARGEBACKS),
    ("date", column::DATE),
    ("payout date", column::DATE),
    ("payout_date", column::DATE),
    ("report date", column::DATE),
    ("transaction date", column::DATE),
    ("payout month", column::PAYOUT_MONTH),
    ("payout_month", column::PAYOUT_MONTH),
    ("month", column::PAYOUT_MONTH),
    ("payout type", column::PAYOUT_TYPE),
    ("payout_type", column::PAYOUT_TYPE),
    ("type", column::PAYOUT_TYPE),
];

// Two-digit years first: `%Y` would otherwise read "24" as year 24.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d"];

/// Lower-case, trim, and map through the synonym table.
/// Unknown headers come back lower-cased and trimmed.
pub fn normalize_header(header: &str) -> String {
    let key = header.trim().to_lowercase();
    HEADER_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(key)
}

/// Parse a money cell: strips `$`, `,` and spaces, reads `(12.50)` as negative.
/// Anything unreadable is zero.
pub fn parse_currency(raw: &str) -> Decimal {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Decimal::zero();
    }

    let (negated, body) = match cleaned
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };

    match Decimal::parse_lenient(body) {
        Some(value) if negated => -value,
        Some(value) => value,
        None => {
            warn!(value = %raw, "Unparsable currency value, using 0");
            Decimal::zero()
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
}

/// Dedup hash over `merchantId|payoutMonth|volume|fees`.
///
/// Both modes are opaque equality keys, never security material.
pub fn dedup_hash(
    mode: DedupHashMode,
    merchant_id: &MerchantId,
    payout_month: PayoutMonth,
    volume: Decimal,
    fees: Decimal,
) -> String {
    let input = format!(
        "{}|{}|{}|{}",
        merchant_id.as_str(),
        payout_month,
        volume.to_canonical_string(),
        fees.to_canonical_string()
    );

    match mode {
        DedupHashMode::Sha256 => {
            use sha2::{Digest, Sha256};
            hex::encode(Sha256::digest(input.as_bytes()))
        }
        DedupHashMode::Rolling => rolling_hash(&input),
    }
}

/// 32-bit `h * 31 + c` over UTF-16 code units, hex of the absolute value.
fn rolling_hash(input: &str) -> String {
    let mut h: i32 = 0;
    for unit in input.encode_utf16() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(unit));
    }
    format!("{:x}", h.unsigned_abs())
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Overrides any per-row month column.
    pub payout_month: Option<PayoutMonth>,
}

/// One successfully parsed residual row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRow {
    /// 1-based line number in the source file.
    pub line: u64,
    pub merchant_id: MerchantId,
    pub merchant_name: String,
    pub volume: Decimal,
    pub fees: Decimal,
    pub adjustments: Decimal,
    pub chargebacks: Decimal,
    pub payout_date: NaiveDate,
    pub payout_month: PayoutMonth,
    pub payout_type: Option<String>,
    pub dedup_hash: String,
    pub raw_data: Value,
}

/// A row that was dropped, with enough context to fix the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub line: u64,
    pub merchant_id: Option<String>,
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseOutcome {
    pub rows: Vec<ParsedRow>,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Default)]
pub struct CsvIngestor {
    hash_mode: DedupHashMode,
}

impl CsvIngestor {
    pub fn new(hash_mode: DedupHashMode) -> Self {
        Self { hash_mode }
    }

    pub fn parse(&self, raw_text: &str, options: &ParseOptions) -> ParseOutcome {
        self.parse_with_today(raw_text, options, Utc::now().date_naive())
    }

    /// Same as [`parse`](Self::parse) with an explicit "today", which only
    /// matters when neither the options nor the row carry a month.
    pub fn parse_with_today(
        &self,
        raw_text: &str,
        options: &ParseOptions,
        today: NaiveDate,
    ) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(raw_text.as_bytes());

        let headers = match reader.headers() {
            Ok(h) => h.clone(),
            Err(e) => {
                outcome.errors.push(RowError {
                    line: 1,
                    merchant_id: None,
                    field: "header".to_string(),
                    message: e.to_string(),
                });
                return outcome;
            }
        };

        // First column wins when two headers fold to the same canonical name.
        let mut columns: HashMap<String, usize> = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            columns.entry(normalize_header(header)).or_insert(idx);
        }

        for record in reader.records() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    warn!(line, error = %e, "Unreadable CSV record");
                    outcome.errors.push(RowError {
                        line,
                        merchant_id: None,
                        field: "record".to_string(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let cell = |name: &str| cell_at(&record, &columns, name).to_string();

            let mid = cell(column::MID);
            if mid.is_empty() {
                continue;
            }
            let merchant_id = MerchantId::new(mid.clone());

            let payout_month = match options.payout_month {
                Some(month) => month,
                None => match cell(column::PAYOUT_MONTH).as_str() {
                    "" => PayoutMonth::of(today),
                    raw => match raw.parse::<PayoutMonth>() {
                        Ok(month) => month,
                        Err(e) => {
                            outcome.errors.push(RowError {
                                line,
                                merchant_id: Some(mid.clone()),
                                field: column::PAYOUT_MONTH.to_string(),
                                message: e.to_string(),
                            });
                            continue;
                        }
                    },
                },
            };

            let payout_date = match cell(column::DATE).as_str() {
                "" => payout_month.first_day(),
                raw => match parse_date(raw) {
                    Some(date) => date,
                    None => {
                        warn!(line, merchant_id = %merchant_id, value = %raw, "Unparsable date, dropping row");
                        outcome.errors.push(RowError {
                            line,
                            merchant_id: Some(mid.clone()),
                            field: column::DATE.to_string(),
                            message: format!("unparsable date {:?}", raw),
                        });
                        continue;
                    }
                },
            };

            let volume = parse_currency(&cell(column::VOLUME));
            let fees = parse_currency(&cell(column::FEES));
            let payout_type = Some(cell(column::PAYOUT_TYPE)).filter(|s| !s.is_empty());

            let raw_data = Value::Object(
                headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                    .collect::<Map<String, Value>>(),
            );

            outcome.rows.push(ParsedRow {
                line,
                dedup_hash: dedup_hash(self.hash_mode, &merchant_id, payout_month, volume, fees),
                merchant_name: cell(column::MERCHANT_NAME),
                merchant_id,
                volume,
                fees,
                adjustments: parse_currency(&cell(column::ADJUSTMENTS)),
                chargebacks: parse_currency(&cell(column::CHARGEBACKS)),
                payout_date,
                payout_month,
                payout_type,
                raw_data,
            });
        }

        outcome
    }
}

fn cell_at<'r>(record: &'r csv::StringRecord, columns: &HashMap<String, usize>, name: &str) -> &'r str {
    columns
        .get(name)
        .and_then(|&idx| record.get(idx))
        .unwrap_or("")
}
