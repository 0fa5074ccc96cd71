//! Deal participants and the legacy field-name decode step.
//!
//! Stored participants come in several historical shapes
//! (`partner_id`/`partner_airtable_id`, `name`/`partner_name`, `role`/`partner_role`,
//! `split`/`split_pct`). They are decoded into [`RawParticipant`] at the boundary
//! and folded into one canonical [`Participant`] by [`normalize_participant`];
//! business logic only ever sees the canonical struct.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_ROLE: &str = "Partner";

const FUND_MARKER: &str = "lumino income fund";
const FUND_ROLE: &str = "Fund I";
const COMPANY_MARKER: &str = "lumino (company)";
const COMPANY_ROLE: &str = "Company";

/// Canonical participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// External partner directory reference. Empty when unknown.
    pub partner_ref: String,
    pub partner_name: String,
    pub role: String,
    /// Percentage in 0..=100.
    pub split_pct: Decimal,
}

impl Participant {
    pub fn has_partner_ref(&self) -> bool {
        !self.partner_ref.trim().is_empty()
    }

    /// Re-apply trimming and the fixed role overrides to an already canonical value.
    pub fn normalized(&self) -> Participant {
        let partner_name = self.partner_name.trim().to_string();
        Participant {
            partner_ref: self.partner_ref.trim().to_string(),
            role: resolve_role(&partner_name, Some(&self.role)),
            partner_name,
            split_pct: self.split_pct,
        }
    }
}

/// Any mix of current and legacy participant field names, as found in storage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawParticipant {
    #[serde(default)]
    pub partner_airtable_id: Option<Value>,
    #[serde(default)]
    pub partner_id: Option<Value>,
    #[serde(default)]
    pub partner_name: Option<Value>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub partner_role: Option<Value>,
    #[serde(default)]
    pub role: Option<Value>,
    #[serde(default)]
    pub split_pct: Option<Value>,
    #[serde(default)]
    pub split: Option<Value>,
}

impl RawParticipant {
    /// Decode a stored JSON value. Non-object values degrade to an empty record.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

/// Fold a raw participant into canonical form.
///
/// Never fails: missing or malformed fields fall back to defaults because this
/// also runs over already-stored, possibly legacy rows.
pub fn normalize_participant(raw: &RawParticipant) -> Participant {
    let partner_name = first_text(&[&raw.partner_name, &raw.name]).unwrap_or_default();
    let raw_role = first_text(&[&raw.partner_role, &raw.role]);
    let role = resolve_role(&partner_name, raw_role.as_deref());
    let partner_ref = first_text(&[&raw.partner_airtable_id, &raw.partner_id]).unwrap_or_default();
    let split_pct = first_decimal(&[&raw.split_pct, &raw.split]).unwrap_or_default();

    Participant {
        partner_ref,
        partner_name,
        role,
        split_pct,
    }
}

/// Fixed role overrides for the two in-house legal entities.
pub fn resolve_role(partner_name: &str, raw_role: Option<&str>) -> String {
    let lowered = partner_name.to_lowercase();
    if lowered.contains(FUND_MARKER) {
        return FUND_ROLE.to_string();
    }
    if lowered.contains(COMPANY_MARKER) {
        return COMPANY_ROLE.to_string();
    }
    match raw_role.map(str::trim) {
        Some(role) if !role.is_empty() => role.to_string(),
        _ => DEFAULT_ROLE.to_string(),
    }
}

fn first_text(candidates: &[&Option<Value>]) -> Option<String> {
    candidates.iter().find_map(|candidate| match candidate {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn first_decimal(candidates: &[&Option<Value>]) -> Option<Decimal> {
    candidates.iter().find_map(|candidate| match candidate {
        Some(Value::Number(n)) => Decimal::parse_lenient(&n.to_string()),
        Some(Value::String(s)) => Decimal::parse_lenient(s.trim().trim_end_matches('%')),
        _ => None,
    })
}

/// Write shape: canonical and legacy names carry identical values so readers on
/// either side of the field rename keep working.
#[derive(Serialize)]
struct StoredParticipant<'a> {
    partner_airtable_id: &'a str,
    partner_name: &'a str,
    partner_role: &'a str,
    split_pct: Decimal,
    partner_id: &'a str,
    name: &'a str,
    role: &'a str,
    split: Decimal,
}

impl Serialize for Participant {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StoredParticipant {
            partner_airtable_id: &self.partner_ref,
            partner_name: &self.partner_name,
            partner_role: &self.role,
            split_pct: self.split_pct,
            partner_id: &self.partner_ref,
            name: &self.partner_name,
            role: &self.role,
            split: self.split_pct,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Participant {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawParticipant::deserialize(deserializer)?;
        Ok(normalize_participant(&raw))
    }
}

/// Decode a stored participants array, tolerating legacy shapes and junk.
pub fn participants_from_json(json: &str) -> Vec<Participant> {
    match serde_json::from_str::<Vec<Value>>(json) {
        Ok(values) => values
            .into_iter()
            .map(|v| normalize_participant(&RawParticipant::from_value(v)))
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable participants payload, treating as empty");
            Vec::new()
        }
    }
}
