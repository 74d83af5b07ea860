//! Bank reconciliation.
//!
//! Per-bank notes and references for a deal live in several places, written
//! by different generations of tooling:
//!
//! 1. legacy flattened `"Bank: value"` text stored on the deal per stage
//! 2. stage-tagged note rows (tagged with a stage name or `"global"`)
//! 3. per-bank sub-records with contact and attorney detail
//! 4. the payload of the latest move into the stage
//!
//! Each source is an [`ExtractionRule`]. The [`Reconciler`] applies rules in
//! order; a later rule's non-empty value replaces the earlier value for the
//! same bank and field.

use std::collections::BTreeMap;

use bondflow_storage::{BankRecord, DealRecord, StageNoteRecord};
use serde::Serialize;

use crate::stage::{normalize, Stage};

/// Stage tag for note rows that apply to every stage.
pub const GLOBAL_STAGE: &str = "global";

/// Placeholder written by older tooling when a deal had several banks.
const MULTIPLE_BANKS: &str = "Multiple";

// ── Reconciled view ──────────────────────────────────────────────────────────

/// Reconciled note and reference for one bank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciledBank {
    pub bank_name: String,
    pub note: String,
    pub reference: String,
}

/// Ordered, case-insensitively unique list of banks for one deal and stage.
///
/// Display names keep the casing under which each bank was first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReconciledBanks {
    banks: Vec<ReconciledBank>,
}

impl ReconciledBanks {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        let key = bank_key(name);
        self.banks.iter().position(|b| bank_key(&b.bank_name) == key)
    }

    /// Get or insert the entry for `name`. Blank names are ignored.
    pub fn ensure(&mut self, name: &str) -> Option<&mut ReconciledBank> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let idx = match self.position(name) {
            Some(i) => i,
            None => {
                self.banks.push(ReconciledBank {
                    bank_name: name.to_string(),
                    ..Default::default()
                });
                self.banks.len() - 1
            }
        };
        self.banks.get_mut(idx)
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&ReconciledBank> {
        self.position(name).and_then(|i| self.banks.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReconciledBank> {
        self.banks.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.banks.iter().map(|b| b.bank_name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    /// Notes keyed by display name, as a form's `bank_by_name` map.
    pub fn note_map(&self) -> BTreeMap<String, String> {
        self.banks
            .iter()
            .map(|b| (b.bank_name.clone(), b.note.clone()))
            .collect()
    }

    /// References keyed by display name, as a form's `bank_ref_by_name` map.
    pub fn reference_map(&self) -> BTreeMap<String, String> {
        self.banks
            .iter()
            .map(|b| (b.bank_name.clone(), b.reference.clone()))
            .collect()
    }
}

fn bank_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// ── Extraction rules ─────────────────────────────────────────────────────────

/// Everything the rules may read for one deal.
#[derive(Debug, Clone, Copy)]
pub struct BankContext<'a> {
    pub deal: &'a DealRecord,
    pub bank_records: &'a [BankRecord],
    pub stage_notes: &'a [StageNoteRecord],
}

/// One bank's values as found by a single rule. `None` means the rule has
/// nothing to say about that field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub bank_name: String,
    pub note: Option<String>,
    pub reference: Option<String>,
}

impl Extracted {
    fn note(bank_name: &str, note: &str) -> Self {
        Self {
            bank_name: bank_name.to_string(),
            note: Some(note.to_string()),
            reference: None,
        }
    }

    fn reference(bank_name: &str, reference: &str) -> Self {
        Self {
            bank_name: bank_name.to_string(),
            note: None,
            reference: Some(reference.to_string()),
        }
    }
}

/// A named source of per-bank data.
pub trait ExtractionRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Values this source holds for `stage`, in the source's own order.
    fn extract(&self, ctx: &BankContext<'_>, stage: Stage) -> Vec<Extracted>;
}

/// Flattened `"Bank: value"` text stored on the deal, keyed by stage name.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyTextRule;

impl ExtractionRule for LegacyTextRule {
    fn name(&self) -> &'static str {
        "legacy_text"
    }

    fn extract(&self, ctx: &BankContext<'_>, stage: Stage) -> Vec<Extracted> {
        let mut out = Vec::new();
        for (key, text) in &ctx.deal.bank_notes {
            if normalize(key) == stage {
                out.extend(parse_bank_text(text).iter().map(|(b, v)| Extracted::note(b, v)));
            }
        }
        for (key, text) in &ctx.deal.bank_refs {
            if normalize(key) == stage {
                out.extend(
                    parse_bank_text(text)
                        .iter()
                        .map(|(b, v)| Extracted::reference(b, v)),
                );
            }
        }
        out
    }
}

/// Stage-tagged note rows. Global rows come first so rows tagged with the
/// exact stage win.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageNoteRule;

impl ExtractionRule for StageNoteRule {
    fn name(&self) -> &'static str {
        "stage_notes"
    }

    fn extract(&self, ctx: &BankContext<'_>, stage: Stage) -> Vec<Extracted> {
        fn is_global(row: &StageNoteRecord) -> bool {
            row.stage.trim().eq_ignore_ascii_case(GLOBAL_STAGE)
        }
        let global = ctx.stage_notes.iter().filter(|r| is_global(r));
        let tagged = ctx
            .stage_notes
            .iter()
            .filter(|r| !is_global(r) && normalize(&r.stage) == stage);

        global
            .chain(tagged)
            .map(|row| Extracted {
                bank_name: row.bank_name.clone(),
                note: Some(row.bank_notes.clone()),
                reference: row.reference.clone(),
            })
            .collect()
    }
}

/// Per-bank sub-records, composed into display text.
#[derive(Debug, Clone, Copy, Default)]
pub struct BankRecordRule;

impl ExtractionRule for BankRecordRule {
    fn name(&self) -> &'static str {
        "bank_records"
    }

    fn extract(&self, ctx: &BankContext<'_>, _stage: Stage) -> Vec<Extracted> {
        ctx.bank_records
            .iter()
            .map(|record| Extracted {
                bank_name: record.bank_name.clone(),
                note: Some(compose_bank_note(record)),
                reference: record.reference_number.clone(),
            })
            .collect()
    }
}

/// The payload of the most recent move into the stage.
///
/// Reads the `bank_by_name` / `bank_ref_by_name` maps, falling back to the
/// flattened `bank_notes` / `bank_refs` text older payloads carry.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryPayloadRule;

impl ExtractionRule for HistoryPayloadRule {
    fn name(&self) -> &'static str {
        "history_payload"
    }

    fn extract(&self, ctx: &BankContext<'_>, stage: Stage) -> Vec<Extracted> {
        let Some(entry) = ctx
            .deal
            .move_history
            .iter()
            .rev()
            .find(|h| normalize(&h.to) == stage)
        else {
            return Vec::new();
        };

        let data = &entry.data;
        let mut out = Vec::new();
        match data.get("bank_by_name").and_then(|v| v.as_object()) {
            Some(map) => out.extend(
                map.iter()
                    .map(|(b, v)| Extracted::note(b, &scalar_text(v))),
            ),
            None => {
                if let Some(text) = data.get("bank_notes").and_then(|v| v.as_str()) {
                    out.extend(parse_bank_text(text).iter().map(|(b, v)| Extracted::note(b, v)));
                }
            }
        }
        match data.get("bank_ref_by_name").and_then(|v| v.as_object()) {
            Some(map) => out.extend(
                map.iter()
                    .map(|(b, v)| Extracted::reference(b, &scalar_text(v))),
            ),
            None => {
                if let Some(text) = data.get("bank_refs").and_then(|v| v.as_str()) {
                    out.extend(
                        parse_bank_text(text)
                            .iter()
                            .map(|(b, v)| Extracted::reference(b, v)),
                    );
                }
            }
        }
        out
    }
}

// ── Reconciler ───────────────────────────────────────────────────────────────

/// Applies extraction rules in precedence order.
pub struct Reconciler {
    rules: Vec<Box<dyn ExtractionRule>>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl Reconciler {
    /// Legacy text, stage notes, bank sub-records, then the latest payload.
    pub fn standard() -> Self {
        Self::with_rules(vec![
            Box::new(LegacyTextRule),
            Box::new(StageNoteRule),
            Box::new(BankRecordRule),
            Box::new(HistoryPayloadRule),
        ])
    }

    /// Rules are applied first to last; later rules win.
    pub fn with_rules(rules: Vec<Box<dyn ExtractionRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Reconcile every source into one view for `stage`.
    ///
    /// Declared banks are always listed, except for `aip` where a bank is
    /// listed only when some rule names it.
    pub fn reconcile(&self, ctx: &BankContext<'_>, stage: Stage) -> ReconciledBanks {
        let extracted: Vec<Extracted> = self
            .rules
            .iter()
            .flat_map(|rule| rule.extract(ctx, stage))
            .collect();

        let mut view = ReconciledBanks::new();
        for name in declared_bank_names(ctx.deal, ctx.bank_records) {
            let named_by_rule = extracted.iter().any(|e| bank_key(&e.bank_name) == bank_key(&name));
            if stage != Stage::Aip || named_by_rule {
                view.ensure(&name);
            }
        }

        for e in extracted {
            let Some(bank) = view.ensure(&e.bank_name) else {
                continue;
            };
            if let Some(note) = non_blank(e.note) {
                bank.note = note;
            }
            if let Some(reference) = non_blank(e.reference) {
                bank.reference = reference;
            }
        }
        view
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Text of a scalar payload value. Older clients wrote numeric references.
fn scalar_text(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Bank names declared on a deal, deduplicated case-insensitively.
///
/// Falls back to the sub-record names when the deal declares none. The
/// legacy `"Multiple"` placeholder is never a bank.
pub fn declared_bank_names(deal: &DealRecord, bank_records: &[BankRecord]) -> Vec<String> {
    let names = dedupe_bank_names(deal.banks.iter().map(String::as_str));
    if !names.is_empty() {
        return names;
    }
    dedupe_bank_names(bank_records.iter().map(|b| b.bank_name.as_str()))
}

/// Trim, drop blanks and placeholders, and keep the first casing seen.
pub fn dedupe_bank_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(MULTIPLE_BANKS) {
            continue;
        }
        if !out.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            out.push(name.to_string());
        }
    }
    out
}

/// Parse `"Bank Name: value"` lines. Each line splits at its first `:`;
/// lines with a blank name or value are skipped.
pub fn parse_bank_text(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Serialize a bank map to `"Bank Name: value"` lines, dropping blank values.
pub fn bank_map_to_text(map: &BTreeMap<String, String>) -> String {
    map.iter()
        .filter_map(|(name, value)| {
            let value = value.trim();
            (!value.is_empty()).then(|| format!("{}: {}", name.trim(), value))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compose a sub-record's detail fields into one display note.
pub fn compose_bank_note(record: &BankRecord) -> String {
    let text = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or_default().to_string();

    let contact = [&record.contact_name, &record.contact_tel, &record.contact_email]
        .into_iter()
        .map(text)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let attorney = text(&record.attorney);

    let mut lines = Vec::new();
    let notes = text(&record.bank_notes);
    if !notes.is_empty() {
        lines.push(notes);
    }
    if !contact.is_empty() {
        lines.push(format!("Contact: {}", contact));
    }
    if !attorney.is_empty() {
        lines.push(format!("Attorney: {}", attorney));
    }
    let attorney_note = text(&record.attorney_note);
    if !attorney_note.is_empty() {
        lines.push(attorney_note);
    }
    lines.join("\n")
}
