//! Stage payloads: the structured data captured for a transition.
//!
//! A [`StageForm`] holds in-progress capture state (seeded from the
//! reconciled bank view), [`StageForm::build`] turns it into a
//! [`StagePayload`], and [`StagePayload::confirm`] marks it as explicitly
//! confirmed by the user. Only a [`ConfirmedPayload`] is accepted by the
//! move executor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bank::{bank_map_to_text, ReconciledBanks};
use crate::clock::Clock;
use crate::stage::Stage;

/// NTU reason that carries a free-text explanation.
pub const NTU_REASON_OTHER: &str = "Other";

/// A timestamped note added during capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteItem {
    pub ts: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttorneyDetails {
    pub name: String,
    pub firm: String,
    pub tel: String,
    pub email: String,
}

impl AttorneyDetails {
    pub fn is_empty(&self) -> bool {
        [&self.name, &self.firm, &self.tel, &self.email]
            .iter()
            .all(|v| v.trim().is_empty())
    }

    /// `Name (Firm) Tel: x Email: y`, with empty parts omitted.
    pub fn compose(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(name) = self.display_name() {
            parts.push(name);
        }
        let tel = self.tel.trim();
        if !tel.is_empty() {
            parts.push(format!("Tel: {}", tel));
        }
        let email = self.email.trim();
        if !email.is_empty() {
            parts.push(format!("Email: {}", email));
        }
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    /// `Name (Firm)`, with empty parts omitted.
    pub fn display_name(&self) -> Option<String> {
        let name = self.name.trim();
        let firm = self.firm.trim();
        let composed = match (name.is_empty(), firm.is_empty()) {
            (true, true) => return None,
            (false, true) => name.to_string(),
            (true, false) => format!("({})", firm),
            (false, false) => format!("{} ({})", name, firm),
        };
        Some(composed)
    }
}

/// Per-bank data shared by every bank-carrying payload.
///
/// `bank_notes` / `bank_refs` / `notes` are text serializations of the maps
/// and the note list, kept for readers of the flattened format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankSection {
    pub bank_notes: String,
    pub bank_refs: String,
    pub notes: String,
    pub bank_by_name: BTreeMap<String, String>,
    pub bank_ref_by_name: BTreeMap<String, String>,
    pub notes_items: Vec<NoteItem>,
}

impl BankSection {
    fn new(
        bank_by_name: BTreeMap<String, String>,
        bank_ref_by_name: BTreeMap<String, String>,
        notes_items: Vec<NoteItem>,
    ) -> Self {
        Self {
            bank_notes: bank_map_to_text(&bank_by_name),
            bank_refs: bank_map_to_text(&bank_ref_by_name),
            notes: notes_to_text(&notes_items),
            bank_by_name,
            bank_ref_by_name,
            notes_items,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedPayload {
    #[serde(flatten)]
    pub banks: BankSection,
    #[serde(default)]
    pub conditions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructedPayload {
    #[serde(flatten)]
    pub banks: BankSection,
    #[serde(default)]
    pub attorney_details: AttorneyDetails,
    #[serde(default)]
    pub attorney: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub estimated_reg_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationsPayload {
    #[serde(flatten)]
    pub banks: BankSection,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default)]
    pub registration_attorney_reference: Option<String>,
    #[serde(default)]
    pub attorney_details: AttorneyDetails,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub payment_due_date: Option<String>,
    #[serde(default)]
    pub agent_comm_paid: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NtuPayload {
    #[serde(default)]
    pub ntu_reason: Option<String>,
    /// Set only when the reason is `"Other"`.
    #[serde(default)]
    pub ntu_note: Option<String>,
    #[serde(default)]
    pub notes_items: Vec<NoteItem>,
}

/// Data captured for one transition, shaped by its target stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum StagePayload {
    Aip(BankSection),
    Granted(GrantedPayload),
    Instructed(InstructedPayload),
    Registrations(RegistrationsPayload),
    Ntu(NtuPayload),
}

impl StagePayload {
    pub fn stage(&self) -> Stage {
        match self {
            StagePayload::Aip(_) => Stage::Aip,
            StagePayload::Granted(_) => Stage::Granted,
            StagePayload::Instructed(_) => Stage::Instructed,
            StagePayload::Registrations(_) => Stage::Registrations,
            StagePayload::Ntu(_) => Stage::Ntu,
        }
    }

    /// The per-bank section, for payloads that carry one.
    pub fn bank_section(&self) -> Option<&BankSection> {
        match self {
            StagePayload::Aip(banks) => Some(banks),
            StagePayload::Granted(p) => Some(&p.banks),
            StagePayload::Instructed(p) => Some(&p.banks),
            StagePayload::Registrations(p) => Some(&p.banks),
            StagePayload::Ntu(_) => None,
        }
    }

    /// Record that the user explicitly confirmed this payload.
    pub fn confirm(self) -> ConfirmedPayload {
        ConfirmedPayload(self)
    }
}

/// A payload the user has explicitly confirmed. Only obtainable through
/// [`StagePayload::confirm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConfirmedPayload(StagePayload);

impl ConfirmedPayload {
    pub fn stage(&self) -> Stage {
        self.0.stage()
    }

    pub fn payload(&self) -> &StagePayload {
        &self.0
    }

    pub fn into_inner(self) -> StagePayload {
        self.0
    }
}

// ── Capture form ─────────────────────────────────────────────────────────────

/// In-progress capture state for one target stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageForm {
    stage: Stage,
    pub bank_notes: BTreeMap<String, String>,
    pub bank_refs: BTreeMap<String, String>,
    notes_items: Vec<NoteItem>,
    pub conditions: String,
    pub attorney: AttorneyDetails,
    pub estimated_reg_date: String,
    pub registration_number: String,
    pub registration_reference: String,
    pub payment_due_date: String,
    pub agent_comm_paid: bool,
    pub ntu_reason: String,
    pub ntu_other_note: String,
}

impl StageForm {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            bank_notes: BTreeMap::new(),
            bank_refs: BTreeMap::new(),
            notes_items: Vec::new(),
            conditions: String::new(),
            attorney: AttorneyDetails::default(),
            estimated_reg_date: String::new(),
            registration_number: String::new(),
            registration_reference: String::new(),
            payment_due_date: String::new(),
            agent_comm_paid: false,
            ntu_reason: String::new(),
            ntu_other_note: String::new(),
        }
    }

    /// A form whose bank inputs are pre-filled from the reconciled view.
    pub fn seeded(stage: Stage, banks: &ReconciledBanks) -> Self {
        let mut form = Self::new(stage);
        form.bank_notes = banks.note_map();
        form.bank_refs = banks.reference_map();
        form
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn set_bank_note(&mut self, bank_name: &str, text: &str) {
        self.bank_notes
            .insert(bank_name.trim().to_string(), text.to_string());
    }

    pub fn set_bank_reference(&mut self, bank_name: &str, text: &str) {
        self.bank_refs
            .insert(bank_name.trim().to_string(), text.to_string());
    }

    /// Append a note stamped with the current time. Blank text is ignored.
    /// Returns whether a note was added.
    pub fn add_note(&mut self, text: &str, clock: &dyn Clock) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.notes_items.push(NoteItem {
            ts: clock.now_rfc3339(),
            text: text.to_string(),
        });
        true
    }

    pub fn notes_items(&self) -> &[NoteItem] {
        &self.notes_items
    }

    /// Build the payload for the form's stage. `submitted` captures nothing.
    pub fn build(&self) -> Option<StagePayload> {
        let banks = || {
            BankSection::new(
                trimmed_map(&self.bank_notes),
                trimmed_map(&self.bank_refs),
                self.notes_items.clone(),
            )
        };
        let payload = match self.stage {
            Stage::Submitted => return None,
            Stage::Aip => StagePayload::Aip(banks()),
            Stage::Granted => StagePayload::Granted(GrantedPayload {
                banks: banks(),
                conditions: non_blank(&self.conditions),
            }),
            Stage::Instructed => StagePayload::Instructed(InstructedPayload {
                banks: banks(),
                attorney: self.attorney.compose(),
                attorney_details: trimmed_attorney(&self.attorney),
                estimated_reg_date: truncate_date(&self.estimated_reg_date),
            }),
            Stage::Registrations => StagePayload::Registrations(RegistrationsPayload {
                banks: banks(),
                registration_number: non_blank(&self.registration_number),
                registration_attorney_reference: non_blank(&self.registration_reference),
                attorney_details: trimmed_attorney(&self.attorney),
                payment_due_date: truncate_date(&self.payment_due_date),
                agent_comm_paid: self.agent_comm_paid,
            }),
            Stage::Ntu => {
                let ntu_reason = non_blank(&self.ntu_reason);
                let ntu_note = match ntu_reason.as_deref() {
                    Some(NTU_REASON_OTHER) => non_blank(&self.ntu_other_note),
                    _ => None,
                };
                StagePayload::Ntu(NtuPayload {
                    ntu_reason,
                    ntu_note,
                    notes_items: self.notes_items.clone(),
                })
            }
        };
        Some(payload)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// `"<ts> - <text>"` per note.
pub fn notes_to_text(items: &[NoteItem]) -> String {
    items
        .iter()
        .map(|n| format!("{} - {}", n.ts, n.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep only the `YYYY-MM-DD` prefix of a date or timestamp. Blank is `None`.
pub fn truncate_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(raw.chars().take(10).collect())
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn trimmed_map(map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.iter()
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

fn trimmed_attorney(details: &AttorneyDetails) -> AttorneyDetails {
    AttorneyDetails {
        name: details.name.trim().to_string(),
        firm: details.firm.trim().to_string(),
        tel: details.tel.trim().to_string(),
        email: details.email.trim().to_string(),
    }
}
