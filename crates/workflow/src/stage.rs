//! Canonical pipeline stages and the normalizer that maps every stored or
//! user-supplied spelling onto them.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One of the six canonical pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Stage {
    #[default]
    Submitted,
    Aip,
    Granted,
    Instructed,
    Registrations,
    Ntu,
}

impl Stage {
    /// All stages in pipeline order, with the `ntu` exit last.
    pub const ALL: [Stage; 6] = [
        Stage::Submitted,
        Stage::Aip,
        Stage::Granted,
        Stage::Instructed,
        Stage::Registrations,
        Stage::Ntu,
    ];

    /// Canonical lowercase name, as persisted.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Submitted => "submitted",
            Stage::Aip => "aip",
            Stage::Granted => "granted",
            Stage::Instructed => "instructed",
            Stage::Registrations => "registrations",
            Stage::Ntu => "ntu",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Submitted => "Submitted",
            Stage::Aip => "AIP",
            Stage::Granted => "Granted",
            Stage::Instructed => "Instructed",
            Stage::Registrations => "Registrations",
            Stage::Ntu => "NTU",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Stage {
    fn from(raw: &str) -> Self {
        normalize(raw)
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(normalize_opt(raw.as_deref()))
    }
}

/// Map an arbitrary stage spelling to its canonical stage.
///
/// Case-insensitive and whitespace-trimmed. Known legacy aliases are folded
/// in; anything unrecognised (including the empty string) is `Submitted`.
pub fn normalize(raw: &str) -> Stage {
    match raw.trim().to_lowercase().as_str() {
        "submitted" => Stage::Submitted,
        "aip" | "arp" | "iap" => Stage::Aip,
        "granted" | "grant" | "approved" => Stage::Granted,
        "instructed" | "instructions" | "instruct" => Stage::Instructed,
        "registrations" | "registration" | "regs" | "reg" => Stage::Registrations,
        "ntu" => Stage::Ntu,
        _ => Stage::Submitted,
    }
}

/// [`normalize`] for values that may be absent.
pub fn normalize_opt(raw: Option<&str>) -> Stage {
    raw.map(normalize).unwrap_or_default()
}
