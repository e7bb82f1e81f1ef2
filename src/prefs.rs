//! Preference mirror.
//!
//! Exposes named key/value preference files as typed `{key, type, value}` entries
//! so a debugging front end can list, edit and remove them. Values arrive as text
//! and are validated against their declared type before anything is written.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Preference error types.
#[derive(Debug, Error)]
pub enum PrefsError {
    /// The value does not parse as its declared type.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The declared type is not one of the supported preference types.
    #[error("unknown preference type: {0}")]
    UnknownType(String),

    /// No preference file with this name exists.
    #[error("preference file not found: {0}")]
    NotFound(String),
}

/// Declared type of a preference value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum PrefType {
    Integer,
    Long,
    Float,
    Boolean,
    String,
    #[strum(serialize = "Set<String>")]
    #[serde(rename = "Set<String>")]
    StringSet,
}

/// A typed preference value.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefValue {
    Integer(i32),
    Long(i64),
    Float(f32),
    Boolean(bool),
    String(String),
    StringSet(BTreeSet<String>),
}

impl PrefValue {
    /// Parse `raw` as a value of type `kind`.
    ///
    /// # Errors
    /// Returns `PrefsError::MalformedInput` if `raw` does not fit the type, including
    /// integers outside the 32-bit (`Integer`) or 64-bit (`Long`) range.
    pub fn parse(kind: PrefType, raw: &str) -> Result<Self, PrefsError> {
        let trimmed = raw.trim();
        match kind {
            PrefType::Integer => parse_integer::<i32>(trimmed, "32-bit").map(Self::Integer),
            PrefType::Long => parse_integer::<i64>(trimmed, "64-bit").map(Self::Long),
            PrefType::Float => {
                let value: f32 = trimmed
                    .parse()
                    .map_err(|_| PrefsError::MalformedInput(format!("'{raw}' is not a float")))?;
                if !value.is_finite() {
                    return Err(PrefsError::MalformedInput(format!(
                        "'{raw}' is out of range for a float"
                    )));
                }
                Ok(Self::Float(value))
            }
            PrefType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" => Ok(Self::Boolean(true)),
                "false" => Ok(Self::Boolean(false)),
                _ => Err(PrefsError::MalformedInput(format!(
                    "'{raw}' is not a boolean"
                ))),
            },
            PrefType::String => Ok(Self::String(raw.to_string())),
            PrefType::StringSet => Ok(Self::StringSet(parse_set(raw))),
        }
    }

    pub fn pref_type(&self) -> PrefType {
        match self {
            Self::Integer(_) => PrefType::Integer,
            Self::Long(_) => PrefType::Long,
            Self::Float(_) => PrefType::Float,
            Self::Boolean(_) => PrefType::Boolean,
            Self::String(_) => PrefType::String,
            Self::StringSet(_) => PrefType::StringSet,
        }
    }

    /// Text form used in entries; sets render as `[a,b,c]`.
    pub fn to_text(&self) -> String {
        match self {
            Self::Integer(v) => v.to_string(),
            Self::Long(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Boolean(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::StringSet(items) => {
                format!("[{}]", items.iter().cloned().collect::<Vec<_>>().join(","))
            }
        }
    }
}

fn parse_integer<T>(raw: &str, width: &str) -> Result<T, PrefsError>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    use std::num::IntErrorKind;

    raw.parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => PrefsError::MalformedInput(
            format!("'{raw}' does not fit in a {width} integer"),
        ),
        _ => PrefsError::MalformedInput(format!("'{raw}' is not an integer")),
    })
}

fn parse_set(raw: &str) -> BTreeSet<String> {
    let inner = raw.trim();
    let inner = inner.strip_prefix('[').unwrap_or(inner);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    if inner.trim().is_empty() {
        return BTreeSet::new();
    }
    inner.split(',').map(|item| item.trim().to_string()).collect()
}

/// A preference as exchanged with callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefEntry {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl PrefEntry {
    pub fn new(key: impl Into<String>, kind: PrefType, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: kind.to_string(),
            value: value.into(),
        }
    }

    fn from_value(key: &str, value: &PrefValue) -> Self {
        Self::new(key, value.pref_type(), value.to_text())
    }
}

/// Backend holding named preference files.
pub trait PreferenceStore: Send + Sync {
    /// Names of all preference files.
    fn names(&self) -> Vec<String>;

    /// All values in a file, or `None` if it does not exist.
    fn get_all(&self, name: &str) -> Option<BTreeMap<String, PrefValue>>;

    /// Write one value, creating the file if needed.
    fn put(&self, name: &str, key: &str, value: PrefValue);

    /// Remove keys from a file; missing keys are ignored.
    fn remove(&self, name: &str, keys: &[String]);

    /// Delete a file. Returns `false` if it did not exist.
    fn drop_store(&self, name: &str) -> bool;
}

/// Validating front end over a [`PreferenceStore`].
pub struct PrefsMirror<S: PreferenceStore> {
    store: S,
}

impl<S: PreferenceStore> std::fmt::Debug for PrefsMirror<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefsMirror").finish_non_exhaustive()
    }
}

impl<S: PreferenceStore> PrefsMirror<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Preference file names, sorted case-insensitively.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.store.names();
        names.sort_by_key(|name| name.to_lowercase());
        names
    }

    /// All entries of a file, sorted by key.
    pub fn get_all(&self, name: &str) -> Result<Vec<PrefEntry>, PrefsError> {
        let values = self
            .store
            .get_all(name)
            .ok_or_else(|| PrefsError::NotFound(name.to_string()))?;
        Ok(values
            .iter()
            .map(|(key, value)| PrefEntry::from_value(key, value))
            .collect())
    }

    /// Validate `entry` and write it. Rejected input writes nothing.
    pub fn update(&self, name: &str, entry: &PrefEntry) -> Result<(), PrefsError> {
        let kind = PrefType::from_str(entry.kind.trim())
            .map_err(|_| PrefsError::UnknownType(entry.kind.clone()))?;
        let value = PrefValue::parse(kind, &entry.value)?;

        tracing::debug!(file = name, key = %entry.key, kind = %kind, "Preference updated");
        self.store.put(name, &entry.key, value);
        Ok(())
    }

    pub fn remove(&self, name: &str, keys: &[String]) {
        tracing::debug!(file = name, count = keys.len(), "Preferences removed");
        self.store.remove(name, keys);
    }

    pub fn drop_store(&self, name: &str) -> Result<(), PrefsError> {
        if self.store.drop_store(name) {
            tracing::info!(file = name, "Preference file dropped");
            Ok(())
        } else {
            Err(PrefsError::NotFound(name.to_string()))
        }
    }
}

/// Process-local preference backend.
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    files: RwLock<BTreeMap<String, BTreeMap<String, PrefValue>>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn names(&self) -> Vec<String> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files.keys().cloned().collect()
    }

    fn get_all(&self, name: &str) -> Option<BTreeMap<String, PrefValue>> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        files.get(name).cloned()
    }

    fn put(&self, name: &str, key: &str, value: PrefValue) {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn remove(&self, name: &str, keys: &[String]) {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = files.get_mut(name) {
            for key in keys {
                file.remove(key);
            }
        }
    }

    fn drop_store(&self, name: &str) -> bool {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        files.remove(name).is_some()
    }
}
