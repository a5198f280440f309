//! Free-form attributes and three-way field updates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockledger_core::ValueObject;

/// Closed set of value shapes an attribute may hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl ValueObject for MetadataValue {}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Ordered map so the serialized form is stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Update instruction for an optional field: leave it, clear it, or set it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    pub fn apply_to(&self, slot: &mut Option<T>)
    where
        T: Clone,
    {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(value) => *slot = Some(value.clone()),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `Some` sets, `None` clears.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_values_keep_their_shape() {
        let mut meta = Metadata::new();
        meta.insert("fragile".into(), true.into());
        meta.insert("weight_kg".into(), 2.5.into());
        meta.insert("origin".into(), "PT".into());

        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"fragile":true,"origin":"PT","weight_kg":2.5}"#);

        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn patch_distinguishes_keep_clear_and_set() {
        let mut slot = Some(3u32);
        Patch::Keep.apply_to(&mut slot);
        assert_eq!(slot, Some(3));

        Patch::Set(0).apply_to(&mut slot);
        assert_eq!(slot, Some(0));

        Patch::<u32>::Clear.apply_to(&mut slot);
        assert_eq!(slot, None);
    }
}
