//! PadStore: pad list and pad content on top of the key/value store
//!
//! Content lives under `pad_prefix + name`; the ordered name list lives under a
//! single key as a JSON-encoded array. Every mutation that touches both the
//! list and a content entry runs in one store transaction.

use serde_json::Value;
use std::sync::Arc;

use crate::config::PadKeys;
use crate::db::{KvStore, KvTable, StoreError};
use crate::logging::Logger;

#[derive(Debug, thiserror::Error)]
pub enum PadError {
    #[error("Pad name cannot be empty")]
    EmptyName,

    #[error("A pad named \"{0}\" already exists")]
    NameTaken(String),

    #[error("Pad not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PadError {
    /// Rejected user input, as opposed to a storage failure
    pub fn is_rejection(&self) -> bool {
        !matches!(self, PadError::Store(_))
    }
}

pub struct PadStore {
    kv: Arc<KvStore>,
    keys: PadKeys,
    log: Logger,
}

impl PadStore {
    pub fn new(kv: Arc<KvStore>, keys: PadKeys, log: Logger) -> Self {
        Self { kv, keys, log }
    }

    pub fn keys(&self) -> &PadKeys {
        &self.keys
    }

    pub fn kv(&self) -> &Arc<KvStore> {
        &self.kv
    }

    /// Load the stored pad list, or `[home]` when nothing has been saved yet
    pub fn load_pad_list(&self) -> Result<Vec<String>, PadError> {
        self.log.trace(format_args!("Loading list"));
        let stored = self.kv.get(&self.keys.list_key)?;
        match stored.map(decode_list).transpose()? {
            Some(pads) => Ok(pads),
            None => Ok(vec![self.keys.home_pad.clone()]),
        }
    }

    pub fn save_pad_list(&self, pads: &[String]) -> Result<(), PadError> {
        self.log.trace(format_args!("Saving list"));
        self.kv.set(&self.keys.list_key, &encode_list(pads)?)?;
        Ok(())
    }

    /// Content of `name`; a pad that was never saved reads as empty
    pub fn get_pad(&self, name: &str) -> Result<String, PadError> {
        self.log.trace(format_args!("Getting \"{}\"", name));
        let value = self.kv.get(&self.keys.content_key(name))?;
        Ok(content_of(value))
    }

    pub fn save_pad(&self, name: &str, content: &str) -> Result<(), PadError> {
        self.log.trace(format_args!("Saving \"{}\"", name));
        self.kv
            .set(&self.keys.content_key(name), &Value::String(content.to_string()))?;
        Ok(())
    }

    /// Append a new pad to `pads` and persist its content and the list.
    ///
    /// Returns the stored name (surrounding whitespace removed). On rejection
    /// neither `pads` nor the store is touched.
    pub fn create_pad(
        &self,
        pads: &mut Vec<String>,
        name: &str,
        content: &str,
    ) -> Result<String, PadError> {
        let name = validate_new_name(pads, name)?;

        let mut updated = pads.clone();
        updated.push(name.clone());

        self.kv.tx(|t| {
            t.set(
                &self.keys.content_key(&name),
                &Value::String(content.to_string()),
            )?;
            t.set(&self.keys.list_key, &encode_list(&updated)?)
        })?;

        *pads = updated;
        self.log.trace(format_args!("Created \"{}\"", name));
        Ok(name)
    }

    /// Rename `from` to `to`, moving its content entry to the new key.
    ///
    /// The list keeps its order; the renamed entry stays in place.
    pub fn rename_pad(
        &self,
        pads: &mut Vec<String>,
        from: &str,
        to: &str,
    ) -> Result<String, PadError> {
        let position = pads
            .iter()
            .position(|p| p == from)
            .ok_or_else(|| PadError::NotFound(from.to_string()))?;

        if to.trim() == from {
            return Ok(from.to_string());
        }
        let to = validate_new_name(pads, to)?;

        let mut updated = pads.clone();
        updated[position] = to.clone();

        self.kv.tx(|t| {
            let old_key = self.keys.content_key(from);
            let content = t.get(&old_key)?.unwrap_or_else(|| Value::String(String::new()));
            t.set(&self.keys.content_key(&to), &content)?;
            t.delete(&old_key)?;
            t.set(&self.keys.list_key, &encode_list(&updated)?)
        })?;

        *pads = updated;
        self.log
            .trace(format_args!("Renamed \"{}\" to \"{}\"", from, to));
        Ok(to)
    }

    /// Remove `name` from the list and delete its content.
    ///
    /// The list never ends up empty: the home pad is re-created instead.
    pub fn delete_pad(&self, pads: &mut Vec<String>, name: &str) -> Result<(), PadError> {
        if !pads.iter().any(|p| p == name) {
            return Err(PadError::NotFound(name.to_string()));
        }

        let mut updated: Vec<String> = pads.iter().filter(|p| *p != name).cloned().collect();
        let recreate_home = updated.is_empty();
        if recreate_home {
            updated.push(self.keys.home_pad.clone());
        }

        self.kv.tx(|t| {
            t.set(&self.keys.list_key, &encode_list(&updated)?)?;
            t.delete(&self.keys.content_key(name))?;
            if recreate_home {
                ensure_content(t, &self.keys.content_key(&self.keys.home_pad))?;
            }
            Ok(())
        })?;

        *pads = updated;
        self.log.trace(format_args!("Removed \"{}\"", name));
        Ok(())
    }
}

/// Trimmed, non-empty and not already in `pads`
pub fn validate_new_name(pads: &[String], name: &str) -> Result<String, PadError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PadError::EmptyName);
    }
    if pads.iter().any(|p| p == name) {
        return Err(PadError::NameTaken(name.to_string()));
    }
    Ok(name.to_string())
}

/// The list is stored as a JSON string holding the encoded array
fn encode_list(pads: &[String]) -> Result<Value, StoreError> {
    Ok(Value::String(serde_json::to_string(pads)?))
}

/// Accepts the encoded-string form and a bare JSON array
fn decode_list(value: Value) -> Result<Vec<String>, StoreError> {
    match value {
        Value::String(text) => Ok(serde_json::from_str(&text)?),
        other => Ok(serde_json::from_value(other)?),
    }
}

fn content_of(value: Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn ensure_content(t: &KvTable<'_>, key: &str) -> Result<(), StoreError> {
    if t.get(key)?.is_none() {
        t.set(key, &Value::String(String::new()))?;
    }
    Ok(())
}
