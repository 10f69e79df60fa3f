//! Editing session: the pad list plus the buffer of the selected pad.
//!
//! Selection changes go through [`switch_pad`], which is the only place the
//! outgoing buffer is persisted and the incoming one is loaded.

use mdpad_types::{ActiveBufferView, PadListing, SessionView};

use super::export::{self, PadExport};
use super::store::{validate_new_name, PadError, PadStore};
use crate::logging::Logger;

/// Editor content of the selected pad
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveBuffer {
    pub pad: String,
    pub content: String,
    /// Edited since the last load or flush
    pub dirty: bool,
}

impl ActiveBuffer {
    pub fn loaded(pad: impl Into<String>, content: String) -> Self {
        Self {
            pad: pad.into(),
            content,
            dirty: false,
        }
    }

    pub fn view(&self) -> ActiveBufferView {
        ActiveBufferView {
            pad: self.pad.clone(),
            content: self.content.clone(),
            dirty: self.dirty,
        }
    }
}

/// Move the editor from `current` to `next`.
///
/// 1. persists `current` if it is still a tracked pad,
/// 2. loads `next` from the store,
/// 3. returns the new buffer.
pub fn switch_pad(
    store: &PadStore,
    pads: &[String],
    current: &ActiveBuffer,
    next: &str,
) -> Result<ActiveBuffer, PadError> {
    if pads.iter().any(|p| *p == current.pad) {
        store.save_pad(&current.pad, &current.content)?;
    }
    let content = store.get_pad(next)?;
    Ok(ActiveBuffer::loaded(next, content))
}

pub struct PadSession {
    store: PadStore,
    pads: Vec<String>,
    active: ActiveBuffer,
    log: Logger,
}

impl PadSession {
    /// Load the list and open the home pad (or the first pad when home is gone)
    pub fn open(store: PadStore, log: Logger) -> Result<Self, PadError> {
        let pads = store.load_pad_list()?;
        let selected = initial_selection(&pads, &store.keys().home_pad);
        let content = store.get_pad(&selected)?;
        log.trace(format_args!("Loaded pad \"{}\"", selected));

        Ok(Self {
            store,
            pads,
            active: ActiveBuffer::loaded(selected, content),
            log,
        })
    }

    pub fn pads(&self) -> &[String] {
        &self.pads
    }

    pub fn active(&self) -> &ActiveBuffer {
        &self.active
    }

    pub fn store(&self) -> &PadStore {
        &self.store
    }

    pub fn listing(&self) -> PadListing {
        PadListing {
            pads: self.pads.clone(),
            selected: self.active.pad.clone(),
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            listing: self.listing(),
            active: self.active.view(),
        }
    }

    /// Switch the editor to `name`
    pub fn select(&mut self, name: &str) -> Result<&ActiveBuffer, PadError> {
        if !self.pads.iter().any(|p| p == name) {
            return Err(PadError::NotFound(name.to_string()));
        }
        self.log.trace(format_args!(
            "Switching from \"{}\" to \"{}\"",
            self.active.pad, name
        ));
        self.active = switch_pad(&self.store, &self.pads, &self.active, name)?;
        Ok(&self.active)
    }

    /// Replace the editor content; persisted on the next flush or switch
    pub fn edit(&mut self, content: String) {
        if content != self.active.content {
            self.active.content = content;
            self.active.dirty = true;
        }
    }

    /// Create a pad and select it
    pub fn create(&mut self, name: &str, content: &str) -> Result<&ActiveBuffer, PadError> {
        let name = self.store.create_pad(&mut self.pads, name, content)?;
        self.select(&name)
    }

    /// Create a pad from an uploaded file; the name defaults to the file stem
    pub fn import(
        &mut self,
        filename: &str,
        content: &str,
        name: Option<&str>,
    ) -> Result<&ActiveBuffer, PadError> {
        let name = match name {
            Some(n) => n.to_string(),
            None => export::pad_name_from_filename(filename),
        };
        self.create(&name, content)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<String, PadError> {
        let renaming_active = self.active.pad == from;
        if renaming_active && self.active.dirty {
            // Reject before touching the store
            if !self.pads.iter().any(|p| p == from) {
                return Err(PadError::NotFound(from.to_string()));
            }
            if to.trim() != from {
                validate_new_name(&self.pads, to)?;
            }
            // The store entry is about to move; carry unsaved edits with it
            self.store.save_pad(from, &self.active.content)?;
            self.active.dirty = false;
        }

        let name = self.store.rename_pad(&mut self.pads, from, to)?;
        if renaming_active {
            self.active.pad = name.clone();
        }
        Ok(name)
    }

    /// Delete a pad. Deleting the selected pad moves the editor to home.
    pub fn delete(&mut self, name: &str) -> Result<(), PadError> {
        self.store.delete_pad(&mut self.pads, name)?;

        if self.active.pad == name {
            let fallback = initial_selection(&self.pads, &self.store.keys().home_pad);
            // `name` is no longer tracked, so its buffer is dropped, not saved
            self.active = switch_pad(&self.store, &self.pads, &self.active, &fallback)?;
        }
        Ok(())
    }

    /// Persist the selected pad and the pad list
    pub fn flush(&mut self) -> Result<(), PadError> {
        if self.pads.iter().any(|p| *p == self.active.pad) {
            self.store.save_pad(&self.active.pad, &self.active.content)?;
        }
        self.store.save_pad_list(&self.pads)?;
        self.active.dirty = false;
        Ok(())
    }

    /// Markdown download of `name`; the selected pad exports its live buffer
    pub fn export(&self, name: &str) -> Result<PadExport, PadError> {
        if !self.pads.iter().any(|p| p == name) {
            return Err(PadError::NotFound(name.to_string()));
        }
        let content = if self.active.pad == name {
            self.active.content.clone()
        } else {
            self.store.get_pad(name)?
        };
        Ok(export::export_pad(name, content))
    }
}

fn initial_selection(pads: &[String], home: &str) -> String {
    if pads.iter().any(|p| p == home) {
        home.to_string()
    } else {
        pads.first().cloned().unwrap_or_else(|| home.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PadKeys;
    use crate::db::KvStore;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_session(dir: &tempfile::TempDir) -> PadSession {
        let kv = Arc::new(KvStore::new(dir.path().join("pads.db"), Logger::quiet("KV")));
        let store = PadStore::new(kv, PadKeys::default(), Logger::quiet("PADS"));
        PadSession::open(store, Logger::quiet("PADS")).unwrap()
    }

    #[test]
    fn test_open_fresh_session_selects_home() {
        let dir = tempdir().unwrap();
        let session = test_session(&dir);

        assert_eq!(session.pads(), ["home".to_string()]);
        assert_eq!(session.active().pad, "home");
        assert_eq!(session.active().content, "");
    }

    #[test]
    fn test_switch_pad_persists_tracked_current() {
        let dir = tempdir().unwrap();
        let kv = Arc::new(KvStore::new(dir.path().join("pads.db"), Logger::quiet("KV")));
        let store = PadStore::new(kv, PadKeys::default(), Logger::quiet("PADS"));
        let mut pads = vec!["home".to_string()];
        store.create_pad(&mut pads, "todo", "- laundry").unwrap();

        let current = ActiveBuffer {
            pad: "home".to_string(),
            content: "edited home".to_string(),
            dirty: true,
        };
        let next = switch_pad(&store, &pads, &current, "todo").unwrap();

        assert_eq!(next, ActiveBuffer::loaded("todo", "- laundry".to_string()));
        assert_eq!(store.get_pad("home").unwrap(), "edited home");
    }

    #[test]
    fn test_switch_pad_skips_untracked_current() {
        let dir = tempdir().unwrap();
        let kv = Arc::new(KvStore::new(dir.path().join("pads.db"), Logger::quiet("KV")));
        let store = PadStore::new(kv, PadKeys::default(), Logger::quiet("PADS"));
        let pads = vec!["home".to_string()];

        let current = ActiveBuffer::loaded("deleted", "stale".to_string());
        switch_pad(&store, &pads, &current, "home").unwrap();

        assert_eq!(store.kv().get("mdp_pad_deleted").unwrap(), None);
    }

    #[test]
    fn test_create_selects_new_pad() {
        let dir = tempdir().unwrap();
        let mut session = test_session(&dir);

        session.edit("home notes".to_string());
        session.create("todo", "").unwrap();

        assert_eq!(session.pads(), ["home".to_string(), "todo".to_string()]);
        assert_eq!(session.active().pad, "todo");
        let kv = session.store().kv();
        assert!(kv.get("mdp_pad_home").unwrap().is_some());
        assert!(kv.get("mdp_pad_todo").unwrap().is_some());
        assert_eq!(session.store().get_pad("home").unwrap(), "home notes");
    }

    #[test]
    fn test_rename_collision_leaves_session_unchanged() {
        let dir = tempdir().unwrap();
        let mut session = test_session(&dir);
        session.create("todo", "").unwrap();

        let err = session.rename("todo", "home").unwrap_err();

        assert!(err.is_rejection());
        assert_eq!(err.to_string(), "A pad named \"home\" already exists");
        assert_eq!(session.pads(), ["home".to_string(), "todo".to_string()]);
        assert_eq!(session.active().pad, "todo");
    }

    #[test]
    fn test_rejected_rename_keeps_unsaved_edits_out_of_store() {
        let dir = tempdir().unwrap();
        let mut session = test_session(&dir);
        session.create("todo", "- milk").unwrap();
        session.edit("- milk\n- eggs".to_string());

        assert!(session.rename("todo", "home").is_err());
        assert!(session.rename("todo", "  ").is_err());

        assert_eq!(session.store().get_pad("todo").unwrap(), "- milk");
        assert!(session.active().dirty);
        assert_eq!(session.active().content, "- milk\n- eggs");
    }

    #[test]
    fn test_rename_active_carries_unsaved_edits() {
        let dir = tempdir().unwrap();
        let mut session = test_session(&dir);
        session.create("draft", "v1").unwrap();
        session.edit("v2".to_string());

        session.rename("draft", "final").unwrap();

        assert_eq!(session.active().pad, "final");
        assert_eq!(session.store().get_pad("final").unwrap(), "v2");
        assert!(!session.active().dirty);
    }

    #[test]
    fn test_delete_active_falls_back_to_home() {
        let dir = tempdir().unwrap();
        let mut session = test_session(&dir);
        session.edit("welcome".to_string());
        session.create("todo", "x").unwrap();

        session.delete("todo").unwrap();

        assert_eq!(session.pads(), ["home".to_string()]);
        assert_eq!(session.active().pad, "home");
        assert_eq!(session.active().content, "welcome");
        assert_eq!(session.store().kv().get("mdp_pad_todo").unwrap(), None);
    }

    #[test]
    fn test_select_unknown_pad() {
        let dir = tempdir().unwrap();
        let mut session = test_session(&dir);
        assert!(matches!(session.select("nope"), Err(PadError::NotFound(_))));
    }

    #[test]
    fn test_flush_persists_buffer_and_list() {
        let dir = tempdir().unwrap();
        let mut session = test_session(&dir);
        session.edit("# Home".to_string());
        assert!(session.active().dirty);

        session.flush().unwrap();

        assert!(!session.active().dirty);
        assert_eq!(session.store().get_pad("home").unwrap(), "# Home");
        assert_eq!(session.store().load_pad_list().unwrap(), vec!["home"]);
    }

    #[test]
    fn test_import_uses_file_stem() {
        let dir = tempdir().unwrap();
        let mut session = test_session(&dir);

        session
            .import("notes/meeting-2024.md", "agenda", None)
            .unwrap();

        assert_eq!(session.active().pad, "meeting-2024");
        assert_eq!(session.active().content, "agenda");
    }

    #[test]
    fn test_export_uses_live_buffer_for_active_pad() {
        let dir = tempdir().unwrap();
        let mut session = test_session(&dir);
        session.edit("unsaved".to_string());

        let file = session.export("home").unwrap();
        assert_eq!(file.filename, "home.md");
        assert_eq!(file.body, "unsaved");
    }

    #[test]
    fn test_reopen_restores_list() {
        let dir = tempdir().unwrap();
        {
            let mut session = test_session(&dir);
            session.create("todo", "buy milk").unwrap();
            session.flush().unwrap();
        }
        let session = test_session(&dir);
        assert_eq!(session.pads(), ["home".to_string(), "todo".to_string()]);
        assert_eq!(session.active().pad, "home");
    }
}
