//! Session Store
//!
//! Holds the in-memory [`Session`] and keeps it synchronized with a
//! [`KeyValueStore`]. Every mutation is applied synchronously and is visible
//! to the next read; persistence happens after each structural change, while
//! [`SessionStore::append_turn`] leaves it to the caller so that a reply and
//! its view update can be persisted together.

use flowchat_types::{
    decode_conversations, Conversation, Role, Session, Turn, CURRENT_CHAT_KEY, SESSION_KEY,
};

use crate::clock::{Clock, SystemClock};
use crate::storage::{self, KeyValueStore, StorageError};
use crate::view;

/// Reconstruct a session from storage.
///
/// Absent or malformed data yields an empty session.
pub fn load_session<S: KeyValueStore + ?Sized>(storage: &S) -> Session {
    let conversations = match storage.get(SESSION_KEY) {
        Ok(Some(raw)) => match decode_conversations(&raw) {
            Ok(conversations) => conversations,
            Err(e) => {
                log::warn!("Discarding unreadable chat history: {}", e);
                Vec::new()
            }
        },
        Ok(None) => Vec::new(),
        Err(e) => {
            log::warn!("Could not read chat history: {}", e);
            Vec::new()
        }
    };

    let current = match storage.get(CURRENT_CHAT_KEY) {
        Ok(current) => current,
        Err(e) => {
            log::warn!("Could not read current chat id: {}", e);
            None
        }
    };

    let session = Session::new(conversations, current);
    log::debug!(
        "Loaded {} conversations (current: {:?})",
        session.len(),
        session.current_id()
    );
    session
}

/// Write the conversation list and the current identifier.
///
/// The current-id key is removed when nothing is selected.
pub fn persist_session<S: KeyValueStore + ?Sized>(
    storage: &S,
    session: &Session,
) -> Result<(), StorageError> {
    storage::write_json(storage, SESSION_KEY, session.conversations())?;
    match session.current_id() {
        Some(id) => storage.set(CURRENT_CHAT_KEY, id),
        None => storage.remove(CURRENT_CHAT_KEY),
    }
}

pub struct SessionStore<S, C = SystemClock> {
    storage: S,
    clock: C,
    session: Session,
}

impl<S: KeyValueStore, C: Clock> SessionStore<S, C> {
    /// Load the persisted session from `storage`
    pub fn open(storage: S, clock: C) -> Self {
        let session = load_session(&storage);
        Self {
            storage,
            clock,
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.session.current()
    }

    /// Mutable access to the current conversation; changes are not persisted
    /// until the next [`persist`](Self::persist).
    pub fn current_mut(&mut self) -> Option<&mut Conversation> {
        self.session.current_mut()
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.session.get(id)
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.session.conversations()
    }

    /// Persist the whole session, logging failures
    pub fn persist(&self) -> Result<(), StorageError> {
        persist_session(&self.storage, &self.session).map_err(|e| {
            log::error!("Failed to persist chat history: {}", e);
            e
        })
    }

    fn persist_quietly(&self) {
        // Failures are already logged; the in-memory session stays authoritative.
        let _ = self.persist();
    }

    /// Create a conversation holding one user turn, make it current and persist
    pub fn start_conversation(&mut self, prompt: &str) -> &Conversation {
        let now = self.clock.now();
        let id = self.session.next_conversation_id(now);

        let mut conversation = Conversation::new(id.clone(), now);
        conversation.push(Turn::user(prompt, now));
        self.session.insert(conversation);
        self.session.set_current(Some(id.clone()));
        log::debug!("Started conversation {}", id);

        self.persist_quietly();
        let conversations = self.session.conversations();
        &conversations[conversations.len() - 1]
    }

    /// Append a timestamped turn to conversation `id`.
    ///
    /// Does not persist. Returns false when no such conversation exists.
    pub fn append_turn(&mut self, id: &str, role: Role, text: &str, is_error: bool) -> bool {
        let now = self.clock.now();
        let Some(conversation) = self.session.get_mut(id) else {
            log::warn!("Cannot append {} turn: conversation {} not found", role.as_str(), id);
            return false;
        };

        let mut turn = Turn::new(role, text, now);
        turn.is_error = is_error && role == Role::Assistant;
        conversation.push(turn);
        true
    }

    /// Remove conversation `id` and persist.
    ///
    /// If it was current, the most recently updated remaining conversation
    /// becomes current, or nothing when none remain.
    pub fn delete_conversation(&mut self, id: &str) -> Option<Conversation> {
        let removed = self.session.remove(id)?;

        if self.session.current_id() == Some(id) {
            let next = self
                .session
                .most_recently_updated()
                .map(|c| c.id().to_string());
            log::debug!("Deleted current conversation {}, now showing {:?}", id, next);
            self.session.set_current(next);
        } else {
            log::debug!("Deleted conversation {}", id);
        }

        self.persist_quietly();
        Some(removed)
    }

    /// Make an existing conversation current; unknown ids are ignored.
    pub fn select_conversation(&mut self, id: &str) -> bool {
        if !self.session.contains(id) {
            log::warn!("Ignoring selection of unknown conversation {}", id);
            return false;
        }
        self.session.set_current(Some(id.to_string()));
        self.persist_quietly();
        true
    }

    /// Return to the new-chat state
    pub fn clear_selection(&mut self) {
        self.session.set_current(None);
        self.persist_quietly();
    }

    /// Latest non-error assistant turn of the current conversation
    pub fn last_assistant_turn(&self) -> Option<&Turn> {
        self.session
            .current()?
            .turns()
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant && !turn.is_error)
    }

    /// Speakable text of [`last_assistant_turn`](Self::last_assistant_turn)
    pub fn last_assistant_reply(&self) -> Option<String> {
        self.last_assistant_turn()
            .map(|turn| view::speakable_text(&turn.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use chrono::{TimeDelta, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn store() -> SessionStore<Rc<MemoryStore>, Rc<ManualClock>> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        SessionStore::open(Rc::new(MemoryStore::new()), Rc::new(ManualClock::new(start)))
    }

    #[test]
    fn test_start_conversation_sets_current_and_persists() {
        let mut store = store();
        let id = store.start_conversation("Hello").id().to_string();

        let conversation = store.current().unwrap();
        assert_eq!(conversation.id(), id);
        assert_eq!(conversation.turns().len(), 1);
        assert_eq!(conversation.turns()[0].role, Role::User);
        assert_eq!(conversation.turns()[0].content, "Hello");

        let reloaded = load_session(store.storage());
        assert_eq!(&reloaded, store.session());
    }

    #[test]
    fn test_conversation_ids_are_unique_within_a_millisecond() {
        let mut store = store();
        let a = store.start_conversation("one").id().to_string();
        let b = store.start_conversation("two").id().to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn test_append_turn_does_not_persist() {
        let mut store = store();
        let id = store.start_conversation("Hello").id().to_string();
        assert!(store.append_turn(&id, Role::Assistant, "Hi there", false));

        let persisted = load_session(store.storage());
        assert_eq!(persisted.get(&id).unwrap().len(), 1);
        assert_eq!(store.get(&id).unwrap().len(), 2);

        assert!(!store.append_turn("chat_missing", Role::User, "x", false));
    }

    #[test]
    fn test_error_flag_ignored_for_user_turns() {
        let mut store = store();
        let id = store.start_conversation("Hello").id().to_string();
        store.append_turn(&id, Role::User, "again", true);
        assert!(!store.get(&id).unwrap().last_turn().unwrap().is_error);
    }

    #[test]
    fn test_delete_current_selects_most_recently_updated() {
        let mut store = store();
        let first = store.start_conversation("first").id().to_string();
        store.clock().advance(TimeDelta::minutes(1));
        let second = store.start_conversation("second").id().to_string();
        store.clock().advance(TimeDelta::minutes(1));
        let third = store.start_conversation("third").id().to_string();

        // Activity in the oldest conversation makes it the freshest.
        store.clock().advance(TimeDelta::minutes(1));
        store.append_turn(&first, Role::Assistant, "late", false);

        store.delete_conversation(&third).unwrap();
        assert_eq!(store.session().current_id(), Some(first.as_str()));

        store.delete_conversation(&first).unwrap();
        assert_eq!(store.session().current_id(), Some(second.as_str()));

        store.delete_conversation(&second).unwrap();
        assert_eq!(store.session().current_id(), None);
        assert!(store.session().is_empty());
        assert_eq!(store.storage().get(CURRENT_CHAT_KEY).unwrap(), None);
    }

    #[test]
    fn test_delete_non_current_keeps_selection() {
        let mut store = store();
        let first = store.start_conversation("first").id().to_string();
        let second = store.start_conversation("second").id().to_string();
        store.delete_conversation(&first);
        assert_eq!(store.session().current_id(), Some(second.as_str()));
        assert!(store.delete_conversation("chat_unknown").is_none());
    }

    #[test]
    fn test_select_and_clear() {
        let mut store = store();
        let first = store.start_conversation("first").id().to_string();
        store.start_conversation("second");

        assert!(store.select_conversation(&first));
        assert_eq!(
            store.storage().get(CURRENT_CHAT_KEY).unwrap().as_deref(),
            Some(first.as_str())
        );
        assert!(!store.select_conversation("chat_nope"));

        store.clear_selection();
        assert!(store.current().is_none());
    }

    #[test]
    fn test_load_tolerates_garbage() {
        let storage = MemoryStore::with_entries([(SESSION_KEY, "not json"), (CURRENT_CHAT_KEY, "chat_1")]);
        let session = load_session(&storage);
        assert!(session.is_empty());
        assert_eq!(session.current_id(), None);
    }

    #[test]
    fn test_last_assistant_turn_skips_errors() {
        let mut store = store();
        let id = store.start_conversation("Hello").id().to_string();
        assert!(store.last_assistant_turn().is_none());

        store.append_turn(&id, Role::Assistant, "**good** answer", false);
        store.append_turn(&id, Role::User, "more", false);
        store.append_turn(&id, Role::Assistant, "boom", true);
        assert_eq!(store.last_assistant_turn().unwrap().content, "**good** answer");
        assert_eq!(store.last_assistant_reply().as_deref(), Some("good answer"));
    }
}
