//! In-memory inbox: known message ids, fetched messages and display order.
//!
//! Every id in the known set has a fetched message behind it. A message whose fetch
//! failed is simply never inserted, so it stays unknown and the next poll retries it.

use crate::model::{MessageFull, MessageSummary};
use std::collections::{HashMap, HashSet, VecDeque};

/// Known messages of the active mailbox.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: HashMap<String, MessageFull>,
    known_ids: HashSet<String>,
    /// Display order, newest first.
    order: VecDeque<String>,
}

impl MessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every message.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.known_ids.clear();
        self.order.clear();
    }

    /// Returns `true` if the message has been fetched and stored.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.known_ids.contains(id)
    }

    /// Returns a stored message.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&MessageFull> {
        self.messages.get(id)
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.known_ids.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known_ids.is_empty()
    }

    /// Stores a message below the existing ones (initial load, provider order).
    ///
    /// Returns `false` if the id was already known; the store is left unchanged.
    pub fn append(&mut self, message: MessageFull) -> bool {
        self.insert(message, Placement::Bottom)
    }

    /// Stores a message on top of the existing ones (newly polled).
    ///
    /// Returns `false` if the id was already known; the store is left unchanged.
    pub fn prepend(&mut self, message: MessageFull) -> bool {
        self.insert(message, Placement::Top)
    }

    fn insert(&mut self, message: MessageFull, placement: Placement) -> bool {
        let id = message.id().to_string();
        if !self.known_ids.insert(id.clone()) {
            return false;
        }

        match placement {
            Placement::Top => self.order.push_front(id.clone()),
            Placement::Bottom => self.order.push_back(id.clone()),
        }
        self.messages.insert(id, message);
        true
    }

    /// Returns the polled summaries not yet known, oldest first.
    ///
    /// `polled` is newest first, as the provider lists it. Reversing means that
    /// prepending each result in turn leaves the newest message on top.
    /// Ids repeated within `polled` are reported once.
    #[must_use]
    pub fn compute_new_messages<'a>(
        &self,
        polled: &'a [MessageSummary],
    ) -> Vec<&'a MessageSummary> {
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for summary in polled {
            if !self.contains(&summary.id) && seen.insert(summary.id.as_str()) {
                fresh.push(summary);
            }
        }
        fresh.reverse();
        fresh
    }

    /// Iterates stored messages in display order, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &MessageFull> {
        self.order.iter().filter_map(|id| self.messages.get(id))
    }

    /// Returns message ids in display order, newest first.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Placement {
    Top,
    Bottom,
}
