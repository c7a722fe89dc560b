//! Merge a task's event log and chat list into one presentation sequence.
//!
//! A chat message anchored at `log_index = k` is emitted immediately before
//! log event `k`. Messages without an anchor, or anchored at or past the
//! current length, come after every log event. Anchors that point into the
//! pruned prefix of the log are emitted at the very beginning. The merge is
//! stable for both inputs.

use std::rc::Rc;

use crate::telemetry::event_log::TaskLog;
use crate::telemetry::types::{ChatMessage, TaskExecutionEvent};

/// Position of one feed item in its source list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedEntry {
    /// Absolute event-log index.
    Log(usize),
    /// Index into the task's chat list.
    Chat(usize),
}

/// A resolved, render-ready feed item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedItem<'a> {
    Log {
        index: usize,
        event: &'a TaskExecutionEvent,
    },
    Chat(&'a ChatMessage),
}

/// Everything the merge result depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub base: usize,
    pub len: usize,
    pub chat_len: usize,
    pub chat_generation: u64,
}

/// Interleave log positions `base..len` with `chats`.
pub fn interleave(base: usize, len: usize, chats: &[ChatMessage]) -> Vec<FeedEntry> {
    let mut anchored: Vec<(usize, usize)> = chats
        .iter()
        .enumerate()
        .map(|(pos, msg)| (effective_anchor(msg.log_index, base, len), pos))
        .collect();
    // Stable: messages sharing an anchor keep chat-list order.
    anchored.sort_by_key(|(anchor, _)| *anchor);

    let mut out = Vec::with_capacity(len.saturating_sub(base) + chats.len());
    let mut pending = anchored.into_iter().peekable();
    for index in base..len {
        while let Some((_, pos)) = pending.next_if(|(anchor, _)| *anchor == index) {
            out.push(FeedEntry::Chat(pos));
        }
        out.push(FeedEntry::Log(index));
    }
    out.extend(pending.map(|(_, pos)| FeedEntry::Chat(pos)));
    out
}

fn effective_anchor(log_index: Option<usize>, base: usize, len: usize) -> usize {
    match log_index {
        Some(k) if k >= len => len,
        Some(k) if k < base => base,
        Some(k) => k,
        None => len,
    }
}

/// Resolve entries against their sources. Entries whose source has since
/// disappeared are skipped.
pub fn resolve<'a>(
    entries: &[FeedEntry],
    log: Option<&'a TaskLog>,
    chats: &'a [ChatMessage],
) -> Vec<FeedItem<'a>> {
    entries
        .iter()
        .filter_map(|entry| match *entry {
            FeedEntry::Log(index) => log
                .and_then(|l| l.get(index))
                .map(|event| FeedItem::Log { index, event }),
            FeedEntry::Chat(pos) => chats.get(pos).map(FeedItem::Chat),
        })
        .collect()
}

/// Memo of the last merge for one task, keyed on `FeedKey`.
#[derive(Debug, Default)]
pub struct FeedCache {
    cached: Option<(FeedKey, Rc<[FeedEntry]>)>,
}

impl FeedCache {
    /// Return the cached merge when `key` matches, recomputing otherwise.
    pub fn get_or_compute(&mut self, key: FeedKey, chats: &[ChatMessage]) -> Rc<[FeedEntry]> {
        if let Some((cached_key, entries)) = &self.cached {
            if *cached_key == key {
                return Rc::clone(entries);
            }
        }
        let entries: Rc<[FeedEntry]> = interleave(key.base, key.len, chats).into();
        self.cached = Some((key, Rc::clone(&entries)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::chat::new_message;
    use crate::telemetry::types::ChatRole;

    fn msg(log_index: Option<usize>) -> ChatMessage {
        new_message(ChatRole::User, None, "m", vec![], log_index)
    }

    #[test]
    fn anchored_message_precedes_its_event() {
        let feed = interleave(0, 3, &[msg(Some(1))]);
        assert_eq!(
            feed,
            vec![
                FeedEntry::Log(0),
                FeedEntry::Chat(0),
                FeedEntry::Log(1),
                FeedEntry::Log(2),
            ]
        );
    }

    #[test]
    fn unanchored_and_past_end_messages_follow_all_events() {
        let chats = [msg(None), msg(Some(9)), msg(Some(0))];
        let feed = interleave(0, 2, &chats);
        assert_eq!(
            feed,
            vec![
                FeedEntry::Chat(2),
                FeedEntry::Log(0),
                FeedEntry::Log(1),
                FeedEntry::Chat(0),
                FeedEntry::Chat(1),
            ]
        );

        // More log growth keeps the unanchored message at the end.
        let grown = interleave(0, 4, &chats);
        assert_eq!(grown.last(), Some(&FeedEntry::Chat(0)));
        assert_eq!(grown[grown.len() - 2], FeedEntry::Log(3));
    }

    #[test]
    fn shared_anchor_keeps_chat_order() {
        let chats = [msg(Some(1)), msg(Some(1)), msg(Some(1))];
        let feed = interleave(0, 2, &chats);
        assert_eq!(
            feed,
            vec![
                FeedEntry::Log(0),
                FeedEntry::Chat(0),
                FeedEntry::Chat(1),
                FeedEntry::Chat(2),
                FeedEntry::Log(1),
            ]
        );
    }

    #[test]
    fn pruned_anchor_renders_first() {
        let chats = [msg(Some(2)), msg(Some(12))];
        let feed = interleave(10, 13, &chats);
        assert_eq!(
            feed,
            vec![
                FeedEntry::Chat(0),
                FeedEntry::Log(10),
                FeedEntry::Log(11),
                FeedEntry::Chat(1),
                FeedEntry::Log(12),
            ]
        );
    }

    #[test]
    fn empty_log_emits_chats_in_order() {
        let chats = [msg(Some(3)), msg(None)];
        assert_eq!(interleave(0, 0, &chats), vec![FeedEntry::Chat(0), FeedEntry::Chat(1)]);
    }

    #[test]
    fn cache_reuses_merge_for_same_key() {
        let chats = [msg(Some(1))];
        let mut cache = FeedCache::default();
        let key = FeedKey {
            base: 0,
            len: 3,
            chat_len: 1,
            chat_generation: 0,
        };
        let first = cache.get_or_compute(key, &chats);
        let second = cache.get_or_compute(key, &chats);
        assert!(Rc::ptr_eq(&first, &second));

        let grown = cache.get_or_compute(FeedKey { len: 4, ..key }, &chats);
        assert_eq!(grown.len(), 5);
    }
}
