use crate::model::{Message, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageSort {
    /// Most widely propagated first.
    #[default]
    PeerCount,
    /// Slowest to propagate first.
    Spread,
    Hash,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    pub kind: Option<MessageType>,
    /// Case-insensitive substring of the hash or originating node.
    pub search: Option<String>,
    pub min_peers: usize,
    pub sort: MessageSort,
    pub limit: Option<usize>,
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        if let Some(kind) = self.kind {
            if message.kind != kind {
                return false;
            }
        }
        if message.peer_count < self.min_peers {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                message.hash.to_lowercase().contains(&needle)
                    || message
                        .orig_node
                        .as_deref()
                        .map(|n| n.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            }
            _ => true,
        }
    }
}

pub fn list_messages<'a>(messages: &'a [Message], filter: &MessageFilter) -> Vec<&'a Message> {
    let mut listed: Vec<&Message> = messages.iter().filter(|m| filter.matches(m)).collect();
    match filter.sort {
        MessageSort::PeerCount => listed.sort_by(|a, b| {
            b.peer_count
                .cmp(&a.peer_count)
                .then_with(|| a.hash.cmp(&b.hash))
        }),
        MessageSort::Spread => listed.sort_by(|a, b| {
            b.time_spread_ms
                .total_cmp(&a.time_spread_ms)
                .then_with(|| a.hash.cmp(&b.hash))
        }),
        MessageSort::Hash => listed.sort_by(|a, b| a.hash.cmp(&b.hash)),
    }
    if let Some(limit) = filter.limit {
        listed.truncate(limit);
    }
    listed
}
