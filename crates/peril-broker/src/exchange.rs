//! Exchanges and their bindings.

use peril_protocol::ExchangeKind;
use peril_protocol::routing::topic_matches;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Binding {
    pub(crate) queue: String,
    pub(crate) key: String,
}

/// A named router. Holds bindings only, never messages.
#[derive(Debug)]
pub(crate) struct Exchange {
    pub(crate) kind: ExchangeKind,
    bindings: Vec<Binding>,
}

impl Exchange {
    pub(crate) fn new(kind: ExchangeKind) -> Self {
        Self {
            kind,
            bindings: Vec::new(),
        }
    }

    /// Adds a binding. Binding the same queue with the same key twice is a
    /// no-op.
    pub(crate) fn bind(&mut self, queue: &str, key: &str) {
        let exists = self
            .bindings
            .iter()
            .any(|b| b.queue == queue && b.key == key);
        if !exists {
            self.bindings.push(Binding {
                queue: queue.to_string(),
                key: key.to_string(),
            });
        }
    }

    /// Drops every binding that targets `queue`.
    pub(crate) fn unbind_queue(&mut self, queue: &str) {
        self.bindings.retain(|b| b.queue != queue);
    }

    /// Names of the queues a message with `routing_key` lands in.
    ///
    /// A queue bound by several matching keys still receives one copy.
    pub(crate) fn route(&self, routing_key: &str) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        for binding in &self.bindings {
            let matched = match self.kind {
                ExchangeKind::Direct => binding.key == routing_key,
                ExchangeKind::Topic => topic_matches(&binding.key, routing_key),
                ExchangeKind::Fanout => true,
            };
            if matched && !targets.contains(&binding.queue) {
                targets.push(binding.queue.clone());
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_needs_exact_key() {
        let mut exchange = Exchange::new(ExchangeKind::Direct);
        exchange.bind("pause.alice", "pause");
        assert_eq!(exchange.route("pause"), vec!["pause.alice"]);
        assert!(exchange.route("pause.alice").is_empty());
    }

    #[test]
    fn test_topic_fans_out_to_every_matching_queue() {
        let mut exchange = Exchange::new(ExchangeKind::Topic);
        exchange.bind("war.alice", "war.*");
        exchange.bind("war.bob", "war.*");
        exchange.bind("army_moves.alice", "army_moves.*");
        let mut routed = exchange.route("war.alice");
        routed.sort();
        assert_eq!(routed, vec!["war.alice", "war.bob"]);
    }

    #[test]
    fn test_overlapping_bindings_deliver_once() {
        let mut exchange = Exchange::new(ExchangeKind::Topic);
        exchange.bind("audit", "war.*");
        exchange.bind("audit", "#");
        assert_eq!(exchange.route("war.alice"), vec!["audit"]);
    }

    #[test]
    fn test_fanout_ignores_key() {
        let mut exchange = Exchange::new(ExchangeKind::Fanout);
        exchange.bind("peril_dlq", "");
        assert_eq!(exchange.route("army_moves.bob"), vec!["peril_dlq"]);
    }

    #[test]
    fn test_duplicate_bind_and_unbind() {
        let mut exchange = Exchange::new(ExchangeKind::Direct);
        exchange.bind("q", "k");
        exchange.bind("q", "k");
        assert_eq!(exchange.bindings.len(), 1);
        exchange.unbind_queue("q");
        assert!(exchange.route("k").is_empty());
    }
}
