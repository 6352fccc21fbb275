//! Routing engine - matches a published message to bound queues
//!
//! Pure selection logic: given an exchange kind, a routing key, and the
//! exchange's bindings, compute which queues receive a copy. Delivery
//! (cloning onto queue tails) happens in the broker.

use std::collections::HashSet;

use relayq_types::{Binding, ExchangeKind};

/// Select the target queues for a publish.
///
/// - `Fanout`: every bound queue, routing key and binding keys ignored.
/// - `Direct`: queues whose binding key is case-sensitive, exact-equal to
///   `routing_key`. No wildcards, no prefixes.
///
/// An empty result is not an error; the message is simply dropped. Each
/// queue appears at most once even if bound under several keys, so a
/// single publish never delivers the same message twice to one queue.
pub fn route(kind: ExchangeKind, routing_key: &str, bindings: &[Binding]) -> Vec<String> {
    let mut seen = HashSet::new();
    bindings
        .iter()
        .filter(|binding| match kind {
            ExchangeKind::Fanout => true,
            ExchangeKind::Direct => binding.binding_key == routing_key,
        })
        .filter(|binding| seen.insert(binding.queue.as_str()))
        .map(|binding| binding.queue.clone())
        .collect()
}
