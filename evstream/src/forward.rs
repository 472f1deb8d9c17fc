//! Re-emit selected events of one emitter on another

use crate::emitter::{Emitter, EventKind, ListenerId};

/// For each kind in `kinds`, re-emit `source`'s events of that kind, payload
/// included, on `target`. Other kinds are never forwarded.
///
/// The forwarders stay registered until the caller removes them from
/// `source` with the returned ids, one per kind in `kinds` order.
pub fn forward_events(source: &Emitter, target: &Emitter, kinds: &[EventKind]) -> Vec<ListenerId> {
    kinds
        .iter()
        .map(|&kind| {
            let target = target.clone();
            source.on(kind, move |event| {
                target.emit(event);
            })
        })
        .collect()
}
