//! Input fingerprinting for cached results.

use sha2::{Digest, Sha256};

use crate::template::{Bindings, SlotValue};

/// SHA-256 hex digest over the canonicalized bindings.
///
/// Bindings iterate in slot-name order (`BTreeMap`), so two identical
/// binding sets always produce the same fingerprint. Slot names and
/// values are length-prefixed to keep the encoding unambiguous.
pub fn fingerprint_bindings(bindings: &Bindings) -> String {
    let mut hasher = Sha256::new();
    for (slot, value) in bindings {
        let (tag, payload) = match value {
            SlotValue::Text(text) => ("t", text.as_str()),
            SlotValue::Asset(reference) => ("a", reference.as_str()),
        };
        hasher.update((slot.len() as u64).to_be_bytes());
        hasher.update(slot.as_bytes());
        hasher.update(tag.as_bytes());
        hasher.update((payload.len() as u64).to_be_bytes());
        hasher.update(payload.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
