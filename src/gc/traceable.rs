//! Size estimation for values kept alive on behalf of the guest.

use crate::host::{HostValue, ObjectPayload};

/// Bytes of host memory a value keeps alive.
///
/// The estimate only has to be stable: a guard accounts the figure once
/// at creation and returns the same figure on drop.
///
/// ```ignore
/// #[derive(DeriveExternalSize)]
/// #[gc(crate_path = "crate", self_size)]
/// struct Wrapper {
///     #[gc(track)]
///     payload: HostValue,
///     id: u64,
/// }
/// ```
pub trait ExternalSize {
    fn external_size(&self) -> usize;
}

impl ExternalSize for String {
    fn external_size(&self) -> usize {
        self.capacity()
    }
}

/// Shallow size of a host value: its own slot, its element slots, and the
/// bytes of inline strings and keys.
///
/// Nested aggregates count only their slot. Every aggregate that crosses to
/// the guest gets a wrapper of its own that accounts its own storage, so a
/// nested structure is counted once in total, not once per ancestor.
impl ExternalSize for HostValue {
    fn external_size(&self) -> usize {
        let slot = std::mem::size_of::<HostValue>();
        match self {
            HostValue::Array(a) => slot + a.to_vec().iter().map(inline_size).sum::<usize>(),
            HostValue::Hash(h) => {
                slot + h
                    .entries()
                    .iter()
                    .map(|(k, v)| k.len() + inline_size(v))
                    .sum::<usize>()
            }
            HostValue::Object(o) => {
                let fields = match o.payload() {
                    ObjectPayload::Fields(fields) => fields
                        .borrow()
                        .iter()
                        .map(|(k, v)| k.len() + inline_size(v))
                        .sum::<usize>(),
                    ObjectPayload::Foreign(_) => 0,
                };
                slot + o.class().len() + fields
            }
            other => inline_size(other),
        }
    }
}

fn inline_size(value: &HostValue) -> usize {
    let slot = std::mem::size_of::<HostValue>();
    match value {
        HostValue::Str(s) | HostValue::Opaque(s) => slot + s.len(),
        HostValue::Code(_) => slot + std::mem::size_of::<usize>() * 4,
        _ => slot,
    }
}
