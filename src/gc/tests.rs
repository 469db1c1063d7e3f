//! Tests for external memory accounting.

use super::*;
use crate::DeriveExternalSize;
use crate::host::{HostCode, HostValue};

#[derive(DeriveExternalSize)]
#[gc(crate_path = "crate")]
struct TestBuffer {
    #[gc(track)]
    data: String,
    #[gc(track)]
    name: String,
    #[allow(dead_code)]
    id: u64,
}

#[derive(DeriveExternalSize)]
#[gc(crate_path = "crate", self_size)]
struct SelfSized {
    #[gc(track)]
    name: String,
}

#[derive(DeriveExternalSize)]
#[gc(crate_path = "crate")]
#[allow(dead_code)]
enum TestPayload {
    Named {
        #[gc(track)]
        label: String,
        count: u32,
    },
    Positional(#[gc(track)] String, u8),
    Empty,
}

#[test]
fn test_derive_struct_counts_tracked_fields_only() {
    let buffer = TestBuffer {
        data: String::with_capacity(1000),
        name: String::with_capacity(100),
        id: 42,
    };

    assert_eq!(buffer.external_size(), 1100);
}

#[test]
fn test_derive_self_size() {
    let value = SelfSized {
        name: String::with_capacity(10),
    };

    assert_eq!(value.external_size(), std::mem::size_of::<SelfSized>() + 10);
}

#[test]
fn test_derive_enum_variants() {
    let named = TestPayload::Named {
        label: String::with_capacity(64),
        count: 3,
    };
    let positional = TestPayload::Positional(String::with_capacity(32), 1);

    assert_eq!(named.external_size(), 64);
    assert_eq!(positional.external_size(), 32);
    assert_eq!(TestPayload::Empty.external_size(), 0);
}

#[test]
fn test_host_value_size_grows_with_contents() {
    let small = HostValue::array([HostValue::Int(1)]);
    let large = HostValue::array((0..100).map(HostValue::Int));

    assert!(large.external_size() > small.external_size());
    assert!(HostValue::str("abcdef").external_size() >= 6);
}

#[test]
fn test_nested_aggregates_count_only_their_slot() {
    let slot = std::mem::size_of::<HostValue>();
    let inner = HostValue::array((0..100).map(HostValue::Int));
    let outer = HostValue::array([inner.clone()]);

    assert_eq!(inner.external_size(), slot * 101);
    assert_eq!(outer.external_size(), slot * 2);
}

#[test]
fn test_nested_depth_grows_size_linearly() {
    let slot = std::mem::size_of::<HostValue>();
    let mut levels = vec![HostValue::array([])];
    for _ in 0..50 {
        let parent = HostValue::array([levels[levels.len() - 1].clone()]);
        levels.push(parent);
    }

    // Summed over every wrapper a conversion would create.
    let total: usize = levels.iter().map(|v| v.external_size()).sum();
    assert_eq!(total, slot + 50 * slot * 2);
}

#[test]
fn test_host_value_size_terminates_on_cycles() {
    let array = HostValue::array([]);
    if let HostValue::Array(a) = &array {
        a.push(array.clone());
    }

    assert_eq!(array.external_size(), std::mem::size_of::<HostValue>() * 2);

    if let HostValue::Array(a) = &array {
        a.clear();
    }
}

#[test]
fn test_code_size_is_constant() {
    let code = HostValue::Code(HostCode::new(|_, _| Ok(HostValue::Undef)));
    assert_eq!(code.external_size(), code.clone().external_size());
}

#[test]
fn test_ledger_defers_without_lock() {
    let ledger = ExternalMemoryLedger::new();

    let guard = ExternalMemoryGuard::new(&ledger, 1000);
    assert_eq!(ledger.accounted(), 1000);
    assert_eq!(ledger.pending(), 1000);

    drop(guard);
    assert_eq!(ledger.accounted(), 0);
    assert_eq!(ledger.pending(), 0);
}

#[test]
fn test_guard_accounts_host_value_size() {
    let ledger = ExternalMemoryLedger::new();
    let value = HostValue::str("abcdef");

    let guard = ExternalMemoryGuard::new(&ledger, value.external_size() as i64);
    assert_eq!(ledger.accounted(), value.external_size() as i64);

    drop(guard);
    assert_eq!(ledger.accounted(), 0);
}

#[test]
fn test_retired_queue_releases_on_process() {
    struct Flag(std::rc::Rc<std::cell::Cell<bool>>);
    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let dropped = std::rc::Rc::new(std::cell::Cell::new(false));
    let queue = RetiredHandleQueue::new();
    queue.retire(Flag(dropped.clone()));

    assert_eq!(queue.len(), 1);
    assert!(!dropped.get());

    queue.process_all();
    assert!(dropped.get());
    assert!(queue.is_empty());
    assert_eq!(queue.released(), 1);
}

mod v8_tests {
    use super::super::*;

    #[test]
    fn test_js_lock_applies_pending_and_nests() {
        crate::platform::init(None);
        let mut isolate = v8::Isolate::new(Default::default());
        let ledger = ExternalMemoryLedger::new();

        let early = ExternalMemoryGuard::new(&ledger, 4096);
        assert_eq!(ledger.pending(), 4096);

        {
            let _outer = JsLock::new(&mut isolate, &ledger);
            assert_eq!(ledger.pending(), 0);
            assert!(ledger.is_attached());

            let during = ExternalMemoryGuard::new(&ledger, 512);
            assert_eq!(ledger.pending(), 0);

            {
                let _inner = JsLock::new(&mut isolate, &ledger);
                drop(during);
            }

            // Inner lock restored the outer attachment.
            assert!(ledger.is_attached());
            assert_eq!(ledger.pending(), 0);
        }

        assert!(!ledger.is_attached());
        drop(early);
        assert_eq!(ledger.pending(), -4096);
        assert_eq!(ledger.accounted(), 0);
    }
}
