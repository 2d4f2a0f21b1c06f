//! Property tests: counters and the ledger agree after any operation sequence

use proptest::prelude::*;

use tiermem_core::{AllocatorConfig, AllocatorError, MemoryManager, Object, ObjectId};

#[derive(Debug, Clone)]
enum Op {
    Allocate { tag: u8, size: u64 },
    Free { tag: u8 },
    Collect,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0_u8..12, 0_u64..400).prop_map(|(tag, size)| Op::Allocate { tag, size }),
        2 => (0_u8..12).prop_map(|tag| Op::Free { tag }),
        1 => Just(Op::Collect),
    ]
}

fn object(tag: u8, size: u64) -> Object {
    Object::with_identity(&format!("object-{tag}"), size, Vec::new())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_used_bytes_equal_ledger_bytes(ops in prop::collection::vec(op(), 1..40)) {
        let config = AllocatorConfig::test().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let manager = MemoryManager::in_memory(config).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut live: Vec<ObjectId> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate { tag, size } => match manager.allocate(&object(tag, size)) {
                    Ok(id) => {
                        if !live.contains(&id) {
                            live.push(id);
                        }
                    }
                    Err(AllocatorError::RamExhausted { .. }) => {}
                    Err(err) => return Err(TestCaseError::fail(err.to_string())),
                },
                Op::Free { tag } => {
                    let id = object(tag, 0).id().clone();
                    match manager.free(&id) {
                        Ok(()) => live.retain(|candidate| candidate != &id),
                        Err(AllocatorError::ObjectNotFound { .. }) => {
                            prop_assert!(!live.contains(&id));
                        }
                        Err(err) => return Err(TestCaseError::fail(err.to_string())),
                    }
                }
                Op::Collect => {
                    manager.garbage_collect().map_err(|e| TestCaseError::fail(e.to_string()))?;
                }
            }

            let stats = manager.stats().map_err(|e| TestCaseError::fail(e.to_string()))?;
            let mut ledger_bytes = 0_u64;
            for id in &live {
                ledger_bytes += manager
                    .fragments_of(id)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?
                    .iter()
                    .map(|entry| entry.allocated_bytes)
                    .sum::<u64>();
            }
            prop_assert_eq!(stats.used_bytes, ledger_bytes);
            prop_assert_eq!(stats.object_count, live.len() as u64);
            prop_assert!(stats.used_bytes <= stats.ram_capacity);
            prop_assert!(manager.verify_integrity().is_ok());
        }
    }
}
