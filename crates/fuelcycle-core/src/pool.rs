//! Capacity-bounded, order-preserving pools of resource batches.
//!
//! The facility owns three of these: the staging ("fresh") buffer, the
//! working ("core") buffer and the output ("spent") buffer. A pool never
//! holds more than its capacity; callers are expected to check
//! [`ResourcePool::space`] before pushing, and a push that would overflow
//! is rejected rather than clipped.
//!
//! Popping is by quantity and may split the boundary batch. The extracted
//! piece gets a fresh batch id and the split is reported back so the caller
//! can copy the parent's identity-index entry to the child; the in-pool
//! remainder keeps its original id. Read-only queries go through
//! [`ResourcePool::iter`], a genuinely non-mutating view.

use crate::fixed::Qty;
use crate::id::BatchId;
use crate::resource::{BatchIdGen, ResourceBatch};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Errors from pool operations. Both variants signal caller bugs, not
/// recoverable conditions.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("push of {pushed} exceeds pool capacity ({quantity} of {capacity} held)")]
    CapacityExceeded {
        pushed: Qty,
        quantity: Qty,
        capacity: Qty,
    },
    #[error("pop of {requested} exceeds pool quantity {quantity}")]
    InsufficientQuantity { requested: Qty, quantity: Qty },
}

/// Record of one batch split performed during a pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRecord {
    /// The batch that stayed in the pool (keeps its id and index entry).
    pub parent: BatchId,
    /// The freshly-created piece that was popped.
    pub child: BatchId,
}

/// Result of a quantity pop: the removed batches in pool order, plus any
/// splits the pop performed.
#[derive(Debug, Default)]
pub struct Popped {
    pub batches: Vec<ResourceBatch>,
    pub splits: Vec<SplitRecord>,
}

impl Popped {
    /// Total quantity removed.
    pub fn quantity(&self) -> Qty {
        self.batches.iter().map(|b| b.quantity()).sum()
    }
}

/// An ordered pool of batches with a quantity ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    batches: VecDeque<ResourceBatch>,
    capacity: Qty,
}

impl ResourcePool {
    pub fn new(capacity: Qty) -> Self {
        Self {
            batches: VecDeque::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> Qty {
        self.capacity
    }

    /// Current total quantity held.
    pub fn quantity(&self) -> Qty {
        self.batches.iter().map(|b| b.quantity()).sum()
    }

    /// Free capacity remaining.
    pub fn space(&self) -> Qty {
        self.capacity - self.quantity()
    }

    /// Number of batches held.
    pub fn count(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Non-mutating view of the held batches in order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceBatch> {
        self.batches.iter()
    }

    /// Append a batch. Fails if the resulting quantity would exceed the
    /// capacity; the pool is untouched on failure.
    pub fn push(&mut self, batch: ResourceBatch) -> Result<(), PoolError> {
        let quantity = self.quantity();
        if quantity + batch.quantity() > self.capacity {
            return Err(PoolError::CapacityExceeded {
                pushed: batch.quantity(),
                quantity,
                capacity: self.capacity,
            });
        }
        self.batches.push_back(batch);
        Ok(())
    }

    /// Remove exactly `qty` from the front of the pool, splitting the
    /// boundary batch if needed. Fails without mutation if `qty` exceeds the
    /// held quantity.
    pub fn pop(&mut self, qty: Qty, ids: &mut BatchIdGen) -> Result<Popped, PoolError> {
        let quantity = self.quantity();
        if qty > quantity {
            return Err(PoolError::InsufficientQuantity {
                requested: qty,
                quantity,
            });
        }

        let mut popped = Popped::default();
        let mut need = qty;
        while need > Qty::ZERO {
            // Loop terminates: the quantity check above guarantees batches
            // cover `need`.
            let front = self
                .batches
                .front_mut()
                .expect("pool quantity covers the requested pop");
            if front.quantity() <= need {
                need -= front.quantity();
                popped.batches.push(self.batches.pop_front().unwrap());
            } else {
                let child = front.extract(need, ids);
                popped.splits.push(SplitRecord {
                    parent: front.id(),
                    child: child.id(),
                });
                popped.batches.push(child);
                need = Qty::ZERO;
            }
        }
        Ok(popped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_qty;
    use crate::id::CompositionId;

    fn batch(ids: &mut BatchIdGen, qty: f64) -> ResourceBatch {
        ResourceBatch::new(ids.next_id(), f64_to_qty(qty), CompositionId(0))
    }

    #[test]
    fn push_respects_capacity() {
        let mut ids = BatchIdGen::new();
        let mut pool = ResourcePool::new(f64_to_qty(10.0));
        pool.push(batch(&mut ids, 6.0)).unwrap();
        assert!(pool.push(batch(&mut ids, 5.0)).is_err());
        assert_eq!(pool.quantity(), f64_to_qty(6.0));
        pool.push(batch(&mut ids, 4.0)).unwrap();
        assert_eq!(pool.space(), Qty::ZERO);
    }

    #[test]
    fn pop_whole_batches_preserves_order_and_ids() {
        let mut ids = BatchIdGen::new();
        let mut pool = ResourcePool::new(f64_to_qty(100.0));
        let a = batch(&mut ids, 3.0);
        let b = batch(&mut ids, 4.0);
        let (ida, idb) = (a.id(), b.id());
        pool.push(a).unwrap();
        pool.push(b).unwrap();

        let popped = pool.pop(f64_to_qty(7.0), &mut ids).unwrap();
        assert!(popped.splits.is_empty());
        let got: Vec<BatchId> = popped.batches.iter().map(|m| m.id()).collect();
        assert_eq!(got, vec![ida, idb]);
        assert!(pool.is_empty());
    }

    #[test]
    fn pop_splits_boundary_batch() {
        let mut ids = BatchIdGen::new();
        let mut pool = ResourcePool::new(f64_to_qty(100.0));
        let b = batch(&mut ids, 10.0);
        let parent = b.id();
        pool.push(b).unwrap();

        let popped = pool.pop(f64_to_qty(4.0), &mut ids).unwrap();
        assert_eq!(popped.quantity(), f64_to_qty(4.0));
        assert_eq!(popped.splits.len(), 1);
        assert_eq!(popped.splits[0].parent, parent);
        assert_eq!(popped.splits[0].child, popped.batches[0].id());

        // Remainder keeps the parent id.
        assert_eq!(pool.iter().next().unwrap().id(), parent);
        assert_eq!(pool.quantity(), f64_to_qty(6.0));
    }

    #[test]
    fn pop_more_than_held_fails_without_mutation() {
        let mut ids = BatchIdGen::new();
        let mut pool = ResourcePool::new(f64_to_qty(10.0));
        pool.push(batch(&mut ids, 5.0)).unwrap();
        assert!(pool.pop(f64_to_qty(6.0), &mut ids).is_err());
        assert_eq!(pool.quantity(), f64_to_qty(5.0));
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn pop_zero_is_a_no_op() {
        let mut ids = BatchIdGen::new();
        let mut pool = ResourcePool::new(f64_to_qty(10.0));
        pool.push(batch(&mut ids, 5.0)).unwrap();
        let popped = pool.pop(Qty::ZERO, &mut ids).unwrap();
        assert!(popped.batches.is_empty());
        assert_eq!(pool.quantity(), f64_to_qty(5.0));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// 0 <= quantity <= capacity in every reachable state, and pops
            /// return exactly the requested quantity.
            #[test]
            fn capacity_invariant(ops in proptest::collection::vec((0u8..2, 1u32..50), 1..40)) {
                let mut ids = BatchIdGen::new();
                let capacity = f64_to_qty(100.0);
                let mut pool = ResourcePool::new(capacity);

                for (op, amount) in ops {
                    let qty = f64_to_qty(amount as f64);
                    if op == 0 {
                        let _ = pool.push(ResourceBatch::new(
                            ids.next_id(),
                            qty,
                            CompositionId(0),
                        ));
                    } else if let Ok(popped) = pool.pop(qty, &mut ids) {
                        prop_assert_eq!(popped.quantity(), qty);
                    }
                    prop_assert!(pool.quantity() >= Qty::ZERO);
                    prop_assert!(pool.quantity() <= capacity);
                }
            }

            /// Every split reported by a pop names a parent still in the
            /// pool and a child in the popped set.
            #[test]
            fn split_bookkeeping(pushes in proptest::collection::vec(1u32..30, 1..10), take in 1u32..200) {
                let mut ids = BatchIdGen::new();
                let mut pool = ResourcePool::new(f64_to_qty(1000.0));
                for p in pushes {
                    pool.push(ResourceBatch::new(ids.next_id(), f64_to_qty(p as f64), CompositionId(0))).unwrap();
                }
                let want = f64_to_qty(take as f64);
                if let Ok(popped) = pool.pop(want, &mut ids) {
                    for split in &popped.splits {
                        prop_assert!(pool.iter().any(|b| b.id() == split.parent));
                        prop_assert!(popped.batches.iter().any(|b| b.id() == split.child));
                    }
                    prop_assert!(popped.splits.len() <= 1);
                }
            }
        }
    }
}
