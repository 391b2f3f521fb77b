//! Object pools - reusable containers with free-slot lists
//!
//! - Slots are pre-allocated by `create_pool` and grow on demand
//! - Released slots go back on the free list and are handed out again
//! - Handles carry a generation so a stale or repeated release is rejected
//!   instead of freeing someone else's object

use std::collections::HashMap;

use crate::core::{Error, Result};

/// Handle to an object checked out of an [`ObjectPool`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: u32,
    generation: u32,
}

impl PoolHandle {
    /// Slot index inside the pool
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    generation: u32,
    in_use: bool,
}

/// Free-list pool of reusable objects.
///
/// Objects are never dropped while the pool lives; `reuse` only marks the
/// slot free. Callers reset whatever state they need after `get`.
#[derive(Debug)]
pub struct ObjectPool<T> {
    label: String,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    reserved: usize,
}

impl<T: Default> ObjectPool<T> {
    /// Create an empty pool; `label` only appears in log output
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            slots: Vec::new(),
            free: Vec::new(),
            reserved: 0,
        }
    }

    /// Pre-allocate `size` additional objects
    pub fn create_pool(&mut self, size: usize) {
        let start = self.slots.len() as u32;
        self.slots.reserve(size);
        for _ in 0..size {
            self.push_slot();
        }
        // hand out low indices first
        self.free.extend((start..start + size as u32).rev());
        self.reserved += size;
        log::debug!("Pool '{}': pre-allocated {} objects", self.label, size);
    }

    fn push_slot(&mut self) -> u32 {
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            value: T::default(),
            generation: 0,
            in_use: false,
        });
        index
    }

    /// Check out an object, creating one if the free list is empty
    pub fn get(&mut self) -> PoolHandle {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.push_slot();
                if self.slots.len() == self.reserved + 1 {
                    log::debug!(
                        "Pool '{}' grew beyond its pre-sized capacity of {}",
                        self.label,
                        self.reserved
                    );
                }
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.in_use = true;
        PoolHandle {
            index,
            generation: slot.generation,
        }
    }

    /// Return an object to the free list
    pub fn reuse(&mut self, handle: PoolHandle) -> Result<()> {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return Err(Error::Pool(format!(
                "pool '{}': handle {} was never handed out",
                self.label, handle.index
            )));
        };
        if !slot.in_use || slot.generation != handle.generation {
            return Err(Error::Pool(format!(
                "pool '{}': object {} released twice",
                self.label, handle.index
            )));
        }
        slot.in_use = false;
        self.free.push(handle.index);
        Ok(())
    }

    /// Whether `handle` refers to a checked-out object
    pub fn is_live(&self, handle: PoolHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|s| s.in_use && s.generation == handle.generation)
    }

    pub fn get_ref(&self, handle: PoolHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.in_use && s.generation == handle.generation)
            .map(|s| &s.value)
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.in_use && s.generation == handle.generation)
            .map(|s| &mut s.value)
    }

    /// Objects currently checked out
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Objects ever created, pre-allocated or on demand
    pub fn created(&self) -> usize {
        self.slots.len()
    }

    /// Objects waiting on the free list
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Drop every object, live or free
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.reserved = 0;
    }
}

/// Handle to an object checked out of a [`MultiObjectPool`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypedHandle {
    pub type_id: u32,
    pub handle: PoolHandle,
}

/// One [`ObjectPool`] per object type id
#[derive(Debug)]
pub struct MultiObjectPool<T> {
    pools: HashMap<u32, ObjectPool<T>>,
}

impl<T: Default> Default for MultiObjectPool<T> {
    fn default() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }
}

impl<T: Default> MultiObjectPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `type_id` (if new) and pre-allocate `size` objects for it
    pub fn create_pool(&mut self, type_id: u32, size: usize) {
        self.pools
            .entry(type_id)
            .or_insert_with(|| ObjectPool::new(format!("type {type_id}")))
            .create_pool(size);
    }

    pub fn contains_type(&self, type_id: u32) -> bool {
        self.pools.contains_key(&type_id)
    }

    pub fn get(&mut self, type_id: u32) -> Result<TypedHandle> {
        let pool = self
            .pools
            .get_mut(&type_id)
            .ok_or_else(|| Error::Pool(format!("unknown object type {type_id}")))?;
        Ok(TypedHandle {
            type_id,
            handle: pool.get(),
        })
    }

    pub fn reuse(&mut self, handle: TypedHandle) -> Result<()> {
        self.pools
            .get_mut(&handle.type_id)
            .ok_or_else(|| Error::Pool(format!("unknown object type {}", handle.type_id)))?
            .reuse(handle.handle)
    }

    pub fn get_ref(&self, handle: TypedHandle) -> Option<&T> {
        self.pools.get(&handle.type_id)?.get_ref(handle.handle)
    }

    pub fn get_mut(&mut self, handle: TypedHandle) -> Option<&mut T> {
        self.pools.get_mut(&handle.type_id)?.get_mut(handle.handle)
    }

    /// Objects of `type_id` currently checked out
    pub fn in_use(&self, type_id: u32) -> usize {
        self.pools.get(&type_id).map_or(0, ObjectPool::in_use)
    }

    pub fn total_in_use(&self) -> usize {
        self.pools.values().map(ObjectPool::in_use).sum()
    }

    pub fn clear(&mut self) {
        self.pools.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_prefers_preallocated() {
        let mut pool: ObjectPool<u32> = ObjectPool::new("test");
        pool.create_pool(3);
        assert_eq!(pool.created(), 3);
        assert_eq!(pool.available(), 3);

        let a = pool.get();
        assert_eq!(a.index(), 0);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.created(), 3);
    }

    #[test]
    fn test_grows_on_demand() {
        let mut pool: ObjectPool<u32> = ObjectPool::new("test");
        pool.create_pool(1);
        let handles: Vec<_> = (0..4).map(|_| pool.get()).collect();
        assert_eq!(pool.created(), 4);
        assert_eq!(pool.in_use(), 4);
        for h in handles {
            pool.reuse(h).unwrap();
        }
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_double_release_rejected() {
        let mut pool: ObjectPool<u32> = ObjectPool::new("test");
        let h = pool.get();
        pool.reuse(h).unwrap();
        assert!(matches!(pool.reuse(h), Err(Error::Pool(_))));

        // A stale handle must not release the slot's next owner
        let next = pool.get();
        assert_eq!(next.index(), h.index());
        assert!(pool.reuse(h).is_err());
        assert!(pool.is_live(next));
        assert!(pool.get_ref(h).is_none());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut other: ObjectPool<u32> = ObjectPool::new("other");
        other.create_pool(5);
        let foreign = (0..5).map(|_| other.get()).last().unwrap();

        let mut pool: ObjectPool<u32> = ObjectPool::new("test");
        assert!(pool.reuse(foreign).is_err());
    }

    #[test]
    fn test_conservation_over_random_sequence() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(9);
        let mut pool: ObjectPool<u32> = ObjectPool::new("test");
        pool.create_pool(4);
        let mut live = Vec::new();

        for _ in 0..500 {
            if live.is_empty() || rng.random_bool(0.55) {
                live.push(pool.get());
            } else {
                let i = rng.random_range(0..live.len());
                pool.reuse(live.swap_remove(i)).unwrap();
            }
            assert_eq!(pool.in_use(), live.len());
            assert!(pool.in_use() <= pool.created());
            assert_eq!(pool.in_use() + pool.available(), pool.created());
        }
    }

    #[test]
    fn test_values_persist_between_uses() {
        let mut pool: ObjectPool<Vec<u8>> = ObjectPool::new("buffers");
        let h = pool.get();
        pool.get_mut(h).unwrap().extend_from_slice(&[1, 2, 3]);
        pool.reuse(h).unwrap();
        let again = pool.get();
        assert!(pool.get_ref(again).unwrap().capacity() >= 3);
    }

    #[test]
    fn test_multi_pool_types() {
        let mut pools: MultiObjectPool<u32> = MultiObjectPool::new();
        pools.create_pool(1, 2);
        pools.create_pool(2, 0);

        let a = pools.get(1).unwrap();
        let b = pools.get(2).unwrap();
        *pools.get_mut(b).unwrap() = 7;
        assert_eq!(pools.in_use(1), 1);
        assert_eq!(pools.total_in_use(), 2);
        assert_eq!(pools.get_ref(b), Some(&7));

        assert!(matches!(pools.get(3), Err(Error::Pool(_))));
        pools.reuse(a).unwrap();
        assert!(pools.reuse(a).is_err());
        assert_eq!(pools.total_in_use(), 1);
    }
}
