//! # Proxy Pool
//!
//! Generational slot pool for objects that are created and destroyed as the
//! provider's content changes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Typed handle to an object in a [`ProxyPool`].
///
/// Packs a slot index and a generation counter, like an ECS entity id:
/// - Lower 32 bits: slot index
/// - Upper 32 bits: generation, bumped every time the slot is freed
pub struct Handle<T> {
    packed: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    #[inline]
    const fn new(index: u32, generation: u32) -> Self {
        Self {
            packed: ((generation as u64) << 32) | (index as u64),
            _marker: PhantomData,
        }
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.packed as u32
    }

    /// Returns the slot generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.packed >> 32) as u32
    }

    /// Returns the packed 64-bit value.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.packed
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.packed == other.packed
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.packed.hash(state);
    }
}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.packed.cmp(&other.packed)
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index(), self.generation())
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A growable pool of proxies addressed by generational handles.
///
/// Insertion and removal are O(1). Storage is reserved up front and only
/// grows when an entity outgrows it.
///
/// # Thread Safety
///
/// Not thread-safe. Each entity owns its pools on the simulation thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: ProxyPool<Joint> = ProxyPool::with_capacity(64);
///
/// let handle = pool.insert(joint);
/// assert!(pool.contains(handle));
///
/// pool.remove(handle);
/// assert!(pool.get(handle).is_none()); // stale handles miss
/// ```
pub struct ProxyPool<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> ProxyPool<T> {
    /// Creates an empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Creates an empty pool with room for `capacity` proxies.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    /// Returns the number of live proxies.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Checks if no proxies are live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Stores `value` and returns its handle.
    ///
    /// Recycles a freed slot when one is available.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        debug_assert!(index != u32::MAX, "proxy pool exhausted");
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index, 0)
    }

    /// Removes the proxy behind `handle`.
    ///
    /// Returns the proxy, or `None` if the handle was stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index());
        self.live -= 1;
        Some(value)
    }

    /// Checks whether `handle` still refers to a live proxy.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Gets a reference to a live proxy.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Gets a mutable reference to a live proxy.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Removes every proxy, invalidating all outstanding handles.
    ///
    /// Proxies are dropped in slot order.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(u32::try_from(index).unwrap_or(u32::MAX));
            }
        }
        self.live = 0;
    }

    /// Iterates over all live proxies.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let value = slot.value.as_ref()?;
            let index = u32::try_from(index).ok()?;
            Some((Handle::new(index, slot.generation), value))
        })
    }

    /// Iterates mutably over all live proxies.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            let value = slot.value.as_mut()?;
            let index = u32::try_from(index).ok()?;
            Some((Handle::new(index, generation), value))
        })
    }
}

impl<T> Default for ProxyPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ProxyPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPool")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .finish()
    }
}
