//! Generation-checked handle table
//!
//! Outstanding requests are identified by a [`Handle`] issued when the request
//! is registered rather than by the address of its kernel record. A handle is
//! a slot index plus the slot's generation; removing an entry bumps the
//! generation, so a stale or duplicated handle coming back from the kernel can
//! never resolve to a newer request that reused the slot.
//!
//! Handles round-trip through a pointer-sized integer ([`Handle::to_bits`]) so
//! they fit in the URB's `usercontext` field. Index and generation each get
//! half of the pointer width.

const HALF_BITS: u32 = usize::BITS / 2;
const HALF_MASK: usize = usize::MAX >> HALF_BITS;
const GENERATION_MASK: u32 = HALF_MASK as u32;
const MAX_SLOTS: usize = if HALF_MASK < u32::MAX as usize {
    HALF_MASK + 1
} else {
    u32::MAX as usize
};

/// Identity of one table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into a pointer-sized integer
    pub fn to_bits(self) -> usize {
        ((self.generation as usize & HALF_MASK) << HALF_BITS) | (self.index as usize & HALF_MASK)
    }

    pub fn from_bits(bits: usize) -> Self {
        Self {
            index: (bits & HALF_MASK) as u32,
            generation: ((bits >> HALF_BITS) & HALF_MASK) as u32,
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena addressed by [`Handle`]
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `value` and return its handle with a reference to the stored
    /// value
    ///
    /// Gives the value back when every representable slot is in use.
    pub fn insert(&mut self, value: T) -> Result<(Handle, &mut T), T> {
        let index = match self.free.pop() {
            Some(index) => index,
            None if self.slots.len() < MAX_SLOTS => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
            None => return Err(value),
        };

        let slot = &mut self.slots[index as usize];
        let handle = Handle {
            index,
            generation: slot.generation,
        };
        self.len += 1;
        Ok((handle, slot.value.insert(value)))
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Remove the entry for `handle`, invalidating the handle
    ///
    /// Returns `None` for unknown, stale or already removed handles.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Remove every entry, invalidating all outstanding handles
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
                self.free.push(index as u32);
                values.push(value);
            }
        }
        self.len = 0;
        values
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
