//! Mono sample buffers and the pool that owns them.
//!
//! Segments never own sample storage. Every [`Buffer`] lives in a
//! [`BufferPool`] and segments refer to it through a [`BufferHandle`], a
//! small `Copy` index that also carries a generation counter. Removing a
//! buffer from the pool bumps the generation of its slot, so a handle that
//! outlives its buffer stops resolving instead of silently aliasing whatever
//! gets allocated into the slot next.

/// A fixed-capacity mono sample store.
///
/// The capacity is set at construction and never changes. The fill cursor
/// records how many samples at the front of the buffer hold meaningful data;
/// segments set it after writing a block.
#[derive(Clone, Debug, PartialEq)]
pub struct Buffer {
    data: Vec<f32>,
    filled: usize,
}

impl Buffer {
    /// Create a zeroed buffer able to hold `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity],
            filled: 0,
        }
    }

    /// Create a buffer holding `samples`; capacity and fill equal its length.
    pub fn from_samples(samples: Vec<f32>) -> Self {
        let filled = samples.len();
        Self {
            data: samples,
            filled,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid samples at the front of the buffer.
    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Move the fill cursor. Values past the capacity are clamped.
    #[inline]
    pub fn set_filled(&mut self, filled: usize) {
        self.filled = filled.min(self.data.len());
    }

    /// The valid samples, `[0, filled)`.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.data[..self.filled]
    }

    /// The whole backing store, regardless of the fill cursor.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Copy `samples` into the front of the buffer and set the fill cursor.
    ///
    /// Samples that don't fit are dropped. Returns how many were copied.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let n = samples.len().min(self.data.len());
        self.data[..n].copy_from_slice(&samples[..n]);
        self.filled = n;
        n
    }

    /// Zero the backing store and reset the fill cursor.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.filled = 0;
    }
}

/// Generational reference to a [`Buffer`] inside a [`BufferPool`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BufferHandle {
    index: u32,
    generation: u32,
}

impl BufferHandle {
    /// Slot index inside the pool.
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    buffer: Option<Buffer>,
}

/// Arena owning every buffer exchanged between segments.
///
/// Freed slots are recycled; each reuse bumps the slot's generation so old
/// handles are rejected.
#[derive(Debug, Default)]
pub struct BufferPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool with room for `capacity` buffers before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Allocate a zeroed buffer of `capacity` samples and return its handle.
    pub fn allocate(&mut self, capacity: usize) -> BufferHandle {
        self.insert(Buffer::new(capacity))
    }

    /// Move `buffer` into the pool.
    pub fn insert(&mut self, buffer: Buffer) -> BufferHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.buffer = Some(buffer);
            return BufferHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            buffer: Some(buffer),
        });
        BufferHandle {
            index,
            generation: 0,
        }
    }

    /// Remove a buffer from the pool, invalidating every copy of `handle`.
    pub fn remove(&mut self, handle: BufferHandle) -> Option<Buffer> {
        let slot = self.slot_mut(handle)?;
        let buffer = slot.buffer.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(buffer)
    }

    /// Whether `handle` still refers to a buffer in this pool.
    pub fn contains(&self, handle: BufferHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: BufferHandle) -> Option<&Buffer> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.buffer.as_ref())
    }

    pub fn get_mut(&mut self, handle: BufferHandle) -> Option<&mut Buffer> {
        self.slot_mut(handle).and_then(|slot| slot.buffer.as_mut())
    }

    /// Number of live buffers.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Temporarily move a buffer out of its slot without freeing the slot.
    ///
    /// The handle stays valid; [`restore`](Self::restore) must put the buffer
    /// back. Used by segments that need one buffer mutably while reading
    /// others from the same pool.
    pub(crate) fn take(&mut self, handle: BufferHandle) -> Option<Buffer> {
        self.slot_mut(handle).and_then(|slot| slot.buffer.take())
    }

    pub(crate) fn restore(&mut self, handle: BufferHandle, buffer: Buffer) {
        if let Some(slot) = self.slot_mut(handle) {
            slot.buffer = Some(buffer);
        }
    }

    fn slot_mut(&mut self, handle: BufferHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_write_sets_fill_cursor() {
        let mut buffer = Buffer::new(4);
        assert_eq!(buffer.filled(), 0);
        assert_eq!(buffer.write(&[1.0, 2.0]), 2);
        assert_eq!(buffer.samples(), &[1.0, 2.0]);
        assert_eq!(buffer.data(), &[1.0, 2.0, 0.0, 0.0]);

        // Overlong writes are truncated to the capacity
        assert_eq!(buffer.write(&[1.0; 6]), 4);
        assert_eq!(buffer.filled(), 4);
    }

    #[test]
    fn fill_cursor_is_clamped() {
        let mut buffer = Buffer::new(8);
        buffer.set_filled(100);
        assert_eq!(buffer.filled(), 8);
        buffer.clear();
        assert_eq!(buffer.filled(), 0);
    }

    #[test]
    fn removed_handle_goes_stale() {
        let mut pool = BufferPool::new();
        let a = pool.allocate(16);
        assert!(pool.contains(a));
        assert_eq!(pool.len(), 1);

        assert!(pool.remove(a).is_some());
        assert!(!pool.contains(a));
        assert!(pool.get(a).is_none());
        assert!(pool.remove(a).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn recycled_slot_does_not_resolve_old_handle() {
        let mut pool = BufferPool::new();
        let a = pool.allocate(16);
        pool.remove(a);

        let b = pool.allocate(32);
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(pool.get(a).is_none());
        assert_eq!(pool.get(b).map(Buffer::capacity), Some(32));
    }

    #[test]
    fn take_and_restore_keep_handle_valid() {
        let mut pool = BufferPool::new();
        let a = pool.insert(Buffer::from_samples(vec![0.5; 4]));

        let taken = pool.take(a).unwrap();
        assert!(!pool.contains(a));
        pool.restore(a, taken);
        assert_eq!(pool.get(a).unwrap().samples(), &[0.5; 4]);
    }
}
