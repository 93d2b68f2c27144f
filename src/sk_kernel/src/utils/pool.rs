//! Fixed-capacity object pools addressed by generational indices
use core::fmt;

/// The identifier of a pool slot, valid until the object in the slot is
/// removed. Removing an object bumps the slot's generation so that every
/// outstanding `RawId` for it goes stale.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawId {
    index: u16,
    generation: u16,
}

impl RawId {
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Pack `self` into a `usize` so that it can be carried through a
    /// callback argument.
    #[inline]
    pub fn to_usize(self) -> usize {
        ((self.generation as usize) << 16) | self.index as usize
    }

    #[inline]
    pub fn from_usize(x: usize) -> Self {
        Self {
            index: x as u16,
            generation: (x >> 16) as u16,
        }
    }
}

impl fmt::Debug for RawId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// A fixed-capacity pool of `T`.
pub struct Pool<T, const N: usize> {
    slots: [Slot<T>; N],
    len: usize,
}

impl<T, const N: usize> Pool<T, N> {
    pub fn new() -> Self {
        assert!(N <= u16::MAX as usize, "pool is too large");
        Self {
            slots: core::array::from_fn(|_| Slot {
                generation: 0,
                value: None,
            }),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        N
    }

    /// Place `value` in a free slot. Returns the value back if the pool is
    /// full.
    pub fn insert(&mut self, value: T) -> Result<RawId, T> {
        let Some(index) = self.slots.iter().position(|s| s.value.is_none()) else {
            return Err(value);
        };
        let slot = &mut self.slots[index];
        slot.value = Some(value);
        self.len += 1;
        Ok(RawId {
            index: index as u16,
            generation: slot.generation,
        })
    }

    /// Remove the object identified by `id`. Returns `None` if `id` is stale.
    pub fn remove(&mut self, id: RawId) -> Option<T> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.len -= 1;
        Some(value)
    }

    pub fn contains(&self, id: RawId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: RawId) -> Option<&T> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, id: RawId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Get the `RawId` of the object currently occupying slot `index`.
    pub fn id_at(&self, index: usize) -> Option<RawId> {
        let slot = self.slots.get(index)?;
        slot.value.as_ref().map(|_| RawId {
            index: index as u16,
            generation: slot.generation,
        })
    }

    pub fn at(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.value.as_ref()
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.value.as_mut()
    }

    /// Iterate over all live objects.
    pub fn iter(&self) -> impl Iterator<Item = (RawId, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value.as_ref().map(|v| {
                (
                    RawId {
                        index: i as u16,
                        generation: s.generation,
                    },
                    v,
                )
            })
        })
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Define a typed handle wrapping [`RawId`].
macro_rules! define_id {
    ($( $(#[$meta:meta])* pub struct $name:ident; )*) => {$(
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) $crate::utils::pool::RawId);

        impl $name {
            /// Pack the handle into a `usize`.
            #[inline]
            pub fn to_usize(self) -> usize {
                self.0.to_usize()
            }

            /// Restore a handle packed by [`Self::to_usize`]. The result is
            /// not checked for validity until it is used.
            #[inline]
            pub fn from_usize(x: usize) -> Self {
                Self($crate::utils::pool::RawId::from_usize(x))
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.0)
            }
        }
    )*};
}
