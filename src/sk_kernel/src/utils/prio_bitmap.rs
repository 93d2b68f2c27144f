//! Provides `PrioBitmap32`, a single-word bit array supporting constant-time
//! scan for the lowest set bit.
use core::fmt;

/// Trait for priority bitmaps.
///
/// All methods panic when the given bit position is out of range.
pub trait PrioBitmap: Send + Sync + Clone + Copy + fmt::Debug + 'static {
    /// Get the bit at the specified position.
    fn get(&self, i: usize) -> bool;

    /// Clear the bit at the specified position.
    fn clear(&mut self, i: usize);

    /// Set the bit at the specified position.
    fn set(&mut self, i: usize);

    /// Get the position of the first set bit.
    fn find_set(&self) -> Option<usize>;

    /// Check whether no bit is set.
    fn is_empty(&self) -> bool {
        self.find_set().is_none()
    }
}

/// Stores 32 entries in one `u32`. Bit `p` corresponds to priority `p`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct PrioBitmap32 {
    bits: u32,
}

impl PrioBitmap32 {
    pub const LEN: usize = 32;

    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Get the raw bit pattern.
    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }
}

impl fmt::Debug for PrioBitmap32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries((0..Self::LEN).filter(|&i| self.get(i)))
            .finish()
    }
}

impl PrioBitmap for PrioBitmap32 {
    fn get(&self, i: usize) -> bool {
        assert!(i < Self::LEN);
        self.bits & (1 << i) != 0
    }

    fn clear(&mut self, i: usize) {
        assert!(i < Self::LEN);
        self.bits &= !(1 << i);
    }

    fn set(&mut self, i: usize) {
        assert!(i < Self::LEN);
        self.bits |= 1 << i;
    }

    fn find_set(&self) -> Option<usize> {
        if self.bits == 0 {
            None
        } else {
            Some(self.bits.trailing_zeros() as usize)
        }
    }
}
