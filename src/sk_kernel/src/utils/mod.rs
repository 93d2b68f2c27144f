//! Utility
#[macro_use]
pub mod pool;
pub mod intrusive_list;
pub mod prio_bitmap;

/// A fixed-capacity object name. Longer names are truncated at a character
/// boundary.
pub type Name = arrayvec::ArrayString<{ crate::cfg::NAME_MAX }>;

pub(crate) fn make_name(s: &str) -> Name {
    let mut name = Name::new();
    for c in s.chars() {
        if name.try_push(c).is_err() {
            break;
        }
    }
    name
}
