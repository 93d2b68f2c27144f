//! Intrusive circular doubly linked list over the slots of a [`Pool`].
//!
//! Each element stores its own [`Link`], so an element can be on at most one
//! list through a given link field. Elements are addressed by pool slot index.
use core::fmt;

use super::pool::Pool;

/// Circular linked list header.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct ListHead {
    pub first: Option<usize>,
}

impl fmt::Debug for ListHead {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ListHead({:?})", &self.first)
    }
}

/// Links to neighbor items.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Link {
    pub prev: usize,
    pub next: usize,
}

/// An element that can be put on a list.
pub trait Linked {
    fn link(&self) -> Option<Link>;
    fn link_mut(&mut self) -> &mut Option<Link>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// The item is already linked.
    AlreadyLinked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemError {
    /// The item is not linked.
    NotLinked,
}

#[cold]
fn inconsistent() -> ! {
    panic!("intrusive list is inconsistent")
}

fn link_of<T: Linked, const N: usize>(pool: &Pool<T, N>, i: usize) -> Link {
    match pool.at(i).and_then(|x| x.link()) {
        Some(link) => link,
        None => inconsistent(),
    }
}

fn link_mut_of<T: Linked, const N: usize>(pool: &mut Pool<T, N>, i: usize) -> &mut Link {
    match pool.at_mut(i).and_then(|x| x.link_mut().as_mut()) {
        Some(link) => link,
        None => inconsistent(),
    }
}

impl ListHead {
    pub const fn new() -> Self {
        Self { first: None }
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    pub fn front(&self) -> Option<usize> {
        self.first
    }

    pub fn back<T: Linked, const N: usize>(&self, pool: &Pool<T, N>) -> Option<usize> {
        self.first.map(|first| link_of(pool, first).prev)
    }

    /// Insert `item` before `at`. If `at` is `None`, insert at the back.
    pub fn insert<T: Linked, const N: usize>(
        &mut self,
        pool: &mut Pool<T, N>,
        item: usize,
        at: Option<usize>,
    ) -> Result<(), InsertError> {
        match pool.at(item) {
            Some(x) if x.link().is_some() => return Err(InsertError::AlreadyLinked),
            Some(_) => {}
            None => inconsistent(),
        }

        if let Some(first) = self.first {
            let (next, update_first) = match at {
                Some(at) => (at, at == first),
                None => (first, false),
            };
            let prev = link_of(pool, next).prev;

            link_mut_of(pool, prev).next = item;
            link_mut_of(pool, next).prev = item;
            if let Some(x) = pool.at_mut(item) {
                *x.link_mut() = Some(Link { prev, next });
            }

            if update_first {
                self.first = Some(item);
            }
        } else {
            debug_assert!(at.is_none());
            if let Some(x) = pool.at_mut(item) {
                *x.link_mut() = Some(Link {
                    prev: item,
                    next: item,
                });
            }
            self.first = Some(item);
        }

        Ok(())
    }

    pub fn push_back<T: Linked, const N: usize>(
        &mut self,
        pool: &mut Pool<T, N>,
        item: usize,
    ) -> Result<(), InsertError> {
        self.insert(pool, item, None)
    }

    pub fn push_front<T: Linked, const N: usize>(
        &mut self,
        pool: &mut Pool<T, N>,
        item: usize,
    ) -> Result<(), InsertError> {
        let at = self.first;
        self.insert(pool, item, at)
    }

    /// Remove `item` from `self`. `item` must be on `self`.
    pub fn remove<T: Linked, const N: usize>(
        &mut self,
        pool: &mut Pool<T, N>,
        item: usize,
    ) -> Result<usize, ItemError> {
        let Some(link) = pool.at(item).and_then(|x| x.link()) else {
            return Err(ItemError::NotLinked);
        };

        if link.prev == item {
            // `item` is the only element
            debug_assert_eq!(self.first, Some(item));
            self.first = None;
        } else {
            link_mut_of(pool, link.prev).next = link.next;
            link_mut_of(pool, link.next).prev = link.prev;
            if self.first == Some(item) {
                self.first = Some(link.next);
            }
        }

        if let Some(x) = pool.at_mut(item) {
            *x.link_mut() = None;
        }

        Ok(item)
    }

    pub fn pop_front<T: Linked, const N: usize>(&mut self, pool: &mut Pool<T, N>) -> Option<usize> {
        let first = self.first?;
        self.remove(pool, first).ok()
    }

    /// Get the element after `item`, or `None` if `item` is the last one.
    pub fn next<T: Linked, const N: usize>(&self, pool: &Pool<T, N>, item: usize) -> Option<usize> {
        let next = link_of(pool, item).next;
        if Some(next) == self.first {
            None
        } else {
            Some(next)
        }
    }

    pub fn iter<'a, T: Linked, const N: usize>(&self, pool: &'a Pool<T, N>) -> Iter<'a, T, N> {
        Iter {
            head: *self,
            next: self.first,
            pool,
        }
    }
}

/// An iterator over the elements of a list.
pub struct Iter<'a, T, const N: usize> {
    head: ListHead,
    next: Option<usize>,
    pool: &'a Pool<T, N>,
}

impl<T: Linked, const N: usize> Iterator for Iter<'_, T, N> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let cur = self.next?;
        self.next = self.head.next(self.pool, cur);
        Some(cur)
    }
}
