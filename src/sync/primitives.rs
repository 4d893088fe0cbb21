//! Synchronization primitives for interrupt-safe access.
//!
//! Low-level spin-style primitive used for the short, branch-free state
//! transitions shared with interrupt-like callbacks.

use core::cell::RefCell;
use critical_section::Mutex;

/// State shared between the driver side and accelerator callbacks.
///
/// A `critical_section::Mutex<RefCell<T>>`. Closures passed to
/// [`with`](Self::with) must not block or call into collaborators.
pub struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    /// Wrap `value`; usable in statics.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Execute a closure with exclusive mutable access.
    #[inline]
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow_ref_mut(cs);
            f(&mut value)
        })
    }

    /// Like [`with`](Self::with), but `None` if the cell is already borrowed
    /// further up the stack.
    #[inline]
    pub fn try_with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            self.inner
                .borrow(cs)
                .try_borrow_mut()
                .ok()
                .map(|mut value| f(&mut value))
        })
    }

    /// Execute a closure with immutable access.
    #[inline]
    pub fn with_ref<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        critical_section::with(|cs| {
            let value = self.inner.borrow_ref(cs);
            f(&value)
        })
    }

    /// Replace the value, returning the previous one.
    #[inline]
    pub fn replace(&self, value: T) -> T {
        self.with(|slot| core::mem::replace(slot, value))
    }
}

impl<T: Copy> CriticalSectionCell<T> {
    /// Copy the current value out.
    #[inline]
    pub fn get(&self) -> T {
        self.with_ref(|value| *value)
    }

    /// Overwrite the current value.
    #[inline]
    pub fn set(&self, value: T) {
        self.with(|slot| *slot = value);
    }
}

impl<T: Default> Default for CriticalSectionCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for CriticalSectionCell<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.with_ref(|value| f.debug_tuple("CriticalSectionCell").field(value).finish())
    }
}

// SAFETY: CriticalSectionCell uses critical sections to protect all access,
// and T: Send means the value may be touched from whichever thread holds it.
unsafe impl<T: Send> Sync for CriticalSectionCell<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    struct Votes {
        granted: bool,
        in_flight: u32,
    }

    #[test]
    fn starts_with_initial_value() {
        let cell = CriticalSectionCell::new(Votes {
            granted: true,
            in_flight: 2,
        });
        assert_eq!(cell.with_ref(|v| v.in_flight), 2);
        assert!(cell.get().granted);
    }

    #[test]
    fn with_returns_closure_result() {
        let cell = CriticalSectionCell::<Votes>::default();
        let before = cell.with(|v| {
            let old = v.in_flight;
            v.in_flight += 3;
            old
        });
        assert_eq!(before, 0);
        assert_eq!(cell.get().in_flight, 3);
    }

    #[test]
    fn nested_access_refused_by_try_with() {
        let cell = CriticalSectionCell::new(7u32);
        assert_eq!(cell.try_with(|v| *v), Some(7));
        let nested = cell.with(|_| cell.try_with(|v| *v));
        assert_eq!(nested, None);
    }

    #[test]
    fn replace_hands_back_previous_slot() {
        let cell = CriticalSectionCell::new(Some(3u8));
        assert_eq!(cell.replace(None), Some(3));
        cell.set(Some(9));
        assert_eq!(cell.get(), Some(9));
    }

    #[test]
    fn usable_as_static() {
        static EPOCH: CriticalSectionCell<u64> = CriticalSectionCell::new(0);
        EPOCH.with(|e| *e += 1);
        assert_eq!(EPOCH.get(), 1);
    }

    #[test]
    fn debug_shows_inner_value() {
        let cell = CriticalSectionCell::new(5u8);
        assert_eq!(format!("{cell:?}"), "CriticalSectionCell(5)");
    }

    #[test]
    fn callbacks_on_many_threads_do_not_lose_updates() {
        let cell = Arc::new(CriticalSectionCell::<Votes>::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    for _ in 0..500 {
                        cell.with(|v| v.in_flight += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cell.get().in_flight, 2000);
    }
}
