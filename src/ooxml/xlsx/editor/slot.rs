//! Part models that are built on first use.

use crate::ooxml::xlsx::error::Result;
use std::cell::{Ref, RefCell};

#[derive(Debug)]
enum Slot<T> {
    Unloaded,
    Loaded(T),
    /// The package has no such part.
    Absent,
}

/// A model slot filled on first access.
///
/// Readers go through a `RefCell` so lookups work from `&self`; the loader
/// runs with no borrow held and must not touch the same slot.
#[derive(Debug)]
pub(crate) struct Lazy<T> {
    slot: RefCell<Slot<T>>,
}

impl<T> Lazy<T> {
    pub fn unloaded() -> Self {
        Self {
            slot: RefCell::new(Slot::Unloaded),
        }
    }

    pub fn loaded(value: T) -> Self {
        Self {
            slot: RefCell::new(Slot::Loaded(value)),
        }
    }

    pub fn absent() -> Self {
        Self {
            slot: RefCell::new(Slot::Absent),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Loaded(_))
    }

    pub fn set(&mut self, value: T) {
        *self.slot.get_mut() = Slot::Loaded(value);
    }

    /// The model, loading it first if needed. `Ok(None)` means the part is
    /// absent. A failed load leaves the slot unloaded.
    pub fn get<F>(&self, load: F) -> Result<Option<Ref<'_, T>>>
    where
        F: FnOnce() -> Result<Option<T>>,
    {
        if matches!(*self.slot.borrow(), Slot::Unloaded) {
            let next = match load()? {
                Some(value) => Slot::Loaded(value),
                None => Slot::Absent,
            };
            *self.slot.borrow_mut() = next;
        }
        Ok(Ref::filter_map(self.slot.borrow(), |slot| match slot {
            Slot::Loaded(value) => Some(value),
            _ => None,
        })
        .ok())
    }

    pub fn get_mut<F>(&mut self, load: F) -> Result<Option<&mut T>>
    where
        F: FnOnce() -> Result<Option<T>>,
    {
        let slot = self.slot.get_mut();
        if matches!(slot, Slot::Unloaded) {
            *slot = match load()? {
                Some(value) => Slot::Loaded(value),
                None => Slot::Absent,
            };
        }
        Ok(match slot {
            Slot::Loaded(value) => Some(value),
            _ => None,
        })
    }

    /// The model if it is already loaded.
    pub fn loaded_mut(&mut self) -> Option<&mut T> {
        match self.slot.get_mut() {
            Slot::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn loaded_ref(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.slot.borrow(), |slot| match slot {
            Slot::Loaded(value) => Some(value),
            _ => None,
        })
        .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::xlsx::error::PackageError;

    #[test]
    fn test_loads_once() {
        let lazy: Lazy<u32> = Lazy::unloaded();
        let mut calls = 0;
        assert_eq!(
            *lazy
                .get(|| {
                    calls += 1;
                    Ok(Some(7))
                })
                .unwrap()
                .unwrap(),
            7
        );
        assert!(lazy.get(|| Ok(Some(9))).unwrap().is_some_and(|v| *v == 7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_failed_load_stays_unloaded() {
        let mut lazy: Lazy<String> = Lazy::unloaded();
        assert!(lazy.get(|| Err(PackageError::validation("boom"))).is_err());
        assert!(!lazy.is_loaded());
        lazy.get_mut(|| Ok(Some("x".to_string()))).unwrap().unwrap().push('y');
        assert_eq!(lazy.loaded_ref().as_deref().map(String::as_str), Some("xy"));
    }

    #[test]
    fn test_absent() {
        let mut lazy: Lazy<u8> = Lazy::unloaded();
        assert!(lazy.get_mut(|| Ok(None)).unwrap().is_none());
        assert!(lazy.get(|| Ok(Some(1))).unwrap().is_none());
        assert!(Lazy::<u8>::absent().loaded_ref().is_none());
        lazy.set(3);
        assert_eq!(lazy.loaded_mut().copied(), Some(3));
    }
}
