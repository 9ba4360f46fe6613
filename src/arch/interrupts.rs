//! Control over the interrupt flag of the current CPU.
//!
//! On bare metal (`target_os = "none"`) these functions touch the real
//! flag. Hosted builds, which are only used to run the unit tests, keep an
//! emulated flag per OS thread instead.

use core::{
    marker::PhantomData,
    sync::atomic::{compiler_fence, Ordering},
};

/// Returns whether interrupts are currently enabled.
#[inline]
pub fn are_enabled() -> bool {
    flag::are_enabled()
}

/// Enable interrupts on this CPU.
#[inline]
pub fn enable() {
    compiler_fence(Ordering::SeqCst);
    flag::enable();
}

/// Disable interrupts on this CPU.
#[inline]
pub fn disable() {
    flag::disable();
    compiler_fence(Ordering::SeqCst);
}

/// Saves the interrupt flag, disables interrupts and restores the
/// saved flag once it is dropped.
///
/// Guards nest: only the outermost guard turns interrupts back on.
#[must_use = "interrupts are restored as soon as the guard is dropped"]
pub struct IrqGuard {
    was_enabled: bool,
    /// The flag belongs to the CPU that created the guard.
    _not_send: PhantomData<*mut ()>,
}

impl IrqGuard {
    /// Disable interrupts until the returned guard is dropped.
    pub fn new() -> Self {
        let was_enabled = are_enabled();
        if was_enabled {
            disable();
        }

        Self {
            was_enabled,
            _not_send: PhantomData,
        }
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.was_enabled {
            enable();
        }
    }
}

#[cfg(target_os = "none")]
mod flag {
    pub use super::super::imp::{
        are_interrupts_enabled as are_enabled, disable_interrupts as disable,
        enable_interrupts as enable,
    };
}

#[cfg(all(not(target_os = "none"), test))]
mod flag {
    use std::cell::Cell;

    std::thread_local! {
        static ENABLED: Cell<bool> = const { Cell::new(true) };
    }

    pub fn are_enabled() -> bool {
        ENABLED.with(Cell::get)
    }

    pub fn enable() {
        ENABLED.with(|flag| flag.set(true));
    }

    pub fn disable() {
        ENABLED.with(|flag| flag.set(false));
    }
}

#[cfg(all(not(target_os = "none"), not(test)))]
mod flag {
    use core::sync::atomic::{AtomicBool, Ordering};

    static ENABLED: AtomicBool = AtomicBool::new(true);

    pub fn are_enabled() -> bool {
        ENABLED.load(Ordering::Relaxed)
    }

    pub fn enable() {
        ENABLED.store(true, Ordering::Relaxed);
    }

    pub fn disable() {
        ENABLED.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_disables_and_restores() {
        enable();
        {
            let _guard = IrqGuard::new();
            assert!(!are_enabled());
        }
        assert!(are_enabled());
    }

    #[test]
    fn nested_guards_only_restore_at_the_outermost() {
        enable();
        let outer = IrqGuard::new();
        {
            let _inner = IrqGuard::new();
            assert!(!are_enabled());
        }
        assert!(!are_enabled());
        drop(outer);
        assert!(are_enabled());
    }

    #[test]
    fn guard_keeps_interrupts_disabled_if_they_were() {
        disable();
        let guard = IrqGuard::new();
        assert!(!are_enabled());
        drop(guard);
        assert!(!are_enabled());
        enable();
    }
}
