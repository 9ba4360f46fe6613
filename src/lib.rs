//! The memory and thread management core of the Kestrel kernel.
//!
//! The crate is split along the layers the kernel boots through:
//!
//! - [`mem`] owns physical memory: the firmware [memory map](mem::map),
//!   the [buddy allocator](mem::buddy) for pages and the
//!   [slab allocator](mem::slab) for kernel objects.
//! - [`sched`] implements a cooperative, single CPU scheduler.
//! - [`sync`] provides the interrupt-excluding spin lock used inside the
//!   allocators and the sleeping [`Mutex`](sync::Mutex) and
//!   [`Condvar`](sync::Condvar) used by threads.
//!
//! [`boot::init`] wires all of them together.
#![cfg_attr(not(test), no_std)]
#![deny(rust_2018_idioms)]

pub mod arch;
pub mod boot;
pub mod mem;
pub mod print;
pub mod sched;
pub mod selftest;
pub mod sync;
pub mod unit;

#[cfg(test)]
mod testing;
