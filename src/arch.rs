//! Everything that depends on the CPU the kernel runs on.
//!
//! The rest of the crate only talks to the hardware through
//! [`interrupts`] and [`context`].

pub mod context;
pub mod interrupts;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
use aarch64 as imp;

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
use self::x86_64 as imp;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("kestrel only supports x86_64 and aarch64");
