use super::context::EntryFn;
use core::arch::{asm, global_asm};

bitflags::bitflags! {
    /// The bits of `RFLAGS` the kernel touches.
    pub struct RFlags: u64 {
        const CARRY = 1 << 0;
        /// Always reads as one.
        const RESERVED = 1 << 1;
        const PARITY = 1 << 2;
        const AUXILIARY_CARRY = 1 << 4;
        const ZERO = 1 << 6;
        const SIGN = 1 << 7;
        const TRAP = 1 << 8;
        const INTERRUPT = 1 << 9;
        const DIRECTION = 1 << 10;
        const OVERFLOW = 1 << 11;

        /// Flags a fresh continuation starts with cleared.
        ///
        /// Interrupts stay off until the thread entry turns them on.
        const ENTRY_CLEARED = Self::CARRY.bits
            | Self::PARITY.bits
            | Self::AUXILIARY_CARRY.bits
            | Self::ZERO.bits
            | Self::SIGN.bits
            | Self::INTERRUPT.bits
            | Self::DIRECTION.bits
            | Self::OVERFLOW.bits;
    }
}

/// Read the current value of `RFLAGS`.
#[inline]
pub fn read_rflags() -> RFlags {
    let raw: u64;
    // SAFETY
    // Pushing and popping the flags has no side effects.
    unsafe { asm!("pushfq", "pop {}", out(reg) raw, options(preserves_flags)) };
    RFlags::from_bits_truncate(raw)
}

#[cfg(target_os = "none")]
#[inline]
pub fn are_interrupts_enabled() -> bool {
    read_rflags().contains(RFlags::INTERRUPT)
}

#[cfg(target_os = "none")]
#[inline]
pub fn enable_interrupts() {
    unsafe { asm!("sti", options(nomem, nostack)) }
}

#[cfg(target_os = "none")]
#[inline]
pub fn disable_interrupts() {
    unsafe { asm!("cli", options(nomem, nostack)) }
}

// Frame pushed by `kestrel_continuation_swap`, lowest address first:
//
// rflags | r15 | r14 | r13 | r12 | rbx | rbp | return address
//
// A fresh frame returns into `kestrel_continuation_start`, which moves
// the argument from r12 into rdi and jumps to the entry in rbx.
global_asm!(
    ".section .text",
    ".global kestrel_continuation_swap",
    "kestrel_continuation_swap:",
    "    push rbp",
    "    push rbx",
    "    push r12",
    "    push r13",
    "    push r14",
    "    push r15",
    "    pushfq",
    "    mov [rdi], rsp",
    "    mov rsp, rsi",
    "    popfq",
    "    pop r15",
    "    pop r14",
    "    pop r13",
    "    pop r12",
    "    pop rbx",
    "    pop rbp",
    "    ret",
    "",
    ".global kestrel_continuation_start",
    "kestrel_continuation_start:",
    "    mov rdi, r12",
    "    jmp rbx",
);

extern "C" {
    fn kestrel_continuation_start();
}

const FRAME_WORDS: usize = 9;

/// Write the initial frame below `top` and return the stack pointer to load.
pub unsafe fn prepare_stack(top: usize, entry: EntryFn, arg: usize) -> usize {
    let flags = (read_rflags() - RFlags::ENTRY_CLEARED) | RFlags::RESERVED;

    let frame: [usize; FRAME_WORDS] = [
        flags.bits() as usize,
        0,
        0,
        0,
        arg,
        entry as usize,
        0,
        kestrel_continuation_start as *const () as usize,
        // the entry function sees this as its return address, and never uses it
        0,
    ];

    let sp = (top & !0xf) - FRAME_WORDS * core::mem::size_of::<usize>();
    core::ptr::copy_nonoverlapping(frame.as_ptr(), sp as *mut usize, FRAME_WORDS);
    sp
}
