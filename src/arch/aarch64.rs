use super::context::EntryFn;
#[cfg(target_os = "none")]
use core::arch::asm;
use core::arch::global_asm;

/// The `I` bit of `DAIF`, set while IRQs are masked.
#[cfg(target_os = "none")]
const DAIF_IRQ: u64 = 1 << 7;

#[cfg(target_os = "none")]
#[inline]
pub fn are_interrupts_enabled() -> bool {
    let daif: u64;
    unsafe { asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack, preserves_flags)) };
    daif & DAIF_IRQ == 0
}

#[cfg(target_os = "none")]
#[inline]
pub fn enable_interrupts() {
    unsafe { asm!("msr daifclr, #2", options(nomem, nostack)) }
}

#[cfg(target_os = "none")]
#[inline]
pub fn disable_interrupts() {
    unsafe { asm!("msr daifset, #2", options(nomem, nostack)) }
}

// Frame pushed by `kestrel_continuation_swap`, 160 bytes:
//
//   0: x19 x20 x21 x22 x23 x24 x25 x26 x27 x28 x29 x30
//  96: d8 d9 d10 d11 d12 d13 d14 d15
//
// A fresh frame carries the argument in x19, the entry in x20 and
// `kestrel_continuation_start` as the link register.
global_asm!(
    ".section .text",
    ".global kestrel_continuation_swap",
    "kestrel_continuation_swap:",
    "    sub sp, sp, #160",
    "    stp x19, x20, [sp, #0]",
    "    stp x21, x22, [sp, #16]",
    "    stp x23, x24, [sp, #32]",
    "    stp x25, x26, [sp, #48]",
    "    stp x27, x28, [sp, #64]",
    "    stp x29, x30, [sp, #80]",
    "    stp d8, d9, [sp, #96]",
    "    stp d10, d11, [sp, #112]",
    "    stp d12, d13, [sp, #128]",
    "    stp d14, d15, [sp, #144]",
    "    mov x9, sp",
    "    str x9, [x0]",
    "    mov sp, x1",
    "    ldp x19, x20, [sp, #0]",
    "    ldp x21, x22, [sp, #16]",
    "    ldp x23, x24, [sp, #32]",
    "    ldp x25, x26, [sp, #48]",
    "    ldp x27, x28, [sp, #64]",
    "    ldp x29, x30, [sp, #80]",
    "    ldp d8, d9, [sp, #96]",
    "    ldp d10, d11, [sp, #112]",
    "    ldp d12, d13, [sp, #128]",
    "    ldp d14, d15, [sp, #144]",
    "    add sp, sp, #160",
    "    ret",
    "",
    ".global kestrel_continuation_start",
    "kestrel_continuation_start:",
    "    mov x0, x19",
    "    mov x30, xzr",
    "    br x20",
);

extern "C" {
    fn kestrel_continuation_start();
}

const FRAME_WORDS: usize = 20;

/// Write the initial frame below `top` and return the stack pointer to load.
pub unsafe fn prepare_stack(top: usize, entry: EntryFn, arg: usize) -> usize {
    let mut frame = [0usize; FRAME_WORDS];
    frame[0] = arg;
    frame[1] = entry as usize;
    frame[11] = kestrel_continuation_start as *const () as usize;

    let sp = (top & !0xf) - FRAME_WORDS * core::mem::size_of::<usize>();
    core::ptr::copy_nonoverlapping(frame.as_ptr(), sp as *mut usize, FRAME_WORDS);
    sp
}
