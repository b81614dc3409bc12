//! aarch64 AAPCS64 register-save context switch.
//!
//! Same shape as the x86_64 backend: save callee-saved registers (`x19`-`x28`,
//! frame pointer `x29`, link register `x30`) on the current stack, switch
//! `sp`, restore the target's registers, and either return normally (a
//! previously-suspended call site) or land in the trampoline (a freshly
//! created context).

use super::{EntryFn, RawContext, Transfer};

core::arch::global_asm!(
    r#"
.text
.globl mntask_jump_context
.align 4
.type mntask_jump_context,@function
mntask_jump_context:
    stp x19, x20, [sp, #-16]!
    stp x21, x22, [sp, #-16]!
    stp x23, x24, [sp, #-16]!
    stp x25, x26, [sp, #-16]!
    stp x27, x28, [sp, #-16]!
    stp x29, x30, [sp, #-16]!
    mov x2, sp
    mov sp, x0
    ldp x29, x30, [sp], #16
    ldp x27, x28, [sp], #16
    ldp x25, x26, [sp], #16
    ldp x23, x24, [sp], #16
    ldp x21, x22, [sp], #16
    ldp x19, x20, [sp], #16
    mov x0, x2
    ret
.size mntask_jump_context, . - mntask_jump_context

.globl mntask_trampoline
.align 4
.type mntask_trampoline,@function
mntask_trampoline:
    blr x19
    brk #1
.size mntask_trampoline, . - mntask_trampoline
"#
);

extern "C" {
    /// `(target_sp: x0, data: x1) -> (old_sp in x0, data in x1)`.
    fn mntask_jump_context(target: RawContext, data: *mut u8) -> Transfer;
    fn mntask_trampoline();
}

/// Layout of the initial stack frame `make_context` writes, in ascending
/// memory order starting at the returned context pointer — matching the
/// `ldp` restore order in `mntask_jump_context`.
#[repr(C)]
struct InitialFrame {
    x29: u64,
    return_addr: u64,
    x27: u64,
    x28: u64,
    x25: u64,
    x26: u64,
    x23: u64,
    x24: u64,
    x21: u64,
    x22: u64,
    /// Restored into x19, which `mntask_trampoline` calls through.
    entry_fn: u64,
    x20: u64,
}

pub unsafe fn make_context(stack_top: *mut u8, size: usize, entry: EntryFn) -> RawContext {
    debug_assert!(size >= core::mem::size_of::<InitialFrame>());
    let mut sp = (stack_top as usize) & !0xF;
    sp -= core::mem::size_of::<InitialFrame>();
    let frame = sp as *mut InitialFrame;
    frame.write(InitialFrame {
        x29: 0,
        return_addr: mntask_trampoline as usize as u64,
        x27: 0,
        x28: 0,
        x25: 0,
        x26: 0,
        x23: 0,
        x24: 0,
        x21: 0,
        x22: 0,
        entry_fn: entry as usize as u64,
        x20: 0,
    });
    sp as RawContext
}

pub unsafe fn jump_context(target: RawContext, data: *mut u8) -> Transfer {
    mntask_jump_context(target, data)
}
