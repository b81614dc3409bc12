//! x86_64 System V register-save context switch.
//!
//! Saves the callee-saved integer registers (`rbp`, `rbx`, `r12`-`r15`)
//! plus a return address, mirroring what a normal `call`/`ret` pair would
//! preserve across a function call — which is exactly what `jump_context`
//! impersonates for the purposes of the resumed code.

use super::{EntryFn, RawContext, Transfer};

core::arch::global_asm!(
    r#"
.text
.globl mntask_jump_context
.align 16
.type mntask_jump_context,@function
mntask_jump_context:
    push rbp
    push rbx
    push r12
    push r13
    push r14
    push r15
    mov rax, rsp
    mov rsp, rdi
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    pop rbp
    mov rdx, rsi
    ret
.size mntask_jump_context, . - mntask_jump_context

.globl mntask_trampoline
.align 16
.type mntask_trampoline,@function
mntask_trampoline:
    mov rdi, rax
    mov rsi, rdx
    call r12
    ud2
.size mntask_trampoline, . - mntask_trampoline
"#
);

extern "C" {
    /// `(target_rsp: rdi, data: rsi) -> (old_rsp in rax, data in rdx)`.
    fn mntask_jump_context(target: RawContext, data: *mut u8) -> Transfer;
    /// Landing pad for a freshly made context; never called directly from
    /// Rust, only jumped to via the saved return-address slot.
    fn mntask_trampoline();
}

/// Layout of the initial stack frame `make_context` writes, matching the
/// push order in `mntask_jump_context` (low address first): r15, r14, r13,
/// r12, rbx, rbp, return address.
#[repr(C)]
struct InitialFrame {
    r15: u64,
    r14: u64,
    r13: u64,
    /// Restored into r12, which `mntask_trampoline` then calls: this is how
    /// the entry function pointer survives the generic register-restore
    /// path without a dedicated asm case for "first resume".
    entry_fn: u64,
    rbx: u64,
    rbp: u64,
    return_addr: u64,
}

pub unsafe fn make_context(stack_top: *mut u8, size: usize, entry: EntryFn) -> RawContext {
    debug_assert!(size >= core::mem::size_of::<InitialFrame>());
    let mut sp = (stack_top as usize) & !0xF;
    sp -= core::mem::size_of::<InitialFrame>();
    let frame = sp as *mut InitialFrame;
    frame.write(InitialFrame {
        r15: 0,
        r14: 0,
        r13: 0,
        entry_fn: entry as usize as u64,
        rbx: 0,
        rbp: 0,
        return_addr: mntask_trampoline as usize as u64,
    });
    sp as RawContext
}

pub unsafe fn jump_context(target: RawContext, data: *mut u8) -> Transfer {
    mntask_jump_context(target, data)
}
