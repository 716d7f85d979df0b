//! Ring transitions and kernel-path parking.
//!
//! Three one-way doors, all speaking the [`Context`] layout the scheduler
//! uses for tick switches:
//! - [`syscall_entry`] is the int 0x80 door in from ring 3;
//! - [`user_dispatch`] parks the calling kernel path and irets out to
//!   ring 3;
//! - [`resume_kernel`] re-enters a parked kernel path, delivering a halt
//!   status.
//!
//! A context parked by one primitive may be re-entered by another: every
//! save stores RSP pointing at the caller's return address plus a resume
//! RIP that ends in `ret`, so `switch_context`, `user_dispatch` and
//! `resume_kernel` interoperate freely.

use core::arch::naked_asm;

use crate::platform::{USER_CS, USER_SS};
use crate::scheduler::context::Context;

/// The int 0x80 entry, reached from ring 3.
/// Saves the caller-visible registers, feeds the syscall registers to
/// [`crate::syscalls::dispatch`] per the System V calling convention, and
/// irets with the result in RAX.
///
/// Convention: RAX = call id, RDI = arg0, RSI = arg1, RDX = arg2.
#[unsafe(naked)]
pub extern "C" fn syscall_entry() {
    naked_asm!(
        "push r15",
        "push r14",
        "push r13",
        "push r12",
        "push r11",
        "push r10",
        "push r9",
        "push r8",
        "push rbp",
        "push rdx",
        "push rsi",
        "push rdi",
        "push rbx",
        "push rcx",
        // CPU frame (5) plus 14 saves is an odd number of qwords; one more
        // keeps the stack 16-byte aligned at the call.
        "sub rsp, 8",
        // dispatch(id, arg0, arg1, arg2) <- (rax, rdi, rsi, rdx)
        "mov rcx, rdx",
        "mov rdx, rsi",
        "mov rsi, rdi",
        "mov rdi, rax",
        "call {dispatch}",
        "add rsp, 8",
        // RAX carries the result back; everything else is restored.
        "pop rcx",
        "pop rbx",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rbp",
        "pop r8",
        "pop r9",
        "pop r10",
        "pop r11",
        "pop r12",
        "pop r13",
        "pop r14",
        "pop r15",
        "iretq",
        dispatch = sym crate::syscalls::dispatch,
    );
}

/// Leave the kernel for ring 3 at `entry`, parking the calling kernel path
/// in `ctx_out` first.
///
/// The call returns when something re-enters the parked context. A halt
/// resuming the launch caller delivers its status as the return value via
/// [`resume_kernel`]; a scheduler switch re-entering an abandoned path
/// leaves the return value unspecified, and such callers must ignore it.
///
/// # Safety
/// Interrupts must be disabled. `ctx_out` must point into state that
/// outlives the excursion to ring 3, and `entry`/`user_stack` must lie in
/// the live user mapping.
#[unsafe(naked)]
pub unsafe extern "C" fn user_dispatch(entry: u64, user_stack: u64, ctx_out: *mut Context) -> i64 {
    naked_asm!(
        "cli",
        // Park the caller: the callee-saved set plus the resume point.
        "mov [rdx + 0x08], rbp",
        "mov [rdx + 0x10], rbx",
        "mov [rdx + 0x18], r12",
        "mov [rdx + 0x20], r13",
        "mov [rdx + 0x28], r14",
        "mov [rdx + 0x30], r15",
        "lea rax, [rip + 2f]",
        "mov [rdx + 0x38], rax",
        "mov [rdx + 0x00], rsp",
        // Ring 3 frame: SS, RSP, RFLAGS with IF set, CS, RIP.
        "push {uss}",
        "push rsi",
        "pushfq",
        "pop rax",
        "or rax, 0x200",
        "push rax",
        "push {ucs}",
        "push rdi",
        "iretq",
        // Re-entered with RSP at our caller's return address and the
        // status (if any) in RAX.
        "2:",
        "ret",
        uss = const USER_SS as i64,
        ucs = const USER_CS as i64,
    );
}

/// Re-enter a parked kernel context; never returns to the caller.
/// `status` becomes the return value of the `user_dispatch` call that
/// parked the context.
///
/// # Safety
/// Interrupts must be disabled. `ctx` must hold a context parked by
/// [`user_dispatch`] or saved by
/// [`switch_context`](crate::scheduler::context::switch_context) and not
/// yet re-entered.
#[unsafe(naked)]
pub unsafe extern "C" fn resume_kernel(ctx: *const Context, status: i64) -> ! {
    naked_asm!(
        "mov rax, rsi",
        "mov rsp, [rdi + 0x00]",
        "mov rbp, [rdi + 0x08]",
        "mov rbx, [rdi + 0x10]",
        "mov r12, [rdi + 0x18]",
        "mov r13, [rdi + 0x20]",
        "mov r14, [rdi + 0x28]",
        "mov r15, [rdi + 0x30]",
        "jmp [rdi + 0x38]",
    );
}
