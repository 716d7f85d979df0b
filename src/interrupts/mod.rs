//! Hardware interrupt entry points.
//!
//! Descriptor-table setup belongs to the boot environment; it points the
//! timer, keyboard and clock vectors (and int 0x80) at the naked entries
//! exported here, and the fault vectors at the entries in [`faults`]. Each
//! IRQ entry saves the full caller-visible register file, calls its Rust
//! handler, and irets. The timer path may switch kernel stacks in the
//! middle, in which case the iret it eventually reaches runs on behalf of
//! a different console.
//!
//! Handlers run with interrupts disabled and take the kernel lock for
//! bookkeeping only. Context switches and ring transitions happen after
//! the lock is dropped, acting on the data the kernel handed back.

pub mod faults;
pub mod usermode;

use core::arch::naked_asm;

use x86_64::instructions::port::Port;

use crate::kernel::{KERNEL, SwitchOutcome};
use crate::log_error;
use crate::scheduler::TickDecision;
use crate::scheduler::context::switch_context;
use usermode::user_dispatch;

/// PS/2 controller data port.
const KEYBOARD_PORT: u16 = 0x60;

macro_rules! interrupt_entry {
    ($(#[$meta:meta])* $name:ident => $handler:ident) => {
        $(#[$meta])*
        #[unsafe(naked)]
        pub extern "C" fn $name() {
            naked_asm!(
                // 15 saves on top of the 5-qword CPU frame keep the stack
                // 16-byte aligned at the call.
                "push rax",
                "push rcx",
                "push rdx",
                "push rbx",
                "push rbp",
                "push rsi",
                "push rdi",
                "push r8",
                "push r9",
                "push r10",
                "push r11",
                "push r12",
                "push r13",
                "push r14",
                "push r15",
                "call {handler}",
                "pop r15",
                "pop r14",
                "pop r13",
                "pop r12",
                "pop r11",
                "pop r10",
                "pop r9",
                "pop r8",
                "pop rdi",
                "pop rsi",
                "pop rbp",
                "pop rbx",
                "pop rdx",
                "pop rcx",
                "pop rax",
                "iretq",
                handler = sym $handler,
            );
        }
    };
}

interrupt_entry!(
    /// IRQ 0: the preemption driver.
    timer_interrupt_entry => timer_tick_handler
);

interrupt_entry!(
    /// IRQ 1: scancode intake, line editing, console switching.
    keyboard_interrupt_entry => keyboard_interrupt_handler
);

interrupt_entry!(
    /// IRQ 8: periodic clock ticks for the clock device.
    clock_interrupt_entry => clock_tick_handler
);

extern "C" fn timer_tick_handler() {
    let decision = KERNEL.lock().timer_tick();
    if let TickDecision::Switch { save, resume, .. } = decision {
        // Lock is gone; the pointers target console records in static
        // kernel state. Control comes back here once this console is
        // scheduled again.
        unsafe { switch_context(save, resume) };
    }
}

extern "C" fn keyboard_interrupt_handler() {
    let mut port: Port<u8> = Port::new(KEYBOARD_PORT);
    let scancode = unsafe { port.read() };
    let mut kernel = KERNEL.lock();
    if let Some(target) = kernel.key_event(scancode) {
        let outcome = kernel.switch_console(target);
        drop(kernel);
        if let SwitchOutcome::NeedsShell { console, abandoned } = outcome {
            bring_up_shell(console, abandoned);
        }
    }
}

extern "C" fn clock_tick_handler() {
    KERNEL.lock().rtc_tick();
}

/// First activation of a console: start its root shell from inside the
/// keyboard interrupt. The interrupted kernel path is parked in the
/// abandoned console's context slot; a later tick re-enters it and lets
/// the interrupt finish for whatever process was running.
fn bring_up_shell(console: usize, abandoned: usize) {
    let parked = {
        let mut kernel = KERNEL.lock();
        match kernel.launch_root(console) {
            Ok(plan) => {
                let slot = kernel.console_context_slot(abandoned);
                Some((plan.entry, plan.user_stack, slot))
            }
            Err(err) => {
                log_error!("console {}: shell launch failed: {}", console, err);
                None
            }
        }
    };
    if let Some((entry, user_stack, slot)) = parked {
        // Returns when the scheduler rotates back to the abandoned
        // console; the status value is meaningless on that path.
        unsafe { user_dispatch(entry as u64, user_stack as u64, slot) };
    }
}
