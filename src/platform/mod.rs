//! Hardware seam.
//!
//! Everything the kernel core needs from the machine goes through the
//! [`Platform`] trait: translation-cache control, the privileged-stack slot,
//! the interrupt controller, timer/clock programming, and raw access to the
//! text frames and the user-image window. The context-switch and ring-
//! transition trampolines are not part of the trait; they live with the
//! interrupt entry code and are only reachable from the metal build.

#[cfg(target_arch = "x86_64")]
pub mod x86;

#[cfg(test)]
pub mod sim;

use crate::console::vga::{Cursor, VideoFrame};

/// Kernel code segment installed by the external descriptor setup.
pub const KERNEL_CS: u16 = 0x10;
/// Kernel stack/data segment.
pub const KERNEL_SS: u16 = 0x18;
/// User code segment (RPL 3).
pub const USER_CS: u16 = 0x23;
/// User stack/data segment (RPL 3).
pub const USER_SS: u16 = 0x2B;

/// Interrupt-controller line of the preemption timer.
pub const IRQ_TIMER: u8 = 0;
/// Keyboard line.
pub const IRQ_KEYBOARD: u8 = 1;
/// Cascade line to the secondary controller.
pub const IRQ_CASCADE: u8 = 2;
/// Periodic clock line.
pub const IRQ_RTC: u8 = 8;

/// Privileged stack installed for a process: the stack the CPU switches to
/// when a trap suspends that process, plus its segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackDescriptor {
    pub sp: u32,
    pub ss: u16,
}

impl StackDescriptor {
    pub fn for_pid(pid: u8) -> StackDescriptor {
        StackDescriptor {
            sp: crate::memory::kernel_stack_top(pid),
            ss: KERNEL_SS,
        }
    }
}

pub trait Platform {
    /// Reload the translation root, dropping every cached non-global
    /// translation. Required after any remap.
    fn flush_tlb(&mut self, directory_base: u32);

    /// Install the privileged stack used on the next trap out of user mode.
    fn set_kernel_stack(&mut self, stack: StackDescriptor);

    fn irq_enable(&mut self, line: u8);
    fn irq_disable(&mut self, line: u8);
    fn irq_ack(&mut self, line: u8);

    /// Program the preemption timer frequency.
    fn timer_set_hz(&mut self, hz: u32);

    /// Program the periodic clock's hardware rate register.
    fn rtc_program(&mut self, rate: u8);

    /// Raw access to a text frame by physical address (display or a
    /// console's backing frame).
    fn video_frame(&mut self, phys: u32) -> &mut VideoFrame;

    /// Copy one whole text frame onto another. The two frames are always
    /// distinct: a console switch exchanges the display with a backing frame.
    fn copy_video(&mut self, dst_phys: u32, src_phys: u32);

    /// The user program-image window, as currently mapped.
    fn user_window(&mut self) -> &mut [u8];

    /// Move the hardware cursor (visible console only).
    fn set_cursor(&mut self, cursor: Cursor);
}
