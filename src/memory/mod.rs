//! Fixed address-space layout.
//!
//! The kernel manages a flat 4GB space through a single 1024-entry first-level
//! directory: slot 0 covers the low 4MB through a second-level table (only the
//! video pages are present), slot 1 is the global 4MB kernel page, slot 32 is
//! the one user program-image page and slot 33 carries the user video window.

pub mod paging;

/// 4KB page size.
pub const PAGE_SIZE: u32 = 0x1000;
/// 4MB large-page size (one first-level slot).
pub const LARGE_PAGE_SIZE: u32 = 0x40_0000;
/// Entries per directory or table.
pub const TABLE_ENTRIES: usize = 1024;

/// Directory slot of the second-level table for the low 4MB.
pub const LOW_SLOT: usize = 0;
/// Directory slot of the kernel's 4MB page (virtual = physical = 4MB).
pub const KERNEL_SLOT: usize = 1;
/// Directory slot of the user program image (128MB).
pub const USER_IMAGE_SLOT: usize = 32;
/// Directory slot of the user video window (132MB).
pub const USER_VIDEO_SLOT: usize = 33;

/// Base of the user program-image page.
pub const USER_IMAGE_BASE: u32 = 0x0800_0000;
/// End of the user program-image page (exclusive); also the user video window base.
pub const USER_IMAGE_END: u32 = 0x0840_0000;
/// Virtual address handed to user programs by the map-video call.
pub const USER_VIDEO_BASE: u32 = USER_IMAGE_END;
/// Load address of program bytes within the image page.
pub const USER_LOAD_ADDR: u32 = 0x0804_8000;
/// Initial user-mode stack pointer (top of the image page).
pub const USER_STACK_TOP: u32 = USER_IMAGE_END - 4;

/// Physical text-mode display frame.
pub const DISPLAY_FRAME: u32 = 0xB8000;
/// Page index of the display frame (and of the kernel video window).
pub const DISPLAY_PAGE: usize = (DISPLAY_FRAME / PAGE_SIZE) as usize;

/// Top of the kernel region; per-process kernel stacks grow down from here.
pub const EIGHT_MB: u32 = 0x80_0000;
/// Per-process kernel stack size.
pub const KSTACK_SIZE: u32 = 0x2000;

/// Private backing frame for a console's off-screen text.
pub fn console_frame(console: usize) -> u32 {
    debug_assert!(console < 3);
    DISPLAY_FRAME + (console as u32 + 1) * PAGE_SIZE
}

/// Physical 4MB frame index backing a process image: frame 2 is pid 0 (8MB).
pub fn user_frame(pid: u8) -> u32 {
    pid as u32 + 2
}

/// Top of the privileged stack used when a trap suspends this process.
pub fn kernel_stack_top(pid: u8) -> u32 {
    EIGHT_MB - KSTACK_SIZE * pid as u32
}
