use bit_field::BitField;
use bitflags::bitflags;

use crate::memory::{
    console_frame, user_frame, DISPLAY_PAGE, KERNEL_SLOT, LOW_SLOT, TABLE_ENTRIES,
    USER_IMAGE_SLOT, USER_VIDEO_BASE, USER_VIDEO_SLOT,
};

bitflags! {
    /// Attribute bits of a directory or table entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE      = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        const LARGE         = 1 << 7;
        const GLOBAL        = 1 << 8;
    }
}

/// One raw 32-bit translation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    pub const fn absent() -> Entry {
        Entry(0)
    }

    /// Entry referencing a second-level table or a 4KB page by frame number.
    pub fn page(frame: u32, flags: EntryFlags) -> Entry {
        let mut e = Entry(flags.bits());
        e.set_frame(frame);
        e
    }

    /// 4MB entry referencing a large frame by its 4MB-granular index.
    pub fn large(frame: u32, flags: EntryFlags) -> Entry {
        let mut e = Entry(flags.bits() | EntryFlags::LARGE.bits());
        e.set_large_frame(frame);
        e
    }

    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0)
    }

    pub fn is_present(&self) -> bool {
        self.flags().contains(EntryFlags::PRESENT)
    }

    /// Frame number in bits 31:12 (4KB pages and table references).
    pub fn frame(&self) -> u32 {
        self.0.get_bits(12..32)
    }

    pub fn set_frame(&mut self, frame: u32) {
        self.0.set_bits(12..32, frame);
    }

    /// Frame index in bits 31:22 (4MB pages).
    pub fn large_frame(&self) -> u32 {
        self.0.get_bits(22..32)
    }

    pub fn set_large_frame(&mut self, frame: u32) {
        self.0.set_bits(22..32, frame);
    }
}

/// A first-level directory or second-level table: 1024 raw entries, page-aligned.
#[repr(C, align(4096))]
pub struct PageTable(pub [Entry; TABLE_ENTRIES]);

impl PageTable {
    pub const fn empty() -> PageTable {
        PageTable([Entry::absent(); TABLE_ENTRIES])
    }
}

/// The kernel's translation tables.
///
/// One directory for the whole kernel lifetime: processes are isolated
/// temporally by rewriting the single user-image slot, never by swapping
/// directories. `init` wires the directory to the second-level tables by their
/// resident addresses, so it must run after the structure has reached its
/// final storage location.
#[repr(C)]
pub struct AddressSpace {
    directory: PageTable,
    /// Second-level table for the low 4MB; only the video pages are present.
    low_table: PageTable,
    /// One-entry second-level table backing the user video window.
    window_table: PageTable,
}

impl AddressSpace {
    pub const fn empty() -> AddressSpace {
        AddressSpace {
            directory: PageTable::empty(),
            low_table: PageTable::empty(),
            window_table: PageTable::empty(),
        }
    }

    /// Build the boot mapping: video pages in the low table, the global 4MB
    /// kernel page, everything else absent.
    pub fn init(&mut self) {
        let kflags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
        for page in DISPLAY_PAGE..DISPLAY_PAGE + 4 {
            self.low_table.0[page] = Entry::page(page as u32, kflags);
        }
        let low_base = &self.low_table as *const PageTable as usize as u32;
        self.directory.0[LOW_SLOT] = Entry::page(low_base >> 12, kflags);
        self.directory.0[KERNEL_SLOT] =
            Entry::large(KERNEL_SLOT as u32, kflags | EntryFlags::GLOBAL);
    }

    /// Point the user-image slot at `pid`'s physical frame.
    ///
    /// The caller must invalidate the translation cache afterwards; stale
    /// translations of the previous image would break temporal isolation.
    pub fn activate(&mut self, pid: u8) {
        debug_assert!(pid < crate::process::MAX_PROCESSES as u8);
        let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER;
        self.directory.0[USER_IMAGE_SLOT] = Entry::large(user_frame(pid), flags);
    }

    /// Point the kernel video window at the display frame (`visible`) or at
    /// `console`'s private frame. Followed by a translation-cache flush.
    pub fn map_console_video(&mut self, console: usize, visible: bool) {
        debug_assert!(console < crate::console::CONSOLE_COUNT);
        let frame = if visible {
            DISPLAY_PAGE as u32
        } else {
            console_frame(console) >> 12
        };
        self.low_table.0[DISPLAY_PAGE].set_frame(frame);
    }

    /// Install the user-mode video window over `console`'s private frame and
    /// return its fixed virtual address.
    pub fn expose_user_video_window(&mut self, console: usize) -> u32 {
        debug_assert!(console < crate::console::CONSOLE_COUNT);
        let uflags = EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER;
        self.window_table.0[0] = Entry::page(console_frame(console) >> 12, uflags);
        let window_base = &self.window_table as *const PageTable as usize as u32;
        self.directory.0[USER_VIDEO_SLOT] = Entry::page(window_base >> 12, uflags);
        USER_VIDEO_BASE
    }

    /// Physical frame the kernel video window currently resolves to.
    pub fn video_window_frame(&self) -> u32 {
        self.low_table.0[DISPLAY_PAGE].frame() << 12
    }

    /// 4MB frame index the user-image slot currently translates to.
    pub fn user_image_frame(&self) -> u32 {
        self.directory.0[USER_IMAGE_SLOT].large_frame()
    }

    /// Resident address of the first-level directory, for CR3.
    pub fn directory_base(&self) -> u32 {
        &self.directory as *const PageTable as usize as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DISPLAY_FRAME, USER_IMAGE_SLOT};

    #[test]
    fn entry_encodes_large_frame_in_high_bits() {
        let e = Entry::large(5, EntryFlags::PRESENT | EntryFlags::USER);
        assert_eq!(e.large_frame(), 5);
        assert!(e.flags().contains(EntryFlags::LARGE));
        assert_eq!(e.0 & 0xFFC0_0000, 5 << 22);
    }

    #[test]
    fn entry_encodes_page_frame_in_high_bits() {
        let e = Entry::page(184, EntryFlags::PRESENT | EntryFlags::WRITABLE);
        assert_eq!(e.frame(), 184);
        assert_eq!(e.0 & 0xFFFF_F000, 184 << 12);
        assert!(e.is_present());
    }

    #[test]
    fn init_maps_only_video_pages_in_low_table() {
        let mut space = AddressSpace::empty();
        space.init();
        for page in 0..TABLE_ENTRIES {
            let entry = space.low_table.0[page];
            if (DISPLAY_PAGE..DISPLAY_PAGE + 4).contains(&page) {
                assert!(entry.is_present());
                assert_eq!(entry.frame(), page as u32);
                assert!(!entry.flags().contains(EntryFlags::USER));
            } else {
                assert!(!entry.is_present());
            }
        }
        let kernel = space.directory.0[KERNEL_SLOT];
        assert!(kernel.is_present());
        assert!(kernel.flags().contains(EntryFlags::LARGE | EntryFlags::GLOBAL));
        assert_eq!(kernel.large_frame(), 1);
    }

    #[test]
    fn activate_rewrites_the_single_user_slot() {
        let mut space = AddressSpace::empty();
        space.init();
        space.activate(0);
        let first = space.directory.0[USER_IMAGE_SLOT];
        assert_eq!(first.large_frame(), 2);
        assert!(first.flags().contains(EntryFlags::USER | EntryFlags::LARGE));
        assert!(!first.flags().contains(EntryFlags::GLOBAL));

        space.activate(4);
        let second = space.directory.0[USER_IMAGE_SLOT];
        assert_eq!(second.large_frame(), 6);
        // Still exactly one user-image mapping.
        let user_slots = space
            .directory
            .0
            .iter()
            .enumerate()
            .filter(|(i, e)| *i >= 2 && e.is_present() && e.flags().contains(EntryFlags::LARGE))
            .count();
        assert_eq!(user_slots, 1);
    }

    #[test]
    fn video_window_tracks_visibility() {
        let mut space = AddressSpace::empty();
        space.init();
        assert_eq!(space.video_window_frame(), DISPLAY_FRAME);

        space.map_console_video(2, false);
        assert_eq!(space.video_window_frame(), console_frame(2));

        space.map_console_video(2, true);
        assert_eq!(space.video_window_frame(), DISPLAY_FRAME);
    }

    #[test]
    fn user_window_maps_console_private_frame() {
        let mut space = AddressSpace::empty();
        space.init();
        let addr = space.expose_user_video_window(1);
        assert_eq!(addr, USER_VIDEO_BASE);
        let slot = space.directory.0[USER_VIDEO_SLOT];
        assert!(slot.is_present());
        assert!(slot.flags().contains(EntryFlags::USER));
        assert_eq!(space.window_table.0[0].frame(), console_frame(1) >> 12);
        assert!(space.window_table.0[0].flags().contains(EntryFlags::USER));
    }
}
