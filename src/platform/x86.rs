use core::ptr::NonNull;

use pic8259::ChainedPics;
use x86_64::instructions::port::Port;

use crate::console::vga::{Cursor, VideoFrame, BUFFER_WIDTH};
use crate::memory::{DISPLAY_FRAME, LARGE_PAGE_SIZE, PAGE_SIZE, USER_IMAGE_BASE};
use crate::platform::{Platform, StackDescriptor};

/// Remapped vector base of the primary controller.
pub const PIC_1_OFFSET: u8 = 32;
/// Remapped vector base of the secondary controller.
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

const PIT_BASE_HZ: u32 = 1_193_182;

/// The real machine: 8259 pair, PIT channel 0, CMOS clock, CRTC cursor and
/// the identity-mapped video/user memory windows.
pub struct X86Platform {
    pics: ChainedPics,
    pit_data: Port<u8>,
    pit_cmd: Port<u8>,
    cmos_index: Port<u8>,
    cmos_data: Port<u8>,
    crtc_index: Port<u8>,
    crtc_data: Port<u8>,
    tss_rsp0: Option<NonNull<u64>>,
}

// Single-processor kernel; the raw TSS slot never crosses CPUs.
unsafe impl Send for X86Platform {}

impl X86Platform {
    pub const fn new() -> X86Platform {
        X86Platform {
            pics: unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) },
            pit_data: Port::new(0x40),
            pit_cmd: Port::new(0x43),
            cmos_index: Port::new(0x70),
            cmos_data: Port::new(0x71),
            crtc_index: Port::new(0x3D4),
            crtc_data: Port::new(0x3D5),
            tss_rsp0: None,
        }
    }

    /// Remap the controllers, mask every line, and turn on the periodic
    /// clock interrupt (register B bit 6).
    pub fn init(&mut self) {
        unsafe {
            self.pics.initialize();
            self.pics.write_masks(0xFF, 0xFF);

            self.cmos_index.write(0x8B);
            let prev = self.cmos_data.read();
            self.cmos_index.write(0x8B);
            self.cmos_data.write(prev | 0x40);
        }
    }

    /// Attach the TSS privileged-stack slot owned by the external descriptor
    /// setup; until then stack installs are recorded nowhere.
    pub fn attach_tss_slot(&mut self, slot: NonNull<u64>) {
        self.tss_rsp0 = Some(slot);
    }
}

impl Platform for X86Platform {
    fn flush_tlb(&mut self, directory_base: u32) {
        use x86_64::registers::control::{Cr3, Cr3Flags};
        use x86_64::structures::paging::PhysFrame;
        use x86_64::PhysAddr;
        let frame = PhysFrame::containing_address(PhysAddr::new(directory_base as u64));
        unsafe {
            Cr3::write(frame, Cr3Flags::empty());
        }
    }

    fn set_kernel_stack(&mut self, stack: StackDescriptor) {
        if let Some(slot) = self.tss_rsp0 {
            unsafe {
                slot.as_ptr().write_volatile(stack.sp as u64);
            }
        }
    }

    fn irq_enable(&mut self, line: u8) {
        unsafe {
            let [mut m1, mut m2] = self.pics.read_masks();
            if line < 8 {
                m1 &= !(1 << line);
            } else {
                m2 &= !(1 << (line - 8));
            }
            self.pics.write_masks(m1, m2);
        }
    }

    fn irq_disable(&mut self, line: u8) {
        unsafe {
            let [mut m1, mut m2] = self.pics.read_masks();
            if line < 8 {
                m1 |= 1 << line;
            } else {
                m2 |= 1 << (line - 8);
            }
            self.pics.write_masks(m1, m2);
        }
    }

    fn irq_ack(&mut self, line: u8) {
        unsafe {
            if line == crate::platform::IRQ_RTC {
                // The clock holds its line until register C is read.
                self.cmos_index.write(0x0C);
                let _ = self.cmos_data.read();
            }
            let vector = if line < 8 {
                PIC_1_OFFSET + line
            } else {
                PIC_2_OFFSET + line - 8
            };
            self.pics.notify_end_of_interrupt(vector);
        }
    }

    fn timer_set_hz(&mut self, hz: u32) {
        let divisor = (PIT_BASE_HZ / hz) as u16;
        unsafe {
            // Channel 0, lo/hi access, square wave.
            self.pit_cmd.write(0x36);
            self.pit_data.write((divisor & 0xFF) as u8);
            self.pit_data.write((divisor >> 8) as u8);
        }
    }

    fn rtc_program(&mut self, rate: u8) {
        unsafe {
            self.cmos_index.write(0x8A);
            let prev = self.cmos_data.read();
            self.cmos_index.write(0x8A);
            self.cmos_data.write((prev & 0xF0) | (rate & 0x0F));
        }
    }

    fn video_frame(&mut self, phys: u32) -> &mut VideoFrame {
        debug_assert!(phys >= DISPLAY_FRAME && phys < DISPLAY_FRAME + 4 * PAGE_SIZE);
        unsafe { &mut *(phys as usize as *mut VideoFrame) }
    }

    fn copy_video(&mut self, dst_phys: u32, src_phys: u32) {
        debug_assert_ne!(dst_phys, src_phys);
        let src = unsafe { &*(src_phys as usize as *const VideoFrame) };
        let dst = unsafe { &mut *(dst_phys as usize as *mut VideoFrame) };
        crate::console::vga::copy_frame(dst, src);
    }

    fn user_window(&mut self) -> &mut [u8] {
        unsafe {
            core::slice::from_raw_parts_mut(
                USER_IMAGE_BASE as usize as *mut u8,
                LARGE_PAGE_SIZE as usize,
            )
        }
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        let pos = (cursor.row * BUFFER_WIDTH + cursor.col) as u16;
        unsafe {
            self.crtc_index.write(0x0F);
            self.crtc_data.write((pos & 0xFF) as u8);
            self.crtc_index.write(0x0E);
            self.crtc_data.write((pos >> 8) as u8);
        }
    }
}
