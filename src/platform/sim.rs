//! Recording platform for hosted tests.

use std::vec;
use std::vec::Vec;

use crate::console::vga::{Cursor, VideoFrame, BUFFER_HEIGHT, BUFFER_WIDTH};
use crate::memory::{console_frame, DISPLAY_FRAME, LARGE_PAGE_SIZE};
use crate::platform::{Platform, StackDescriptor};

/// In-memory machine: real frame contents and user RAM, counters for
/// everything else. Tests drive the kernel and assert on this record.
pub struct SimPlatform {
    pub display: VideoFrame,
    pub backing: [VideoFrame; 3],
    pub user_ram: Vec<u8>,
    pub tlb_flushes: usize,
    pub last_directory: u32,
    pub kernel_stacks: Vec<StackDescriptor>,
    pub irq_enabled: [bool; 16],
    pub irq_acks: Vec<u8>,
    pub timer_hz: Option<u32>,
    pub rtc_rate: Option<u8>,
    pub cursor: Cursor,
}

impl SimPlatform {
    pub fn new() -> SimPlatform {
        SimPlatform {
            display: VideoFrame::blank(),
            backing: [
                VideoFrame::blank(),
                VideoFrame::blank(),
                VideoFrame::blank(),
            ],
            user_ram: vec![0; LARGE_PAGE_SIZE as usize],
            tlb_flushes: 0,
            last_directory: 0,
            kernel_stacks: Vec::new(),
            irq_enabled: [false; 16],
            irq_acks: Vec::new(),
            timer_hz: None,
            rtc_rate: None,
            cursor: Cursor::default(),
        }
    }

    /// The descriptor most recently installed, if any.
    pub fn current_kernel_stack(&self) -> Option<StackDescriptor> {
        self.kernel_stacks.last().copied()
    }

    /// Text content of one display row, trailing blanks trimmed.
    pub fn display_row(&self, row: usize) -> Vec<u8> {
        row_text(&self.display, row)
    }

    /// Text content of one backing-frame row, trailing blanks trimmed.
    pub fn backing_row(&self, console: usize, row: usize) -> Vec<u8> {
        row_text(&self.backing[console], row)
    }
}

fn row_text(frame: &VideoFrame, row: usize) -> Vec<u8> {
    let mut out: Vec<u8> = (0..BUFFER_WIDTH)
        .map(|col| frame.char_at(row, col).ascii_character)
        .collect();
    while out.last() == Some(&b' ') {
        out.pop();
    }
    out
}

impl Platform for SimPlatform {
    fn flush_tlb(&mut self, directory_base: u32) {
        self.tlb_flushes += 1;
        self.last_directory = directory_base;
    }

    fn set_kernel_stack(&mut self, stack: StackDescriptor) {
        self.kernel_stacks.push(stack);
    }

    fn irq_enable(&mut self, line: u8) {
        self.irq_enabled[line as usize] = true;
    }

    fn irq_disable(&mut self, line: u8) {
        self.irq_enabled[line as usize] = false;
    }

    fn irq_ack(&mut self, line: u8) {
        self.irq_acks.push(line);
    }

    fn timer_set_hz(&mut self, hz: u32) {
        self.timer_hz = Some(hz);
    }

    fn rtc_program(&mut self, rate: u8) {
        self.rtc_rate = Some(rate);
    }

    fn video_frame(&mut self, phys: u32) -> &mut VideoFrame {
        if phys == DISPLAY_FRAME {
            return &mut self.display;
        }
        for console in 0..3 {
            if phys == console_frame(console) {
                return &mut self.backing[console];
            }
        }
        panic!("video access to unmapped frame {:#x}", phys);
    }

    fn copy_video(&mut self, dst_phys: u32, src_phys: u32) {
        assert_ne!(dst_phys, src_phys);
        let mut cells = Vec::with_capacity(BUFFER_HEIGHT * BUFFER_WIDTH);
        {
            let src = self.video_frame(src_phys);
            for row in 0..BUFFER_HEIGHT {
                for col in 0..BUFFER_WIDTH {
                    cells.push(src.0[row][col].read());
                }
            }
        }
        let dst = self.video_frame(dst_phys);
        for row in 0..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                dst.0[row][col].write(cells[row * BUFFER_WIDTH + col]);
            }
        }
    }

    fn user_window(&mut self) -> &mut [u8] {
        &mut self.user_ram
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }
}
