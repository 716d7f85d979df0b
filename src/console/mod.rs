pub mod line;
pub mod vga;

use crate::memory::console_frame;
use crate::platform::StackDescriptor;
use crate::process::Pid;
use crate::scheduler::context::Context;
use line::LineBuffer;
use vga::Cursor;

/// Number of virtual consoles multiplexed onto the one display.
pub const CONSOLE_COUNT: usize = 3;

/// One virtual console. Input, cursor and video state persist while the
/// console is in the background; the scheduler parks the kernel context of
/// its process here between timeslices.
pub struct Console {
    /// Private video frame backing this console while it is off screen.
    pub frame: u32,
    /// Kernel context of this console's process, saved at preemption.
    pub context: Context,
    /// Privileged-stack descriptor last installed for this console.
    pub stack: StackDescriptor,
    /// Input line being edited on this console.
    pub line: LineBuffer,
    pub cursor: Cursor,
    /// Process currently bound to this console. `None` until the console's
    /// root shell is launched on first activation.
    pub pid: Option<Pid>,
}

impl Console {
    pub fn new(id: usize) -> Self {
        Console {
            frame: console_frame(id),
            context: Context::empty(),
            stack: StackDescriptor::default(),
            line: LineBuffer::new(),
            cursor: Cursor::default(),
            pid: None,
        }
    }
}

/// The three consoles plus the two roles a console can hold: `foreground`
/// owns the physical display, `scheduled` owns the CPU. They coincide only
/// when the visible console's process is the one running.
pub struct ConsoleSet {
    consoles: [Console; CONSOLE_COUNT],
    foreground: usize,
    scheduled: usize,
}

impl ConsoleSet {
    pub fn new() -> Self {
        ConsoleSet {
            consoles: [Console::new(0), Console::new(1), Console::new(2)],
            foreground: 0,
            scheduled: 0,
        }
    }

    pub fn foreground(&self) -> usize {
        self.foreground
    }

    pub fn scheduled(&self) -> usize {
        self.scheduled
    }

    pub fn set_foreground(&mut self, id: usize) {
        debug_assert!(id < CONSOLE_COUNT);
        self.foreground = id;
    }

    pub fn set_scheduled(&mut self, id: usize) {
        debug_assert!(id < CONSOLE_COUNT);
        self.scheduled = id;
    }

    pub fn get(&self, id: usize) -> &Console {
        &self.consoles[id]
    }

    pub fn get_mut(&mut self, id: usize) -> &mut Console {
        &mut self.consoles[id]
    }

    pub fn foreground_console(&self) -> &Console {
        &self.consoles[self.foreground]
    }

    pub fn foreground_console_mut(&mut self) -> &mut Console {
        &mut self.consoles[self.foreground]
    }

    pub fn scheduled_console(&self) -> &Console {
        &self.consoles[self.scheduled]
    }

    pub fn scheduled_console_mut(&mut self) -> &mut Console {
        &mut self.consoles[self.scheduled]
    }

    /// Which consoles have a live process, in the shape the scheduler wants.
    pub fn live(&self) -> [bool; CONSOLE_COUNT] {
        [
            self.consoles[0].pid.is_some(),
            self.consoles[1].pid.is_some(),
            self.consoles[2].pid.is_some(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boots_with_console_zero_in_both_roles() {
        let set = ConsoleSet::new();
        assert_eq!(set.foreground(), 0);
        assert_eq!(set.scheduled(), 0);
        for id in 0..CONSOLE_COUNT {
            assert!(set.get(id).pid.is_none());
        }
    }

    #[test]
    fn consoles_back_onto_distinct_frames() {
        let set = ConsoleSet::new();
        assert_eq!(set.get(0).frame, 0xB9000);
        assert_eq!(set.get(1).frame, 0xBA000);
        assert_eq!(set.get(2).frame, 0xBB000);
    }

    #[test]
    fn live_map_follows_bound_pids() {
        let mut set = ConsoleSet::new();
        assert_eq!(set.live(), [false, false, false]);
        set.get_mut(0).pid = Some(Pid(0));
        set.get_mut(2).pid = Some(Pid(1));
        assert_eq!(set.live(), [true, false, true]);
    }

    #[test]
    fn line_buffers_are_independent() {
        let mut set = ConsoleSet::new();
        set.get_mut(0).line.push(b'a');
        set.get_mut(0).line.push(b'b');
        assert_eq!(set.get(0).line.len(), 2);
        assert_eq!(set.get(1).line.len(), 0);
        assert_eq!(set.get(2).line.len(), 0);
    }
}
