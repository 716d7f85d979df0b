pub mod context;

use crate::console::CONSOLE_COUNT;
use context::Context;

/// Preemption rate programmed into the timer at boot.
pub const SCHED_HZ: u32 = 100;

/// Outcome of one timer tick, produced under the kernel lock and acted on
/// after it is dropped.
#[derive(Debug, Clone, Copy)]
pub enum TickDecision {
    /// Keep running whatever was interrupted.
    Stay,
    /// Preempt: save the interrupted kernel context into `save`, resume the
    /// one stored in `resume`. Both point into the console records, which
    /// live in static kernel state and stay valid across the lock drop.
    Switch {
        target: usize,
        save: *mut Context,
        resume: *const Context,
    },
}

/// Round-robin selection with idle-skip: the next console after `current`
/// (wrapping) that has a live process. `None` means stay put, either because
/// no other console is live yet or because nothing is live at all.
pub fn next_console(live: &[bool; CONSOLE_COUNT], current: usize) -> Option<usize> {
    for step in 1..CONSOLE_COUNT {
        let candidate = (current + step) % CONSOLE_COUNT;
        if live[candidate] {
            return Some(candidate);
        }
    }
    None
}
