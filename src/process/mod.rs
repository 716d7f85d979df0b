pub mod fd;

use crate::console::line::LINE_CAPACITY;
use crate::error::{KResult, KernelError};
use crate::platform::StackDescriptor;
use crate::scheduler::context::Context;
use fd::FdTable;

/// Fixed process-id pool.
pub const MAX_PROCESSES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pid(pub u8);

impl Pid {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-process record. Lives in the arena slot named by its pid from launch
/// to halt; parent linkage is a plain id, never a reference.
pub struct Pcb {
    pub pid: Pid,
    pub parent: Option<Pid>,
    /// Console this process runs on.
    pub console: usize,
    /// Kernel context of the launch call that created this process,
    /// resumed by halt.
    pub parent_context: Context,
    /// The parent's privileged stack, restored when this process halts.
    pub parent_stack: StackDescriptor,
    pub fds: FdTable,
    args: [u8; LINE_CAPACITY],
    args_len: usize,
}

impl Pcb {
    fn new(pid: Pid, parent: Option<Pid>, console: usize) -> Pcb {
        Pcb {
            pid,
            parent,
            console,
            parent_context: Context::empty(),
            parent_stack: StackDescriptor::default(),
            fds: FdTable::with_stdio(),
            args: [0; LINE_CAPACITY],
            args_len: 0,
        }
    }

    pub fn set_args(&mut self, bytes: &[u8]) {
        let n = core::cmp::min(bytes.len(), LINE_CAPACITY);
        self.args[..n].copy_from_slice(&bytes[..n]);
        self.args_len = n;
    }

    pub fn args(&self) -> &[u8] {
        &self.args[..self.args_len]
    }
}

/// The pid-indexed arena: slot address is a pure function of the id.
pub struct ProcessTable {
    slots: [Option<Pcb>; MAX_PROCESSES],
}

impl ProcessTable {
    pub const fn new() -> ProcessTable {
        const VACANT: Option<Pcb> = None;
        ProcessTable {
            slots: [VACANT; MAX_PROCESSES],
        }
    }

    /// Claim the lowest free id and seed its PCB.
    pub fn allocate(&mut self, parent: Option<Pid>, console: usize) -> KResult<Pid> {
        let free = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(KernelError::ResourceExhausted)?;
        let pid = Pid(free as u8);
        self.slots[free] = Some(Pcb::new(pid, parent, console));
        Ok(pid)
    }

    /// Return an id to the pool, yielding its PCB for teardown.
    pub fn release(&mut self, pid: Pid) -> Option<Pcb> {
        self.slots[pid.index()].take()
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.slots[pid.index()].as_ref()
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.slots[pid.index()].as_mut()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_lowest_free_first() {
        let mut table = ProcessTable::new();
        for expected in 0..MAX_PROCESSES as u8 {
            let pid = table.allocate(None, 0).unwrap();
            assert_eq!(pid, Pid(expected));
        }
        assert_eq!(table.allocate(None, 0), Err(KernelError::ResourceExhausted));
    }

    #[test]
    fn release_returns_id_to_pool() {
        let mut table = ProcessTable::new();
        for _ in 0..MAX_PROCESSES {
            table.allocate(None, 0).unwrap();
        }
        let pcb = table.release(Pid(3)).unwrap();
        assert_eq!(pcb.pid, Pid(3));
        assert_eq!(table.live_count(), MAX_PROCESSES - 1);
        assert_eq!(table.allocate(Some(Pid(0)), 1).unwrap(), Pid(3));
    }

    #[test]
    fn fresh_pcb_has_stdio_and_no_args() {
        let mut table = ProcessTable::new();
        let pid = table.allocate(None, 2).unwrap();
        let pcb = table.get(pid).unwrap();
        assert!(pcb.fds.in_use(fd::FD_STDIN));
        assert!(pcb.fds.in_use(fd::FD_STDOUT));
        assert!(!pcb.fds.in_use(2));
        assert_eq!(pcb.args(), b"");
        assert_eq!(pcb.console, 2);
        assert_eq!(pcb.parent, None);
    }

    #[test]
    fn args_are_truncated_to_capacity() {
        let mut table = ProcessTable::new();
        let pid = table.allocate(None, 0).unwrap();
        let pcb = table.get_mut(pid).unwrap();
        pcb.set_args(b"frame0.txt");
        assert_eq!(pcb.args(), b"frame0.txt");
        let long = [b'x'; 200];
        pcb.set_args(&long);
        assert_eq!(pcb.args().len(), LINE_CAPACITY);
    }
}
