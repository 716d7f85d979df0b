use crate::error::{KResult, KernelError};

/// Slots per process.
pub const FD_COUNT: usize = 8;
/// Reserved standard input (terminal, read side).
pub const FD_STDIN: usize = 0;
/// Reserved standard output (terminal, write side).
pub const FD_STDOUT: usize = 1;
/// First assignable slot.
pub const FIRST_FREE_FD: usize = 2;

/// Dispatch tag selecting the open/read/write/close behavior of a
/// descriptor. Replaces the per-descriptor operation table of the classic
/// design with a plain `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// The periodic clock device.
    Device,
    Directory,
    Regular,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    pub kind: FileKind,
    /// Inode index for regular files; unused for the other kinds.
    pub inode: u32,
    /// Byte offset for regular files, entry index for directories.
    pub offset: u32,
}

impl FileDescriptor {
    fn new(kind: FileKind, inode: u32) -> FileDescriptor {
        FileDescriptor {
            kind,
            inode,
            offset: 0,
        }
    }
}

/// A process's fixed descriptor table. Slots 0/1 carry the console standard
/// streams for the whole process lifetime; 2..7 are assignable, lowest free
/// slot first.
#[derive(Debug, Clone, Copy)]
pub struct FdTable {
    slots: [Option<FileDescriptor>; FD_COUNT],
}

impl FdTable {
    pub fn with_stdio() -> FdTable {
        let mut slots = [None; FD_COUNT];
        slots[FD_STDIN] = Some(FileDescriptor::new(FileKind::Terminal, 0));
        slots[FD_STDOUT] = Some(FileDescriptor::new(FileKind::Terminal, 0));
        FdTable { slots }
    }

    /// Claim the lowest free assignable slot.
    pub fn allocate(&mut self, kind: FileKind, inode: u32) -> KResult<usize> {
        for fd in FIRST_FREE_FD..FD_COUNT {
            if self.slots[fd].is_none() {
                self.slots[fd] = Some(FileDescriptor::new(kind, inode));
                return Ok(fd);
            }
        }
        Err(KernelError::ResourceExhausted)
    }

    pub fn get(&self, fd: usize) -> KResult<&FileDescriptor> {
        self.slots
            .get(fd)
            .and_then(Option::as_ref)
            .ok_or(KernelError::InvalidArgument)
    }

    pub fn get_mut(&mut self, fd: usize) -> KResult<&mut FileDescriptor> {
        self.slots
            .get_mut(fd)
            .and_then(Option::as_mut)
            .ok_or(KernelError::InvalidArgument)
    }

    /// Free an assignable slot; the reserved standard streams stay put.
    pub fn release(&mut self, fd: usize) -> KResult<FileDescriptor> {
        if !(FIRST_FREE_FD..FD_COUNT).contains(&fd) {
            return Err(KernelError::InvalidArgument);
        }
        self.slots[fd].take().ok_or(KernelError::InvalidArgument)
    }

    /// Pull out an assignable slot's descriptor if present (halt teardown).
    pub fn take(&mut self, fd: usize) -> Option<FileDescriptor> {
        debug_assert!((FIRST_FREE_FD..FD_COUNT).contains(&fd));
        self.slots[fd].take()
    }

    pub fn in_use(&self, fd: usize) -> bool {
        fd < FD_COUNT && self.slots[fd].is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_slots_are_terminal() {
        let table = FdTable::with_stdio();
        assert_eq!(table.get(FD_STDIN).unwrap().kind, FileKind::Terminal);
        assert_eq!(table.get(FD_STDOUT).unwrap().kind, FileKind::Terminal);
        assert!(table.get(2).is_err());
    }

    #[test]
    fn allocation_takes_lowest_free_slot_in_order() {
        let mut table = FdTable::with_stdio();
        for expected in FIRST_FREE_FD..FD_COUNT {
            let fd = table.allocate(FileKind::Regular, 9).unwrap();
            assert_eq!(fd, expected);
        }
        assert_eq!(
            table.allocate(FileKind::Regular, 9),
            Err(KernelError::ResourceExhausted)
        );
    }

    #[test]
    fn release_reopens_the_lowest_hole() {
        let mut table = FdTable::with_stdio();
        for _ in 0..4 {
            table.allocate(FileKind::Regular, 1).unwrap();
        }
        table.release(3).unwrap();
        assert_eq!(table.allocate(FileKind::Directory, 0).unwrap(), 3);
    }

    #[test]
    fn reserved_slots_cannot_be_released() {
        let mut table = FdTable::with_stdio();
        assert_eq!(table.release(FD_STDIN), Err(KernelError::InvalidArgument));
        assert_eq!(table.release(FD_STDOUT), Err(KernelError::InvalidArgument));
        assert_eq!(table.release(11), Err(KernelError::InvalidArgument));
        assert_eq!(table.release(5), Err(KernelError::InvalidArgument));
    }
}
