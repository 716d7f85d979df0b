/// Capacity of an input line: at most 127 characters plus the terminator.
pub const LINE_CAPACITY: usize = 128;

/// One console's in-progress input line.
///
/// The keyboard handler appends; a terminal read drains the whole line once
/// the terminator has been observed. Between completion and the drain the
/// buffer is frozen and further input is dropped.
#[derive(Clone, Copy)]
pub struct LineBuffer {
    buf: [u8; LINE_CAPACITY],
    len: usize,
    complete: bool,
}

impl LineBuffer {
    pub const fn new() -> LineBuffer {
        LineBuffer {
            buf: [0; LINE_CAPACITY],
            len: 0,
            complete: false,
        }
    }

    /// Append one byte; reports whether it was accepted.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.complete || self.len >= LINE_CAPACITY - 1 {
            return false;
        }
        self.buf[self.len] = byte;
        self.len += 1;
        true
    }

    /// Remove the most recent byte, if any.
    pub fn pop(&mut self) -> Option<u8> {
        if self.complete || self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.buf[self.len])
    }

    /// Append the terminator and freeze the line. Always fits.
    pub fn terminate(&mut self) {
        if self.complete {
            return;
        }
        self.buf[self.len] = b'\n';
        self.len += 1;
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Copy out up to `out.len()` bytes (the terminator comes along whenever
    /// it fits) and reset the line for new input.
    pub fn drain(&mut self, out: &mut [u8]) -> usize {
        let n = core::cmp::min(self.len, out.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.len = 0;
        self.complete = false;
        n
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        LineBuffer::new()
    }
}
