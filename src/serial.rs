//! COM1 serial logging.
//!
//! Kernel diagnostics leave through [`log_info!`], [`log_warn!`] and
//! [`log_error!`], one line per call under one lock acquisition. Host test
//! builds have no UART; the same macros print to stderr.

use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::instructions::port::Port;

const COM1_BASE: u16 = 0x3F8;
/// Line-status bit: transmit holding register empty.
const TX_EMPTY: u8 = 1 << 5;
/// Line-control bit opening the divisor latch.
const DLAB: u8 = 0x80;
/// Divisor for 38400 baud, from the UART's 115200 base rate.
const BAUD_DIVISOR: u8 = 3;

/// A 16550 UART reduced to what logging needs: the transmit register and
/// the line-status register. The one-shot setup registers are addressed
/// only inside [`SerialPort::init`].
pub struct SerialPort {
    base: u16,
    data: Port<u8>,
    line_status: Port<u8>,
}

impl SerialPort {
    /// # Safety
    /// `base` must be the I/O base of a real 16550-compatible UART.
    pub const unsafe fn new(base: u16) -> SerialPort {
        SerialPort {
            base,
            data: Port::new(base),
            line_status: Port::new(base + 5),
        }
    }

    /// Program 38400 baud, 8 data bits, no parity, one stop bit, FIFOs on.
    pub fn init(&mut self) {
        let mut int_enable: Port<u8> = Port::new(self.base + 1);
        let mut fifo_ctrl: Port<u8> = Port::new(self.base + 2);
        let mut line_ctrl: Port<u8> = Port::new(self.base + 3);
        let mut modem_ctrl: Port<u8> = Port::new(self.base + 4);
        unsafe {
            int_enable.write(0x00);
            line_ctrl.write(DLAB);
            // With the latch open, base+0/base+1 hold the divisor.
            self.data.write(BAUD_DIVISOR);
            int_enable.write(0x00);
            line_ctrl.write(0x03);
            fifo_ctrl.write(0xC7);
            modem_ctrl.write(0x0B);
            int_enable.write(0x01);
        }
    }

    /// Busy-wait until the transmitter drains, then hand it `byte`.
    pub fn send(&mut self, byte: u8) {
        unsafe {
            while (self.line_status.read() & TX_EMPTY) == 0 {}
            self.data.write(byte);
        }
    }
}

impl core::fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            self.send(byte);
        }
        Ok(())
    }
}

lazy_static! {
    /// The COM1 writer; first use runs the port setup.
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut port = unsafe { SerialPort::new(COM1_BASE) };
        port.init();
        Mutex::new(port)
    };
}

#[doc(hidden)]
#[cfg(not(test))]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;
    SERIAL1.lock().write_fmt(args).expect("serial write failed");
}

// Host test builds have no serial port; route log output to stderr instead.
#[doc(hidden)]
#[cfg(test)]
pub fn _print(args: ::core::fmt::Arguments) {
    std::eprint!("{}", args);
}

#[macro_export]
macro_rules! log_info {
    ($fmt:literal $($arg:tt)*) => {
        $crate::serial::_print(format_args!(concat!("[INFO] ", $fmt, "\n") $($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($fmt:literal $($arg:tt)*) => {
        $crate::serial::_print(format_args!(concat!("[WARN] ", $fmt, "\n") $($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($fmt:literal $($arg:tt)*) => {
        $crate::serial::_print(format_args!(concat!("[ERROR] ", $fmt, "\n") $($arg)*))
    };
}

/// Bring the port up now rather than at the first log line.
pub fn init() {
    let _ = SERIAL1.lock();
}
