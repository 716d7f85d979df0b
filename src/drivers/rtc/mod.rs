//! Periodic clock, virtualized over the hardware RTC.
//!
//! The hardware side runs at a fixed 1024Hz; readers see a software divider.
//! Rate changes only touch this state, never the rate register.

use crate::error::{KernelError, KResult};

/// Fixed hardware interrupt rate.
pub const HW_HZ: u32 = 1024;
/// Rate a freshly opened (or closed) device falls back to.
pub const DEFAULT_HZ: u32 = 2;
/// Divider value programming the hardware for 1024Hz (32768 >> (6 - 1)).
pub const HW_RATE: u8 = 6;

pub struct RtcState {
    /// Hardware ticks per virtual tick.
    limit: u32,
    count: u32,
    pending: bool,
}

impl RtcState {
    pub const fn new() -> Self {
        RtcState {
            limit: HW_HZ / DEFAULT_HZ,
            count: 0,
            pending: false,
        }
    }

    /// Reset to the default rate with no tick carried over.
    pub fn open(&mut self) {
        self.limit = HW_HZ / DEFAULT_HZ;
        self.count = 0;
        self.pending = false;
    }

    pub fn close(&mut self) {
        self.open();
    }

    /// Called from the hardware interrupt at 1024Hz.
    pub fn hw_tick(&mut self) {
        self.count += 1;
        if self.count >= self.limit {
            self.count = 0;
            self.pending = true;
        }
    }

    /// Consume a virtual tick if one has arrived since the last read.
    pub fn try_read(&mut self) -> bool {
        if self.pending {
            self.pending = false;
            true
        } else {
            false
        }
    }

    /// Apply a new virtual frequency: a power of two within the hardware
    /// rate. The device's write call still reports failure to its caller
    /// after this succeeds; only invalid frequencies are refused here.
    pub fn set_frequency(&mut self, hz: u32) -> KResult<()> {
        if !hz.is_power_of_two() || !(DEFAULT_HZ..=HW_HZ).contains(&hz) {
            return Err(KernelError::InvalidArgument);
        }
        self.limit = HW_HZ / hz;
        self.count = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_at_two_hertz() {
        let mut rtc = RtcState::new();
        assert!(!rtc.try_read());
        for _ in 0..511 {
            rtc.hw_tick();
        }
        assert!(!rtc.try_read());
        rtc.hw_tick();
        assert!(rtc.try_read());
        // The tick was consumed.
        assert!(!rtc.try_read());
    }

    #[test]
    fn frequency_change_shortens_the_divider() {
        let mut rtc = RtcState::new();
        rtc.set_frequency(512).unwrap();
        rtc.hw_tick();
        assert!(!rtc.try_read());
        rtc.hw_tick();
        assert!(rtc.try_read());
    }

    #[test]
    fn rejects_rates_outside_the_hardware_range() {
        let mut rtc = RtcState::new();
        assert_eq!(rtc.set_frequency(0), Err(KernelError::InvalidArgument));
        assert_eq!(rtc.set_frequency(1), Err(KernelError::InvalidArgument));
        assert_eq!(rtc.set_frequency(3), Err(KernelError::InvalidArgument));
        assert_eq!(rtc.set_frequency(2048), Err(KernelError::InvalidArgument));
        assert!(rtc.set_frequency(1024).is_ok());
    }

    #[test]
    fn open_discards_a_pending_tick() {
        let mut rtc = RtcState::new();
        rtc.set_frequency(1024).unwrap();
        rtc.hw_tick();
        rtc.open();
        assert!(!rtc.try_read());
        // Back at the default divider after reopen.
        for _ in 0..512 {
            rtc.hw_tick();
        }
        assert!(rtc.try_read());
    }
}
