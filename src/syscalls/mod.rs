//! The system-call surface.
//!
//! [`dispatch`] is called from the int 0x80 entry with the id and argument
//! registers. Every call funnels into the kernel behind its lock; the
//! blocking reads spin outside the lock with interrupts open, and launch
//! and halt end in a ring transition once the lock is gone. Results are
//! flattened to a single signed register: negative means failure, with no
//! further detail.

use crate::memory::{USER_IMAGE_BASE, USER_IMAGE_END};

/// Syscall ids (passed in RAX from ring 3).
pub const SYS_HALT: u64 = 1;
pub const SYS_LAUNCH: u64 = 2;
pub const SYS_READ: u64 = 3;
pub const SYS_WRITE: u64 = 4;
pub const SYS_OPEN: u64 = 5;
pub const SYS_CLOSE: u64 = 6;
pub const SYS_GET_ARGS: u64 = 7;
pub const SYS_MAP_VIDEO: u64 = 8;
/// Signal-hook ids, accepted but unimplemented.
pub const SYS_SET_HANDLER: u64 = 9;
pub const SYS_SIG_RETURN: u64 = 10;

/// Failure sentinel returned to ring 3.
pub const SYSCALL_FAILURE: i64 = -1;

/// True when `[ptr, ptr + len)` lies inside the user image window. User
/// pointers are only honored in this range; everything else (null included)
/// is rejected before any copy.
pub fn user_range_ok(ptr: u32, len: u32) -> bool {
    if ptr < USER_IMAGE_BASE {
        return false;
    }
    match ptr.checked_add(len) {
        Some(end) => end <= USER_IMAGE_END,
        None => false,
    }
}

/// Central dispatcher, called from the int 0x80 entry.
/// Convention: RAX = id, RDI = arg0, RSI = arg1, RDX = arg2; the i64
/// result is returned to ring 3 in RAX.
#[cfg(target_arch = "x86_64")]
pub extern "C" fn dispatch(number: u64, arg0: u64, arg1: u64, arg2: u64) -> i64 {
    match number {
        // Masked to eight bits; the values above belong to the fault path.
        SYS_HALT => do_halt((arg0 & 0xFF) as u32),
        SYS_LAUNCH => do_launch(arg0 as u32),
        SYS_READ => do_read(arg0 as usize, arg1 as u32, arg2 as u32),
        SYS_WRITE => do_write(arg0 as usize, arg1 as u32, arg2 as u32),
        SYS_OPEN => do_open(arg0 as u32),
        SYS_CLOSE => do_close(arg0 as usize),
        SYS_GET_ARGS => do_get_args(arg0 as u32, arg1 as u32),
        SYS_MAP_VIDEO => do_map_video(arg0 as u32),
        SYS_SET_HANDLER | SYS_SIG_RETURN => SYSCALL_FAILURE,
        _ => {
            crate::log_warn!("syscall: unknown id {}", number);
            SYSCALL_FAILURE
        }
    }
}

#[cfg(target_arch = "x86_64")]
mod glue {
    use super::{SYSCALL_FAILURE, user_range_ok};
    use crate::console::line::LINE_CAPACITY;
    use crate::error::KResult;
    use crate::fs::NAME_CAPACITY;
    use crate::interrupts::usermode::{resume_kernel, user_dispatch};
    use crate::kernel::{HaltAction, KERNEL, ReadOutcome};
    use crate::log_error;

    /// Copy a NUL-terminated user string into `buf`, validating every byte
    /// address. Returns the length copied (the terminator is dropped), or
    /// `None` when the pointer walks out of the user window. A string
    /// longer than `buf` is truncated to it and left for the kernel's
    /// name/length checks to reject.
    fn copy_user_cstr(ptr: u32, buf: &mut [u8]) -> Option<usize> {
        for i in 0..buf.len() {
            let addr = ptr.checked_add(i as u32)?;
            if !user_range_ok(addr, 1) {
                return None;
            }
            let byte = unsafe { core::ptr::read(addr as usize as *const u8) };
            if byte == 0 {
                return Some(i);
            }
            buf[i] = byte;
        }
        Some(buf.len())
    }

    /// One spin-wait beat: open the interrupt window so the handler that
    /// produces the awaited state can run, then close it again before the
    /// next poll takes the lock.
    fn wait_for_interrupt() {
        x86_64::instructions::interrupts::enable_and_hlt();
        x86_64::instructions::interrupts::disable();
    }

    fn flatten(result: KResult<usize>) -> i64 {
        match result {
            Ok(count) => count as i64,
            Err(_) => SYSCALL_FAILURE,
        }
    }

    pub(super) fn do_halt(status: u32) -> i64 {
        let action = { KERNEL.lock().prepare_halt(status) };
        match action {
            Ok(action) => apply_halt(action),
            // No current process to tear down.
            Err(_) => SYSCALL_FAILURE,
        }
    }

    /// Finish a halt once the bookkeeping is done and the lock is gone.
    fn apply_halt(action: HaltAction) -> ! {
        match action {
            HaltAction::Resume { context, status } => {
                // Never comes back: the parent picks up at its parked
                // launch call with `status` as the result.
                unsafe { resume_kernel(&context, status) }
            }
            HaltAction::RespawnShell { console } => respawn_shell(console),
        }
    }

    /// Tear down the scheduled console's process on behalf of a CPU fault.
    /// There is no caller to hand a failure back to: a fault with no live
    /// process came from the kernel itself, and the machine parks.
    pub(crate) fn squash_current(status: u32) -> ! {
        let action = { KERNEL.lock().prepare_halt(status) };
        match action {
            Ok(action) => apply_halt(action),
            Err(err) => {
                log_error!("fault: no process to squash ({})", err);
                loop {
                    x86_64::instructions::hlt();
                }
            }
        }
    }

    /// Keep a console shelled forever. The parked context of a root shell
    /// is never resumed, so a successful bring-up never returns; the loop
    /// only spins again if the launch itself failed.
    fn respawn_shell(console: usize) -> ! {
        loop {
            let plan = { KERNEL.lock().launch_root(console) };
            match plan {
                Ok(plan) => unsafe {
                    user_dispatch(
                        plan.entry as u64,
                        plan.user_stack as u64,
                        plan.caller_context,
                    );
                },
                Err(err) => {
                    log_error!("console {}: shell respawn failed: {}", console, err);
                }
            }
            // Keep the machine breathing while retrying.
            wait_for_interrupt();
        }
    }

    pub(super) fn do_launch(command_ptr: u32) -> i64 {
        let mut command = [0u8; LINE_CAPACITY];
        let len = match copy_user_cstr(command_ptr, &mut command) {
            Some(len) => len,
            None => return SYSCALL_FAILURE,
        };
        let plan = { KERNEL.lock().launch_from(&command[..len]) };
        match plan {
            Ok(plan) => unsafe {
                // Returns when the child halts, with its status.
                user_dispatch(
                    plan.entry as u64,
                    plan.user_stack as u64,
                    plan.caller_context,
                )
            },
            Err(_) => SYSCALL_FAILURE,
        }
    }

    pub(super) fn do_read(fd: usize, buf: u32, count: u32) -> i64 {
        if !user_range_ok(buf, count) {
            return SYSCALL_FAILURE;
        }
        let slice =
            unsafe { core::slice::from_raw_parts_mut(buf as usize as *mut u8, count as usize) };
        loop {
            let outcome = { KERNEL.lock().sys_read(fd, &mut slice[..]) };
            match outcome {
                Ok(ReadOutcome::Done(count)) => return count as i64,
                Ok(ReadOutcome::WouldBlock) => wait_for_interrupt(),
                Err(_) => return SYSCALL_FAILURE,
            }
        }
    }

    pub(super) fn do_write(fd: usize, buf: u32, count: u32) -> i64 {
        if !user_range_ok(buf, count) {
            return SYSCALL_FAILURE;
        }
        let slice =
            unsafe { core::slice::from_raw_parts(buf as usize as *const u8, count as usize) };
        flatten({ KERNEL.lock().sys_write(fd, slice) })
    }

    pub(super) fn do_open(name_ptr: u32) -> i64 {
        // One spare byte so an over-length name survives into the kernel's
        // length check instead of silently truncating to a valid one.
        let mut name = [0u8; NAME_CAPACITY + 1];
        let len = match copy_user_cstr(name_ptr, &mut name) {
            Some(len) => len,
            None => return SYSCALL_FAILURE,
        };
        flatten({ KERNEL.lock().sys_open(&name[..len]) })
    }

    pub(super) fn do_close(fd: usize) -> i64 {
        match { KERNEL.lock().sys_close(fd) } {
            Ok(()) => 0,
            Err(_) => SYSCALL_FAILURE,
        }
    }

    pub(super) fn do_get_args(buf: u32, count: u32) -> i64 {
        if !user_range_ok(buf, count) {
            return SYSCALL_FAILURE;
        }
        let slice =
            unsafe { core::slice::from_raw_parts_mut(buf as usize as *mut u8, count as usize) };
        flatten({ KERNEL.lock().sys_get_args(slice) })
    }

    pub(super) fn do_map_video(out_ptr: u32) -> i64 {
        // The result is a pointer-sized store into user memory.
        if !user_range_ok(out_ptr, 8) {
            return SYSCALL_FAILURE;
        }
        match { KERNEL.lock().sys_map_video() } {
            Ok(addr) => {
                unsafe { core::ptr::write(out_ptr as usize as *mut u64, addr as u64) };
                0
            }
            Err(_) => SYSCALL_FAILURE,
        }
    }
}

#[cfg(target_arch = "x86_64")]
use glue::{
    do_close, do_get_args, do_halt, do_launch, do_map_video, do_open, do_read, do_write,
};
#[cfg(target_arch = "x86_64")]
pub(crate) use glue::squash_current;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_range_accepts_the_image_window() {
        assert!(user_range_ok(USER_IMAGE_BASE, 0));
        assert!(user_range_ok(USER_IMAGE_BASE, USER_IMAGE_END - USER_IMAGE_BASE));
        assert!(user_range_ok(0x0804_8000, 128));
    }

    #[test]
    fn user_range_rejects_outside_and_overflow() {
        assert!(!user_range_ok(0, 4));
        assert!(!user_range_ok(USER_IMAGE_BASE - 4, 4));
        assert!(!user_range_ok(USER_IMAGE_END, 1));
        assert!(!user_range_ok(USER_IMAGE_END - 4, 8));
        assert!(!user_range_ok(u32::MAX, 2));
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn unknown_and_stub_ids_fail_without_side_effects() {
        assert_eq!(dispatch(SYS_SET_HANDLER, 0, 0, 0), SYSCALL_FAILURE);
        assert_eq!(dispatch(SYS_SIG_RETURN, 0, 0, 0), SYSCALL_FAILURE);
        assert_eq!(dispatch(0, 0, 0, 0), SYSCALL_FAILURE);
        assert_eq!(dispatch(99, 0, 0, 0), SYSCALL_FAILURE);
    }
}
