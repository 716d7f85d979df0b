//! CPU fault containment.
//!
//! One exported entry per architectural fault vector, for the boot
//! environment to wire alongside the IRQ and trap gates. A fault ends the
//! running process, not the kernel: the handler logs what happened and
//! tears the process down through the regular halt path, so the parent's
//! launch call returns [`FAULT_STATUS`](crate::kernel::FAULT_STATUS) and a
//! faulting root shell is replaced like any other. The faulting context is
//! never resumed; the entries save nothing before calling in.

use core::arch::naked_asm;

use x86_64::registers::control::Cr2;

use crate::kernel::FAULT_STATUS;
use crate::log_error;
use crate::syscalls::squash_current;

const PAGE_FAULT_VECTOR: u64 = 14;

macro_rules! fault_entry {
    // Vectors where the CPU pushes no error code: push a zero so the frame
    // matches the error-code form and the call site stays 16-byte aligned.
    ($name:ident => $vector:literal) => {
        #[unsafe(naked)]
        pub extern "C" fn $name() {
            naked_asm!(
                "cli",
                "push 0",
                "mov edi, {vector}",
                "mov rsi, [rsp]",
                "mov rdx, [rsp + 8]",
                "call {handler}",
                vector = const $vector,
                handler = sym fault_handler,
            );
        }
    };
    ($name:ident => $vector:literal, error_code) => {
        #[unsafe(naked)]
        pub extern "C" fn $name() {
            naked_asm!(
                "cli",
                "mov edi, {vector}",
                "mov rsi, [rsp]",
                "mov rdx, [rsp + 8]",
                "call {handler}",
                vector = const $vector,
                handler = sym fault_handler,
            );
        }
    };
}

// Vector 15 is reserved and stays unwired.
fault_entry!(divide_error_entry => 0);
fault_entry!(debug_entry => 1);
fault_entry!(nmi_entry => 2);
fault_entry!(breakpoint_entry => 3);
fault_entry!(overflow_entry => 4);
fault_entry!(bound_range_entry => 5);
fault_entry!(invalid_opcode_entry => 6);
fault_entry!(device_not_available_entry => 7);
fault_entry!(double_fault_entry => 8, error_code);
fault_entry!(coprocessor_overrun_entry => 9);
fault_entry!(invalid_tss_entry => 10, error_code);
fault_entry!(segment_not_present_entry => 11, error_code);
fault_entry!(stack_fault_entry => 12, error_code);
fault_entry!(general_protection_entry => 13, error_code);
fault_entry!(page_fault_entry => 14, error_code);
fault_entry!(fpu_error_entry => 16);
fault_entry!(alignment_check_entry => 17, error_code);
fault_entry!(machine_check_entry => 18);
fault_entry!(simd_error_entry => 19);

/// Common landing point once the entry has normalized the frame.
extern "C" fn fault_handler(vector: u64, error_code: u64, rip: u64) -> ! {
    log_error!(
        "fault: {} (vector {}, code {:#x}) at {:#010x}",
        fault_name(vector),
        vector,
        error_code,
        rip
    );
    if vector == PAGE_FAULT_VECTOR {
        log_error!("fault: page access at {:#010x}", Cr2::read().as_u64());
    }
    squash_current(FAULT_STATUS)
}

fn fault_name(vector: u64) -> &'static str {
    match vector {
        0 => "divide error",
        1 => "debug",
        2 => "non-maskable interrupt",
        3 => "breakpoint",
        4 => "overflow",
        5 => "bound range exceeded",
        6 => "invalid opcode",
        7 => "device not available",
        8 => "double fault",
        9 => "coprocessor segment overrun",
        10 => "invalid TSS",
        11 => "segment not present",
        12 => "stack fault",
        13 => "general protection",
        14 => "page fault",
        16 => "x87 floating point",
        17 => "alignment check",
        18 => "machine check",
        19 => "SIMD floating point",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_names_cover_the_wired_set() {
        assert_eq!(fault_name(0), "divide error");
        assert_eq!(fault_name(14), "page fault");
        assert_eq!(fault_name(19), "SIMD floating point");
        // Reserved vector: nothing wires it, nothing names it.
        assert_eq!(fault_name(15), "unknown");
    }
}
