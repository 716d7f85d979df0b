//! A three-console, preemptively multitasked teaching kernel for one x86
//! CPU. The boot path below brings the machine to its first shell; after
//! that everything happens in the interrupt and syscall entry points.

#![cfg_attr(not(test), no_std)]

pub mod console;
pub mod drivers;
pub mod error;
pub mod fs;
#[cfg(target_arch = "x86_64")]
pub mod interrupts;
pub mod kernel;
pub mod loader;
pub mod memory;
pub mod platform;
pub mod process;
pub mod scheduler;
pub mod serial;
pub mod syscalls;

#[cfg(target_arch = "x86_64")]
use core::ptr::NonNull;
#[cfg(target_arch = "x86_64")]
use multiboot2::{BootInformation, BootInformationHeader};
#[cfg(target_arch = "x86_64")]
use platform::Platform;

/// Kernel entry, called by the assembly bring-up once the descriptor
/// tables are live and interrupts are still masked. `multiboot_info_addr`
/// is the boot information handed over in EBX; `tss_rsp0` is the
/// privileged-stack slot of the running TSS, which the kernel rewrites on
/// every process switch. Does not return: control moves to ring 3 and
/// stays there.
#[cfg(target_arch = "x86_64")]
#[no_mangle]
pub extern "C" fn kernel_main(multiboot_info_addr: usize, tss_rsp0: *mut u64) -> ! {
    serial::init();
    log_info!("boot: kernel entry, multiboot info at {:#x}", multiboot_info_addr);

    let image = match boot_module(multiboot_info_addr) {
        Some(image) => image,
        None => {
            log_error!("boot: no file-store module in the boot information");
            halt_forever();
        }
    };

    let mut kernel = kernel::KERNEL.lock();
    {
        let platform = kernel.platform_mut();
        platform.init();
        if let Some(slot) = NonNull::new(tss_rsp0) {
            platform.attach_tss_slot(slot);
        }
        // Scrub the loader's leftovers from the display and the three
        // backing frames.
        for id in 0..console::CONSOLE_COUNT {
            let mut cursor = console::vga::Cursor::default();
            console::vga::clear(platform.video_frame(memory::console_frame(id)), &mut cursor);
        }
        let mut cursor = console::vga::Cursor::default();
        console::vga::clear(platform.video_frame(memory::DISPLAY_FRAME), &mut cursor);
        platform.set_cursor(cursor);
    }
    kernel.init();
    if let Err(err) = kernel.attach_store(image) {
        log_error!("boot: rejecting file-store image: {}", err);
        drop(kernel);
        halt_forever();
    }
    kernel.init_devices();
    let plan = match kernel.launch_root(0) {
        Ok(plan) => plan,
        Err(err) => {
            log_error!("boot: first shell failed: {}", err);
            drop(kernel);
            halt_forever();
        }
    };
    drop(kernel);

    log_info!("boot: handing console 0 to ring 3");
    unsafe {
        interrupts::usermode::user_dispatch(
            plan.entry as u64,
            plan.user_stack as u64,
            plan.caller_context,
        );
    }
    // The boot context parked above belongs to a root shell and is never
    // resumed.
    halt_forever()
}

/// The file-store image, handed over by the boot loader as the first
/// multiboot module.
#[cfg(target_arch = "x86_64")]
fn boot_module(multiboot_info_addr: usize) -> Option<&'static [u8]> {
    let header = multiboot_info_addr as *const BootInformationHeader;
    let info = unsafe { BootInformation::load(header) }.ok()?;
    let module = info.module_tags().next()?;
    let start = module.start_address() as usize;
    let length = module.end_address() as usize - start;
    Some(unsafe { core::slice::from_raw_parts(start as *const u8, length) })
}

fn halt_forever() -> ! {
    loop {
        #[cfg(target_arch = "x86_64")]
        x86_64::instructions::hlt();
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log_error!("{}", info);
    halt_forever()
}
