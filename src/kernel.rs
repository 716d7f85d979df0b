//! The privileged state machine.
//!
//! One instance of [`Kernel`] sits behind one lock and owns every piece of
//! mutable kernel state: the page tables, the process table, the console
//! records, the keyboard decoder and the clock device. Interrupt handlers
//! and system calls take the lock, call a method, drop the lock, and only
//! then act on what the method returned. Methods never perform a context
//! switch or a ring transition themselves; they hand back plain data
//! ([`TickDecision`], [`LaunchPlan`], [`HaltAction`]) describing the one the
//! caller must perform. That keeps the lock out of every path that never
//! returns.

use crate::console::vga;
use crate::console::{ConsoleSet, CONSOLE_COUNT};
use crate::drivers::keyboard::{Keyboard, KeyboardAction};
use crate::drivers::rtc::{self, RtcState};
use crate::error::{KResult, KernelError};
use crate::fs::FileStore;
use crate::loader;
use crate::memory::paging::AddressSpace;
use crate::memory::{DISPLAY_FRAME, USER_STACK_TOP, console_frame};
use crate::platform::{
    IRQ_CASCADE, IRQ_KEYBOARD, IRQ_RTC, IRQ_TIMER, Platform, StackDescriptor,
};
use crate::process::fd::{FD_COUNT, FD_STDIN, FD_STDOUT, FIRST_FREE_FD, FileKind};
use crate::process::{Pcb, Pid, ProcessTable};
use crate::scheduler::context::Context;
use crate::log_info;
use crate::scheduler::{self, SCHED_HZ, TickDecision};

/// Spaces rendered for one tab keystroke.
const TAB_WIDTH: usize = 4;

/// Everything the ring-transition glue needs to start a user program.
/// Produced under the kernel lock, consumed after it is dropped.
#[derive(Debug, Clone, Copy)]
pub struct LaunchPlan {
    pub pid: Pid,
    pub console: usize,
    /// Entry point read out of the image header.
    pub entry: u32,
    /// Initial user stack pointer, at the top of the image window.
    pub user_stack: u32,
    /// Where the launching kernel path parks its own context. The matching
    /// halt resumes it. Points into the child's PCB, which outlives the lock
    /// drop because PCBs live in the static kernel state.
    pub caller_context: *mut Context,
}

/// Halt status delivered when a process dies by a CPU fault. The trap edge
/// masks halt arguments to eight bits, so no exiting process can forge it.
pub const FAULT_STATUS: u32 = 256;

/// What the halt glue must do once the bookkeeping is done.
#[derive(Debug, Clone, Copy)]
pub enum HaltAction {
    /// Resume the parent at its parked context, with `status` becoming the
    /// return value of the launch that created the dead process.
    Resume { context: Context, status: i64 },
    /// A root shell halted. The caller brings up a fresh one on the same
    /// console; there is no parent to resume.
    RespawnShell { console: usize },
}

/// Result of a foreground change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Done,
    /// The target console has never run. The caller must start its root
    /// shell; `abandoned` is the console whose kernel path the caller is
    /// standing on, to be parked and resumed by a later tick.
    NeedsShell { console: usize, abandoned: usize },
}

/// Outcome of a read that may have to wait for input or device state.
/// `WouldBlock` sends the caller into a retry loop with interrupts open, so
/// the handlers that produce the awaited state can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Done(usize),
    WouldBlock,
}

pub struct Kernel<P: Platform> {
    platform: P,
    paging: AddressSpace,
    processes: ProcessTable,
    consoles: ConsoleSet,
    keyboard: Keyboard,
    rtc: RtcState,
    store: Option<FileStore>,
}

impl<P: Platform> Kernel<P> {
    pub fn new(platform: P) -> Kernel<P> {
        Kernel {
            platform,
            paging: AddressSpace::empty(),
            processes: ProcessTable::new(),
            consoles: ConsoleSet::new(),
            keyboard: Keyboard::new(),
            rtc: RtcState::new(),
            store: None,
        }
    }

    /// Build the kernel page tables and make them live. Must run after the
    /// kernel has reached its final address: the directory holds physical
    /// pointers into `self`.
    pub fn init(&mut self) {
        self.paging.init();
        self.platform.flush_tlb(self.paging.directory_base());
        log_info!("paging: directory at {:#010x}", self.paging.directory_base());
    }

    /// Program the timer and clock hardware and open their interrupt lines.
    pub fn init_devices(&mut self) {
        self.platform.timer_set_hz(SCHED_HZ);
        self.platform.rtc_program(rtc::HW_RATE);
        self.platform.irq_enable(IRQ_TIMER);
        self.platform.irq_enable(IRQ_KEYBOARD);
        self.platform.irq_enable(IRQ_CASCADE);
        self.platform.irq_enable(IRQ_RTC);
        log_info!("devices: timer {} Hz, clock base {} Hz", SCHED_HZ, rtc::HW_HZ);
    }

    /// Adopt the boot-module image as the file store.
    pub fn attach_store(&mut self, image: &'static [u8]) -> KResult<()> {
        let store = FileStore::new(image)?;
        log_info!(
            "file store: {} entries, {} inodes, {} data blocks",
            store.dentry_count(),
            store.inode_count(),
            store.data_block_count()
        );
        self.store = Some(store);
        Ok(())
    }

    fn store(&self) -> KResult<FileStore> {
        self.store.ok_or(KernelError::NotFound)
    }

    /// The process owning the CPU: whatever the scheduled console runs.
    fn current_pid(&self) -> KResult<Pid> {
        self.consoles
            .scheduled_console()
            .pid
            .ok_or(KernelError::NotFound)
    }

    fn current_pcb(&self) -> KResult<&Pcb> {
        let pid = self.current_pid()?;
        self.processes.get(pid).ok_or(KernelError::NotFound)
    }

    fn current_pcb_mut(&mut self) -> KResult<&mut Pcb> {
        let pid = self.current_pid()?;
        self.processes.get_mut(pid).ok_or(KernelError::NotFound)
    }

    // ── process lifecycle ───────────────────────────────────────────────

    /// Start the program named on `command_line` as a child of the scheduled
    /// console's current process.
    pub fn launch_from(&mut self, command_line: &[u8]) -> KResult<LaunchPlan> {
        let console = self.consoles.scheduled();
        let parent = self.consoles.get(console).pid;
        self.prepare_launch(command_line, console, parent)
    }

    /// Start the root shell on `console`: at boot, on first switch to a
    /// fresh console, and as the respawn after a root shell halts.
    pub fn launch_root(&mut self, console: usize) -> KResult<LaunchPlan> {
        self.prepare_launch(b"shell", console, None)
    }

    fn prepare_launch(
        &mut self,
        command_line: &[u8],
        console: usize,
        parent: Option<Pid>,
    ) -> KResult<LaunchPlan> {
        let (name, args) = split_command(command_line);
        if name.is_empty() {
            return Err(KernelError::InvalidArgument);
        }
        let store = self.store()?;
        let dentry = store.dentry_by_name(name)?;
        // Claim the pid before touching the address space so a late failure
        // has one thing to undo.
        let pid = self.processes.allocate(parent, console)?;
        if let Err(err) = loader::check_marker(&store, dentry.inode) {
            self.processes.release(pid);
            return Err(err);
        }
        // From here the child's mapping is live; failures must restore the
        // parent's before propagating.
        self.paging.activate(pid.index() as u8);
        self.platform.flush_tlb(self.paging.directory_base());
        let entry = match loader::load_image(&store, dentry.inode, self.platform.user_window()) {
            Ok(entry) => entry,
            Err(err) => return Err(self.abort_launch(pid, parent, err)),
        };
        let parent_stack = self.consoles.get(console).stack;
        let stack = StackDescriptor::for_pid(pid.index() as u8);
        let caller_context = {
            let pcb = self.processes.get_mut(pid).ok_or(KernelError::NotFound)?;
            pcb.set_args(args);
            pcb.parent_stack = parent_stack;
            &mut pcb.parent_context as *mut Context
        };
        let slot = self.consoles.get_mut(console);
        slot.pid = Some(pid);
        slot.stack = stack;
        self.platform.set_kernel_stack(stack);
        log_info!("launch: pid {} on console {}, entry {:#010x}", pid, console, entry);
        Ok(LaunchPlan {
            pid,
            console,
            entry,
            user_stack: USER_STACK_TOP,
            caller_context,
        })
    }

    /// Undo a launch that failed after the child's mapping went live. The
    /// user slot must never be left pointing at the freed frame: fall back
    /// to whatever the scheduled console still runs when there is no parent.
    fn abort_launch(&mut self, pid: Pid, parent: Option<Pid>, err: KernelError) -> KernelError {
        self.processes.release(pid);
        let survivor = parent.or_else(|| self.consoles.scheduled_console().pid);
        if let Some(survivor) = survivor {
            self.paging.activate(survivor.index() as u8);
            self.platform.flush_tlb(self.paging.directory_base());
        }
        err
    }

    /// Tear down the scheduled console's current process. Bookkeeping only;
    /// the resume or respawn is the caller's to execute.
    pub fn prepare_halt(&mut self, status: u32) -> KResult<HaltAction> {
        let console = self.consoles.scheduled();
        let pid = self
            .consoles
            .get(console)
            .pid
            .ok_or(KernelError::NotFound)?;
        let parent = self.processes.get(pid).ok_or(KernelError::NotFound)?.parent;
        let parent = match parent {
            Some(parent) => parent,
            None => {
                // A console must never be left without a shell. Free the
                // slot and have the caller start a replacement.
                self.processes.release(pid);
                self.consoles.get_mut(console).pid = None;
                log_info!("halt: root shell on console {} (status {}), respawning", console, status);
                return Ok(HaltAction::RespawnShell { console });
            }
        };
        // Release everything the process still holds open.
        let mut close_device = false;
        if let Some(pcb) = self.processes.get_mut(pid) {
            for fd in FIRST_FREE_FD..FD_COUNT {
                if let Some(desc) = pcb.fds.take(fd) {
                    if desc.kind == FileKind::Device {
                        close_device = true;
                    }
                }
            }
        }
        if close_device {
            self.rtc.close();
        }
        let dying = self.processes.release(pid).ok_or(KernelError::NotFound)?;
        let slot = self.consoles.get_mut(console);
        slot.pid = Some(parent);
        slot.stack = dying.parent_stack;
        self.platform.set_kernel_stack(dying.parent_stack);
        self.paging.activate(parent.index() as u8);
        self.platform.flush_tlb(self.paging.directory_base());
        log_info!("halt: pid {} -> pid {} (status {})", pid, parent, status);
        Ok(HaltAction::Resume {
            context: dying.parent_context,
            status: status as i64,
        })
    }

    // ── preemption ──────────────────────────────────────────────────────

    /// The 100 Hz preemption point. Acknowledges first so the line reopens
    /// even when no switch happens.
    pub fn timer_tick(&mut self) -> TickDecision {
        self.platform.irq_ack(IRQ_TIMER);
        let current = self.consoles.scheduled();
        if self.consoles.get(current).pid.is_none() {
            // Boot or console bring-up has not planted a process yet.
            return TickDecision::Stay;
        }
        let target = match scheduler::next_console(&self.consoles.live(), current) {
            Some(target) => target,
            None => return TickDecision::Stay,
        };
        let pid = match self.consoles.get(target).pid {
            Some(pid) => pid,
            None => return TickDecision::Stay,
        };
        self.paging.activate(pid.index() as u8);
        self.paging
            .map_console_video(target, target == self.consoles.foreground());
        self.platform.flush_tlb(self.paging.directory_base());
        let stack = self.consoles.get(target).stack;
        self.platform.set_kernel_stack(stack);
        self.consoles.set_scheduled(target);
        TickDecision::Switch {
            target,
            save: &mut self.consoles.get_mut(current).context as *mut Context,
            resume: &self.consoles.get(target).context as *const Context,
        }
    }

    /// Periodic-clock interrupt: advance the virtual counter.
    pub fn rtc_tick(&mut self) {
        self.platform.irq_ack(IRQ_RTC);
        self.rtc.hw_tick();
    }

    // ── console input and switching ─────────────────────────────────────

    /// Keyboard interrupt. Line editing and echo always target the
    /// foreground console, whichever console is scheduled. Returns the
    /// console the user asked to switch to, if any; the caller runs that
    /// switch once the lock is gone.
    pub fn key_event(&mut self, scancode: u8) -> Option<usize> {
        self.platform.irq_ack(IRQ_KEYBOARD);
        let fg = self.consoles.foreground();
        match self.keyboard.scancode(scancode) {
            KeyboardAction::Input(byte) => {
                let slot = self.consoles.get_mut(fg);
                if slot.line.push(byte) {
                    let frame = self.platform.video_frame(DISPLAY_FRAME);
                    vga::put_byte(frame, &mut slot.cursor, byte);
                    self.platform.set_cursor(slot.cursor);
                }
            }
            KeyboardAction::Backspace => {
                let slot = self.consoles.get_mut(fg);
                if slot.line.pop().is_some() {
                    let frame = self.platform.video_frame(DISPLAY_FRAME);
                    vga::erase_last(frame, &mut slot.cursor);
                    self.platform.set_cursor(slot.cursor);
                }
            }
            KeyboardAction::Enter => {
                let slot = self.consoles.get_mut(fg);
                // A completed line sits frozen until a reader drains it;
                // further returns are swallowed.
                if !slot.line.is_complete() {
                    slot.line.terminate();
                    let frame = self.platform.video_frame(DISPLAY_FRAME);
                    vga::put_byte(frame, &mut slot.cursor, b'\n');
                    self.platform.set_cursor(slot.cursor);
                }
            }
            KeyboardAction::Tab => {
                for _ in 0..TAB_WIDTH {
                    let slot = self.consoles.get_mut(fg);
                    if !slot.line.push(b' ') {
                        break;
                    }
                    let frame = self.platform.video_frame(DISPLAY_FRAME);
                    vga::put_byte(frame, &mut slot.cursor, b' ');
                }
                let cursor = self.consoles.get(fg).cursor;
                self.platform.set_cursor(cursor);
            }
            KeyboardAction::ClearScreen => {
                let slot = self.consoles.get_mut(fg);
                let frame = self.platform.video_frame(DISPLAY_FRAME);
                vga::clear(frame, &mut slot.cursor);
                self.platform.set_cursor(slot.cursor);
            }
            KeyboardAction::SwitchConsole(target) => return Some(target),
            KeyboardAction::None => {}
        }
        None
    }

    /// Make `target` the foreground console: park the outgoing text in its
    /// backing frame, bring in the target's, and re-point the kernel video
    /// window for whichever console is scheduled.
    pub fn switch_console(&mut self, target: usize) -> SwitchOutcome {
        let outgoing = self.consoles.foreground();
        if target == outgoing || target >= CONSOLE_COUNT {
            return SwitchOutcome::Done;
        }
        self.platform.copy_video(console_frame(outgoing), DISPLAY_FRAME);
        self.platform.copy_video(DISPLAY_FRAME, console_frame(target));
        self.consoles.set_foreground(target);
        let abandoned = self.consoles.scheduled();
        let needs_shell = self.consoles.get(target).pid.is_none();
        if needs_shell {
            // A fresh console becomes scheduled immediately; its shell is
            // launched by the caller. The abandoned console's kernel path
            // is parked by the caller and resumed by a later tick.
            self.consoles.set_scheduled(target);
        }
        let scheduled = self.consoles.scheduled();
        self.paging
            .map_console_video(scheduled, scheduled == target);
        self.platform.flush_tlb(self.paging.directory_base());
        self.platform.set_cursor(self.consoles.get(target).cursor);
        log_info!("console {} -> {}", outgoing, target);
        if needs_shell {
            SwitchOutcome::NeedsShell {
                console: target,
                abandoned,
            }
        } else {
            SwitchOutcome::Done
        }
    }

    /// Saved-context slot of a console record, for parking an abandoned
    /// kernel path across a shell bring-up.
    pub fn console_context_slot(&mut self, console: usize) -> *mut Context {
        &mut self.consoles.get_mut(console).context as *mut Context
    }

    // ── terminal transfer ───────────────────────────────────────────────

    /// Drain the scheduled console's line buffer if a completed line is
    /// waiting. The terminator comes along when it fits.
    fn try_terminal_read(&mut self, buf: &mut [u8]) -> Option<usize> {
        let slot = self.consoles.scheduled_console_mut();
        if slot.line.is_complete() {
            Some(slot.line.drain(buf))
        } else {
            None
        }
    }

    /// Copy `buf` to the scheduled console's output, character by character.
    /// The write goes through the kernel video window, so a background
    /// console's output lands in its backing frame, not on the display.
    fn terminal_write(&mut self, buf: &[u8]) -> usize {
        let frame_phys = self.paging.video_window_frame();
        let scheduled = self.consoles.scheduled();
        let foreground = self.consoles.foreground();
        let slot = self.consoles.get_mut(scheduled);
        let frame = self.platform.video_frame(frame_phys);
        for &byte in buf {
            vga::put_byte(frame, &mut slot.cursor, byte);
        }
        if scheduled == foreground {
            let cursor = slot.cursor;
            self.platform.set_cursor(cursor);
        }
        buf.len()
    }

    // ── file operations ─────────────────────────────────────────────────

    /// Open `name` into the lowest free fd slot of the current process.
    pub fn sys_open(&mut self, name: &[u8]) -> KResult<usize> {
        let store = self.store()?;
        let dentry = store.dentry_by_name(name)?;
        match dentry.kind {
            FileKind::Device => {
                let fd = self.current_pcb_mut()?.fds.allocate(FileKind::Device, 0)?;
                self.rtc.open();
                Ok(fd)
            }
            FileKind::Directory => {
                self.current_pcb_mut()?
                    .fds
                    .allocate(FileKind::Directory, dentry.inode)
            }
            FileKind::Regular => {
                self.current_pcb_mut()?
                    .fds
                    .allocate(FileKind::Regular, dentry.inode)
            }
            // The store never hands out terminal entries; stdio is planted
            // at process birth.
            FileKind::Terminal => Err(KernelError::InvalidArgument),
        }
    }

    pub fn sys_close(&mut self, fd: usize) -> KResult<()> {
        let desc = self.current_pcb_mut()?.fds.release(fd)?;
        if desc.kind == FileKind::Device {
            self.rtc.close();
        }
        Ok(())
    }

    /// Read from an fd. `WouldBlock` asks the caller to retry with
    /// interrupts open; the awaited state is produced by a handler.
    pub fn sys_read(&mut self, fd: usize, buf: &mut [u8]) -> KResult<ReadOutcome> {
        if fd == FD_STDOUT {
            return Err(KernelError::NotPermitted);
        }
        let desc = *self.current_pcb()?.fds.get(fd)?;
        match desc.kind {
            FileKind::Terminal => match self.try_terminal_read(buf) {
                Some(count) => Ok(ReadOutcome::Done(count)),
                None => Ok(ReadOutcome::WouldBlock),
            },
            FileKind::Regular => {
                let store = self.store()?;
                let count = store.read_data(desc.inode, desc.offset as usize, buf)?;
                self.current_pcb_mut()?.fds.get_mut(fd)?.offset += count as u32;
                Ok(ReadOutcome::Done(count))
            }
            FileKind::Directory => {
                let store = self.store()?;
                match store.dentry_by_index(desc.offset as usize) {
                    Ok(entry) => {
                        let name = entry.name_bytes();
                        let count = name.len().min(buf.len());
                        buf[..count].copy_from_slice(&name[..count]);
                        self.current_pcb_mut()?.fds.get_mut(fd)?.offset += 1;
                        Ok(ReadOutcome::Done(count))
                    }
                    // Past the last entry: end of directory, not an error.
                    Err(_) => Ok(ReadOutcome::Done(0)),
                }
            }
            FileKind::Device => {
                if self.rtc.try_read() {
                    Ok(ReadOutcome::Done(0))
                } else {
                    Ok(ReadOutcome::WouldBlock)
                }
            }
        }
    }

    /// Write to an fd. Only the terminal accepts data; the clock device
    /// consumes a rate but reports failure regardless.
    pub fn sys_write(&mut self, fd: usize, buf: &[u8]) -> KResult<usize> {
        if fd == FD_STDIN {
            return Err(KernelError::NotPermitted);
        }
        let desc = *self.current_pcb()?.fds.get(fd)?;
        match desc.kind {
            FileKind::Terminal => Ok(self.terminal_write(buf)),
            FileKind::Regular | FileKind::Directory => Err(KernelError::NotPermitted),
            FileKind::Device => {
                if buf.len() != 4 {
                    return Err(KernelError::InvalidArgument);
                }
                let hz = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
                self.rtc.set_frequency(hz)?;
                // The rate change sticks, but the caller still sees failure.
                Err(KernelError::NotPermitted)
            }
        }
    }

    /// Copy the launch arguments, NUL-terminated, into `buf`.
    pub fn sys_get_args(&self, buf: &mut [u8]) -> KResult<usize> {
        let pcb = self.current_pcb()?;
        let args = pcb.args();
        if args.is_empty() {
            return Err(KernelError::InvalidArgument);
        }
        if args.len() + 1 > buf.len() {
            return Err(KernelError::InvalidArgument);
        }
        buf[..args.len()].copy_from_slice(args);
        buf[args.len()] = 0;
        Ok(args.len() + 1)
    }

    /// Map the calling process's console backing frame into its address
    /// space and return the user-visible address.
    pub fn sys_map_video(&mut self) -> KResult<u32> {
        let console = self.current_pcb()?.console;
        let addr = self.paging.expose_user_video_window(console);
        self.platform.flush_tlb(self.paging.directory_base());
        log_info!("map-video: console {} at {:#010x}", console, addr);
        Ok(addr)
    }

    // ── accessors for the trap glue and tests ───────────────────────────

    pub fn consoles(&self) -> &ConsoleSet {
        &self.consoles
    }

    pub fn process(&self, pid: Pid) -> Option<&Pcb> {
        self.processes.get(pid)
    }

    pub fn live_processes(&self) -> usize {
        self.processes.live_count()
    }

    /// Direct platform access for the boot path, which programs hardware
    /// state the kernel proper never touches again.
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    #[cfg(test)]
    fn process_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.processes.get_mut(pid)
    }

    #[cfg(test)]
    fn platform(&self) -> &P {
        &self.platform
    }
}

/// Split a command line at the first space: program name, then the argument
/// remainder with the separating spaces dropped. The remainder itself is
/// kept verbatim.
fn split_command(line: &[u8]) -> (&[u8], &[u8]) {
    let end = line
        .iter()
        .position(|&byte| byte == b' ')
        .unwrap_or(line.len());
    let name = &line[..end];
    let mut rest = &line[end..];
    while let Some((&b' ', tail)) = rest.split_first() {
        rest = tail;
    }
    (name, rest)
}

#[cfg(target_arch = "x86_64")]
use crate::platform::x86::X86Platform;

#[cfg(target_arch = "x86_64")]
lazy_static::lazy_static! {
    /// The one kernel instance. Entry points lock it inside an
    /// interrupts-disabled window and release it before any context switch
    /// or ring transition.
    pub static ref KERNEL: spin::Mutex<Kernel<X86Platform>> =
        spin::Mutex::new(Kernel::new(X86Platform::new()));
}
