//! Synchronous system calls (spec §4.4). SYSCALL reads the selector from
//! r0 and arguments from r1..r7; the result lands back in r0. Syscalls
//! never raise run-loop faults for their own argument validation — they
//! report failure as `0xFFFFFFFF` in r0 (spec §7 "BadSyscall ... not as
//! a run-loop fault").

use alloc::string::String;
use alloc::vec;

use crate::memory::Protection;
use crate::sched::WaitTarget;
use crate::vm::Vm;

pub const EXIT: u32 = 0;
pub const PRINT: u32 = 1;
pub const READ: u32 = 2;
pub const OPEN: u32 = 3;
pub const CLOSE: u32 = 4;
pub const READ_FILE: u32 = 5;
pub const WRITE_FILE: u32 = 6;
pub const GET_TIME: u32 = 7;
pub const SLEEP: u32 = 8;
pub const ALLOC: u32 = 9;
pub const FREE: u32 = 10;
pub const PIXEL: u32 = 11;
pub const NET_SEND: u32 = 12;
pub const NET_RECV: u32 = 13;
pub const NET_CONNECT: u32 = 14;
pub const NET_LISTEN: u32 = 15;
pub const THREAD_CREATE: u32 = 16;
pub const THREAD_EXIT: u32 = 17;
pub const THREAD_JOIN: u32 = 18;
pub const MUTEX_LOCK: u32 = 19;
pub const MUTEX_UNLOCK: u32 = 20;
pub const SEM_WAIT: u32 = 21;
pub const SEM_POST: u32 = 22;

const ERR: u32 = 0xFFFF_FFFF;
const MAX_PATH_LEN: usize = 256;

pub fn dispatch(vm: &mut Vm) {
    let selector = vm.regs.get(0);
    let a1 = vm.regs.get(1);
    let a2 = vm.regs.get(2);
    let a3 = vm.regs.get(3);

    let result = match selector {
        EXIT => {
            vm.exit_code = Some(a1);
            vm.regs.halted = true;
            return;
        }
        PRINT => print(vm, a1, a2),
        READ => read_input(vm, a1, a2),
        OPEN => open(vm, a1, a2),
        CLOSE => close(vm, a1),
        READ_FILE => read_file(vm, a1, a2, a3),
        WRITE_FILE => write_file(vm, a1, a2, a3),
        GET_TIME => vm.timer.ticks() as u32,
        SLEEP => {
            vm.timer.sleep_millis(a1);
            0
        }
        ALLOC => vm.heap.alloc(a1).unwrap_or(ERR),
        FREE => {
            vm.heap.free(a1);
            0
        }
        PIXEL => pixel(vm, a1, a2, a3),
        NET_SEND => net_send(vm, a1, a2),
        NET_RECV => net_recv(vm, a1, a2),
        NET_CONNECT | NET_LISTEN => {
            vm.network.set_connected(true);
            0
        }
        THREAD_CREATE => vm.create_thread(a1, a2).unwrap_or(ERR),
        THREAD_EXIT => {
            let id = vm.threads.current_id();
            vm.threads.exit_current();
            vm.threads.wake_joiners_of(id);
            vm.threads.yield_now(&mut vm.regs);
            return;
        }
        THREAD_JOIN => {
            if !vm.threads.is_exited(a1) {
                vm.threads.wait_current(WaitTarget::Thread(a1));
                vm.threads.yield_now(&mut vm.regs);
                return;
            }
            0
        }
        MUTEX_LOCK | MUTEX_UNLOCK | SEM_WAIT | SEM_POST => 0,
        _ => ERR,
    };
    vm.regs.set(0, result);
}

fn print(vm: &mut Vm, addr: u32, len: u32) -> u32 {
    let mut buf = vec![0u8; len as usize];
    if vm.mem.copy_out(addr, &mut buf, Protection::READ).is_err() {
        return ERR;
    }
    let text = String::from_utf8_lossy(&buf);
    vm.sink.write_line(logger::Level::Info, &text);
    len
}

fn read_input(vm: &mut Vm, addr: u32, maxlen: u32) -> u32 {
    let mut buf = vec![0u8; maxlen as usize];
    let count = vm.keyboard.read(&mut buf);
    if vm.mem.copy_in(addr, &buf[..count], Protection::WRITE).is_err() {
        return ERR;
    }
    count as u32
}

fn read_cstring(vm: &Vm, addr: u32) -> Result<alloc::vec::Vec<u8>, ()> {
    let mut out = alloc::vec::Vec::new();
    for i in 0..MAX_PATH_LEN as u32 {
        let byte = vm.mem.read_u8(addr + i).map_err(|_| ())?;
        if byte == 0 {
            return Ok(out);
        }
        out.push(byte);
    }
    Err(())
}

fn open(vm: &mut Vm, path_addr: u32, mode: u32) -> u32 {
    let Ok(path) = read_cstring(vm, path_addr) else {
        return ERR;
    };
    let Some(mode) = drivers::OpenMode::from_u32(mode) else {
        return ERR;
    };
    vm.fs.open(&path, mode).unwrap_or(ERR)
}

fn close(vm: &mut Vm, fd: u32) -> u32 {
    if vm.fs.close(fd).is_ok() { 0 } else { ERR }
}

fn read_file(vm: &mut Vm, fd: u32, addr: u32, len: u32) -> u32 {
    let Ok(transfer) = vm.fs.prepare_read(fd, len as usize) else {
        return ERR;
    };
    let mut buf = vec![0u8; transfer.count];
    if vm.storage.read(transfer.storage_offset, &mut buf).is_err() {
        return ERR;
    }
    if vm.mem.copy_in(addr, &buf, Protection::WRITE).is_err() {
        return ERR;
    }
    transfer.count as u32
}

fn write_file(vm: &mut Vm, fd: u32, addr: u32, len: u32) -> u32 {
    let Ok(transfer) = vm.fs.prepare_write(fd, len as usize) else {
        return ERR;
    };
    let mut buf = vec![0u8; transfer.count];
    if vm.mem.copy_out(addr, &mut buf, Protection::READ).is_err() {
        return ERR;
    }
    if vm.storage.write(transfer.storage_offset, &buf).is_err() {
        return ERR;
    }
    transfer.count as u32
}

fn pixel(vm: &mut Vm, x: u32, y: u32, color: u32) -> u32 {
    match vm.display.set_pixel(x, y, color) {
        Ok(()) => 0,
        Err(_) => ERR,
    }
}

fn net_send(vm: &mut Vm, addr: u32, len: u32) -> u32 {
    let mut buf = vec![0u8; len as usize];
    if vm.mem.copy_out(addr, &mut buf, Protection::READ).is_err() {
        return ERR;
    }
    if !vm.network.send(&buf) {
        return ERR;
    }
    vm.interrupts.raise(crate::interrupts::IRQ_NETWORK);
    0
}

fn net_recv(vm: &mut Vm, addr: u32, maxlen: u32) -> u32 {
    let Some(packet) = vm.network.recv() else {
        return 0;
    };
    let bytes = packet.as_slice();
    let count = bytes.len().min(maxlen as usize);
    if vm.mem.copy_in(addr, &bytes[..count], Protection::WRITE).is_err() {
        return ERR;
    }
    count as u32
}
