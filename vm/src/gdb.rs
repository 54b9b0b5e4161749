//! GDB remote-serial-protocol stub (spec §4.10). The transport is
//! abstracted away entirely: [`GdbStub::handle`] consumes bytes already
//! read from *some* stream and returns bytes to write back to it; the
//! core never owns a socket (spec §9 "GDB socket programming is
//! stubbed").

use alloc::string::String;
use alloc::vec::Vec;

use crate::vm::Vm;

pub const PACKET_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_PORT: u16 = 1234;

pub struct GdbStub {
    enabled: bool,
    connected: bool,
    break_requested: bool,
}

impl GdbStub {
    pub fn new() -> Self {
        Self {
            enabled: false,
            connected: false,
            break_requested: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn start(&mut self) {
        self.enabled = true;
        self.connected = true;
    }

    pub fn stop(&mut self) {
        self.enabled = false;
        self.connected = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn request_break(&mut self) {
        self.break_requested = true;
    }

    /// Consume one `input` chunk (may contain multiple packets) and
    /// return the bytes to send back: an ack/nack per packet plus any
    /// reply payloads.
    pub fn handle(&mut self, input: &[u8], vm: &mut Vm) -> Vec<u8> {
        let mut out = Vec::new();
        let mut rest = input;
        while let Some((payload, consumed, valid)) = next_packet(rest) {
            rest = &rest[consumed..];
            if !valid {
                out.push(b'-');
                continue;
            }
            out.push(b'+');
            if let Some(reply) = self.dispatch(payload, vm) {
                out.extend_from_slice(reply.as_bytes());
            }
        }
        out
    }

    fn dispatch(&mut self, payload: &[u8], vm: &mut Vm) -> Option<String> {
        if payload.is_empty() {
            return Some(encode_packet(""));
        }
        match payload[0] {
            b'?' => Some(encode_packet("S05")),
            b'g' => Some(encode_packet(&read_registers_hex(vm))),
            b'G' => {
                let hex = core::str::from_utf8(&payload[1..]).ok()?;
                write_registers_hex(vm, hex);
                Some(encode_packet("OK"))
            }
            b'm' => {
                let (addr, len) = parse_addr_len(&payload[1..])?;
                let mut buf = alloc::vec![0u8; len];
                let _ = vm.mem.copy_out(addr, &mut buf, crate::memory::Protection::READ);
                Some(encode_packet(&to_hex(&buf)))
            }
            b'M' => {
                let rest = &payload[1..];
                let colon = rest.iter().position(|&b| b == b':')?;
                let (addr, len) = parse_addr_len(&rest[..colon])?;
                let data = from_hex(&rest[colon + 1..])?;
                if data.len() != len {
                    return Some(encode_packet("E01"));
                }
                match vm.mem.copy_in(addr, &data, crate::memory::Protection::WRITE) {
                    Ok(()) => Some(encode_packet("OK")),
                    Err(_) => Some(encode_packet("E01")),
                }
            }
            b's' => {
                vm.debugger.set_single_step(true);
                vm.step();
                Some(encode_packet("S05"))
            }
            b'c' => {
                vm.run(u32::MAX);
                Some(encode_packet("S05"))
            }
            b'Z' if payload.starts_with(b"Z0,") => {
                let (addr, _) = parse_addr_len(&payload[3..])?;
                match vm.debugger.add_breakpoint(addr) {
                    Ok(()) => Some(encode_packet("OK")),
                    Err(_) => Some(encode_packet("E01")),
                }
            }
            b'z' if payload.starts_with(b"z0,") => {
                let (addr, _) = parse_addr_len(&payload[3..])?;
                vm.debugger.remove_breakpoint(addr);
                Some(encode_packet("OK"))
            }
            b'k' => {
                vm.regs.halted = true;
                None
            }
            _ => Some(encode_packet("")),
        }
    }
}

impl Default for GdbStub {
    fn default() -> Self {
        Self::new()
    }
}

fn read_registers_hex(vm: &Vm) -> String {
    let mut bytes = Vec::with_capacity(20 * 4);
    for r in vm.regs.gpr.iter() {
        bytes.extend_from_slice(&r.to_le_bytes());
    }
    bytes.extend_from_slice(&vm.regs.pc.to_le_bytes());
    bytes.extend_from_slice(&vm.regs.sp.to_le_bytes());
    bytes.extend_from_slice(&vm.regs.fp.to_le_bytes());
    bytes.extend_from_slice(&vm.regs.flags.to_word().to_le_bytes());
    to_hex(&bytes)
}

fn write_registers_hex(vm: &mut Vm, hex: &str) {
    let Some(bytes) = from_hex(hex.as_bytes()) else {
        return;
    };
    let mut chunks = bytes.chunks_exact(4);
    for slot in vm.regs.gpr.iter_mut() {
        if let Some(c) = chunks.next() {
            *slot = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
        }
    }
    if let Some(c) = chunks.next() {
        vm.regs.pc = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
    }
    if let Some(c) = chunks.next() {
        vm.regs.sp = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
    }
    if let Some(c) = chunks.next() {
        vm.regs.fp = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
    }
    if let Some(c) = chunks.next() {
        vm.regs.flags = crate::registers::Flags::from_word(u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
    }
}

fn parse_addr_len(bytes: &[u8]) -> Option<(u32, usize)> {
    let text = core::str::from_utf8(bytes).ok()?;
    let (addr_s, len_s) = text.split_once(',')?;
    let addr = u32::from_str_radix(addr_s, 16).ok()?;
    let len = usize::from_str_radix(len_s, 16).ok()?;
    Some((addr, len))
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&alloc::format!("{b:02x}"));
    }
    s
}

fn from_hex(bytes: &[u8]) -> Option<Vec<u8>> {
    let text = core::str::from_utf8(bytes).ok()?;
    if text.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(text.len() / 2);
    for pair in text.as_bytes().chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push((hi as u8) << 4 | lo as u8);
    }
    Some(out)
}

fn encode_packet(payload: &str) -> String {
    let chk = checksum(payload.as_bytes());
    alloc::format!("${payload}#{chk:02x}")
}

fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Find the next `$<payload>#<chk>` packet in `buf`. Returns the
/// payload, the number of bytes consumed (through the checksum), and
/// whether the checksum matched.
fn next_packet(buf: &[u8]) -> Option<(&[u8], usize, bool)> {
    let start = buf.iter().position(|&b| b == b'$')?;
    let hash = buf[start..].iter().position(|&b| b == b'#')? + start;
    if hash + 2 >= buf.len() {
        return None;
    }
    let payload = &buf[start + 1..hash];
    let chk_text = core::str::from_utf8(&buf[hash + 1..hash + 3]).ok()?;
    let expected = u8::from_str_radix(chk_text, 16).ok()?;
    let valid = checksum(payload) == expected;
    Some((payload, hash + 3, valid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VmConfig;

    #[test]
    fn checksum_matches_known_packet() {
        let payload = b"OK";
        assert_eq!(checksum(payload), b'O'.wrapping_add(b'K'));
    }

    #[test]
    fn stop_reply_packet_is_acknowledged() {
        let mut vm = Vm::new(VmConfig::new());
        vm.init();
        let mut stub = GdbStub::new();
        let packet = encode_packet("?");
        let out = stub.handle(packet.as_bytes(), &mut vm);
        assert_eq!(out[0], b'+');
    }

    #[test]
    fn bad_checksum_is_nacked() {
        let mut vm = Vm::new(VmConfig::new());
        vm.init();
        let mut stub = GdbStub::new();
        let out = stub.handle(b"$?#00", &mut vm);
        assert_eq!(out, alloc::vec![b'-']);
    }

    #[test]
    fn memory_write_then_read_round_trips() {
        let mut vm = Vm::new(VmConfig::new());
        vm.init();
        let mut stub = GdbStub::new();
        let write = encode_packet("M1000,4:11223344");
        stub.handle(write.as_bytes(), &mut vm);
        let read = encode_packet("m1000,4");
        let out = stub.handle(read.as_bytes(), &mut vm);
        let text = core::str::from_utf8(&out).unwrap();
        assert!(text.contains("11223344"));
    }
}
