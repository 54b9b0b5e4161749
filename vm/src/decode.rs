//! Splits a 32-bit instruction word into its R/I/J form (spec §4.1). The
//! opcode occupies the high 8 bits in every form; `modular_bitfield`
//! fields are declared low-bit-first, so the opcode is always listed last.

use modular_bitfield::prelude::*;

use crate::opcode::Opcode;

#[bitfield(bits = 32)]
#[derive(Debug, Clone, Copy)]
#[repr(u32)]
pub struct RForm {
    pub unused: B12,
    pub rs2: B4,
    pub rs1: B4,
    pub rd: B4,
    pub opcode: B8,
}

#[bitfield(bits = 32)]
#[derive(Debug, Clone, Copy)]
#[repr(u32)]
pub struct IForm {
    pub imm16: B16,
    pub reserved: B4,
    pub rd: B4,
    pub opcode: B8,
}

#[bitfield(bits = 32)]
#[derive(Debug, Clone, Copy)]
#[repr(u32)]
pub struct JForm {
    pub imm24: B24,
    pub opcode: B8,
}

/// A decoded instruction: the opcode plus its operands still packed in
/// whichever form matches that opcode's class. The executor picks the
/// accessor that matches the opcode.
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub opcode: Opcode,
    pub word: u32,
}

impl Instruction {
    pub fn decode(word: u32) -> Option<Self> {
        let opcode = Opcode::from_byte((word >> 24) as u8)?;
        Some(Self { opcode, word })
    }

    pub fn as_r(self) -> RForm {
        RForm::from_bytes(self.word.to_le_bytes())
    }

    pub fn as_i(self) -> IForm {
        IForm::from_bytes(self.word.to_le_bytes())
    }

    pub fn as_j(self) -> JForm {
        JForm::from_bytes(self.word.to_le_bytes())
    }

    pub fn rd(self) -> u8 {
        self.as_r().rd()
    }

    pub fn rs1(self) -> u8 {
        self.as_r().rs1()
    }

    pub fn rs2(self) -> u8 {
        self.as_r().rs2()
    }

    pub fn imm16_sign_extended(self) -> i32 {
        sign_extend(self.as_i().imm16() as u32, 16)
    }

    pub fn imm24_sign_extended(self) -> i32 {
        sign_extend(self.as_j().imm24(), 24)
    }
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Encode an R-form word: opcode | rd | rs1 | rs2 | unused=0.
pub fn encode_r(opcode: Opcode, rd: u8, rs1: u8, rs2: u8) -> u32 {
    let form = RForm::new()
        .with_opcode(opcode.to_byte())
        .with_rd(rd)
        .with_rs1(rs1)
        .with_rs2(rs2)
        .with_unused(0);
    u32::from_le_bytes(form.into_bytes())
}

/// Encode an I-form word: opcode | rd | reserved=0 | imm16.
pub fn encode_i(opcode: Opcode, rd: u8, imm16: i16) -> u32 {
    let form = IForm::new()
        .with_opcode(opcode.to_byte())
        .with_rd(rd)
        .with_reserved(0)
        .with_imm16(imm16 as u16);
    u32::from_le_bytes(form.into_bytes())
}

/// Encode a J-form word: opcode | imm24.
pub fn encode_j(opcode: Opcode, imm24: i32) -> u32 {
    let form = JForm::new()
        .with_opcode(opcode.to_byte())
        .with_imm24((imm24 as u32) & 0x00FF_FFFF);
    u32::from_le_bytes(form.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r_form_round_trips_fields() {
        let word = encode_r(Opcode::Add, 3, 1, 2);
        let inst = Instruction::decode(word).unwrap();
        assert_eq!(inst.opcode, Opcode::Add);
        assert_eq!(inst.rd(), 3);
        assert_eq!(inst.rs1(), 1);
        assert_eq!(inst.rs2(), 2);
    }

    #[test]
    fn i_form_sign_extends_negative_immediate() {
        let word = encode_i(Opcode::Loadi, 2, -1);
        let inst = Instruction::decode(word).unwrap();
        assert_eq!(inst.rd(), 2);
        assert_eq!(inst.imm16_sign_extended(), -1);
    }

    #[test]
    fn j_form_sign_extends_24_bit_immediate() {
        let word = encode_j(Opcode::Jmp, -2);
        let inst = Instruction::decode(word).unwrap();
        assert_eq!(inst.imm24_sign_extended(), -2);
    }

    #[test]
    fn opcode_occupies_the_high_byte() {
        let word = encode_r(Opcode::Halt, 0, 0, 0);
        assert_eq!(word >> 24, Opcode::Halt.to_byte() as u32);
    }
}
