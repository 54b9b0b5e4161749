//! Disassembles one instruction word into the plain-ASCII form fixed by
//! spec §6: uppercase mnemonic, `rN` registers, signed decimal I-form
//! immediates, `0x`-hex J-form addresses.

use alloc::format;
use alloc::string::String;

use crate::decode::Instruction;
use crate::opcode::Opcode;

pub fn disassemble(word: u32) -> String {
    let Some(inst) = Instruction::decode(word) else {
        return format!("?? (0x{word:08X})");
    };
    let mnemonic = inst.opcode.mnemonic();
    use Opcode::*;
    match inst.opcode {
        Add | Sub | Mul | Div | Mod | And | Or | Xor | Shl | Shr | Cmp | Test | Slt | Sle
        | Seq | Sne | Load | Store | Loadb | Storeb | Fadd | Fsub | Fmul | Fdiv | Fcmp | Vadd
        | Vsub | Vmul | Vdot | Xchg | Cas | FaddAtomic => {
            let r = inst.as_r();
            format!("{mnemonic} r{},r{},r{}", r.rd(), r.rs1(), r.rs2())
        }
        Neg | Not | Move | Fcvt | Icvt | Fmov => {
            let r = inst.as_r();
            format!("{mnemonic} r{},r{}", r.rd(), r.rs1())
        }
        Loadi => {
            let i = inst.as_i();
            format!("{mnemonic} r{},{}", i.rd(), inst.imm16_sign_extended())
        }
        Jmp | Call => format!("{mnemonic} 0x{:X}", inst.imm24_sign_extended()),
        Jz | Jnz | Jc | Jnc => format!("{mnemonic} 0x{:X}", inst.imm24_sign_extended()),
        Ret | Syscall | Halt | Lock => mnemonic.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{encode_i, encode_j, encode_r};

    #[test]
    fn r_form_three_register_instruction() {
        let word = encode_r(Opcode::Add, 3, 1, 2);
        assert_eq!(disassemble(word), "ADD r3,r1,r2");
    }

    #[test]
    fn i_form_uses_signed_decimal_immediate() {
        let word = encode_i(Opcode::Loadi, 1, -1);
        assert_eq!(disassemble(word), "LOADI r1,-1");
    }

    #[test]
    fn j_form_uses_hex_address() {
        let word = encode_j(Opcode::Jmp, 0x10);
        assert_eq!(disassemble(word), "JMP 0x10");
    }

    #[test]
    fn zero_operand_instruction_is_bare_mnemonic() {
        let word = encode_r(Opcode::Halt, 0, 0, 0);
        assert_eq!(disassemble(word), "HALT");
    }

    #[test]
    fn unknown_opcode_byte_does_not_panic() {
        let word = 0xFF00_0000;
        assert!(disassemble(word).starts_with("??"));
    }
}
