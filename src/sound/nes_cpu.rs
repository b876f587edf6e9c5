// license:BSD-3-Clause
//! MOS 6502 interpreter.
//!
//! Covers the legal opcode subset that NSF music drivers rely on and
//! executes against a [`NesBus`]. Execution is bounded: a driver
//! subroutine is entered with [`Mos6502::call_subroutine`] and runs
//! until it returns, exhausts its instruction budget, or hits an
//! undefined opcode.

use thiserror::Error;

use crate::sound::nes_bus::NesBus;

const C_FLAG: u8 = 0x01;
const Z_FLAG: u8 = 0x02;
#[allow(dead_code)]
const I_FLAG: u8 = 0x04;
#[allow(dead_code)]
const D_FLAG: u8 = 0x08;
const B_FLAG: u8 = 0x10;
#[allow(dead_code)]
const U_FLAG: u8 = 0x20;
const V_FLAG: u8 = 0x40;
const N_FLAG: u8 = 0x80;

/// Hard CPU faults. Undefined opcodes abandon the current driver call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    #[error("undefined opcode 0x{opcode:02X} at [0x{addr:04X}]")]
    UndefinedOpcode { opcode: u8, addr: u16 },
}

/// Architectural register file plus the addressing-mode scratch state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NesCpuState {
    pub pc: u16,
    pub sp: u8,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub flags: u8,
    pub abs_addr: u16,
    pub rel_addr: u16,
    pub implied: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Opcode {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Clc, Cmp, Cpx,
    Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr,
    Nop, Ora, Pha, Pla, Rol, Ror, Rts, Sbc, Sec, Sta, Stx, Sty, Tax, Tay,
    Txa, Tya, Und,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum AddrMode {
    /// Implied or accumulator target.
    Imp,
    Imd,
    Zp,
    Zpx,
    Zpy,
    Rel,
    Abs,
    Abx,
    Aby,
    Ind,
    Idx,
    Idy,
}

use AddrMode::*;
use Opcode::*;

const UND: (Opcode, AddrMode) = (Und, Imp);

#[rustfmt::skip]
const DISPATCH: [(Opcode, AddrMode); 256] = [
    /*        X0          X1          X2   X3   X4          X5          X6          X7   */
    /* 0X */ (Brk, Imp), (Ora, Idx), UND, UND, UND,        (Ora, Zp ), (Asl, Zp ), UND,
    /*        X8          X9          XA          XB   XC          XD          XE          XF   */
    /* 0X */ UND,        (Ora, Imd), (Asl, Imp), UND, UND,        (Ora, Abs), (Asl, Abs), UND,
    /* 1X */ (Bpl, Rel), (Ora, Idy), UND, UND, UND,        (Ora, Zpx), (Asl, Zpx), UND,
    /* 1X */ (Clc, Imp), (Ora, Aby), UND, UND, UND,        (Ora, Abx), (Asl, Abx), UND,
    /* 2X */ (Jsr, Abs), (And, Idx), UND, UND, (Bit, Zp ), (And, Zp ), (Rol, Zp ), UND,
    /* 2X */ UND,        (And, Imd), (Rol, Imp), UND, (Bit, Abs), (And, Abs), (Rol, Abs), UND,
    /* 3X */ (Bmi, Rel), (And, Idy), UND, UND, UND,        (And, Zpx), (Rol, Zpx), UND,
    /* 3X */ (Sec, Imp), (And, Aby), UND, UND, UND,        (And, Abx), (Rol, Abx), UND,
    /* 4X */ UND,        (Eor, Idx), UND, UND, UND,        (Eor, Zp ), (Lsr, Zp ), UND,
    /* 4X */ (Pha, Imp), (Eor, Imd), (Lsr, Imp), UND, (Jmp, Abs), (Eor, Abs), (Lsr, Abs), UND,
    /* 5X */ UND,        (Eor, Idy), UND, UND, UND,        (Eor, Zpx), (Lsr, Zpx), UND,
    /* 5X */ UND,        (Eor, Aby), UND, UND, UND,        (Eor, Abx), (Lsr, Abx), UND,
    /* 6X */ (Rts, Imp), (Adc, Idx), UND, UND, UND,        (Adc, Zp ), (Ror, Zp ), UND,
    /* 6X */ (Pla, Imp), (Adc, Imd), (Ror, Imp), UND, (Jmp, Ind), (Adc, Abs), (Ror, Abs), UND,
    /* 7X */ UND,        (Adc, Idy), UND, UND, UND,        (Adc, Zpx), (Ror, Zpx), UND,
    /* 7X */ UND,        (Adc, Aby), UND, UND, UND,        (Adc, Abx), (Ror, Abx), UND,
    /* 8X */ UND,        (Sta, Idx), UND, UND, (Sty, Zp ), (Sta, Zp ), (Stx, Zp ), UND,
    /* 8X */ (Dey, Imp), UND,        (Txa, Imp), UND, (Sty, Abs), (Sta, Abs), (Stx, Abs), UND,
    /* 9X */ (Bcc, Rel), (Sta, Idy), UND, UND, (Sty, Zpx), (Sta, Zpx), (Stx, Zpy), UND,
    /* 9X */ (Tya, Imp), (Sta, Aby), UND, UND, UND,        (Sta, Abx), UND,        UND,
    /* AX */ (Ldy, Imd), (Lda, Idx), (Ldx, Imd), UND, (Ldy, Zp ), (Lda, Zp ), (Ldx, Zp ), UND,
    /* AX */ (Tay, Imp), (Lda, Imd), (Tax, Imp), UND, (Ldy, Abs), (Lda, Abs), (Ldx, Abs), UND,
    /* BX */ (Bcs, Rel), (Lda, Idy), UND, UND, (Ldy, Zpx), (Lda, Zpx), (Ldx, Zpy), UND,
    /* BX */ UND,        (Lda, Aby), UND, UND, (Ldy, Abx), (Lda, Abx), (Ldx, Aby), UND,
    /* CX */ (Cpy, Imd), (Cmp, Idx), UND, UND, (Cpy, Zp ), (Cmp, Zp ), (Dec, Zp ), UND,
    /* CX */ (Iny, Imp), (Cmp, Imd), (Dex, Imp), UND, (Cpy, Abs), (Cmp, Abs), (Dec, Abs), UND,
    /* DX */ (Bne, Rel), (Cmp, Idy), UND, UND, UND,        (Cmp, Zpx), (Dec, Zpx), UND,
    /* DX */ UND,        (Cmp, Aby), UND, UND, UND,        (Cmp, Abx), (Dec, Abx), UND,
    /* EX */ (Cpx, Imd), (Sbc, Idx), UND, UND, (Cpx, Zp ), (Sbc, Zp ), (Inc, Zp ), UND,
    /* EX */ (Inx, Imp), (Sbc, Imd), (Nop, Imp), UND, (Cpx, Abs), (Sbc, Abs), (Inc, Abs), UND,
    /* FX */ (Beq, Rel), (Sbc, Idy), UND, UND, UND,        (Sbc, Zpx), (Inc, Zpx), UND,
    /* FX */ UND,        (Sbc, Aby), UND, UND, UND,        (Sbc, Abx), (Inc, Abx), UND,
];

/// MOS 6502 core.
pub struct Mos6502 {
    state: NesCpuState,
    stop_sp: u8,
}

impl Mos6502 {
    pub fn new() -> Self {
        Mos6502 {
            state: NesCpuState::default(),
            stop_sp: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = NesCpuState::default();
        self.stop_sp = 0;
    }

    pub fn power(&mut self) {
        self.reset();
    }

    pub fn state(&self) -> &NesCpuState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut NesCpuState {
        &mut self.state
    }

    /// Executes one instruction. An undefined opcode leaves `pc` just
    /// past the faulty byte; bounded execution rewinds it.
    pub fn step(&mut self, bus: &mut NesBus) -> Result<(), CpuError> {
        let opcode_addr = self.state.pc;
        let opcode = self.fetch(bus);
        let (op, mode) = DISPATCH[opcode as usize];
        if op == Und {
            return Err(CpuError::UndefinedOpcode {
                opcode,
                addr: opcode_addr,
            });
        }
        self.state.implied = false;
        self.apply_addr_mode(bus, mode);
        self.execute(bus, op);
        Ok(())
    }

    /// Calls the subroutine at `addr` by faking a JSR, then runs up to
    /// `max_instructions` instructions (negative = unlimited).
    ///
    /// Returns 1 when the subroutine returned, 0 when the budget ran
    /// out (resume with [`Mos6502::continue_subroutine`]), and -1 on a
    /// CPU fault with `pc` rewound to the faulty byte.
    pub fn call_subroutine(&mut self, bus: &mut NesBus, addr: u16, max_instructions: i32) -> i32 {
        self.stop_sp = self.state.sp;
        self.state.abs_addr = addr;
        self.jsr(bus);
        self.continue_subroutine(bus, max_instructions)
    }

    /// Continues a budget-exhausted subroutine call.
    pub fn continue_subroutine(&mut self, bus: &mut NesBus, max_instructions: i32) -> i32 {
        let mut max_instructions = max_instructions;
        loop {
            if self.stop_sp == self.state.sp {
                break;
            }
            match self.step(bus) {
                Ok(()) => {}
                Err(err) => {
                    log::error!("{}", err);
                    break;
                }
            }
            if max_instructions == 0 {
                break;
            }
            if max_instructions > 0 {
                max_instructions -= 1;
            }
        }
        // Exit if we returned from the subroutine call
        if self.stop_sp == self.state.sp {
            return 1;
        }
        // Budget exhausted, there are more instructions to execute
        if max_instructions == 0 {
            return 0;
        }
        // Fault, point pc at the problem instruction
        self.state.pc = self.state.pc.wrapping_sub(1);
        -1
    }

    fn fetch(&mut self, bus: &mut NesBus) -> u8 {
        let data = bus.read(self.state.pc);
        self.state.pc = self.state.pc.wrapping_add(1);
        data
    }

    fn apply_addr_mode(&mut self, bus: &mut NesBus, mode: AddrMode) {
        match mode {
            Imp => self.state.implied = true,
            Imd => {
                self.state.abs_addr = self.state.pc;
                self.state.pc = self.state.pc.wrapping_add(1);
            }
            Zp => self.state.abs_addr = self.fetch(bus) as u16,
            Zpx => {
                self.state.abs_addr = (self.fetch(bus).wrapping_add(self.state.x)) as u16;
            }
            Zpy => {
                self.state.abs_addr = (self.fetch(bus).wrapping_add(self.state.y)) as u16;
            }
            Rel => {
                let mut rel = self.fetch(bus) as u16;
                if rel & 0x80 != 0 {
                    rel |= 0xFF00;
                }
                self.state.rel_addr = rel;
            }
            Abs => {
                let lo = self.fetch(bus) as u16;
                let hi = self.fetch(bus) as u16;
                self.state.abs_addr = hi << 8 | lo;
            }
            Abx => {
                let lo = self.fetch(bus) as u16;
                let hi = self.fetch(bus) as u16;
                self.state.abs_addr = (hi << 8 | lo).wrapping_add(self.state.x as u16);
            }
            Aby => {
                let lo = self.fetch(bus) as u16;
                let hi = self.fetch(bus) as u16;
                self.state.abs_addr = (hi << 8 | lo).wrapping_add(self.state.y as u16);
            }
            Ind => {
                let lo = self.fetch(bus) as u16;
                let hi = self.fetch(bus) as u16;
                let ptr = hi << 8 | lo;
                // the page-crossing hardware bug is not reproduced
                self.state.abs_addr = bus.read(ptr) as u16
                    | (bus.read(ptr.wrapping_add(1)) as u16) << 8;
            }
            Idx => {
                let ptr = (self.fetch(bus).wrapping_add(self.state.x)) as u16;
                self.state.abs_addr = bus.read(ptr) as u16
                    | (bus.read((ptr + 1) & 0xFF) as u16) << 8;
            }
            Idy => {
                let ptr = self.fetch(bus) as u16;
                let base = bus.read(ptr) as u16 | (bus.read((ptr + 1) & 0xFF) as u16) << 8;
                self.state.abs_addr = base.wrapping_add(self.state.y as u16);
            }
        }
    }

    fn modify_flags(&mut self, data: u8) {
        self.state.flags &= !(Z_FLAG | N_FLAG);
        if data == 0 {
            self.state.flags |= Z_FLAG;
        }
        if data & 0x80 != 0 {
            self.state.flags |= N_FLAG;
        }
    }

    fn push(&mut self, bus: &mut NesBus, data: u8) {
        bus.write(0x100 + self.state.sp as u16, data);
        self.state.sp = self.state.sp.wrapping_sub(1);
    }

    fn pull(&mut self, bus: &mut NesBus) -> u8 {
        self.state.sp = self.state.sp.wrapping_add(1);
        bus.read(0x100 + self.state.sp as u16)
    }

    fn operand(&self, bus: &mut NesBus) -> u8 {
        bus.read(self.state.abs_addr)
    }

    fn add_with_carry(&mut self, data: u8) {
        let a = self.state.a;
        let carry = if self.state.flags & C_FLAG != 0 { 1 } else { 0 };
        let temp = a as u16 + data as u16 + carry;
        if temp > 255 {
            self.state.flags |= C_FLAG;
        } else {
            self.state.flags &= !C_FLAG;
        }
        self.modify_flags(temp as u8);
        // sign change of like-signed operands
        if (!(a ^ data) & (a ^ temp as u8)) & 0x80 != 0 {
            self.state.flags |= V_FLAG;
        } else {
            self.state.flags &= !V_FLAG;
        }
        self.state.a = temp as u8;
    }

    fn compare(&mut self, lhs: u8, data: u8) {
        if lhs >= data {
            self.state.flags |= C_FLAG;
        } else {
            self.state.flags &= !C_FLAG;
        }
        self.modify_flags(lhs.wrapping_sub(data));
    }

    fn branch(&mut self, condition: bool) {
        if condition {
            self.state.pc = self.state.pc.wrapping_add(self.state.rel_addr);
        }
    }

    fn jsr(&mut self, bus: &mut NesBus) {
        let addr = self.state.pc.wrapping_sub(1);
        self.push(bus, (addr >> 8) as u8);
        self.push(bus, (addr & 0xFF) as u8);
        self.state.pc = self.state.abs_addr;
    }

    fn execute(&mut self, bus: &mut NesBus, op: Opcode) {
        match op {
            Adc => {
                let data = self.operand(bus);
                self.add_with_carry(data);
            }
            Sbc => {
                let data = self.operand(bus) ^ 0xFF;
                self.add_with_carry(data);
            }
            And => {
                self.state.a &= self.operand(bus);
                self.modify_flags(self.state.a);
            }
            Ora => {
                self.state.a |= self.operand(bus);
                self.modify_flags(self.state.a);
            }
            Eor => {
                self.state.a ^= self.operand(bus);
                self.modify_flags(self.state.a);
            }
            Asl => {
                let data = if self.state.implied {
                    self.state.a
                } else {
                    self.operand(bus)
                };
                self.state.flags &= !(C_FLAG | Z_FLAG | N_FLAG);
                if data & 0x80 != 0 {
                    self.state.flags |= C_FLAG;
                }
                if data & 0x40 != 0 {
                    self.state.flags |= N_FLAG;
                }
                if data & 0x7F == 0 {
                    self.state.flags |= Z_FLAG;
                }
                let data = data << 1;
                if self.state.implied {
                    self.state.a = data;
                } else {
                    bus.write(self.state.abs_addr, data);
                }
            }
            Lsr => {
                let data = if self.state.implied {
                    self.state.a
                } else {
                    self.operand(bus)
                };
                self.state.flags &= !(C_FLAG | Z_FLAG | N_FLAG);
                if data & 0x01 != 0 {
                    self.state.flags |= C_FLAG;
                }
                if data == 1 {
                    self.state.flags |= Z_FLAG;
                }
                let data = data >> 1;
                if self.state.implied {
                    self.state.a = data;
                } else {
                    bus.write(self.state.abs_addr, data);
                }
            }
            Rol => {
                let data = if self.state.implied {
                    self.state.a
                } else {
                    self.operand(bus)
                };
                let carry_in = if self.state.flags & C_FLAG != 0 { 0x01 } else { 0x00 };
                self.state.flags &= !(C_FLAG | Z_FLAG | N_FLAG);
                if data & 0x80 != 0 {
                    self.state.flags |= C_FLAG;
                }
                let data = data << 1 | carry_in;
                self.modify_flags(data);
                if self.state.implied {
                    self.state.a = data;
                } else {
                    bus.write(self.state.abs_addr, data);
                }
            }
            Ror => {
                let data = if self.state.implied {
                    self.state.a
                } else {
                    self.operand(bus)
                };
                let carry_in = if self.state.flags & C_FLAG != 0 { 0x80 } else { 0x00 };
                self.state.flags &= !(C_FLAG | Z_FLAG | N_FLAG);
                if data & 0x01 != 0 {
                    self.state.flags |= C_FLAG;
                }
                let data = data >> 1 | carry_in;
                self.modify_flags(data);
                if self.state.implied {
                    self.state.a = data;
                } else {
                    bus.write(self.state.abs_addr, data);
                }
            }
            Bit => {
                let data = self.operand(bus);
                if self.state.a & data != 0 {
                    self.state.flags &= !Z_FLAG;
                } else {
                    self.state.flags |= Z_FLAG;
                }
                if data & 0x40 != 0 {
                    self.state.flags |= V_FLAG;
                } else {
                    self.state.flags &= !V_FLAG;
                }
                if data & 0x80 != 0 {
                    self.state.flags |= N_FLAG;
                } else {
                    self.state.flags &= !N_FLAG;
                }
            }
            Cmp => {
                let data = self.operand(bus);
                self.compare(self.state.a, data);
            }
            Cpx => {
                let data = self.operand(bus);
                self.compare(self.state.x, data);
            }
            Cpy => {
                let data = self.operand(bus);
                self.compare(self.state.y, data);
            }
            Inc => {
                let data = self.operand(bus).wrapping_add(1);
                bus.write(self.state.abs_addr, data);
                self.modify_flags(data);
            }
            Dec => {
                let data = self.operand(bus).wrapping_sub(1);
                bus.write(self.state.abs_addr, data);
                self.modify_flags(data);
            }
            Inx => {
                self.state.x = self.state.x.wrapping_add(1);
                self.modify_flags(self.state.x);
            }
            Iny => {
                self.state.y = self.state.y.wrapping_add(1);
                self.modify_flags(self.state.y);
            }
            Dex => {
                self.state.x = self.state.x.wrapping_sub(1);
                self.modify_flags(self.state.x);
            }
            Dey => {
                self.state.y = self.state.y.wrapping_sub(1);
                self.modify_flags(self.state.y);
            }
            Lda => {
                self.state.a = self.operand(bus);
                self.modify_flags(self.state.a);
            }
            Ldx => {
                self.state.x = self.operand(bus);
                self.modify_flags(self.state.x);
            }
            Ldy => {
                self.state.y = self.operand(bus);
                self.modify_flags(self.state.y);
            }
            Sta => {
                bus.write(self.state.abs_addr, self.state.a);
            }
            Stx => {
                bus.write(self.state.abs_addr, self.state.x);
            }
            Sty => {
                bus.write(self.state.abs_addr, self.state.y);
            }
            Tax => {
                self.state.x = self.state.a;
                self.modify_flags(self.state.x);
            }
            Tay => {
                self.state.y = self.state.a;
                self.modify_flags(self.state.y);
            }
            Txa => {
                self.state.a = self.state.x;
                self.modify_flags(self.state.a);
            }
            Tya => {
                self.state.a = self.state.y;
                self.modify_flags(self.state.a);
            }
            Jmp => {
                self.state.pc = self.state.abs_addr;
            }
            Jsr => self.jsr(bus),
            Rts => {
                let lo = self.pull(bus) as u16;
                let hi = self.pull(bus) as u16;
                self.state.pc = (hi << 8 | lo).wrapping_add(1);
            }
            Brk => {
                let lo = bus.read(0xFFFE) as u16;
                let hi = bus.read(0xFFFF) as u16;
                self.state.abs_addr = hi << 8 | lo;
                self.jsr(bus);
                let flags = self.state.flags;
                self.push(bus, flags);
                self.state.flags |= B_FLAG;
            }
            Pha => {
                let a = self.state.a;
                self.push(bus, a);
            }
            Pla => {
                self.state.a = self.pull(bus);
            }
            Bpl => self.branch(self.state.flags & N_FLAG == 0),
            Bmi => self.branch(self.state.flags & N_FLAG != 0),
            Bne => self.branch(self.state.flags & Z_FLAG == 0),
            Beq => self.branch(self.state.flags & Z_FLAG != 0),
            Bcc => self.branch(self.state.flags & C_FLAG == 0),
            Bcs => self.branch(self.state.flags & C_FLAG != 0),
            Clc => self.state.flags &= !C_FLAG,
            Sec => self.state.flags |= C_FLAG,
            Nop => {}
            Und => unreachable!("undefined opcodes are rejected before dispatch"),
        }
    }
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::nes_bus::NesBus;

    /// Loads `program` into RAM at `addr` through the bus.
    fn load(bus: &mut NesBus, addr: u16, program: &[u8]) {
        for (i, &byte) in program.iter().enumerate() {
            bus.write(addr + i as u16, byte);
        }
    }

    fn cpu_at(addr: u16) -> Mos6502 {
        let mut cpu = Mos6502::new();
        cpu.state_mut().pc = addr;
        cpu.state_mut().sp = 0xEF;
        cpu
    }

    #[test]
    fn lda_sta_roundtrip() {
        let mut bus = NesBus::new();
        // LDA #$5A; STA $0040; RTS
        load(&mut bus, 0x0200, &[0xA9, 0x5A, 0x8D, 0x40, 0x00, 0x60]);
        let mut cpu = cpu_at(0x0000);
        cpu.state_mut().sp = 0xEF;
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), 1);
        assert_eq!(bus.read(0x0040), 0x5A);
        assert_eq!(cpu.state().a, 0x5A);
    }

    #[test]
    fn jsr_rts_restores_stack_pointer() {
        let mut bus = NesBus::new();
        // JSR $0210; RTS at both levels
        load(&mut bus, 0x0200, &[0x20, 0x10, 0x02, 0x60]);
        load(&mut bus, 0x0210, &[0x60]);
        let mut cpu = cpu_at(0x0000);
        let sp_before = cpu.state().sp;
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), 1);
        assert_eq!(cpu.state().sp, sp_before);
    }

    #[test]
    fn bounded_call_returns_zero_then_resumes() {
        let mut bus = NesBus::new();
        // NOP; NOP; RTS
        load(&mut bus, 0x0200, &[0xEA, 0xEA, 0x60]);
        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, 2), 1);

        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, 1), 0);
        assert_eq!(cpu.continue_subroutine(&mut bus, 1), 1);
    }

    #[test]
    fn undefined_opcode_rewinds_pc() {
        let mut bus = NesBus::new();
        // NOP; 0xFF is undefined
        load(&mut bus, 0x0200, &[0xEA, 0xFF]);
        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), -1);
        assert_eq!(cpu.state().pc, 0x0201);
    }

    #[test]
    fn adc_sets_overflow_on_like_signed_operands() {
        let mut bus = NesBus::new();
        // LDA #$50; ADC #$50; RTS -> 0xA0, V set
        load(&mut bus, 0x0200, &[0xA9, 0x50, 0x69, 0x50, 0x60]);
        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), 1);
        assert_eq!(cpu.state().a, 0xA0);
        assert_ne!(cpu.state().flags & V_FLAG, 0);
        assert_ne!(cpu.state().flags & N_FLAG, 0);
        assert_eq!(cpu.state().flags & C_FLAG, 0);
    }

    #[test]
    fn sbc_is_adc_of_ones_complement() {
        let mut bus = NesBus::new();
        // SEC; LDA #$10; SBC #$08; RTS -> 0x08, carry kept
        load(&mut bus, 0x0200, &[0x38, 0xA9, 0x10, 0xE9, 0x08, 0x60]);
        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), 1);
        assert_eq!(cpu.state().a, 0x08);
        assert_ne!(cpu.state().flags & C_FLAG, 0);
    }

    #[test]
    fn indirect_jmp_reads_across_page_with_16_bit_arithmetic() {
        let mut bus = NesBus::new();
        // pointer straddles the 0x02FF/0x0300 boundary
        bus.write(0x02FF, 0x34);
        bus.write(0x0300, 0x12);
        // JMP ($02FF); target holds RTS
        load(&mut bus, 0x0200, &[0x6C, 0xFF, 0x02]);
        load(&mut bus, 0x1234 & 0x07FF, &[0x60]); // RAM mirror of 0x1234
        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), 1);
    }

    #[test]
    fn branch_taken_moves_pc_backwards_and_forwards() {
        let mut bus = NesBus::new();
        // LDX #$03; DEX; BNE -3; RTS
        load(&mut bus, 0x0200, &[0xA2, 0x03, 0xCA, 0xD0, 0xFD, 0x60]);
        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), 1);
        assert_eq!(cpu.state().x, 0);
    }

    #[test]
    fn asl_accumulator_uses_implied_target() {
        let mut bus = NesBus::new();
        // LDA #$41; ASL A; RTS
        load(&mut bus, 0x0200, &[0xA9, 0x41, 0x0A, 0x60]);
        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), 1);
        assert_eq!(cpu.state().a, 0x82);
        assert_ne!(cpu.state().flags & N_FLAG, 0);
    }

    #[test]
    fn pha_pla_roundtrip() {
        let mut bus = NesBus::new();
        // LDA #$77; PHA; LDA #$00; PLA; RTS
        load(&mut bus, 0x0200, &[0xA9, 0x77, 0x48, 0xA9, 0x00, 0x68, 0x60]);
        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), 1);
        assert_eq!(cpu.state().a, 0x77);
    }

    #[test]
    fn indexed_indirect_and_indirect_indexed_addressing() {
        let mut bus = NesBus::new();
        // ($10,X) with X=4 -> pointer at $14 -> $0040
        bus.write(0x0014, 0x40);
        bus.write(0x0015, 0x00);
        bus.write(0x0040, 0xAB);
        // ($20),Y with Y=2 -> base $0050 + 2 = $0052
        bus.write(0x0020, 0x50);
        bus.write(0x0021, 0x00);
        bus.write(0x0052, 0xCD);
        // LDX #$04; LDA ($10,X); STA $60; LDY #$02; LDA ($20),Y; RTS
        load(
            &mut bus,
            0x0200,
            &[0xA2, 0x04, 0xA1, 0x10, 0x85, 0x60, 0xA0, 0x02, 0xB1, 0x20, 0x60],
        );
        let mut cpu = cpu_at(0x0000);
        assert_eq!(cpu.call_subroutine(&mut bus, 0x0200, -1), 1);
        assert_eq!(bus.read(0x0060), 0xAB);
        assert_eq!(cpu.state().a, 0xCD);
    }
}
