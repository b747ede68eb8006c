use std::ops::{Index, IndexMut};

pub const R0: Register = unsafe { Register::new_unchecked(0) };
pub const R1: Register = unsafe { Register::new_unchecked(1) };
pub const R2: Register = unsafe { Register::new_unchecked(2) };
pub const R3: Register = unsafe { Register::new_unchecked(3) };
pub const R4: Register = unsafe { Register::new_unchecked(4) };
pub const R5: Register = unsafe { Register::new_unchecked(5) };
pub const R6: Register = unsafe { Register::new_unchecked(6) };
pub const R7: Register = unsafe { Register::new_unchecked(7) };
pub const R8: Register = unsafe { Register::new_unchecked(8) };
pub const R9: Register = unsafe { Register::new_unchecked(9) };
pub const R10: Register = unsafe { Register::new_unchecked(10) };
pub const R11: Register = unsafe { Register::new_unchecked(11) };
pub const R12: Register = unsafe { Register::new_unchecked(12) };
pub const R13: Register = unsafe { Register::new_unchecked(13) };
pub const R14: Register = unsafe { Register::new_unchecked(14) };
pub const R15: Register = unsafe { Register::new_unchecked(15) };

/// Stack pointer
pub const SP: Register = R13;
/// Link register, holds the return address after a branch with link
pub const LR: Register = R14;
/// Program counter
pub const PC: Register = R15;

pub const REGISTER_COUNT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(u8);

impl Register {
    pub const fn new(i: u8) -> Option<Self> {
        if (i as usize) < REGISTER_COUNT {
            Some(Self(i))
        } else {
            None
        }
    }

    /// SAFETY: `i` must be below [REGISTER_COUNT]
    pub const unsafe fn new_unchecked(i: u8) -> Self {
        Self(i)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            SP => f.pad("sp"),
            LR => f.pad("lr"),
            PC => f.pad("pc"),
            Register(i) => f.pad(&format!("r{i}")),
        }
    }
}

/// One bank of the ARM general purpose registers, as seen by the current mode.
///
/// The aliases [SP], [LR] and [PC] are plain [Register] values, so they always
/// address the same slot as `R13`, `R14` and `R15`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegisterBank {
    registers: [u32; REGISTER_COUNT],
}

impl RegisterBank {
    pub fn get(&self, register: Register) -> u32 {
        // Register is always < REGISTER_COUNT
        unsafe { *self.registers.get_unchecked(register.index()) }
    }

    pub fn set(&mut self, register: Register, value: u32) {
        unsafe { *self.registers.get_unchecked_mut(register.index()) = value };
    }

    pub fn get_mut(&mut self, register: Register) -> &mut u32 {
        unsafe { self.registers.get_unchecked_mut(register.index()) }
    }

    pub fn sp(&self) -> u32 {
        self.get(SP)
    }

    pub fn sp_mut(&mut self) -> &mut u32 {
        self.get_mut(SP)
    }

    pub fn lr(&self) -> u32 {
        self.get(LR)
    }

    pub fn lr_mut(&mut self) -> &mut u32 {
        self.get_mut(LR)
    }

    pub fn pc(&self) -> u32 {
        self.get(PC)
    }

    pub fn pc_mut(&mut self) -> &mut u32 {
        self.get_mut(PC)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.registers
    }

    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.registers
    }
}

impl Index<Register> for RegisterBank {
    type Output = u32;

    fn index(&self, register: Register) -> &u32 {
        unsafe { self.registers.get_unchecked(register.index()) }
    }
}

impl IndexMut<Register> for RegisterBank {
    fn index_mut(&mut self, register: Register) -> &mut u32 {
        self.get_mut(register)
    }
}

/// A set of registers for load/store multiple, iterated in ascending order
/// like the register list field of `LDM`/`STM`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegisterList(u16);

impl RegisterList {
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, register: Register) -> bool {
        self.0 & (1 << register.as_u8()) != 0
    }

    pub fn insert(&mut self, register: Register) {
        self.0 |= 1 << register.as_u8();
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Register> {
        let bits = self.0;

        (0..REGISTER_COUNT as u8)
            .filter(move |i| bits & (1 << *i) != 0)
            .map(|i| unsafe { Register::new_unchecked(i) })
    }
}

impl FromIterator<Register> for RegisterList {
    fn from_iter<I: IntoIterator<Item = Register>>(iter: I) -> Self {
        let mut list = RegisterList::default();

        for register in iter {
            list.insert(register);
        }

        list
    }
}

impl<const N: usize> From<[Register; N]> for RegisterList {
    fn from(registers: [Register; N]) -> Self {
        registers.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_bounds() {
        assert_eq!(Register::new(15), Some(PC));
        assert_eq!(Register::new(16), None);
    }

    #[test]
    fn aliases_share_storage() {
        let mut bank = RegisterBank::default();

        *bank.sp_mut() = 0x1000;
        assert_eq!(bank.get(R13), 0x1000);

        bank.set(R13, 0x2000);
        assert_eq!(bank.sp(), 0x2000);

        bank[LR] = 0xDEAD_BEEF;
        assert_eq!(bank[R14], 0xDEAD_BEEF);

        *bank.get_mut(R15) = 0x40;
        assert_eq!(bank.pc(), 0x40);
    }

    #[test]
    fn register_list_order() {
        let list = RegisterList::from([LR, R4, R0, R4]);

        assert_eq!(list.len(), 3);
        assert!(list.contains(R14));
        assert!(!list.contains(R5));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![R0, R4, LR]);
        assert_eq!(list.iter().rev().next(), Some(LR));
        assert_eq!(list.bits(), 0b0100_0000_0001_0001);
    }

    #[test]
    fn display() {
        assert_eq!(R0.to_string(), "r0");
        assert_eq!(R13.to_string(), "sp");
        assert_eq!(PC.to_string(), "pc");
        assert_eq!(format!("{R7:>3}"), " r7");
    }
}
