//! Raw word and stack transfers.
//!
//! The three single-word disciplines follow the ARM load/store multiple
//! addressing modes:
//!
//! | Operation | Mode    | Address | Base update   |
//! |-----------|---------|---------|---------------|
//! | push      | `STMDB` | `base-4`| `base -= 4`   |
//! | pop       | `LDMIA` | `base`  | `base += 4`   |
//! | rpop      | `LDMDB` | `base-4`| `base -= 4`   |
//!
//! The base register is read fresh for every transfer and written back only
//! once the transfer succeeded, so a fault leaves every register untouched.

use crate::{
    context::EmulationContext,
    memory::{Memory, MemoryFault, WORD_SIZE},
    processor::Processor,
    registers::{Register, RegisterList, REGISTER_COUNT, SP},
};

impl<P: Processor, M: Memory> EmulationContext<'_, P, M> {
    /// Reads one word from guest memory.
    pub fn peek(&self, address: u32) -> Result<u32, MemoryFault> {
        self.read_word(address)
    }

    /// Writes one word to guest memory.
    pub fn poke(&mut self, address: u32, word: u32) -> Result<(), MemoryFault> {
        self.write_word(address, word)
    }

    pub fn push(&mut self, word: u32) -> Result<(), MemoryFault> {
        self.push_on(SP, word)
    }

    pub fn pop(&mut self) -> Result<u32, MemoryFault> {
        self.pop_from(SP)
    }

    pub fn rpop(&mut self) -> Result<u32, MemoryFault> {
        self.rpop_from(SP)
    }

    pub fn push_on(&mut self, base: Register, word: u32) -> Result<(), MemoryFault> {
        let address = self.reg(base).wrapping_sub(WORD_SIZE);

        self.poke(address, word)?;
        self.set_reg(base, address);

        Ok(())
    }

    pub fn pop_from(&mut self, base: Register) -> Result<u32, MemoryFault> {
        let address = self.reg(base);
        let word = self.peek(address)?;

        self.set_reg(base, address.wrapping_add(WORD_SIZE));

        Ok(word)
    }

    pub fn rpop_from(&mut self, base: Register) -> Result<u32, MemoryFault> {
        let address = self.reg(base).wrapping_sub(WORD_SIZE);
        let word = self.peek(address)?;

        self.set_reg(base, address);

        Ok(word)
    }

    /// Store multiple, decrement before, with write-back.
    ///
    /// The lowest register ends up at the lowest address. A fault part-way may
    /// leave the words already stored in memory, but registers are untouched.
    pub fn stmdb(&mut self, base: Register, registers: RegisterList) -> Result<(), MemoryFault> {
        let mut address = self.reg(base);

        for register in registers.iter().rev() {
            address = address.wrapping_sub(WORD_SIZE);

            let word = self.reg(register);

            self.poke(address, word)?;
        }

        self.set_reg(base, address);

        Ok(())
    }

    /// Load multiple, increment after, with write-back.
    ///
    /// When `base` is part of the list the loaded value wins over write-back.
    pub fn ldmia(&mut self, base: Register, registers: RegisterList) -> Result<(), MemoryFault> {
        let mut address = self.reg(base);
        let mut loaded = [0; REGISTER_COUNT];

        for register in registers.iter() {
            loaded[register.index()] = self.peek(address)?;
            address = address.wrapping_add(WORD_SIZE);
        }

        self.set_reg(base, address);
        self.commit(registers, &loaded);

        Ok(())
    }

    /// Load multiple, decrement before, with write-back.
    pub fn ldmdb(&mut self, base: Register, registers: RegisterList) -> Result<(), MemoryFault> {
        let mut address = self.reg(base);
        let mut loaded = [0; REGISTER_COUNT];

        for register in registers.iter().rev() {
            address = address.wrapping_sub(WORD_SIZE);
            loaded[register.index()] = self.peek(address)?;
        }

        self.set_reg(base, address);
        self.commit(registers, &loaded);

        Ok(())
    }

    fn commit(&mut self, registers: RegisterList, loaded: &[u32; REGISTER_COUNT]) {
        let bank = self.registers_mut();

        for register in registers.iter() {
            bank.set(register, loaded[register.index()]);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        context::EmulationContext,
        memory::{Access, GuestMemory, Memory, MemoryConfig, MemoryFault, RegionConfig},
        processor::ProcessorState,
        ram::Endianness,
        registers::{RegisterList, LR, R0, R1, R2, R4, R5, SP},
        test_support::{make_machine, RAM_START},
    };

    const STACK_TOP: u32 = RAM_START + 0x800;

    #[test]
    fn push_pop_round_trip() {
        let (mut cpu, mut memory) = make_machine();
        let mut ctx = EmulationContext::new(&mut cpu, &mut memory);

        for word in [0, 1, 0xDEAD_BEEF, u32::MAX] {
            ctx.set_sp(STACK_TOP);

            ctx.push(word).unwrap();
            assert_eq!(ctx.sp(), STACK_TOP - 4);
            assert_eq!(ctx.peek(STACK_TOP - 4), Ok(word));

            assert_eq!(ctx.pop(), Ok(word));
            assert_eq!(ctx.sp(), STACK_TOP);
        }
    }

    #[test]
    fn push_rpop() {
        let (mut cpu, mut memory) = make_machine();
        let mut ctx = EmulationContext::new(&mut cpu, &mut memory);

        ctx.set_sp(STACK_TOP);
        ctx.push(0xCAFE).unwrap();
        // rpop reads below the current pointer, not the word just pushed
        ctx.set_sp(STACK_TOP);

        assert_eq!(ctx.rpop(), Ok(0xCAFE));
        assert_eq!(ctx.sp(), STACK_TOP - 4);
    }

    #[test]
    fn stack_on_other_base() {
        let (mut cpu, mut memory) = make_machine();
        let mut ctx = EmulationContext::new(&mut cpu, &mut memory);

        ctx.set_sp(STACK_TOP);
        ctx.set_reg(R4, STACK_TOP - 0x100);

        ctx.push_on(R4, 7).unwrap();
        ctx.push_on(R4, 8).unwrap();

        assert_eq!(ctx.reg(R4), STACK_TOP - 0x108);
        assert_eq!(ctx.pop_from(R4), Ok(8));
        assert_eq!(ctx.pop_from(R4), Ok(7));
        assert_eq!(ctx.sp(), STACK_TOP);
    }

    #[test]
    fn store_load_multiple() {
        let (mut cpu, mut memory) = make_machine();
        let mut ctx = EmulationContext::new(&mut cpu, &mut memory);
        let list = RegisterList::from([R0, R1, R4, LR]);

        ctx.set_sp(STACK_TOP);
        ctx.set_reg(R0, 10);
        ctx.set_reg(R1, 11);
        ctx.set_reg(R4, 14);
        ctx.set_lr(0x1000);

        ctx.stmdb(SP, list).unwrap();

        assert_eq!(ctx.sp(), STACK_TOP - 16);
        assert_eq!(ctx.peek(STACK_TOP - 16), Ok(10));
        assert_eq!(ctx.peek(STACK_TOP - 12), Ok(11));
        assert_eq!(ctx.peek(STACK_TOP - 8), Ok(14));
        assert_eq!(ctx.peek(STACK_TOP - 4), Ok(0x1000));

        for register in list.iter() {
            ctx.set_reg(register, 0);
        }

        ctx.ldmia(SP, list).unwrap();

        assert_eq!(ctx.sp(), STACK_TOP);
        assert_eq!(ctx.reg(R0), 10);
        assert_eq!(ctx.reg(R1), 11);
        assert_eq!(ctx.reg(R4), 14);
        assert_eq!(ctx.lr(), 0x1000);

        ctx.ldmdb(SP, RegisterList::from([R2, R5])).unwrap();

        assert_eq!(ctx.sp(), STACK_TOP - 8);
        assert_eq!(ctx.reg(R2), 14);
        assert_eq!(ctx.reg(R5), 0x1000);
    }

    #[test]
    fn loaded_base_wins_over_write_back() {
        let (mut cpu, mut memory) = make_machine();
        let mut ctx = EmulationContext::new(&mut cpu, &mut memory);

        ctx.poke(STACK_TOP, 5).unwrap();
        ctx.poke(STACK_TOP + 4, 0x1234).unwrap();
        ctx.set_reg(R1, STACK_TOP);

        ctx.ldmia(R1, RegisterList::from([R0, R1])).unwrap();

        assert_eq!(ctx.reg(R0), 5);
        assert_eq!(ctx.reg(R1), 0x1234);
    }

    #[test]
    fn faults_leave_registers_untouched() {
        let (mut cpu, mut memory) = make_machine();
        let mut ctx = EmulationContext::new(&mut cpu, &mut memory);

        // Bottom of RAM, the next push lands below the mapping
        ctx.set_sp(RAM_START);
        ctx.set_reg(R0, 0x77);

        assert_eq!(
            ctx.push(1),
            Err(MemoryFault::Unmapped {
                address: RAM_START - 4
            })
        );
        assert_eq!(ctx.sp(), RAM_START);

        assert_eq!(
            ctx.rpop(),
            Err(MemoryFault::Unmapped {
                address: RAM_START - 4
            })
        );
        assert_eq!(ctx.sp(), RAM_START);

        ctx.set_sp(RAM_START + 4);
        assert!(ctx.ldmdb(SP, RegisterList::from([R0, R1])).is_err());
        assert_eq!(ctx.sp(), RAM_START + 4);
        assert_eq!(ctx.reg(R0), 0x77);

        ctx.set_sp(0x0300_0000);
        assert!(ctx.pop().is_err());
        assert_eq!(ctx.sp(), 0x0300_0000);
        assert_eq!(ctx.read_word(RAM_START), Ok(0));
    }

    #[test]
    fn stack_pointer_wraps() {
        let mut cpu = ProcessorState::new();
        cpu.reset();

        let mut memory = GuestMemory::new(MemoryConfig {
            endianness: Endianness::Big,
            regions: vec![
                RegionConfig {
                    start_address: 0x0,
                    size: 0x100,
                    access: Access::ReadWrite,
                },
                RegionConfig {
                    start_address: 0xFFFF_FF00,
                    size: 0x100,
                    access: Access::ReadWrite,
                },
            ],
        })
        .unwrap();
        let mut ctx = EmulationContext::new(&mut cpu, &mut memory);

        ctx.set_sp(0);
        ctx.push(0xAA).unwrap();

        assert_eq!(ctx.sp(), 0xFFFF_FFFC);
        assert_eq!(ctx.peek(0xFFFF_FFFC), Ok(0xAA));

        assert_eq!(ctx.pop(), Ok(0xAA));
        assert_eq!(ctx.sp(), 0);

        // Two words straddle the top of the address space
        ctx.set_sp(4);
        ctx.set_reg(R0, 1);
        ctx.set_reg(R1, 2);
        ctx.stmdb(SP, RegisterList::from([R0, R1])).unwrap();

        assert_eq!(ctx.sp(), 0xFFFF_FFFC);
        assert_eq!(ctx.peek(0xFFFF_FFFC), Ok(1));
        assert_eq!(ctx.peek(0), Ok(2));

        ctx.ldmia(SP, RegisterList::from([R4, R5])).unwrap();

        assert_eq!(ctx.sp(), 4);
        assert_eq!(ctx.reg(R4), 1);
        assert_eq!(ctx.reg(R5), 2);
    }

    #[test]
    fn faulting_store_multiple_keeps_stored_words() {
        let (mut cpu, mut memory) = make_machine();
        let mut ctx = EmulationContext::new(&mut cpu, &mut memory);

        ctx.set_sp(RAM_START + 4);
        ctx.set_reg(R0, 0x10);
        ctx.set_reg(R1, 0x11);

        // R1 goes first, to RAM_START, then R0 falls below the mapping
        assert_eq!(
            ctx.stmdb(SP, RegisterList::from([R0, R1])),
            Err(MemoryFault::Unmapped {
                address: RAM_START - 4
            })
        );
        assert_eq!(ctx.sp(), RAM_START + 4);
        assert_eq!(ctx.peek(RAM_START), Ok(0x11));
        assert_eq!(ctx.reg(R0), 0x10);
        assert_eq!(ctx.reg(R1), 0x11);
    }
}
