use crate::{
    memory::{Memory, MemoryFault},
    processor::Processor,
    registers::{Register, RegisterBank, LR, PC, SP},
};

/// Everything a native patch may touch: the processor it runs on and the guest
/// address space behind it.
///
/// Registers are looked up in the processor's current bank on every call, so a
/// mode switch between two accesses is always observed.
pub struct EmulationContext<'a, P: Processor, M: Memory> {
    processor: &'a mut P,
    memory: &'a mut M,
}

impl<'a, P: Processor, M: Memory> EmulationContext<'a, P, M> {
    pub fn new(processor: &'a mut P, memory: &'a mut M) -> Self {
        Self { processor, memory }
    }

    pub fn processor(&self) -> &P {
        &*self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut *self.processor
    }

    pub fn memory(&self) -> &M {
        &*self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut *self.memory
    }

    pub fn registers(&self) -> &RegisterBank {
        self.processor.current_registers()
    }

    pub fn registers_mut(&mut self) -> &mut RegisterBank {
        self.processor.current_registers_mut()
    }

    pub fn reg(&self, register: Register) -> u32 {
        self.registers().get(register)
    }

    pub fn set_reg(&mut self, register: Register, value: u32) {
        self.registers_mut().set(register, value);
    }

    pub fn reg_mut(&mut self, register: Register) -> &mut u32 {
        self.registers_mut().get_mut(register)
    }

    pub fn sp(&self) -> u32 {
        self.reg(SP)
    }

    pub fn set_sp(&mut self, value: u32) {
        self.set_reg(SP, value);
    }

    pub fn lr(&self) -> u32 {
        self.reg(LR)
    }

    pub fn set_lr(&mut self, value: u32) {
        self.set_reg(LR, value);
    }

    pub fn pc(&self) -> u32 {
        self.reg(PC)
    }

    pub fn set_pc(&mut self, value: u32) {
        self.set_reg(PC, value);
    }
}

impl<P: Processor, M: Memory> Memory for EmulationContext<'_, P, M> {
    fn read_word(&self, address: u32) -> Result<u32, MemoryFault> {
        self.memory.read_word(address)
    }

    fn write_word(&mut self, address: u32, word: u32) -> Result<(), MemoryFault> {
        self.memory.write_word(address, word)
    }
}
