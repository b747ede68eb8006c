use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RAMError {
    #[error("Memory size should be a multiple of four, but it is {size}")]
    InvalidSize { size: u32 },
    #[error("Out of bounds")]
    OutOfBounds,
}

/// Byte order of words stored in guest memory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Newton-class ARM guests run big-endian.
    #[default]
    Big,
    Little,
}

const fn check_bounds(offset: u32, len: usize, slice: &[u8]) -> Result<(), RAMError> {
    match (offset as usize).checked_add(len) {
        Some(end) if end <= slice.len() => Ok(()),
        _ => Err(RAMError::OutOfBounds),
    }
}

#[derive(Debug, Clone)]
pub struct RAM {
    memory: Vec<u8>,
    endianness: Endianness,
}

impl RAM {
    pub fn new(size: u32, endianness: Endianness) -> Result<Self, RAMError> {
        if size % 4 != 0 {
            return Err(RAMError::InvalidSize { size });
        }

        let memory = vec![0; size as usize];

        Ok(Self { memory, endianness })
    }

    pub fn size(&self) -> u32 {
        self.memory.len() as u32
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn as_slice(&self) -> &[u8] {
        self.memory.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.memory.as_mut_slice()
    }

    /// Copies `bytes` verbatim starting at `offset`.
    pub fn load(&mut self, offset: u32, bytes: &[u8]) -> Result<(), RAMError> {
        check_bounds(offset, bytes.len(), self.memory.as_slice())?;

        let offset = offset as usize;

        self.memory[offset..offset + bytes.len()].copy_from_slice(bytes);

        Ok(())
    }

    pub fn write_u8(&mut self, value: u8, offset: u32) -> Result<(), RAMError> {
        check_bounds(offset, 1, self.memory.as_slice())?;

        self.memory[offset as usize] = value;

        Ok(())
    }

    pub fn write_u32(&mut self, value: u32, offset: u32) -> Result<(), RAMError> {
        check_bounds(offset, 4, self.memory.as_slice())?;

        let offset = offset as usize;
        let bytes = match self.endianness {
            Endianness::Big => value.to_be_bytes(),
            Endianness::Little => value.to_le_bytes(),
        };

        self.memory[offset..offset + bytes.len()].copy_from_slice(&bytes);

        Ok(())
    }

    pub fn read_u8(&self, offset: u32) -> Result<u8, RAMError> {
        check_bounds(offset, 1, self.memory.as_slice())?;

        Ok(self.memory[offset as usize])
    }

    pub fn read_u32(&self, offset: u32) -> Result<u32, RAMError> {
        check_bounds(offset, 4, self.memory.as_slice())?;

        let offset = offset as usize;
        let mem = self.memory.as_slice();
        let bytes = [
            mem[offset],
            mem[offset + 1],
            mem[offset + 2],
            mem[offset + 3],
        ];

        let value = match self.endianness {
            Endianness::Big => u32::from_be_bytes(bytes),
            Endianness::Little => u32::from_le_bytes(bytes),
        };

        Ok(value)
    }
}
