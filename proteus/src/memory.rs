use crate::ram::{Endianness, RAMError, RAM};
use thiserror::Error;

pub const WORD_SIZE: u32 = std::mem::size_of::<u32>() as u32;

/// A failed guest memory transfer. The bridge never retries or translates these.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum MemoryFault {
    #[error("The address '0x{address:08X}' is not mapped")]
    Unmapped { address: u32 },
    #[error("The address '0x{address:08X}' is misaligned")]
    NotAligned { address: u32 },
    #[error("The address '0x{address:08X}' is read-only")]
    ReadOnly { address: u32 },
}

impl MemoryFault {
    pub fn address(&self) -> u32 {
        match *self {
            MemoryFault::Unmapped { address }
            | MemoryFault::NotAligned { address }
            | MemoryFault::ReadOnly { address } => address,
        }
    }
}

/// Word-granular access to the guest address space.
///
/// Words arrive already converted to host order; byte order is the
/// implementor's business.
pub trait Memory {
    fn read_word(&self, address: u32) -> Result<u32, MemoryFault>;

    fn write_word(&mut self, address: u32, word: u32) -> Result<(), MemoryFault>;
}

impl<M: Memory + ?Sized> Memory for &mut M {
    fn read_word(&self, address: u32) -> Result<u32, MemoryFault> {
        (**self).read_word(address)
    }

    fn write_word(&mut self, address: u32, word: u32) -> Result<(), MemoryFault> {
        (**self).write_word(address, word)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MemoryConfigError {
    #[error(transparent)]
    RAMError(#[from] RAMError),
    #[error("The region start '0x{address:08X}' is misaligned")]
    NotAligned { address: u32 },
    #[error("The region at '0x{address:08X}' does not fit in the address space")]
    OutOfRange { address: u32 },
    #[error("The regions at '0x{first:08X}' and '0x{second:08X}' overlap")]
    Overlap { first: u32, second: u32 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    #[default]
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone)]
pub struct RegionConfig {
    pub start_address: u32,
    pub size: u32,
    pub access: Access,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    pub endianness: Endianness,
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Clone)]
pub struct Region {
    start: u32,
    access: Access,
    ram: RAM,
}

impl Region {
    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn size(&self) -> u32 {
        self.ram.size()
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn ram(&self) -> &RAM {
        &self.ram
    }

    fn translate(&self, address: u32) -> Option<u32> {
        let offset = address.checked_sub(self.start)?;

        (offset < self.ram.size()).then_some(offset)
    }
}

const fn check_align(address: u32) -> Result<(), MemoryFault> {
    if address % WORD_SIZE == 0 {
        Ok(())
    } else {
        Err(MemoryFault::NotAligned { address })
    }
}

fn report(fault: MemoryFault) -> MemoryFault {
    log::debug!("memory fault: {fault}");
    fault
}

/// Flat guest address space made of RAM and ROM regions.
#[derive(Debug, Clone)]
pub struct GuestMemory {
    endianness: Endianness,
    regions: Vec<Region>,
}

impl GuestMemory {
    pub fn new(config: MemoryConfig) -> Result<Self, MemoryConfigError> {
        let mut regions = Vec::with_capacity(config.regions.len());

        for region in config.regions {
            if region.start_address % WORD_SIZE != 0 {
                return Err(MemoryConfigError::NotAligned {
                    address: region.start_address,
                });
            }

            if region.start_address as u64 + region.size as u64 > 1 << 32 {
                return Err(MemoryConfigError::OutOfRange {
                    address: region.start_address,
                });
            }

            regions.push(Region {
                start: region.start_address,
                access: region.access,
                ram: RAM::new(region.size, config.endianness)?,
            });
        }

        regions.sort_by_key(|region| region.start);

        for pair in regions.windows(2) {
            let (first, second) = (&pair[0], &pair[1]);

            if first.start as u64 + first.size() as u64 > second.start as u64 {
                return Err(MemoryConfigError::Overlap {
                    first: first.start,
                    second: second.start,
                });
            }
        }

        Ok(Self {
            endianness: config.endianness,
            regions,
        })
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn region_index(&self, address: u32) -> Option<usize> {
        let index = self
            .regions
            .partition_point(|region| region.start <= address)
            .checked_sub(1)?;

        self.regions[index].translate(address).map(|_| index)
    }

    /// Copies an image into guest memory, ignoring write protection.
    ///
    /// The image may run on into an adjacent region. A gap faults with the
    /// first unmapped address, after the bytes before it were copied.
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryFault> {
        let mut cursor = address;
        let mut rest = bytes;

        while !rest.is_empty() {
            let index = self
                .region_index(cursor)
                .ok_or(MemoryFault::Unmapped { address: cursor })
                .map_err(report)?;
            let region = &mut self.regions[index];
            let offset = cursor - region.start;
            let len = rest.len().min((region.size() - offset) as usize);
            let (chunk, tail) = rest.split_at(len);

            region
                .ram
                .load(offset, chunk)
                .map_err(|_| report(MemoryFault::Unmapped { address: cursor }))?;

            rest = tail;
            cursor = match cursor.checked_add(len as u32) {
                Some(next) => next,
                None if rest.is_empty() => break,
                None => return Err(report(MemoryFault::Unmapped { address: 0 })),
            };
        }

        log::debug!("loaded {} bytes at 0x{address:08X}", bytes.len());

        Ok(())
    }
}

impl Memory for GuestMemory {
    fn read_word(&self, address: u32) -> Result<u32, MemoryFault> {
        check_align(address).map_err(report)?;

        let index = self
            .region_index(address)
            .ok_or(MemoryFault::Unmapped { address })
            .map_err(report)?;
        let region = &self.regions[index];
        let word = region
            .ram
            .read_u32(address - region.start)
            .map_err(|_| report(MemoryFault::Unmapped { address }))?;

        log::trace!("read  [0x{address:08X}] -> 0x{word:08X}");

        Ok(word)
    }

    fn write_word(&mut self, address: u32, word: u32) -> Result<(), MemoryFault> {
        check_align(address).map_err(report)?;

        let index = self
            .region_index(address)
            .ok_or(MemoryFault::Unmapped { address })
            .map_err(report)?;
        let region = &mut self.regions[index];

        if region.access == Access::ReadOnly {
            return Err(report(MemoryFault::ReadOnly { address }));
        }

        region
            .ram
            .write_u32(word, address - region.start)
            .map_err(|_| report(MemoryFault::Unmapped { address }))?;

        log::trace!("write [0x{address:08X}] <- 0x{word:08X}");

        Ok(())
    }
}
