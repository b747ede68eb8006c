use anyhow::{bail, Context};
use object::{
    read::elf::{ElfFile32, ProgramHeader},
    FileKind, Object, ObjectSegment,
};
use proteus::ram::Endianness;

const ELF_MAGIC: [u8; 4] = *b"\x7fELF";

#[derive(Debug, Clone)]
pub struct Segment {
    pub address: u32,
    pub data: Vec<u8>,
}

impl Segment {
    /// Word aligned `[start, end)` covering the segment.
    pub fn span(&self) -> (u64, u64) {
        let start = self.address as u64;
        let end = start + self.data.len() as u64;

        (start & !3, (end + 3) & !3)
    }
}

/// A guest image ready to be copied into guest memory.
#[derive(Debug, Clone)]
pub struct Image {
    pub endianness: Endianness,
    pub segments: Vec<Segment>,
}

impl Image {
    pub fn parse(bytes: &[u8], raw_address: u32, raw_endianness: Endianness) -> anyhow::Result<Self> {
        if bytes.starts_with(&ELF_MAGIC) {
            Self::parse_elf(bytes)
        } else {
            Ok(Self {
                endianness: raw_endianness,
                segments: vec![Segment {
                    address: raw_address,
                    data: bytes.to_vec(),
                }],
            })
        }
    }

    fn parse_elf(bytes: &[u8]) -> anyhow::Result<Self> {
        match FileKind::parse(bytes).context("Failed to parse the ELF image")? {
            FileKind::Elf32 => {}
            FileKind::Elf64 => bail!("Only 32-bit guest images are supported"),
            kind => bail!("Unsupported image format {kind:?}"),
        }

        let file = ElfFile32::<object::Endianness>::parse(bytes)
            .context("Failed to parse the ELF image")?;
        let endian = file.endian();

        let endianness = if file.is_little_endian() {
            Endianness::Little
        } else {
            Endianness::Big
        };

        let mut segments = Vec::new();

        for segment in file.segments() {
            let data = segment.data().context("Failed to read a segment")?;

            if data.is_empty() {
                continue;
            }

            // Load address, not the link address
            let address = segment.elf_program_header().p_paddr(endian);

            log::debug!(
                "segment 0x{address:08X} ({} bytes, linked at 0x{:08X})",
                data.len(),
                segment.address()
            );

            segments.push(Segment {
                address,
                data: data.to_vec(),
            });
        }

        Ok(Self {
            endianness,
            segments,
        })
    }
}
