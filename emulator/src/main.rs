use std::{fs, path::PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use loader::Image;
#[cfg(test)]
use loader::Segment;
use proteus::{
    memory::{Access, MemoryConfig, RegionConfig},
    ram::Endianness,
    registers::{Register, RegisterBank, LR, PC, REGISTER_COUNT, SP},
    GuestMemory, Processor, ProcessorState,
};

mod loader;
mod patches;

/// Registers the procedure call standard passes arguments in.
const ARGUMENT_REGISTERS: usize = 4;

fn parse_u32(value: &str) -> Result<u32, std::num::ParseIntError> {
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => value.replace('_', "").parse(),
    }
}

#[derive(Debug, Parser)]
struct App {
    /// Path to an ELF or raw ARM image.
    #[arg(required_unless_present = "list")]
    pub image: Option<PathBuf>,
    /// Start of guest RAM.
    #[arg(long, value_parser = parse_u32, default_value = "0x04000000")]
    pub ram_start: u32,
    /// Size of guest RAM in bytes.
    #[arg(long, value_parser = parse_u32, default_value = "0x00100000")]
    pub ram_size: u32,
    /// Load address of a raw image. ELF images carry their own addresses.
    #[arg(long, value_parser = parse_u32, default_value = "0x00000000")]
    pub rom_start: u32,
    /// Treat a raw image as little-endian.
    #[arg(long)]
    pub little_endian: bool,
    /// Initial stack pointer, the top of RAM by default.
    #[arg(long, value_parser = parse_u32)]
    pub sp: Option<u32>,
    /// Return address the patch exits to.
    #[arg(long, value_parser = parse_u32, default_value = "0")]
    pub lr: u32,
    /// Native patch to run.
    #[arg(long, required_unless_present = "list")]
    pub patch: Option<String>,
    /// Arguments passed in R0-R3, comma separated.
    #[arg(long, value_parser = parse_u32, value_delimiter = ',')]
    pub args: Vec<u32>,
    /// List the available native patches.
    #[arg(long)]
    pub list: bool,
}

fn memory_config(app: &App, image: &Image) -> anyhow::Result<MemoryConfig> {
    let mut regions = vec![RegionConfig {
        start_address: app.ram_start,
        size: app.ram_size,
        access: Access::ReadWrite,
    }];

    let ram_start = app.ram_start as u64;
    let ram_end = ram_start + app.ram_size as u64;
    let mut outside = Vec::new();

    // Whatever lies outside RAM is mapped read-only, like the ROM it came from
    for segment in &image.segments {
        let (start, end) = segment.span();

        for (start, end) in [(start, end.min(ram_start)), (start.max(ram_end), end)] {
            if start < end {
                outside.push((start, end));
            }
        }
    }

    outside.sort_unstable();

    let mut runs: Vec<(u64, u64)> = Vec::new();

    for (start, end) in outside {
        match runs.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => runs.push((start, end)),
        }
    }

    for (start, end) in runs {
        let start_address = u32::try_from(start)
            .context("The image does not fit in the guest address space")?;
        let size = u32::try_from(end - start)
            .context("The image does not fit in the guest address space")?;

        regions.push(RegionConfig {
            start_address,
            size,
            access: Access::ReadOnly,
        });
    }

    Ok(MemoryConfig {
        endianness: image.endianness,
        regions,
    })
}

fn print_registers(bank: &RegisterBank) {
    let cells: Vec<String> = (0..REGISTER_COUNT as u8)
        .filter_map(Register::new)
        .map(|register| format!("{register:>3} = 0x{:08X}", bank.get(register)))
        .collect();

    for row in cells.chunks(4) {
        println!("{}", row.join("  "));
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let app = App::parse();
    let table = patches::table()?;

    if app.list {
        for patch in table.iter() {
            println!("0x{:08X}  {}", patch.address, patch.name);
        }

        return Ok(());
    }

    let path = app.image.as_ref().ok_or_else(|| anyhow!("No image given"))?;
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;

    let raw_endianness = if app.little_endian {
        Endianness::Little
    } else {
        Endianness::Big
    };
    let image = Image::parse(&bytes, app.rom_start, raw_endianness)?;

    let mut memory = GuestMemory::new(memory_config(&app, &image)?)?;

    for segment in &image.segments {
        memory
            .load(segment.address, &segment.data)
            .with_context(|| format!("Failed to load segment at 0x{:08X}", segment.address))?;
    }

    let name = app.patch.as_deref().ok_or_else(|| anyhow!("No patch given"))?;
    let patch = table
        .find(name)
        .ok_or_else(|| anyhow!("Unknown patch '{name}', see --list"))?;

    if app.args.len() > ARGUMENT_REGISTERS {
        bail!("At most {ARGUMENT_REGISTERS} arguments fit in registers");
    }

    let mut cpu = ProcessorState::new();
    cpu.reset();

    let registers = cpu.current_registers_mut();

    registers.as_mut_slice()[..app.args.len()].copy_from_slice(&app.args);
    registers.set(SP, app.sp.unwrap_or(app.ram_start.wrapping_add(app.ram_size)));
    registers.set(LR, app.lr);
    registers.set(PC, patch.address);

    let resume_at = patch
        .invoke(&mut cpu, &mut memory)
        .with_context(|| format!("Native patch '{}' faulted", patch.name))?;

    println!("{} resumes at 0x{resume_at:08X}", patch.name);
    print_registers(cpu.current_registers());

    Ok(())
}
