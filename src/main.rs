use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Read;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::Term;
use tracing::{event, Level};

use crate::cartridge::{
    compute_global_checksum, compute_header_checksum, CartridgeHeader, HEADER_OFFSET,
};
use crate::opcodes::{OpcodeTable, Section};

mod cartridge;
mod opcodes;

#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log debug details.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode the cartridge header of a ROM image.
    Header {
        rom_file: OsString,
        /// Header offset in the image, hex (default 0x100).
        #[arg(long)]
        offset: Option<String>,
    },
    /// Look up an instruction in an opcode table document.
    Opcode {
        section: Option<String>,
        key: Option<String>,
        #[arg(long, default_value = "Opcodes.json")]
        table: OsString,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match args.command {
        Command::Header { rom_file, offset } => print_header(&rom_file, offset),
        Command::Opcode {
            section,
            key,
            table,
        } => print_opcode(&table, section, key),
    }
}

fn print_header(rom_file: &OsString, offset: Option<String>) -> anyhow::Result<()> {
    // read rom file
    let mut rom = File::open(rom_file).with_context(|| format!("cannot open {:?}", rom_file))?;
    let mut data = vec![];
    rom.read_to_end(&mut data)
        .with_context(|| format!("cannot read {:?}", rom_file))?;

    event!(Level::DEBUG, "read {} bytes", data.len());

    let offset = match offset {
        Some(offset) => usize::from_str_radix(offset.trim_start_matches("0x"), 16)
            .context("offset must be a hex number")?,
        None => HEADER_OFFSET,
    };

    let header = CartridgeHeader::decode_at(&data, offset)?;

    println!("Cartridge Metadata:");
    println!("{}", header);

    let computed = compute_header_checksum(&data, offset)?;
    if computed != header.header_checksum {
        event!(
            Level::WARN,
            "header checksum mismatch: computed {:#04X}, stored {:#04X}",
            computed,
            header.header_checksum
        );
    }

    let computed = compute_global_checksum(&data, offset)?;
    if computed != header.global_checksum {
        event!(
            Level::WARN,
            "global checksum mismatch: computed {:#06X}, stored {:#06X}",
            computed,
            header.global_checksum
        );
    }

    Ok(())
}

fn print_opcode(
    table_file: &OsString,
    section: Option<String>,
    key: Option<String>,
) -> anyhow::Result<()> {
    let text = fs::read_to_string(table_file)
        .with_context(|| format!("cannot read {:?}", table_file))?;
    let table = OpcodeTable::from_json(&text)?;

    event!(
        Level::DEBUG,
        "loaded {} unprefixed and {} cbprefixed opcodes",
        table.len(Section::Unprefixed),
        table.len(Section::CbPrefixed)
    );

    let term = Term::stdout();

    let section = match section {
        Some(section) => section,
        None => prompt(&term, "Enter 'unprefixed' or 'cbprefixed': ")?,
    };
    let section = section.parse::<Section>()?;

    let key = match key {
        Some(key) => key,
        None => prompt(&term, &format!("Enter the opcode within '{}': ", section))?,
    };

    let instruction = table.lookup(section, &key)?;

    println!("{}", instruction);

    Ok(())
}

fn prompt(term: &Term, text: &str) -> anyhow::Result<String> {
    term.write_str(text)?;

    Ok(term.read_line()?)
}
