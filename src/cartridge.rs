use std::fmt::{Display, Formatter};
use std::io::{Cursor, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

pub const HEADER_OFFSET: usize = 0x100;
pub const HEADER_SIZE: usize = 0x50;
pub const TITLE_SIZE: usize = 15;

// Offsets relative to the start of the header region. The title sits after
// the 4 entry point bytes and the 48 logo bytes.
const TITLE_START: usize = 0x34;
const CHECKSUM_END: usize = 0x4C;
const GLOBAL_CHECKSUM_START: usize = 0x4E;

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("ROM image too small (need at least {needed} bytes, got {got})")]
    Truncated { needed: usize, got: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: [u8; TITLE_SIZE],
    pub cgb_flag: u8,
    pub new_licensee_code: u16,
    pub sgb_flag: u8,
    pub cartridge_type: u8,
    pub rom_size: u8,
    pub ram_size: u8,
    pub destination_code: u8,
    pub old_licensee_code: u8,
    pub mask_rom_version: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl CartridgeHeader {
    pub fn decode(data: &[u8]) -> Result<Self, HeaderError> {
        Self::decode_at(data, HEADER_OFFSET)
    }

    pub fn decode_at(data: &[u8], offset: usize) -> Result<Self, HeaderError> {
        let region = header_region(data, offset)?;

        let mut reader = Cursor::new(region);
        reader.set_position(TITLE_START as u64);

        // the length check above covers the whole region, none of these
        // reads can come up short
        let mut title = [0; TITLE_SIZE];
        reader.read_exact(&mut title).unwrap();
        let cgb_flag = reader.read_u8().unwrap();
        let new_licensee_code = reader.read_u16::<LittleEndian>().unwrap();
        let sgb_flag = reader.read_u8().unwrap();
        let cartridge_type = reader.read_u8().unwrap();
        let rom_size = reader.read_u8().unwrap();
        let ram_size = reader.read_u8().unwrap();
        let destination_code = reader.read_u8().unwrap();
        let old_licensee_code = reader.read_u8().unwrap();
        let mask_rom_version = reader.read_u8().unwrap();
        let header_checksum = reader.read_u8().unwrap();
        let global_checksum = reader.read_u16::<BigEndian>().unwrap();

        Ok(CartridgeHeader {
            title,
            cgb_flag,
            new_licensee_code,
            sgb_flag,
            cartridge_type,
            rom_size,
            ram_size,
            destination_code,
            old_licensee_code,
            mask_rom_version,
            header_checksum,
            global_checksum,
        })
    }

    /// Title bytes as text, with the trailing NUL padding stripped.
    pub fn title(&self) -> String {
        let end = self
            .title
            .iter()
            .rposition(|&byte| byte != 0)
            .map_or(0, |last| last + 1);
        String::from_utf8_lossy(&self.title[..end]).into_owned()
    }
}

impl Display for CartridgeHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "title={}", self.title())?;
        writeln!(f, "cgb_flag={}", self.cgb_flag)?;
        writeln!(f, "new_licensee_code={}", self.new_licensee_code)?;
        writeln!(f, "sgb_flag={}", self.sgb_flag)?;
        writeln!(f, "cartridge_type={}", self.cartridge_type)?;
        writeln!(f, "rom_size={}", self.rom_size)?;
        writeln!(f, "ram_size={}", self.ram_size)?;
        writeln!(f, "destination_code={}", self.destination_code)?;
        writeln!(f, "old_licensee_code={}", self.old_licensee_code)?;
        writeln!(f, "mask_rom_version={}", self.mask_rom_version)?;
        writeln!(f, "header_checksum={}", self.header_checksum)?;
        write!(f, "global_checksum={}", self.global_checksum)
    }
}

/// Checksum the boot rom runs over the title..version bytes (0x134..=0x14C
/// in a normally placed header).
pub fn compute_header_checksum(data: &[u8], offset: usize) -> Result<u8, HeaderError> {
    let region = header_region(data, offset)?;

    let mut x: u8 = 0;
    for byte in &region[TITLE_START..=CHECKSUM_END] {
        x = x.overflowing_sub(*byte).0.overflowing_sub(1).0;
    }

    Ok(x)
}

/// Sum of every byte in the image except the two global checksum bytes.
pub fn compute_global_checksum(data: &[u8], offset: usize) -> Result<u16, HeaderError> {
    header_region(data, offset)?;

    let skip = offset + GLOBAL_CHECKSUM_START;
    let mut sum: u16 = 0;
    for (pos, byte) in data.iter().enumerate() {
        if pos == skip || pos == skip + 1 {
            continue;
        }
        sum = sum.wrapping_add(*byte as u16);
    }

    Ok(sum)
}

fn header_region(data: &[u8], offset: usize) -> Result<&[u8], HeaderError> {
    let needed = offset.saturating_add(HEADER_SIZE);
    if data.len() < needed {
        return Err(HeaderError::Truncated {
            needed,
            got: data.len(),
        });
    }

    Ok(&data[offset..needed])
}
