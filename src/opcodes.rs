use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum OpcodeError {
    #[error("malformed opcode table: {0}")]
    Malformed(String),
    #[error("unknown section {0:?}, expected 'unprefixed' or 'cbprefixed'")]
    UnknownSection(String),
    #[error("no opcode {key:?} in section '{section}'")]
    UnknownOpcode { section: Section, key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Unprefixed,
    CbPrefixed,
}

impl FromStr for Section {
    type Err = OpcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unprefixed" => Ok(Section::Unprefixed),
            "cbprefixed" => Ok(Section::CbPrefixed),
            _ => Err(OpcodeError::UnknownSection(s.to_string())),
        }
    }
}

impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Unprefixed => write!(f, "unprefixed"),
            Section::CbPrefixed => write!(f, "cbprefixed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Adjust {
    #[serde(rename = "+")]
    Increment,
    #[serde(rename = "-")]
    Decrement,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Operand {
    pub immediate: bool,
    pub name: String,
    #[serde(default)]
    pub bytes: u8,
    pub value: Option<u8>,
    pub adjust: Option<Adjust>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub immediate: bool,
    pub operands: Vec<Operand>,
    pub cycles: Vec<u8>,
    pub bytes: u8,
    pub mnemonic: String,
    pub comment: String,
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Opcode: {}", self.opcode)?;
        write!(f, "Mnemonic: {}", self.mnemonic)?;

        if !self.operands.is_empty() {
            let names: Vec<&str> = self
                .operands
                .iter()
                .map(|operand| operand.name.as_str())
                .collect();
            write!(f, "\nOperands: {}", names.join(", "))?;
        }

        Ok(())
    }
}

// Entry fields checked when the entry is looked up, not at load.
#[derive(Debug, Deserialize)]
struct RawInstruction {
    immediate: bool,
    operands: Vec<Operand>,
    cycles: Vec<u8>,
    bytes: u8,
    mnemonic: String,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    unprefixed: HashMap<String, Value>,
    cbprefixed: HashMap<String, Value>,
}

#[derive(Debug)]
pub struct OpcodeTable {
    unprefixed: HashMap<u8, Value>,
    cbprefixed: HashMap<u8, Value>,
}

impl OpcodeTable {
    pub fn from_json(text: &str) -> Result<Self, OpcodeError> {
        let doc = serde_json::from_str(text)
            .map_err(|err| OpcodeError::Malformed(err.to_string()))?;

        Self::from_value(doc)
    }

    pub fn from_value(doc: Value) -> Result<Self, OpcodeError> {
        let raw: RawTable =
            serde_json::from_value(doc).map_err(|err| OpcodeError::Malformed(err.to_string()))?;

        Ok(OpcodeTable {
            unprefixed: index_section(raw.unprefixed, Section::Unprefixed)?,
            cbprefixed: index_section(raw.cbprefixed, Section::CbPrefixed)?,
        })
    }

    /// Builds the instruction for `key` out of the stored entry. The key is
    /// hex, case-insensitive, with an optional 0x prefix.
    pub fn lookup(&self, section: Section, key: &str) -> Result<Instruction, OpcodeError> {
        let opcode = parse_opcode_key(key).ok_or_else(|| OpcodeError::UnknownOpcode {
            section,
            key: key.to_string(),
        })?;

        let entry = self
            .entries(section)
            .get(&opcode)
            .ok_or_else(|| OpcodeError::UnknownOpcode {
                section,
                key: key.to_string(),
            })?;

        let raw = RawInstruction::deserialize(entry).map_err(|err| {
            OpcodeError::Malformed(format!(
                "opcode {:#04X} in section '{}': {}",
                opcode, section, err
            ))
        })?;

        Ok(Instruction {
            opcode,
            immediate: raw.immediate,
            operands: raw.operands,
            cycles: raw.cycles,
            bytes: raw.bytes,
            mnemonic: raw.mnemonic,
            comment: raw.comment,
        })
    }

    pub fn len(&self, section: Section) -> usize {
        self.entries(section).len()
    }

    fn entries(&self, section: Section) -> &HashMap<u8, Value> {
        match section {
            Section::Unprefixed => &self.unprefixed,
            Section::CbPrefixed => &self.cbprefixed,
        }
    }
}

fn index_section(
    entries: HashMap<String, Value>,
    section: Section,
) -> Result<HashMap<u8, Value>, OpcodeError> {
    let mut indexed = HashMap::with_capacity(entries.len());

    for (key, entry) in entries {
        let opcode = parse_opcode_key(&key).ok_or_else(|| {
            OpcodeError::Malformed(format!(
                "non-hex opcode key {:?} in section '{}'",
                key, section
            ))
        })?;
        indexed.insert(opcode, entry);
    }

    Ok(indexed)
}

fn parse_opcode_key(key: &str) -> Option<u8> {
    let hex = key.trim().to_ascii_lowercase();

    u8::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "unprefixed": {
            "0x00": {
                "mnemonic": "NOP",
                "bytes": 1,
                "cycles": [4],
                "operands": [],
                "immediate": true
            },
            "0x3A": {
                "mnemonic": "LD",
                "bytes": 1,
                "cycles": [8],
                "operands": [
                    {"name": "A", "immediate": true},
                    {"name": "HL", "bytes": 0, "immediate": false, "adjust": "-"}
                ],
                "immediate": false
            },
            "0xC7": {
                "mnemonic": "RST",
                "bytes": 1,
                "cycles": [16],
                "operands": [{"name": "00H", "immediate": true, "value": 0}],
                "immediate": true
            },
            "0xC2": {
                "mnemonic": "JP",
                "bytes": 3,
                "cycles": [16, 12],
                "operands": [
                    {"name": "NZ", "immediate": true},
                    {"name": "a16", "bytes": 2, "immediate": true}
                ],
                "immediate": true
            }
        },
        "cbprefixed": {
            "0x37": {
                "mnemonic": "SWAP",
                "bytes": 2,
                "cycles": [8],
                "operands": [{"name": "A", "immediate": true}],
                "immediate": true
            }
        }
    }"#;

    fn table() -> OpcodeTable {
        OpcodeTable::from_json(TABLE).unwrap()
    }

    #[test]
    fn nop_has_no_operands() {
        let nop = table().lookup(Section::Unprefixed, "0x00").unwrap();

        assert_eq!(nop.opcode, 0);
        assert_eq!(nop.mnemonic, "NOP");
        assert_eq!(nop.bytes, 1);
        assert_eq!(nop.cycles, vec![4]);
        assert!(nop.immediate);
        assert!(nop.operands.is_empty());
        assert_eq!(nop.comment, "");
    }

    #[test]
    fn render_omits_the_operand_line_when_empty() {
        let nop = table().lookup(Section::Unprefixed, "0x00").unwrap();

        assert_eq!(nop.to_string(), "Opcode: 0\nMnemonic: NOP");
    }

    #[test]
    fn render_joins_operand_names_in_order() {
        let ld = table().lookup(Section::Unprefixed, "0x3A").unwrap();

        assert_eq!(ld.to_string(), "Opcode: 58\nMnemonic: LD\nOperands: A, HL");
    }

    #[test]
    fn opcode_matches_the_key_it_was_looked_up_under() {
        let swap = table().lookup(Section::CbPrefixed, "0x37").unwrap();

        assert_eq!(swap.opcode, 0x37);
        assert_eq!(swap.mnemonic, "SWAP");
    }

    #[test]
    fn keys_normalize_case_prefix_and_whitespace() {
        for key in ["0x3a", "0X3A", "3A", "3a", " 0x3a "] {
            let found = table().lookup(Section::Unprefixed, key).unwrap();
            assert_eq!(found.opcode, 0x3A);
        }
    }

    #[test]
    fn missing_opcode_is_unknown() {
        let err = table().lookup(Section::CbPrefixed, "0xFF").unwrap_err();

        assert!(matches!(
            err,
            OpcodeError::UnknownOpcode {
                section: Section::CbPrefixed,
                ..
            }
        ));
    }

    #[test]
    fn non_hex_key_is_unknown() {
        let err = table().lookup(Section::Unprefixed, "nope").unwrap_err();

        assert!(matches!(err, OpcodeError::UnknownOpcode { .. }));
    }

    #[test]
    fn section_names_parse_case_insensitively() {
        assert_eq!("UNPREFIXED".parse::<Section>().unwrap(), Section::Unprefixed);
        assert_eq!("CbPrefixed".parse::<Section>().unwrap(), Section::CbPrefixed);
        assert_eq!(" unprefixed ".parse::<Section>().unwrap(), Section::Unprefixed);
    }

    #[test]
    fn unrecognized_section_name_fails() {
        let err = "prefixed".parse::<Section>().unwrap_err();

        assert!(matches!(err, OpcodeError::UnknownSection(_)));
    }

    #[test]
    fn operand_bytes_defaults_to_zero() {
        let ld = table().lookup(Section::Unprefixed, "0x3A").unwrap();

        assert_eq!(ld.operands[0].bytes, 0);
        assert_eq!(ld.operands[1].bytes, 0);
    }

    #[test]
    fn absent_value_and_adjust_stay_absent() {
        let ld = table().lookup(Section::Unprefixed, "0x3A").unwrap();

        assert_eq!(ld.operands[0].value, None);
        assert_eq!(ld.operands[0].adjust, None);
        assert_eq!(ld.operands[1].adjust, Some(Adjust::Decrement));
    }

    #[test]
    fn present_zero_value_differs_from_absent() {
        let rst = table().lookup(Section::Unprefixed, "0xC7").unwrap();

        assert_eq!(rst.operands[0].value, Some(0));
        assert_ne!(rst.operands[0].value, None);
    }

    #[test]
    fn cycles_keep_document_order() {
        let jp = table().lookup(Section::Unprefixed, "0xC2").unwrap();

        assert_eq!(jp.cycles, vec![16, 12]);
        assert_eq!(jp.operands[0].name, "NZ");
        assert_eq!(jp.operands[1].name, "a16");
        assert_eq!(jp.operands[1].bytes, 2);
    }

    #[test]
    fn entries_deserialize_at_lookup_not_at_load() {
        let table = OpcodeTable::from_json(
            r#"{"unprefixed": {"0x00": {"mnemonic": "NOP"}}, "cbprefixed": {}}"#,
        )
        .unwrap();

        let err = table.lookup(Section::Unprefixed, "0x00").unwrap_err();

        assert!(matches!(err, OpcodeError::Malformed(_)));
    }

    #[test]
    fn both_sections_are_required() {
        let err = OpcodeTable::from_json(r#"{"unprefixed": {}}"#).unwrap_err();

        assert!(matches!(err, OpcodeError::Malformed(_)));
    }

    #[test]
    fn top_level_must_be_a_section_map() {
        let err = OpcodeTable::from_json("[1, 2, 3]").unwrap_err();

        assert!(matches!(err, OpcodeError::Malformed(_)));
    }

    #[test]
    fn non_hex_document_key_fails_the_load() {
        let err = OpcodeTable::from_json(r#"{"unprefixed": {"zz": {}}, "cbprefixed": {}}"#)
            .unwrap_err();

        assert!(matches!(err, OpcodeError::Malformed(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            OpcodeTable::from_json("not json"),
            Err(OpcodeError::Malformed(_))
        ));
    }

    #[test]
    fn len_counts_section_entries() {
        let table = table();

        assert_eq!(table.len(Section::Unprefixed), 4);
        assert_eq!(table.len(Section::CbPrefixed), 1);
    }
}
