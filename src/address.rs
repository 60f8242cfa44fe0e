use crate::protocol::{
    error::{Error, Result},
    frame::S7Area,
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};

/// Largest byte offset whose bit address still fits the 24-bit address field.
pub const MAX_BYTE_OFFSET: u32 = 0x00FF_FFFF >> 3;

/// Memory area of an address. The declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemoryArea {
    Input,
    Output,
    /// Flags / markers (M)
    Flag,
    DataBlock,
    Unknown,
}

impl MemoryArea {
    /// Wire area code; `Unknown` has none.
    pub fn to_s7(self) -> Result<S7Area> {
        match self {
            MemoryArea::Input => Ok(S7Area::I),
            MemoryArea::Output => Ok(S7Area::O),
            MemoryArea::Flag => Ok(S7Area::M),
            MemoryArea::DataBlock => Ok(S7Area::DB),
            MemoryArea::Unknown => Err(Error::ErrInvalidAddress("unknown memory area".into())),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            MemoryArea::Input => "I",
            MemoryArea::Output => "Q",
            MemoryArea::Flag => "M",
            MemoryArea::DataBlock => "DB",
            MemoryArea::Unknown => "?",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementType {
    Bit,
    Byte,
    Word,
    DoubleWord,
}

impl ElementType {
    fn letter(self) -> char {
        match self {
            ElementType::Bit => 'X',
            ElementType::Byte => 'B',
            ElementType::Word => 'W',
            ElementType::DoubleWord => 'D',
        }
    }
}

/// One PLC memory location.
///
/// Addresses are plain values: constructors validate, nothing mutates.
/// The order is (area, db, byte offset, length, bit offset) with element
/// type and float flag as final tie breakers, so it agrees with equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    area: MemoryArea,
    db: u16,
    byte: u32,
    bit: u8,
    element: ElementType,
    length: u16,
    is_float: bool,
}

impl Address {
    fn new(
        area: MemoryArea,
        db: u16,
        byte: u32,
        bit: u8,
        element: ElementType,
        length: u16,
        is_float: bool,
    ) -> Result<Self> {
        if byte > MAX_BYTE_OFFSET {
            return Err(Error::ErrInvalidAddress(format!("byte offset {byte} out of range")));
        }
        if bit > 7 {
            return Err(Error::ErrInvalidAddress(format!("bit offset {bit} out of range")));
        }
        if length == 0 {
            return Err(Error::ErrInvalidAddress("zero length".into()));
        }
        Ok(Self {
            area,
            db: if area == MemoryArea::DataBlock { db } else { 0 },
            byte,
            bit: if element == ElementType::Bit { bit } else { 0 },
            element,
            length,
            is_float: is_float && element == ElementType::DoubleWord,
        })
    }

    pub fn bit(area: MemoryArea, db: u16, byte: u32, bit: u8) -> Result<Self> {
        Self::new(area, db, byte, bit, ElementType::Bit, 1, false)
    }

    pub fn bytes(area: MemoryArea, db: u16, byte: u32, length: u16) -> Result<Self> {
        Self::new(area, db, byte, 0, ElementType::Byte, length, false)
    }

    pub fn word(area: MemoryArea, db: u16, byte: u32) -> Result<Self> {
        Self::new(area, db, byte, 0, ElementType::Word, 2, false)
    }

    pub fn double_word(area: MemoryArea, db: u16, byte: u32, is_float: bool) -> Result<Self> {
        Self::new(area, db, byte, 0, ElementType::DoubleWord, 4, is_float)
    }

    #[inline]
    pub fn area(&self) -> MemoryArea {
        self.area
    }

    /// Data block number; 0 outside data blocks
    #[inline]
    pub fn db(&self) -> u16 {
        self.db
    }

    #[inline]
    pub fn byte_offset(&self) -> u32 {
        self.byte
    }

    #[inline]
    pub fn bit_offset(&self) -> u8 {
        self.bit
    }

    #[inline]
    pub fn element(&self) -> ElementType {
        self.element
    }

    #[inline]
    pub fn length(&self) -> u16 {
        self.length
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        self.is_float
    }

    #[inline]
    pub fn is_bit(&self) -> bool {
        self.element == ElementType::Bit
    }

    /// First byte after the address.
    #[inline]
    pub fn end(&self) -> u32 {
        self.byte + self.length as u32
    }

    /// Bit address as used by bit transport (`byte * 8 + bit`).
    #[inline]
    pub fn bit_address(&self) -> u32 {
        self.byte * 8 + self.bit as u32
    }

    /// Same location and DB, ignoring offsets and types.
    #[inline]
    pub fn same_memory(&self, other: &Address) -> bool {
        self.area == other.area && self.db == other.db
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.area
            .cmp(&other.area)
            .then(self.db.cmp(&other.db))
            .then(self.byte.cmp(&other.byte))
            .then(self.length.cmp(&other.length))
            .then(self.bit.cmp(&other.bit))
            .then(self.element.cmp(&other.element))
            .then(self.is_float.cmp(&other.is_float))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.area == MemoryArea::DataBlock {
            write!(f, "DB{}.DB", self.db)?;
        } else {
            f.write_str(self.area.prefix())?;
        }
        match self.element {
            ElementType::Bit => write!(f, "X{}.{}", self.byte, self.bit),
            ElementType::Byte if self.length > 1 => write!(f, "B{}.{}", self.byte, self.length),
            ElementType::DoubleWord if self.is_float => write!(f, "D{}F", self.byte),
            element => write!(f, "{}{}", element.letter(), self.byte),
        }
    }
}

fn number<T: FromStr>(s: &str, input: &str) -> Result<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::ErrInvalidAddress(input.to_string()));
    }
    s.parse::<T>()
        .map_err(|_| Error::ErrInvalidAddress(input.to_string()))
}

/// Split the area prefix off an upper-cased address.
fn split_area(s: &str) -> Option<(MemoryArea, Option<&str>, &str)> {
    if let Some(rest) = s.strip_prefix("DB") {
        let (db, tail) = rest.split_once('.')?;
        let tail = tail.strip_prefix("DB")?;
        return Some((MemoryArea::DataBlock, Some(db), tail));
    }
    let mut chars = s.chars();
    let area = match chars.next()? {
        'I' | 'E' => MemoryArea::Input,
        'Q' | 'A' => MemoryArea::Output,
        'M' => MemoryArea::Flag,
        _ => return None,
    };
    Some((area, None, chars.as_str()))
}

/// Parse an address such as `MB10`, `MD10F`, `M10.3`, `DB5.DBX10.3` or
/// `DB5.DBB10.20`. Parsing is case-insensitive; `E`/`A` are accepted for
/// inputs/outputs.
pub fn parse(input: &str) -> Result<Address> {
    let s = input.trim().to_ascii_uppercase();
    let invalid = || Error::ErrInvalidAddress(input.to_string());
    let (area, db, tail) = split_area(&s).ok_or_else(invalid)?;
    let db = match db {
        Some(d) => number::<u16>(d, input)?,
        None => 0,
    };

    let (element, spec) = match tail.chars().next() {
        Some('X') => (Some(ElementType::Bit), &tail[1..]),
        Some('B') => (Some(ElementType::Byte), &tail[1..]),
        Some('W') => (Some(ElementType::Word), &tail[1..]),
        Some('D') => (Some(ElementType::DoubleWord), &tail[1..]),
        Some(c) if c.is_ascii_digit() && area != MemoryArea::DataBlock => (None, tail),
        _ => return Err(invalid()),
    };

    match element {
        Some(ElementType::Bit) => {
            let (byte, bit) = spec.split_once('.').ok_or_else(invalid)?;
            Address::bit(area, db, number(byte, input)?, number(bit, input)?)
        }
        None => match spec.split_once('.') {
            Some((byte, bit)) => Address::bit(area, db, number(byte, input)?, number(bit, input)?),
            None => Address::bytes(area, db, number(spec, input)?, 1),
        },
        Some(ElementType::Byte) => match spec.split_once('.') {
            Some((byte, len)) => {
                Address::bytes(area, db, number(byte, input)?, number(len, input)?)
            }
            None => Address::bytes(area, db, number(spec, input)?, 1),
        },
        Some(ElementType::Word) => {
            let byte = spec.strip_suffix('F').unwrap_or(spec);
            Address::word(area, db, number(byte, input)?)
        }
        Some(ElementType::DoubleWord) => {
            let (byte, is_float) = match spec.strip_suffix('F') {
                Some(b) => (b, true),
                None => (spec, false),
            };
            Address::double_word(area, db, number(byte, input)?, is_float)
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}
