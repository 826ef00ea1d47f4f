//! ELF identification and file header parsing for both bit widths.
//!
//! The identification bytes are validated twice per conversion: once on the
//! raw prefix before the bit width is known ([`validate_ident`]), and once
//! more on the fully decoded header ([`ElfHeader::validate`]).

use core::fmt;

/// ELF magic bytes: `\x7fELF`.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// ELF class: 32-bit.
pub const ELFCLASS32: u8 = 1;

/// ELF class: 64-bit.
pub const ELFCLASS64: u8 = 2;

/// ELF data encoding: little-endian.
pub const ELFDATA2LSB: u8 = 1;

/// Current ELF version.
pub const EV_CURRENT: u8 = 1;

/// Index of the class byte in `e_ident`.
pub const EI_CLASS: usize = 4;

/// Index of the data encoding byte in `e_ident`.
pub const EI_DATA: usize = 5;

/// Index of the version byte in `e_ident`.
pub const EI_VERSION: usize = 6;

/// Size of the identification prefix common to both widths:
/// `e_ident` plus `e_type`, `e_machine`, and `e_version`.
pub const ELF_COMMON_SIZE: usize = 24;

/// Size of an ELF32 file header (52 bytes).
pub const ELF32_EHDR_SIZE: usize = 52;

/// Size of an ELF64 file header (64 bytes).
pub const ELF64_EHDR_SIZE: usize = 64;

/// Size of an ELF32 program header entry (32 bytes).
pub const ELF32_PHDR_SIZE: usize = 32;

/// Size of an ELF64 program header entry (56 bytes).
pub const ELF64_PHDR_SIZE: usize = 56;

/// Read a little-endian `u16` from `data` at byte offset `off`.
///
/// # Panics
///
/// Panics if `off + 2 > data.len()`. Callers must bounds-check first.
pub(crate) fn le_u16(data: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(*data[off..].first_chunk().unwrap())
}

/// Read a little-endian `u32` from `data` at byte offset `off`.
pub(crate) fn le_u32(data: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(*data[off..].first_chunk().unwrap())
}

/// Read a little-endian `u64` from `data` at byte offset `off`.
pub(crate) fn le_u64(data: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(*data[off..].first_chunk().unwrap())
}

/// Errors that can occur when parsing an ELF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    /// The file does not start with the ELF magic bytes.
    BadMagic,
    /// The class byte is neither `ELFCLASS32` nor `ELFCLASS64`.
    UnsupportedClass,
    /// The identification version byte is not `EV_CURRENT`.
    BadVersion,
    /// The input data is too short for the declared structure.
    Truncated,
    /// A header offset or size is out of bounds.
    InvalidOffset,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "invalid ELF magic bytes"),
            Self::UnsupportedClass => {
                write!(f, "unsupported ELF class (expected ELFCLASS32 or ELFCLASS64)")
            }
            Self::BadVersion => write!(f, "invalid ELF version"),
            Self::Truncated => write!(f, "input data truncated"),
            Self::InvalidOffset => write!(f, "invalid header offset or size"),
        }
    }
}

impl core::error::Error for ElfError {}

/// The bit width of an ELF image, detected from the class byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    /// 32-bit layout.
    Elf32,
    /// 64-bit layout.
    Elf64,
}

impl ElfClass {
    /// Maps the `e_ident` class byte to a width.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError::UnsupportedClass`] for any other value.
    pub fn from_ident_byte(byte: u8) -> Result<Self, ElfError> {
        match byte {
            ELFCLASS32 => Ok(Self::Elf32),
            ELFCLASS64 => Ok(Self::Elf64),
            _ => Err(ElfError::UnsupportedClass),
        }
    }

    /// Size of the file header for this width.
    #[must_use]
    pub fn ehdr_size(self) -> usize {
        match self {
            Self::Elf32 => ELF32_EHDR_SIZE,
            Self::Elf64 => ELF64_EHDR_SIZE,
        }
    }

    /// Size of one program header entry for this width.
    #[must_use]
    pub fn phdr_size(self) -> usize {
        match self {
            Self::Elf32 => ELF32_PHDR_SIZE,
            Self::Elf64 => ELF64_PHDR_SIZE,
        }
    }
}

/// Validate the identification prefix and detect the bit width.
///
/// This is the pure validation predicate applied before the width is
/// known: magic bytes, recognized class byte, and identification
/// version. It reads nothing beyond the common prefix.
///
/// # Errors
///
/// Returns [`ElfError`] if the prefix is too short or any check fails.
pub fn validate_ident(data: &[u8]) -> Result<ElfClass, ElfError> {
    if data.len() < ELF_COMMON_SIZE {
        return Err(ElfError::Truncated);
    }
    if data[..4] != ELF_MAGIC {
        return Err(ElfError::BadMagic);
    }
    let class = ElfClass::from_ident_byte(data[EI_CLASS])?;
    if data[EI_VERSION] != EV_CURRENT {
        return Err(ElfError::BadVersion);
    }
    Ok(class)
}

/// Parsed ELF file header, width-agnostic.
///
/// All offset and size fields are widened to `u64`; [`ElfHeader::encode`]
/// re-emits the class-correct layout. The full `e_ident` array is carried
/// verbatim so unchanged bytes survive a rewrite untouched. Fields are
/// public because the rewriter mutates offsets and counts in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfHeader {
    /// Identification bytes, carried through unchanged.
    pub e_ident: [u8; 16],
    /// Object file type.
    pub e_type: u16,
    /// Target machine architecture.
    pub e_machine: u16,
    /// Object file version.
    pub e_version: u32,
    /// Virtual address of the entry point.
    pub e_entry: u64,
    /// Offset of the program header table in the file.
    pub e_phoff: u64,
    /// Offset of the section header table in the file.
    pub e_shoff: u64,
    /// Processor-specific flags.
    pub e_flags: u32,
    /// Size of this header.
    pub e_ehsize: u16,
    /// Size of each program header entry.
    pub e_phentsize: u16,
    /// Number of program header entries.
    pub e_phnum: u16,
    /// Size of each section header entry.
    pub e_shentsize: u16,
    /// Number of section header entries.
    pub e_shnum: u16,
    /// Section header string table index.
    pub e_shstrndx: u16,
}

impl ElfHeader {
    /// Parse a file header from raw bytes, detecting the width from the
    /// identification prefix.
    ///
    /// The prefix is validated before decoding and the decoded header is
    /// validated again, guarding against a prefix/body mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError`] if validation fails or the data is too short
    /// for the detected width.
    pub fn parse(data: &[u8]) -> Result<Self, ElfError> {
        let class = validate_ident(data)?;
        if data.len() < class.ehdr_size() {
            return Err(ElfError::Truncated);
        }

        let mut e_ident = [0u8; 16];
        e_ident.copy_from_slice(&data[..16]);

        let header = match class {
            ElfClass::Elf32 => Self {
                e_ident,
                e_type: le_u16(data, 16),
                e_machine: le_u16(data, 18),
                e_version: le_u32(data, 20),
                e_entry: u64::from(le_u32(data, 24)),
                e_phoff: u64::from(le_u32(data, 28)),
                e_shoff: u64::from(le_u32(data, 32)),
                e_flags: le_u32(data, 36),
                e_ehsize: le_u16(data, 40),
                e_phentsize: le_u16(data, 42),
                e_phnum: le_u16(data, 44),
                e_shentsize: le_u16(data, 46),
                e_shnum: le_u16(data, 48),
                e_shstrndx: le_u16(data, 50),
            },
            ElfClass::Elf64 => Self {
                e_ident,
                e_type: le_u16(data, 16),
                e_machine: le_u16(data, 18),
                e_version: le_u32(data, 20),
                e_entry: le_u64(data, 24),
                e_phoff: le_u64(data, 32),
                e_shoff: le_u64(data, 40),
                e_flags: le_u32(data, 48),
                e_ehsize: le_u16(data, 52),
                e_phentsize: le_u16(data, 54),
                e_phnum: le_u16(data, 56),
                e_shentsize: le_u16(data, 58),
                e_shnum: le_u16(data, 60),
                e_shstrndx: le_u16(data, 62),
            },
        };

        header.validate()?;
        Ok(header)
    }

    /// Re-validate the identification bytes of a decoded header.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError`] on magic, class, or version mismatch.
    pub fn validate(&self) -> Result<ElfClass, ElfError> {
        if self.e_ident[..4] != ELF_MAGIC {
            return Err(ElfError::BadMagic);
        }
        let class = ElfClass::from_ident_byte(self.e_ident[EI_CLASS])?;
        if self.e_ident[EI_VERSION] != EV_CURRENT {
            return Err(ElfError::BadVersion);
        }
        Ok(class)
    }

    /// The bit width recorded in the identification bytes.
    ///
    /// Valid for any header produced by [`ElfHeader::parse`]; falls back
    /// to 64-bit only if the ident has been corrupted since.
    #[must_use]
    pub fn class(&self) -> ElfClass {
        ElfClass::from_ident_byte(self.e_ident[EI_CLASS]).unwrap_or(ElfClass::Elf64)
    }

    /// Encode the header into `buf` using the class-correct layout.
    ///
    /// Returns the number of bytes written. For the 32-bit layout, wide
    /// fields are truncated to their on-disk width; the rewriter checks
    /// representability before mutating offsets.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than the header size for this class.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "32-bit layout narrows fields by definition"
    )]
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let class = self.class();
        assert!(buf.len() >= class.ehdr_size());

        buf[..16].copy_from_slice(&self.e_ident);
        buf[16..18].copy_from_slice(&self.e_type.to_le_bytes());
        buf[18..20].copy_from_slice(&self.e_machine.to_le_bytes());
        buf[20..24].copy_from_slice(&self.e_version.to_le_bytes());

        match class {
            ElfClass::Elf32 => {
                buf[24..28].copy_from_slice(&(self.e_entry as u32).to_le_bytes());
                buf[28..32].copy_from_slice(&(self.e_phoff as u32).to_le_bytes());
                buf[32..36].copy_from_slice(&(self.e_shoff as u32).to_le_bytes());
                buf[36..40].copy_from_slice(&self.e_flags.to_le_bytes());
                buf[40..42].copy_from_slice(&self.e_ehsize.to_le_bytes());
                buf[42..44].copy_from_slice(&self.e_phentsize.to_le_bytes());
                buf[44..46].copy_from_slice(&self.e_phnum.to_le_bytes());
                buf[46..48].copy_from_slice(&self.e_shentsize.to_le_bytes());
                buf[48..50].copy_from_slice(&self.e_shnum.to_le_bytes());
                buf[50..52].copy_from_slice(&self.e_shstrndx.to_le_bytes());
                ELF32_EHDR_SIZE
            }
            ElfClass::Elf64 => {
                buf[24..32].copy_from_slice(&self.e_entry.to_le_bytes());
                buf[32..40].copy_from_slice(&self.e_phoff.to_le_bytes());
                buf[40..48].copy_from_slice(&self.e_shoff.to_le_bytes());
                buf[48..52].copy_from_slice(&self.e_flags.to_le_bytes());
                buf[52..54].copy_from_slice(&self.e_ehsize.to_le_bytes());
                buf[54..56].copy_from_slice(&self.e_phentsize.to_le_bytes());
                buf[56..58].copy_from_slice(&self.e_phnum.to_le_bytes());
                buf[58..60].copy_from_slice(&self.e_shentsize.to_le_bytes());
                buf[60..62].copy_from_slice(&self.e_shnum.to_le_bytes());
                buf[62..64].copy_from_slice(&self.e_shstrndx.to_le_bytes());
                ELF64_EHDR_SIZE
            }
        }
    }
}
