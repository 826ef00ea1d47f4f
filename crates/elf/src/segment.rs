//! ELF program header parsing and the parsed image view.
//!
//! Provides [`ElfImage`] as the main entry point for reading an ELF image
//! of either width, and [`ProgramHeader`] as the width-agnostic segment
//! record the hashing and rewriting logic operates on.

use crate::header::{ElfClass, ElfError, ElfHeader, le_u32, le_u64};

/// Program header type: unused entry.
pub const PT_NULL: u32 = 0;

/// Program header type: loadable segment.
pub const PT_LOAD: u32 = 1;

/// Program header type: the program header table itself.
pub const PT_PHDR: u32 = 6;

/// Parsed program header entry, width-agnostic.
///
/// Wide fields are `u64` regardless of the source width;
/// [`ProgramHeader::encode`] re-emits the class-correct layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramHeader {
    /// Segment type.
    pub p_type: u32,
    /// Segment flags. Bits 20–27 carry tool-specific classification.
    pub p_flags: u32,
    /// Offset of the segment data in the file.
    pub p_offset: u64,
    /// Virtual address of the segment.
    pub p_vaddr: u64,
    /// Physical address of the segment.
    pub p_paddr: u64,
    /// Size of the segment data in the file.
    pub p_filesz: u64,
    /// Size of the segment in memory.
    pub p_memsz: u64,
    /// Segment alignment.
    pub p_align: u64,
}

impl ProgramHeader {
    /// Parse a program header entry from `data` at `off` for `class`.
    ///
    /// The caller must ensure `off + class.phdr_size() <= data.len()`.
    pub(crate) fn parse(data: &[u8], off: usize, class: ElfClass) -> Self {
        let b = &data[off..];
        match class {
            ElfClass::Elf32 => Self {
                p_type: le_u32(b, 0),
                p_offset: u64::from(le_u32(b, 4)),
                p_vaddr: u64::from(le_u32(b, 8)),
                p_paddr: u64::from(le_u32(b, 12)),
                p_filesz: u64::from(le_u32(b, 16)),
                p_memsz: u64::from(le_u32(b, 20)),
                p_flags: le_u32(b, 24),
                p_align: u64::from(le_u32(b, 28)),
            },
            ElfClass::Elf64 => Self {
                p_type: le_u32(b, 0),
                p_flags: le_u32(b, 4),
                p_offset: le_u64(b, 8),
                p_vaddr: le_u64(b, 16),
                p_paddr: le_u64(b, 24),
                p_filesz: le_u64(b, 32),
                p_memsz: le_u64(b, 40),
                p_align: le_u64(b, 48),
            },
        }
    }

    /// Encode this entry into `buf` using the layout for `class`.
    ///
    /// Returns the number of bytes written. For the 32-bit layout, wide
    /// fields are truncated to their on-disk width.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than `class.phdr_size()`.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "32-bit layout narrows fields by definition"
    )]
    pub fn encode(&self, buf: &mut [u8], class: ElfClass) -> usize {
        assert!(buf.len() >= class.phdr_size());
        match class {
            ElfClass::Elf32 => {
                buf[0..4].copy_from_slice(&self.p_type.to_le_bytes());
                buf[4..8].copy_from_slice(&(self.p_offset as u32).to_le_bytes());
                buf[8..12].copy_from_slice(&(self.p_vaddr as u32).to_le_bytes());
                buf[12..16].copy_from_slice(&(self.p_paddr as u32).to_le_bytes());
                buf[16..20].copy_from_slice(&(self.p_filesz as u32).to_le_bytes());
                buf[20..24].copy_from_slice(&(self.p_memsz as u32).to_le_bytes());
                buf[24..28].copy_from_slice(&self.p_flags.to_le_bytes());
                buf[28..32].copy_from_slice(&(self.p_align as u32).to_le_bytes());
            }
            ElfClass::Elf64 => {
                buf[0..4].copy_from_slice(&self.p_type.to_le_bytes());
                buf[4..8].copy_from_slice(&self.p_flags.to_le_bytes());
                buf[8..16].copy_from_slice(&self.p_offset.to_le_bytes());
                buf[16..24].copy_from_slice(&self.p_vaddr.to_le_bytes());
                buf[24..32].copy_from_slice(&self.p_paddr.to_le_bytes());
                buf[32..40].copy_from_slice(&self.p_filesz.to_le_bytes());
                buf[40..48].copy_from_slice(&self.p_memsz.to_le_bytes());
                buf[48..56].copy_from_slice(&self.p_align.to_le_bytes());
            }
        }
        class.phdr_size()
    }
}

/// A parsed ELF image: the validated file header plus borrowed raw data.
///
/// Program header order is semantically significant downstream (it fixes
/// hash-table entry order), so [`ElfImage::program_headers`] yields
/// entries strictly in table order.
#[derive(Debug, Clone)]
pub struct ElfImage<'a> {
    data: &'a [u8],
    header: ElfHeader,
    class: ElfClass,
}

impl<'a> ElfImage<'a> {
    /// Parse an ELF image of either width from raw bytes.
    ///
    /// Validates the identification prefix, decodes the class-correct
    /// file header, re-validates it, and checks that the program header
    /// table lies within `data`. No ceiling is imposed on `e_phnum`
    /// here; usability limits are the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns [`ElfError`] if validation fails or the program header
    /// table is truncated or malformed.
    pub fn parse(data: &'a [u8]) -> Result<Self, ElfError> {
        let header = ElfHeader::parse(data)?;
        let class = header.validate()?;

        let ph_end = header
            .e_phoff
            .checked_add(u64::from(header.e_phnum) * u64::from(header.e_phentsize))
            .ok_or(ElfError::InvalidOffset)?;
        if ph_end > data.len() as u64 {
            return Err(ElfError::InvalidOffset);
        }
        if header.e_phnum > 0 && (header.e_phentsize as usize) < class.phdr_size() {
            return Err(ElfError::InvalidOffset);
        }

        Ok(Self { data, header, class })
    }

    /// The parsed file header.
    #[must_use]
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// The detected bit width.
    #[must_use]
    pub fn class(&self) -> ElfClass {
        self.class
    }

    /// The raw bytes backing this image.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns an iterator over all program headers in table order.
    ///
    /// Bounds were validated in [`ElfImage::parse`], so iteration cannot
    /// run past the end of the data.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "table bounds were checked against data.len() at parse time"
    )]
    pub fn program_headers(&self) -> impl Iterator<Item = ProgramHeader> + 'a {
        let data = self.data;
        let class = self.class;
        let phoff = self.header.e_phoff as usize;
        let phentsize = self.header.e_phentsize as usize;
        let phnum = self.header.e_phnum as usize;

        (0..phnum).map(move |i| ProgramHeader::parse(data, phoff + i * phentsize, class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ELF32_PHDR_SIZE;
    use crate::header::tests::{encode_header, make_header};

    /// Build an ELF image buffer from a header and program headers.
    ///
    /// Appends each entry at `e_phoff` and bumps `e_phnum`; segment
    /// payloads are left to the caller.
    fn make_image(class: ElfClass, phdrs: &[ProgramHeader]) -> Vec<u8> {
        let mut header = make_header(class);
        header.e_phnum = phdrs.len() as u16;
        let mut buf = encode_header(&header);
        for phdr in phdrs {
            let start = buf.len();
            buf.resize(start + class.phdr_size(), 0);
            phdr.encode(&mut buf[start..], class);
        }
        buf
    }

    fn load_phdr(offset: u64, vaddr: u64, filesz: u64) -> ProgramHeader {
        ProgramHeader {
            p_type: PT_LOAD,
            p_flags: 5,
            p_offset: offset,
            p_vaddr: vaddr,
            p_paddr: vaddr,
            p_filesz: filesz,
            p_memsz: filesz,
            p_align: 0x1000,
        }
    }

    #[test]
    fn iterate_program_headers_in_order() {
        let phdrs = [
            load_phdr(0x1000, 0x8000_0000, 0x100),
            load_phdr(0x2000, 0x8000_2000, 0x200),
        ];
        let buf = make_image(ElfClass::Elf64, &phdrs);
        let image = ElfImage::parse(&buf).expect("valid image");
        let parsed: Vec<_> = image.program_headers().collect();
        assert_eq!(parsed, phdrs);
    }

    #[test]
    fn phdr_round_trip_both_widths() {
        for class in [ElfClass::Elf32, ElfClass::Elf64] {
            let phdr = load_phdr(0x1000, 0x8000_1000, 0x42);
            let mut buf = vec![0u8; class.phdr_size()];
            assert_eq!(phdr.encode(&mut buf, class), class.phdr_size());
            assert_eq!(ProgramHeader::parse(&buf, 0, class), phdr);
        }
    }

    #[test]
    fn elf32_phdr_field_positions() {
        // p_flags sits after p_memsz in the 32-bit layout.
        let phdr = ProgramHeader {
            p_flags: 0x0120_0000,
            ..load_phdr(0x1000, 0x8000_0000, 0x10)
        };
        let mut buf = vec![0u8; ELF32_PHDR_SIZE];
        phdr.encode(&mut buf, ElfClass::Elf32);
        assert_eq!(le_u32(&buf, 24), 0x0120_0000);
        assert_eq!(le_u32(&buf, 4), 0x1000);
    }

    #[test]
    fn reject_phdr_table_out_of_bounds() {
        let mut header = make_header(ElfClass::Elf64);
        header.e_phnum = 3; // claims entries that are not in the buffer
        let buf = encode_header(&header);
        assert_eq!(
            ElfImage::parse(&buf).unwrap_err(),
            ElfError::InvalidOffset
        );
    }

    #[test]
    fn reject_undersized_phentsize() {
        let mut header = make_header(ElfClass::Elf64);
        header.e_phnum = 1;
        header.e_phentsize = 8;
        let mut buf = encode_header(&header);
        buf.resize(buf.len() + 8, 0);
        assert_eq!(
            ElfImage::parse(&buf).unwrap_err(),
            ElfError::InvalidOffset
        );
    }

    #[test]
    fn image_view_is_cloneable() {
        let phdrs = [load_phdr(0x1000, 0x8000_0000, 0x100)];
        let buf = make_image(ElfClass::Elf64, &phdrs);
        let image = ElfImage::parse(&buf).expect("valid image");
        let copy = image.clone();
        assert_eq!(copy.header(), image.header());
        assert_eq!(copy.program_headers().count(), 1);
    }

    #[test]
    fn empty_phdr_table() {
        let buf = encode_header(&make_header(ElfClass::Elf64));
        let image = ElfImage::parse(&buf).expect("valid image");
        assert_eq!(image.program_headers().count(), 0);
    }

    #[test]
    fn parse_fails_before_reading_phdrs_on_bad_ident() {
        // A corrupt class byte must fail parse even though a phdr table
        // is present and well-formed for the original class.
        let phdrs = [load_phdr(0x1000, 0x8000_0000, 0x100)];
        let mut buf = make_image(ElfClass::Elf64, &phdrs);
        buf[crate::header::EI_CLASS] = 9;
        assert_eq!(
            ElfImage::parse(&buf).unwrap_err(),
            ElfError::UnsupportedClass
        );
    }
}
