//! Minimal dual-width ELF model for the hashseg tool.
//!
//! Parses and re-emits ELF32/ELF64 file headers and program headers from
//! raw byte slices using safe field extraction (`from_le_bytes`). The bit
//! width is detected at runtime from the identification bytes, so one
//! build of the tool handles both 32- and 64-bit images. No unsafe code,
//! no allocations.
//!
//! # Usage
//!
//! ```
//! use hashseg_elf::ElfImage;
//!
//! fn dump_segments(data: &[u8]) {
//!     let image = ElfImage::parse(data).expect("valid ELF");
//!     for phdr in image.program_headers() {
//!         // phdr.p_offset, phdr.p_filesz, ...
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

pub mod header;
pub mod segment;

pub use header::{
    ELF32_EHDR_SIZE, ELF32_PHDR_SIZE, ELF64_EHDR_SIZE, ELF64_PHDR_SIZE, ELF_COMMON_SIZE,
    ElfClass, ElfError, ElfHeader, validate_ident,
};
pub use segment::{ElfImage, PT_LOAD, PT_NULL, PT_PHDR, ProgramHeader};
