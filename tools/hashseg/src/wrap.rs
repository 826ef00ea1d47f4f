//! Wrapping a raw binary image into a minimal one-segment ELF.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use hashseg_elf::header::{
    EI_CLASS, EI_DATA, EI_VERSION, ELF_MAGIC, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, EV_CURRENT,
};
use hashseg_elf::{ElfClass, ElfHeader, PT_LOAD, ProgramHeader};

use crate::flags::RWE_SEGMENT_FLAGS;
use crate::hashtable::PAGE_SIZE;

/// Executable file type.
const ET_EXEC: u16 = 2;
/// ARM machine tag, used for both widths.
const EM_ARM: u16 = 40;

/// Build the identification bytes for a fresh header.
fn ident_for(class: ElfClass) -> [u8; 16] {
    let mut ident = [0u8; 16];
    ident[..4].copy_from_slice(&ELF_MAGIC);
    ident[EI_CLASS] = match class {
        ElfClass::Elf32 => ELFCLASS32,
        ElfClass::Elf64 => ELFCLASS64,
    };
    ident[EI_DATA] = ELFDATA2LSB;
    ident[EI_VERSION] = EV_CURRENT;
    ident
}

/// Wrap `payload` into a single-segment executable loaded at `dest`.
///
/// The payload lands directly after the program-header table; the one
/// segment is read-write-execute and page aligned, with the entry point
/// at its base.
pub fn wrap_image(payload: &[u8], dest: u64, class: ElfClass) -> Vec<u8> {
    let ehdr_size = class.ehdr_size();
    let phdr_size = class.phdr_size();
    let payload_offset = (ehdr_size + phdr_size) as u64;

    #[expect(clippy::cast_possible_truncation)]
    let header = ElfHeader {
        e_ident: ident_for(class),
        e_type: ET_EXEC,
        e_machine: EM_ARM,
        e_version: u32::from(EV_CURRENT),
        e_entry: dest,
        e_phoff: ehdr_size as u64,
        e_shoff: 0,
        e_flags: 0,
        e_ehsize: ehdr_size as u16,
        e_phentsize: phdr_size as u16,
        e_phnum: 1,
        e_shentsize: 0,
        e_shnum: 0,
        e_shstrndx: 0,
    };

    let phdr = ProgramHeader {
        p_type: PT_LOAD,
        p_flags: RWE_SEGMENT_FLAGS,
        p_offset: payload_offset,
        p_vaddr: dest,
        p_paddr: dest,
        p_filesz: payload.len() as u64,
        p_memsz: payload.len() as u64,
        p_align: PAGE_SIZE,
    };

    let mut out = vec![0u8; ehdr_size + phdr_size + payload.len()];
    header.encode(&mut out[..ehdr_size]);
    phdr.encode(&mut out[ehdr_size..ehdr_size + phdr_size], class);
    out[ehdr_size + phdr_size..].copy_from_slice(payload);
    out
}

/// Wrap a raw image file into an ELF on disk.
///
/// # Errors
///
/// Fails on I/O errors reading the input or writing the output.
pub fn wrap_file(input: &Path, output: &Path, dest: u64, class: ElfClass) -> Result<u64> {
    let payload = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let out = wrap_image(&payload, dest, class);
    fs::write(output, &out).with_context(|| format!("writing {}", output.display()))?;
    Ok(payload.len() as u64)
}
