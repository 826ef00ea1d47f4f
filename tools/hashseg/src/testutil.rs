//! Shared builders for synthetic test images.

use hashseg_elf::header::{
    EI_CLASS, EI_DATA, EI_VERSION, ELF_MAGIC, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, EV_CURRENT,
};
use hashseg_elf::{ElfClass, ElfHeader, PT_LOAD, ProgramHeader};

use crate::convert::Options;
use crate::digest::HashAlgo;
use crate::rewrite::CERT_CHAIN_ONEROOT_MAXSIZE;

/// A loadable segment with the given flag word and geometry.
pub fn load_phdr(flags: u32, offset: u64, vaddr: u64, filesz: u64) -> ProgramHeader {
    ProgramHeader {
        p_type: PT_LOAD,
        p_flags: flags,
        p_offset: offset,
        p_vaddr: vaddr,
        p_paddr: vaddr,
        p_filesz: filesz,
        p_memsz: filesz,
        p_align: 4,
    }
}

/// Serialize a complete image: header, program-header table, and a
/// deterministic byte pattern filling the rest out to `total`.
pub fn make_image(class: ElfClass, phdrs: &[ProgramHeader], total: usize) -> Vec<u8> {
    let ehdr_size = class.ehdr_size();
    let phdr_size = class.phdr_size();

    let mut ident = [0u8; 16];
    ident[..4].copy_from_slice(&ELF_MAGIC);
    ident[EI_CLASS] = match class {
        ElfClass::Elf32 => ELFCLASS32,
        ElfClass::Elf64 => ELFCLASS64,
    };
    ident[EI_DATA] = ELFDATA2LSB;
    ident[EI_VERSION] = EV_CURRENT;

    #[expect(clippy::cast_possible_truncation)]
    let header = ElfHeader {
        e_ident: ident,
        e_type: 2,
        e_machine: 40,
        e_version: 1,
        e_entry: 0x8000_0000,
        e_phoff: ehdr_size as u64,
        e_shoff: 0,
        e_flags: 0,
        e_ehsize: ehdr_size as u16,
        e_phentsize: phdr_size as u16,
        e_phnum: phdrs.len() as u16,
        e_shentsize: 0,
        e_shnum: 0,
        e_shstrndx: 0,
    };

    #[expect(clippy::cast_possible_truncation)]
    let mut out: Vec<u8> = (0..total).map(|i| (i as u8).wrapping_mul(31)).collect();
    header.encode(&mut out[..ehdr_size]);
    for (i, phdr) in phdrs.iter().enumerate() {
        let at = ehdr_size + i * phdr_size;
        phdr.encode(&mut out[at..at + phdr_size], class);
    }
    out
}

/// Baseline conversion options: SHA-256, no outputs, nothing reserved.
pub fn options() -> Options {
    Options {
        elf_out: None,
        hash_out: None,
        secure: false,
        max_seg_size: None,
        seg_addr: None,
        algo: HashAlgo::Sha256,
        append_header: false,
        cert_chain_size: CERT_CHAIN_ONEROOT_MAXSIZE,
        page_as_segment: false,
    }
}
