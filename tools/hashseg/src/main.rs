//! Secure-boot hash segment generator.
//!
//! Rewrites an ELF boot image so a hash segment covering every loadable
//! segment sits between the program-header table and the payload, in the
//! layout secure-boot loaders authenticate. Also wraps raw binaries into
//! minimal single-segment ELFs.

mod cli;
mod convert;
mod digest;
mod flags;
mod hashtable;
mod rewrite;
#[cfg(test)]
mod testutil;
mod wrap;

use anyhow::Result;
use clap::Parser;
use hashseg_elf::ElfClass;

use convert::Options;
use digest::HashAlgo;
use rewrite::CERT_CHAIN_ONEROOT_MAXSIZE;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    match cli.command {
        cli::Command::Gen(args) => cmd_gen(&args),
        cli::Command::Wrap(args) => cmd_wrap(&args),
    }
}

fn cmd_gen(args: &cli::GenArgs) -> Result<()> {
    let opts = Options {
        elf_out: args.elf_out.clone(),
        hash_out: args.hash_out.clone(),
        secure: args.secure,
        max_seg_size: args.max_seg_size,
        seg_addr: args.seg_addr,
        algo: if args.sha1 {
            HashAlgo::Sha1
        } else {
            HashAlgo::Sha256
        },
        append_header: args.append_header,
        cert_chain_size: args.cert_chain_size.unwrap_or(CERT_CHAIN_ONEROOT_MAXSIZE),
        page_as_segment: args.page_as_segment,
    };

    let summary = convert::convert(&args.input, &opts)?;

    if let Some(hash_out) = &args.hash_out {
        println!(
            "Hash table: {} entries, {} bytes -> {}",
            summary.entries,
            summary.table_bytes,
            hash_out.display()
        );
    }
    if let Some(elf_out) = &args.elf_out {
        println!(
            "ELF: {} program headers, segments shifted by {:#x} -> {}",
            summary.phnum,
            summary.shift,
            elf_out.display()
        );
    }
    Ok(())
}

fn cmd_wrap(args: &cli::WrapArgs) -> Result<()> {
    let class = if args.elf64 {
        ElfClass::Elf64
    } else {
        ElfClass::Elf32
    };
    let size = wrap::wrap_file(&args.input, &args.output, args.image_dest, class)?;
    println!(
        "Wrapped {} bytes at {:#x} -> {}",
        size,
        args.image_dest,
        args.output.display()
    );
    Ok(())
}
