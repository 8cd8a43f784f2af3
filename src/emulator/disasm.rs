use capstone::arch::x86::ArchMode;
use capstone::prelude::*;
use capstone::Capstone;

use crate::arch::Arch;
use crate::emulator::Cpu;
use crate::error::{Error, Result};

/// Disassemble `len` bytes at `address` and emit one diagnostic line per
/// instruction. Used when symbol resolution fails and for the legacy
/// fast-system-call diagnostic; never fatal to the trace session.
pub fn dump_disassembly(cpu: &dyn Cpu, arch: Arch, address: u64, len: usize) {
    if let Err(err) = disasm(cpu, arch, address, len) {
        log::warn!("cannot disassemble {:#x}: {}", address, err);
    }
}

fn disasm(cpu: &dyn Cpu, arch: Arch, address: u64, len: usize) -> Result<()> {
    let mut code = vec![0u8; len];
    cpu.mem_read(address, &mut code)?;

    let mode = match arch {
        Arch::X86 => ArchMode::Mode32,
        Arch::Amd64 => ArchMode::Mode64,
    };
    let cs = Capstone::new()
        .x86()
        .mode(mode)
        .build()
        .map_err(|err| Error::Disasm(err.to_string()))?;

    let insns = cs
        .disasm_all(&code, address)
        .map_err(|err| Error::Disasm(err.to_string()))?;
    for insn in insns.iter() {
        log::debug!(
            "{:#010x}: {}\t{}\t{}",
            insn.address(),
            dump_hex(insn.bytes()),
            insn.mnemonic().unwrap_or(""),
            insn.op_str().unwrap_or("")
        );
    }
    Ok(())
}

fn dump_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
