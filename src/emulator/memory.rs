use byteorder::{ByteOrder, LittleEndian};

use crate::arch::Arch;
use crate::emulator::{Cpu, Reg};
use crate::error::Result;

/// Upper bound on decoded string length, in code units. Shellcode controls
/// the pointers we chase; a missing terminator must not turn into an
/// unbounded walk over the address space.
pub const MAX_STRING_LEN: usize = 4096;

/// Align an `address` down to a specified alignment boundary.
/// If `alignment` is not specified the `address` will be aligned
/// to page size.
pub fn mem_align_down(address: u64, alignment: Option<u64>) -> u64 {
    let align = alignment.unwrap_or(0x1000);
    (address / align) * align
}

/// Align an `address` up to a specified alignment boundary.
/// If `alignment` is not specified the `address` will be aligned
/// to page size.
pub fn mem_align_up(address: u64, alignment: Option<u64>) -> u64 {
    let align = alignment.unwrap_or(0x1000);
    ((address + align - 1) / align) * align
}

/// Read one stack-slot-sized little-endian word.
pub fn read_word(cpu: &dyn Cpu, arch: Arch, address: u64) -> Result<u64> {
    let mut buf = [0u8; 8];
    match arch {
        Arch::X86 => {
            cpu.mem_read(address, &mut buf[..4])?;
            Ok(LittleEndian::read_u32(&buf[..4]) as u64)
        }
        Arch::Amd64 => {
            cpu.mem_read(address, &mut buf)?;
            Ok(LittleEndian::read_u64(&buf))
        }
    }
}

/// Write one stack-slot-sized little-endian word.
pub fn write_word(cpu: &mut dyn Cpu, arch: Arch, address: u64, value: u64) -> Result<()> {
    match arch {
        Arch::X86 => cpu.mem_write(address, &(value as u32).to_le_bytes()),
        Arch::Amd64 => cpu.mem_write(address, &value.to_le_bytes()),
    }
}

/// The caller's return address: the word on top of the stack.
pub fn return_address(cpu: &dyn Cpu, arch: Arch) -> Result<u64> {
    let sp = cpu.reg_read(Reg::Sp)?;
    read_word(cpu, arch, sp)
}

/// `count` consecutive stack words immediately above the return address,
/// in call-argument order.
pub fn stack_args(cpu: &dyn Cpu, arch: Arch, count: usize) -> Result<Vec<u64>> {
    let sp = cpu.reg_read(Reg::Sp)?;
    let word = arch.word_size();
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        values.push(read_word(cpu, arch, sp + word * (1 + i as u64))?);
    }
    Ok(values)
}

/// One stack argument by index (0-based, first argument slot above the
/// return address).
pub fn stack_arg(cpu: &dyn Cpu, arch: Arch, index: usize) -> Result<u64> {
    let sp = cpu.reg_read(Reg::Sp)?;
    read_word(cpu, arch, sp + arch.word_size() * (1 + index as u64))
}

/// Read a NUL-terminated single-byte string.
pub fn read_string(cpu: &dyn Cpu, mut addr: u64) -> Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while buf.len() < MAX_STRING_LEN {
        cpu.mem_read(addr, &mut byte)?;
        if byte[0] == 0 {
            break;
        }
        buf.push(byte[0]);
        addr += 1;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read a NUL-terminated UTF-16LE string.
pub fn read_wstring(cpu: &dyn Cpu, mut addr: u64) -> Result<String> {
    let mut units = Vec::new();
    let mut pair = [0u8; 2];
    while units.len() < MAX_STRING_LEN {
        cpu.mem_read(addr, &mut pair)?;
        let unit = LittleEndian::read_u16(&pair);
        if unit == 0 {
            break;
        }
        units.push(unit);
        addr += 2;
    }
    Ok(String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::fake::FakeCpu;

    #[test]
    fn align_helpers() {
        assert_eq!(mem_align_up(100, None), 0x1000);
        assert_eq!(mem_align_up(0x1000, None), 0x1000);
        assert_eq!(mem_align_up(0x1001, None), 0x2000);
        assert_eq!(mem_align_down(0x1fff, None), 0x1000);
        assert_eq!(mem_align_up(5, Some(4)), 8);
    }

    #[test]
    fn read_strings() {
        let mut cpu = FakeCpu::new();
        cpu.map(0x1000, 0x1000);
        cpu.write(0x1000, b"kernel32.dll\0");
        let wide: Vec<u8> = "evil.dll"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .chain([0, 0])
            .collect();
        cpu.write(0x1100, &wide);

        assert_eq!(read_string(&cpu, 0x1000).unwrap(), "kernel32.dll");
        assert_eq!(read_wstring(&cpu, 0x1100).unwrap(), "evil.dll");
    }

    #[test]
    fn read_string_fails_on_unmapped_memory() {
        let cpu = FakeCpu::new();
        assert!(read_string(&cpu, 0xdead0000).is_err());
    }

    #[test]
    fn stack_words_by_arch() {
        let mut cpu = FakeCpu::new();
        cpu.map(0x100000, 0x1000);
        cpu.reg_write(Reg::Sp, 0x100800).unwrap();
        // x86 layout: [ra][arg0][arg1]
        cpu.write(0x100800, &0x401000u32.to_le_bytes());
        cpu.write(0x100804, &0x10u32.to_le_bytes());
        cpu.write(0x100808, &0x20u32.to_le_bytes());

        assert_eq!(return_address(&cpu, Arch::X86).unwrap(), 0x401000);
        assert_eq!(stack_args(&cpu, Arch::X86, 2).unwrap(), vec![0x10, 0x20]);

        // same stack interpreted with 64-bit slots
        cpu.write(0x100800, &0x140001000u64.to_le_bytes());
        cpu.write(0x100808, &0x99u64.to_le_bytes());
        assert_eq!(return_address(&cpu, Arch::Amd64).unwrap(), 0x140001000);
        assert_eq!(stack_arg(&cpu, Arch::Amd64, 0).unwrap(), 0x99);
    }
}
