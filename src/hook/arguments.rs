use crate::api::{ArgType, ArgumentDescriptor};
use crate::arch::Arch;
use crate::emulator::memory::{read_string, read_wstring, stack_args};
use crate::emulator::{Cpu, ARGUMENT_REGISTERS};
use crate::error::Result;
use crate::hook::call_log::ArgumentValue;

/// Extract the declared arguments of a call at interception time.
///
/// 64-bit convention: the first `min(N, 4)` arguments come from the fixed
/// argument registers in declared order, the remainder from consecutive
/// stack words immediately above the return address. Everything else is
/// stack-only. String-pointer arguments are dereferenced unless the raw
/// value is zero; a dereference failure leaves `decoded_value` absent and
/// never aborts extraction of the remaining arguments.
pub fn extract(
    cpu: &dyn Cpu,
    arch: Arch,
    descriptors: &[ArgumentDescriptor],
) -> Result<Vec<ArgumentValue>> {
    let reg_count = descriptors.len().min(arch.register_argument_count());

    let mut raw = Vec::with_capacity(descriptors.len());
    for reg in &ARGUMENT_REGISTERS[..reg_count] {
        raw.push(cpu.reg_read(*reg)?);
    }
    if descriptors.len() > reg_count {
        raw.extend(stack_args(cpu, arch, descriptors.len() - reg_count)?);
    }

    let mut arguments = Vec::with_capacity(descriptors.len());
    for (descriptor, value) in descriptors.iter().zip(raw) {
        arguments.push(ArgumentValue {
            name: descriptor.name.clone(),
            ty: descriptor.ty,
            value,
            decoded_value: decode_string(cpu, descriptor.ty, value),
        });
    }
    Ok(arguments)
}

fn decode_string(cpu: &dyn Cpu, ty: ArgType, value: u64) -> Option<String> {
    if value == 0 {
        return None;
    }
    let decoded = match ty {
        ArgType::AnsiString => read_string(cpu, value),
        ArgType::WideString => read_wstring(cpu, value),
        ArgType::Integer | ArgType::Unknown => return None,
    };
    match decoded {
        Ok(string) => Some(string),
        Err(err) => {
            log::warn!("cannot decode string argument at {:#x}: {}", value, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::fake::FakeCpu;
    use crate::emulator::Reg;

    fn descriptors(types: &[ArgType]) -> Vec<ArgumentDescriptor> {
        types
            .iter()
            .map(|ty| ArgumentDescriptor { name: None, ty: *ty })
            .collect()
    }

    #[test]
    fn amd64_arity_six_splits_registers_and_stack() {
        let mut cpu = FakeCpu::new();
        cpu.map(0x100000, 0x1000);
        cpu.reg_write(Reg::Sp, 0x100800).unwrap();
        cpu.reg_write(Reg::Arg0, 1).unwrap();
        cpu.reg_write(Reg::Arg1, 2).unwrap();
        cpu.reg_write(Reg::Arg2, 3).unwrap();
        cpu.reg_write(Reg::Arg3, 4).unwrap();
        cpu.write(0x100800, &0x401000u64.to_le_bytes()); // return address
        cpu.write(0x100808, &5u64.to_le_bytes());
        cpu.write(0x100810, &6u64.to_le_bytes());

        let args = extract(&cpu, Arch::Amd64, &descriptors(&[ArgType::Integer; 6])).unwrap();
        let values: Vec<u64> = args.iter().map(|a| a.value).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn x86_reads_all_arguments_from_the_stack() {
        let mut cpu = FakeCpu::new();
        cpu.map(0x100000, 0x1000);
        cpu.reg_write(Reg::Sp, 0x100800).unwrap();
        cpu.write(0x100800, &0x401000u32.to_le_bytes());
        cpu.write(0x100804, &0xaau32.to_le_bytes());
        cpu.write(0x100808, &0xbbu32.to_le_bytes());
        // register values must not leak into an all-stack convention
        cpu.reg_write(Reg::Arg0, 0xdead).unwrap();

        let args = extract(&cpu, Arch::X86, &descriptors(&[ArgType::Integer; 2])).unwrap();
        let values: Vec<u64> = args.iter().map(|a| a.value).collect();
        assert_eq!(values, vec![0xaa, 0xbb]);
    }

    #[test]
    fn string_pointers_are_decoded() {
        let mut cpu = FakeCpu::new();
        cpu.map(0x100000, 0x1000);
        cpu.map(0x2000, 0x1000);
        cpu.reg_write(Reg::Sp, 0x100800).unwrap();
        cpu.write(0x2000, b"calc.exe\0");
        cpu.write(0x100804, &0x2000u32.to_le_bytes());

        let args = extract(&cpu, Arch::X86, &descriptors(&[ArgType::AnsiString])).unwrap();
        assert_eq!(args[0].decoded_value.as_deref(), Some("calc.exe"));
    }

    #[test]
    fn zero_string_pointer_is_never_dereferenced() {
        let mut cpu = FakeCpu::new();
        cpu.map(0x100000, 0x1000);
        cpu.reg_write(Reg::Sp, 0x100800).unwrap();
        // slot holds 0

        let args = extract(&cpu, Arch::X86, &descriptors(&[ArgType::WideString])).unwrap();
        assert_eq!(args[0].value, 0);
        assert_eq!(args[0].decoded_value, None);
    }

    #[test]
    fn dereference_failure_does_not_abort_siblings() {
        let mut cpu = FakeCpu::new();
        cpu.map(0x100000, 0x1000);
        cpu.map(0x2000, 0x1000);
        cpu.reg_write(Reg::Sp, 0x100800).unwrap();
        cpu.write(0x100804, &0xdead0000u32.to_le_bytes()); // unmapped pointer
        cpu.write(0x100808, &0x2000u32.to_le_bytes());
        cpu.write(0x2000, b"user32\0");

        let args = extract(
            &cpu,
            Arch::X86,
            &descriptors(&[ArgType::AnsiString, ArgType::AnsiString]),
        )
        .unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].decoded_value, None);
        assert_eq!(args[1].decoded_value.as_deref(), Some("user32"));
    }
}
