mod file;
mod loader;
mod memory;
mod rtl;

use std::collections::HashMap;

use crate::arch::Arch;
use crate::debugger::Debugger;
use crate::emulator::memory::stack_arg;
use crate::emulator::{Cpu, Reg, ARGUMENT_REGISTERS};
use crate::error::Result;
use crate::hook::call_log::ArgumentValue;

/// A behavior simulator: fabricates the observable effect of one OS
/// function. Plain function pointers keep the dispatch table a closed,
/// statically registered mapping.
pub type ApiHandler = fn(&mut ApiContext) -> Result<()>;

/// Placeholder addresses and sizes used by the simulators. Development
/// stand-ins, not faithful OS behavior.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// first candidate base for allocator-chosen mappings
    pub alloc_base: u64,
    /// distance between successive allocation candidates
    pub alloc_step: u64,
    /// candidates probed before the allocation simulator gives up
    pub alloc_probe_limit: u32,
    /// fixed size reported for every file-size query
    pub file_size_stub: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            alloc_base: 0x70000,
            alloc_step: 0x10000,
            alloc_probe_limit: 1024,
            file_size_stub: 0x7bafe,
        }
    }
}

/// Everything a simulator may touch: the CPU, the debugger, the extracted
/// declared arguments, and the stack for undeclared ones.
pub struct ApiContext<'a> {
    pub cpu: &'a mut dyn Cpu,
    pub debugger: &'a mut dyn Debugger,
    pub arch: Arch,
    pub config: &'a SimConfig,
    /// address of the intercepted instruction
    pub address: u64,
    /// caller's return address, read from the stack at interception time
    pub return_address: u64,
    /// arguments already extracted per the declared signature
    pub arguments: &'a [ArgumentValue],
}

impl ApiContext<'_> {
    /// Argument by call position: the extracted value when the signature
    /// covered it, otherwise read from the convention's slot directly.
    pub fn arg(&self, index: usize) -> Result<u64> {
        if let Some(argument) = self.arguments.get(index) {
            return Ok(argument.value);
        }
        let reg_count = self.arch.register_argument_count();
        if index < reg_count {
            return self.cpu.reg_read(ARGUMENT_REGISTERS[index]);
        }
        stack_arg(&*self.cpu, self.arch, index - reg_count)
    }

    pub fn return_from_call(&mut self, arg_count: u64, return_value: u64) -> Result<()> {
        return_from_call(
            self.cpu,
            self.arch,
            self.return_address,
            arg_count,
            return_value,
        )
    }
}

/// Call-return simulation: make the CPU look as if the callee had executed
/// and returned without running its body. Sets IP to the return address,
/// pops the return address plus `arg_count` caller-cleaned slots, and sets
/// the return-value register.
pub fn return_from_call(
    cpu: &mut dyn Cpu,
    arch: Arch,
    return_address: u64,
    arg_count: u64,
    return_value: u64,
) -> Result<()> {
    cpu.reg_write(Reg::Ip, return_address)?;
    let sp = cpu.reg_read(Reg::Sp)?;
    let new_sp = sp + arch.word_size() * (arg_count + 1);
    log::trace!(
        "[WINAPI] return to {:#x}, sp {:#x} -> {:#x}, value {:#x}",
        return_address,
        sp,
        new_sp,
        return_value
    );
    cpu.reg_write(Reg::Sp, new_sp)?;
    cpu.reg_write(Reg::Ret, return_value)
}

/// The full simulator table, keyed by canonical `module!function` name.
pub fn handlers() -> HashMap<String, ApiHandler> {
    let mut table: HashMap<String, ApiHandler> = HashMap::new();
    table.insert("ntdll!LdrLoadDll".to_string(), loader::ldr_load_dll as ApiHandler);
    table.insert(
        "kernel32!GetProcAddress".to_string(),
        loader::get_proc_address as ApiHandler,
    );
    table.insert(
        "kernel32!LoadLibraryA".to_string(),
        loader::load_library_a as ApiHandler,
    );
    table.insert("kernel32!WinExec".to_string(), loader::win_exec as ApiHandler);
    table.insert(
        "kernel32!VirtualAlloc".to_string(),
        memory::virtual_alloc as ApiHandler,
    );
    table.insert(
        "KERNELBASE!VirtualAlloc".to_string(),
        memory::virtual_alloc as ApiHandler,
    );
    table.insert(
        "ntdll!RtlDecompressBuffer".to_string(),
        rtl::rtl_decompress_buffer as ApiHandler,
    );
    table.insert(
        "kernel32!GetFileSize".to_string(),
        file::get_file_size as ApiHandler,
    );
    table
}
