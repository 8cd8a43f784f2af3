pub mod arguments;
pub mod call_log;

use std::collections::{HashMap, HashSet};

use crate::api::ApiResolver;
use crate::arch::Arch;
use crate::debugger::Debugger;
use crate::emulator::{disasm, memory, Cpu, Reg};
use crate::error::Result;
use crate::hook::call_log::{CallLog, CallRecord};
use crate::os::winapi::{self, ApiContext, ApiHandler, SimConfig};

/// Modules whose exports are instrumented by default.
pub const DEFAULT_TRACE_MODULES: [&str; 3] = ["ntdll", "kernel32", "kernelbase"];

// legacy fast-system-call encoding
const SYSENTER: [u8; 2] = [0x0f, 0x34];

/// Inclusive caller-address bound. No configured ranges means every caller
/// is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: u64,
    pub end: u64,
}

impl AddressRange {
    fn contains(&self, address: u64) -> bool {
        self.start <= address && address <= self.end
    }
}

/// One tracing session: the module allow-list, caller-address filters,
/// simulator table, and call log, plus the debugger and signature-resolver
/// collaborators. Owned by the host and passed by reference into the
/// interception callback; stepping is single-threaded, so no locking.
pub struct ApiHook<D: Debugger, R: ApiResolver> {
    arch: Arch,
    debugger: D,
    resolver: R,
    trace_modules: Vec<String>,
    log_addresses: Vec<AddressRange>,
    hooked_addresses: HashSet<u64>,
    handlers: HashMap<String, ApiHandler>,
    config: SimConfig,
    log: CallLog,
}

impl<D: Debugger, R: ApiResolver> ApiHook<D, R> {
    pub fn new(arch: Arch, debugger: D, resolver: R) -> Self {
        Self {
            arch,
            debugger,
            resolver,
            trace_modules: DEFAULT_TRACE_MODULES.iter().map(|m| m.to_string()).collect(),
            log_addresses: Vec::new(),
            hooked_addresses: HashSet::new(),
            handlers: winapi::handlers(),
            config: SimConfig::default(),
            log: CallLog::new(),
        }
    }

    pub fn set_trace_modules(&mut self, modules: Vec<String>) {
        self.trace_modules = modules;
    }

    pub fn add_trace_module(&mut self, module: &str) {
        self.trace_modules.push(module.to_string());
    }

    pub fn add_log_address_range(&mut self, start: u64, end: u64) {
        self.log_addresses.push(AddressRange { start, end });
    }

    pub fn register_handler(&mut self, name: &str, handler: ApiHandler) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn config_mut(&mut self) -> &mut SimConfig {
        &mut self.config
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn save_log(&self, path: &std::path::Path) -> Result<()> {
        self.log.save(path)
    }

    fn check_log_address(&self, address: u64) -> bool {
        if self.log_addresses.is_empty() {
            return true;
        }
        self.log_addresses.iter().any(|r| r.contains(address))
    }

    /// Load symbols for the allow-listed modules and hand every unique
    /// export address to `install` exactly once, whatever the number of
    /// symbol aliases pointing at it. Installer errors propagate
    /// unmodified.
    pub fn start<F>(&mut self, mut install: F) -> Result<()>
    where
        F: FnMut(u64) -> Result<()>,
    {
        self.debugger.load_symbols(&self.trace_modules)?;

        for (symbol, address) in self.debugger.symbols() {
            if !self.hooked_addresses.insert(address) {
                continue;
            }
            log::debug!("hooking {} ({:#x})", symbol, address);
            install(address)?;
        }
        Ok(())
    }

    /// The interception callback. Runs synchronously between two emulator
    /// steps and must never propagate a failure into the host.
    pub fn on_code(&mut self, cpu: &mut dyn Cpu, address: u64, size: u32) {
        if let Err(err) = self.intercept(cpu, address, size) {
            log::error!("interception at {:#x} failed: {}", address, err);
        }
    }

    fn intercept(&mut self, cpu: &mut dyn Cpu, address: u64, size: u32) -> Result<()> {
        let return_address = memory::return_address(cpu, self.arch)?;
        if !self.check_log_address(return_address) {
            return Ok(());
        }

        let name = match self.debugger.find_symbol(address) {
            Some(name) => name,
            None => {
                disasm::dump_disassembly(cpu, self.arch, address, size as usize);
                String::new()
            }
        };

        let sp = cpu.reg_read(Reg::Sp)?;
        log::debug!(
            "{:#x}: {} ({:#x}) - return: {:#x}",
            sp,
            name,
            address,
            return_address
        );

        // signatures are keyed by bare function name; the module prefix is
        // dropped, so identically named exports share one signature
        let function_name = match name.split_once('!') {
            Some((_, function)) => function,
            None => name.as_str(),
        };
        let descriptors = self
            .resolver
            .find_function(function_name)
            .map(|signature| signature.arguments.clone())
            .unwrap_or_default();

        let arguments = match arguments::extract(cpu, self.arch, &descriptors) {
            Ok(arguments) => arguments,
            Err(err) => {
                log::warn!("cannot extract arguments of {}: {}", name, err);
                Vec::new()
            }
        };

        self.log
            .append(CallRecord::new(name.clone(), arguments.clone()));

        if let Some(handler) = self.handlers.get(&name).copied() {
            let mut context = ApiContext {
                cpu: &mut *cpu,
                debugger: &mut self.debugger,
                arch: self.arch,
                config: &self.config,
                address,
                return_address,
                arguments: &arguments,
            };
            if let Err(err) = handler(&mut context) {
                log::error!("simulating {} failed: {}", name, err);
            }
        }

        if size as usize == SYSENTER.len() {
            let mut code = [0u8; 2];
            if cpu.mem_read(address, &mut code).is_ok() && code == SYSENTER {
                log::debug!("{:#x}: legacy fast system call", address);
                disasm::dump_disassembly(cpu, self.arch, address, 16);
            }
        }
        Ok(())
    }
}
