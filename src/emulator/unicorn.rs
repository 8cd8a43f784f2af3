use std::sync::{Arc, Mutex};

use unicorn_engine::unicorn_const::Permission;
use unicorn_engine::{RegisterX86, Unicorn};

use crate::api::SignatureDb;
use crate::arch::Arch;
use crate::debugger::SymbolMap;
use crate::emulator::{Cpu, Protection, Reg};
use crate::error::{Error, Result};
use crate::hook::ApiHook;

/// Session data attached to the Unicorn instance.
#[derive(Clone)]
pub struct Context {
    pub arch: Arch,
    pub hook: Arc<Mutex<ApiHook<SymbolMap, SignatureDb>>>,
}

fn register_id(arch: Arch, reg: Reg) -> Result<RegisterX86> {
    match (arch, reg) {
        (Arch::X86, Reg::Ip) => Ok(RegisterX86::EIP),
        (Arch::X86, Reg::Sp) => Ok(RegisterX86::ESP),
        (Arch::X86, Reg::Ret) => Ok(RegisterX86::EAX),
        (Arch::X86, _) => Err(Error::Emulator(
            "no argument registers in the 32-bit convention".to_string(),
        )),
        (Arch::Amd64, Reg::Ip) => Ok(RegisterX86::RIP),
        (Arch::Amd64, Reg::Sp) => Ok(RegisterX86::RSP),
        (Arch::Amd64, Reg::Ret) => Ok(RegisterX86::RAX),
        (Arch::Amd64, Reg::Arg0) => Ok(RegisterX86::RCX),
        (Arch::Amd64, Reg::Arg1) => Ok(RegisterX86::RDX),
        (Arch::Amd64, Reg::Arg2) => Ok(RegisterX86::R8),
        (Arch::Amd64, Reg::Arg3) => Ok(RegisterX86::R9),
    }
}

fn to_permission(perms: Protection) -> Permission {
    let mut uc_perms = Permission::NONE;
    if perms.contains(Protection::READ) {
        uc_perms |= Permission::READ;
    }
    if perms.contains(Protection::WRITE) {
        uc_perms |= Permission::WRITE;
    }
    if perms.contains(Protection::EXEC) {
        uc_perms |= Permission::EXEC;
    }
    uc_perms
}

impl Cpu for Unicorn<'_, Context> {
    fn reg_read(&self, reg: Reg) -> Result<u64> {
        let id = register_id(self.get_data().arch, reg)?;
        Unicorn::reg_read(self, id)
            .map_err(|err| Error::Emulator(format!("Unicorn reg_read error: {:?}", err)))
    }

    fn reg_write(&mut self, reg: Reg, value: u64) -> Result<()> {
        let id = register_id(self.get_data().arch, reg)?;
        Unicorn::reg_write(self, id, value)
            .map_err(|err| Error::Emulator(format!("Unicorn reg_write error: {:?}", err)))
    }

    fn mem_read(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        Unicorn::mem_read(self, address, buf).map_err(|_| Error::MemoryAccess {
            address,
            size: buf.len(),
        })
    }

    fn mem_write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        Unicorn::mem_write(self, address, data).map_err(|_| Error::MemoryAccess {
            address,
            size: data.len(),
        })
    }

    fn mem_map(&mut self, address: u64, size: usize, perms: Protection) -> Result<()> {
        Unicorn::mem_map(self, address, size, to_permission(perms))
            .map_err(|err| Error::Emulator(format!("Unicorn mem_map error: {:?}", err)))
    }
}

/// Install one code hook per unique export address selected by the
/// session. Each hook locks the session and runs the interception
/// callback; stepping is single-threaded, so the lock is never contended.
pub fn install_hooks(
    unicorn: &mut Unicorn<'_, Context>,
    hook: Arc<Mutex<ApiHook<SymbolMap, SignatureDb>>>,
) -> Result<()> {
    let mut session = hook.lock().unwrap();
    session.start(|address| {
        unicorn
            .add_code_hook(address, address, |uc, address, size| {
                let hook = uc.get_data().hook.clone();
                hook.lock().unwrap().on_code(uc, address, size as u32);
            })
            .map(|_| ())
            .map_err(|err| Error::Emulator(format!("Unicorn hook error: {:?}", err)))
    })
}
