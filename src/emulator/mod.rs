pub mod disasm;
pub mod memory;
#[cfg(feature = "unicorn")]
pub mod unicorn;

#[cfg(test)]
pub mod fake;

use bitflags::bitflags;

use crate::error::Result;

/// Registers the tracer needs by role rather than by architectural name.
/// The backend maps them onto the concrete register file (`Ret` is RAX/EAX,
/// `Arg0`..`Arg3` are RCX, RDX, R8, R9 on 64-bit Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Ip,
    Sp,
    Ret,
    Arg0,
    Arg1,
    Arg2,
    Arg3,
}

/// Registers carrying the first argument-register-class arguments, in
/// declared order.
pub const ARGUMENT_REGISTERS: [Reg; 4] = [Reg::Arg0, Reg::Arg1, Reg::Arg2, Reg::Arg3];

bitflags! {
    pub struct Protection: u32 {
        const READ = 1;
        const WRITE = 2;
        const EXEC = 4;
    }
}

/// The CPU-emulator collaborator. The interception engine is written
/// against this seam; hook installation stays on the host side (see
/// `ApiHook::start`).
pub trait Cpu {
    fn reg_read(&self, reg: Reg) -> Result<u64>;
    fn reg_write(&mut self, reg: Reg, value: u64) -> Result<()>;
    fn mem_read(&self, address: u64, buf: &mut [u8]) -> Result<()>;
    fn mem_write(&mut self, address: u64, data: &[u8]) -> Result<()>;
    /// Map a new region, failing if any part of it is already mapped.
    fn mem_map(&mut self, address: u64, size: usize, perms: Protection) -> Result<()>;
}
