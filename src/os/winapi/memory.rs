use crate::emulator::memory::mem_align_up;
use crate::emulator::Protection;
use crate::error::{Error, Result};
use crate::os::winapi::ApiContext;

// Only the allocator-chooses-address form (lpAddress == 0) is simulated:
// candidate bases are probed upward from `alloc_base` until one maps
// without colliding with an existing region. Explicit-address requests are
// logged and left to the real instruction stream.
pub fn virtual_alloc(ctx: &mut ApiContext) -> Result<()> {
    let lp_address = ctx.arg(0)?;
    let dw_size = ctx.arg(1)?;
    let fl_allocation_type = ctx.arg(2)?;
    let fl_protect = ctx.arg(3)?;
    log::debug!(
        "{:#x}: [WINAPI] VirtualAlloc(lpAddress = {:#x}, dwSize = {:#x}, flAllocationType = {:#x}, flProtect = {:#x})",
        ctx.address,
        lp_address,
        dw_size,
        fl_allocation_type,
        fl_protect
    );

    if lp_address != 0 {
        return Ok(());
    }

    let size = mem_align_up(dw_size, None);
    let mut base = ctx.config.alloc_base;
    let mut probes = 0u32;
    loop {
        if probes >= ctx.config.alloc_probe_limit {
            return Err(Error::AllocationProbesExhausted(probes));
        }
        match ctx.cpu.mem_map(
            base,
            size as usize,
            Protection::READ | Protection::WRITE | Protection::EXEC,
        ) {
            Ok(()) => break,
            Err(err) => {
                log::trace!("[WINAPI] VirtualAlloc cannot map {:#x}: {}", base, err);
                base += ctx.config.alloc_step;
                probes += 1;
            }
        }
    }

    log::debug!(
        "{:#x}: [WINAPI] VirtualAlloc => {:#x} (size {:#x})",
        ctx.address,
        base,
        size
    );
    ctx.return_from_call(4, base)
}
