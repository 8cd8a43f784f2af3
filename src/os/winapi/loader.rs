use crate::emulator::memory::{read_string, read_wstring, write_word};
use crate::os::winapi::ApiContext;
use crate::error::Result;

// LdrLoadDll never runs its body here: the referenced module is already
// known to the debugger, so the out-handle is filled with its base and the
// call is returned. Observed success code is 1, not STATUS_SUCCESS.
pub fn ldr_load_dll(ctx: &mut ApiContext) -> Result<()> {
    let path_to_file = ctx.arg(0)?;
    let flags = ctx.arg(1)?;
    let module_filename_addr = ctx.arg(2)?;
    let module_handle_out = ctx.arg(3)?;
    log::debug!(
        "{:#x}: [WINAPI] LdrLoadDll(PathToFile = {:#x}, Flags = {:#x}, ModuleFileName = {:#x}, ModuleHandle = {:#x})",
        ctx.address,
        path_to_file,
        flags,
        module_filename_addr,
        module_handle_out
    );

    let module_filename = read_wstring(&*ctx.cpu, module_filename_addr)?;
    log::debug!("[WINAPI] LdrLoadDll module filename: {}", module_filename);

    let module_base = ctx.debugger.module_base(&module_filename).or_else(|| {
        // retry without the file extension
        let stem = module_filename
            .split('.')
            .next()
            .unwrap_or(&module_filename);
        ctx.debugger.module_base(stem)
    });

    match module_base {
        Some(base) => {
            log::debug!(
                "[WINAPI] LdrLoadDll module base {:#x} -> {:#x}",
                base,
                module_handle_out
            );
            write_word(ctx.cpu, ctx.arch, module_handle_out, base)?;
            ctx.return_from_call(4, 1)
        }
        None => {
            // no simulation; the call stays logged and execution proceeds
            log::warn!("[WINAPI] LdrLoadDll: unknown module {}", module_filename);
            Ok(())
        }
    }
}

// Export resolution is still a stub: when the debugger does not know the
// qualified symbol, the intercepted address itself is handed back.
pub fn get_proc_address(ctx: &mut ApiContext) -> Result<()> {
    let module_handle = ctx.arg(0)?;
    let proc_name_addr = ctx.arg(1)?;

    let module_name = ctx.debugger.module_from_base(module_handle).unwrap_or_default();
    let proc_name = read_string(&*ctx.cpu, proc_name_addr)?;
    let symbol = format!("{}!{}", module_name, proc_name);

    let resolved = ctx.debugger.symbol_address(&symbol).unwrap_or(ctx.address);
    log::debug!(
        "{:#x}: [WINAPI] GetProcAddress(hModule = {:#x}, lpProcName = {}) => {:#x}",
        ctx.address,
        module_handle,
        symbol,
        resolved
    );
    ctx.return_from_call(2, resolved)
}

// Logging point only. The target body is not mapped, so letting the call
// proceed will generally fault in the emulator; accepted.
pub fn load_library_a(ctx: &mut ApiContext) -> Result<()> {
    let filename_addr = ctx.arg(0)?;
    let filename = read_string(&*ctx.cpu, filename_addr)?;
    log::debug!(
        "{:#x}: [WINAPI] LoadLibraryA(lpLibFileName = {})",
        ctx.address,
        filename
    );
    Ok(())
}

pub fn win_exec(ctx: &mut ApiContext) -> Result<()> {
    let cmd_line_addr = ctx.arg(0)?;
    let cmd_show = ctx.arg(1)?;
    let cmd_line = match cmd_line_addr {
        0 => String::new(),
        addr => read_string(&*ctx.cpu, addr).unwrap_or_default(),
    };
    log::debug!(
        "{:#x}: [WINAPI] WinExec(lpCmdLine = {}, uCmdShow = {:#x})",
        ctx.address,
        cmd_line,
        cmd_show
    );
    // the command never runs; values above 31 mean success
    ctx.return_from_call(2, 33)
}
