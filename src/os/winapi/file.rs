use crate::error::Result;
use crate::os::winapi::ApiContext;

// Every query gets the same placeholder size, whatever the handle. An
// approximate stand-in, good enough for unpacker loops that only need a
// plausible length.
pub fn get_file_size(ctx: &mut ApiContext) -> Result<()> {
    let h_file = ctx.arg(0)?;
    let lp_file_size_high = ctx.arg(1)?;
    log::debug!(
        "{:#x}: [WINAPI] GetFileSize(hFile = {:#x}, lpFileSizeHigh = {:#x}) => {:#x}",
        ctx.address,
        h_file,
        lp_file_size_high,
        ctx.config.file_size_stub
    );
    let size = ctx.config.file_size_stub;
    ctx.return_from_call(2, size)
}
