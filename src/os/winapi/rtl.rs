use crate::error::Result;
use crate::os::winapi::ApiContext;

// Logging point only. The call proceeds into the mapped callee (or faults
// if it is not mapped).
// TODO: decompress COMPRESSION_FORMAT_LZNT1 payloads into the output
// buffer so unpacking shellcode can continue past this call.
pub fn rtl_decompress_buffer(ctx: &mut ApiContext) -> Result<()> {
    let compression_format = ctx.arg(0)?;
    let uncompressed_buffer = ctx.arg(1)?;
    let uncompressed_buffer_size = ctx.arg(2)?;
    let compressed_buffer = ctx.arg(3)?;
    let compressed_buffer_size = ctx.arg(4)?;
    let final_uncompressed_size = ctx.arg(5)?;
    log::debug!(
        "{:#x}: [WINAPI] RtlDecompressBuffer(CompressionFormat = {:#x}, UncompressedBuffer = {:#x}, UncompressedBufferSize = {:#x}, CompressedBuffer = {:#x}, CompressedBufferSize = {:#x}, FinalUncompressedSize = {:#x})",
        ctx.address,
        compression_format,
        uncompressed_buffer,
        uncompressed_buffer_size,
        compressed_buffer,
        compressed_buffer_size,
        final_uncompressed_size
    );
    Ok(())
}
