use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("emulator error: {0}")]
    Emulator(String),

    #[error("memory access error at {address:#x} ({size} bytes)")]
    MemoryAccess { address: u64, size: usize },

    #[error("address space exhausted after {0} allocation probes")]
    AllocationProbesExhausted(u32),

    #[error("disassembly error: {0}")]
    Disasm(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
