//! Traces Windows API calls made by shellcode under instruction-level
//! emulation: hooks the exports of the allow-listed system modules,
//! extracts call arguments per the target calling convention, fabricates
//! the effect of selected calls, and records everything to an ordered log.

pub mod api;
pub mod arch;
pub mod debugger;
pub mod emulator;
pub mod error;
pub mod hook;
pub mod os;

pub use crate::api::{ApiResolver, ArgType, ArgumentDescriptor, FunctionSignature, SignatureDb};
pub use crate::arch::Arch;
pub use crate::debugger::{Debugger, SymbolMap};
pub use crate::emulator::{Cpu, Protection, Reg};
pub use crate::error::{Error, Result};
pub use crate::hook::call_log::{ArgumentValue, CallLog, CallRecord};
pub use crate::hook::{AddressRange, ApiHook, DEFAULT_TRACE_MODULES};
pub use crate::os::winapi::{ApiContext, ApiHandler, SimConfig};
