/// Target architecture of the emulated shellcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86,
    Amd64,
}

impl Arch {
    /// Width of a pointer / stack slot in bytes.
    pub fn word_size(&self) -> u64 {
        match self {
            Arch::X86 => 4,
            Arch::Amd64 => 8,
        }
    }

    /// Number of call arguments passed in registers before the
    /// convention spills to the stack.
    pub fn register_argument_count(&self) -> usize {
        match self {
            Arch::X86 => 0,
            Arch::Amd64 => 4,
        }
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x86" => Ok(Arch::X86),
            "amd64" | "x86_64" | "x64" => Ok(Arch::Amd64),
            other => Err(format!("unknown architecture: {}", other)),
        }
    }
}
