use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Closed set of argument type tags. Only the two string-pointer variants
/// ever cause a memory dereference during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    Integer,
    AnsiString,
    WideString,
    Unknown,
}

impl ArgType {
    /// Map a Windows API type name from a signature pack onto a tag.
    pub fn from_windows_type(name: &str) -> ArgType {
        match name {
            "LPCSTR" | "LPSTR" | "PCSTR" | "PSTR" | "PCHAR" => ArgType::AnsiString,
            "LPCWSTR" | "LPWSTR" | "PCWSTR" | "PWSTR" | "PWCHAR" => ArgType::WideString,
            "BOOL" | "BYTE" | "WORD" | "DWORD" | "INT" | "UINT" | "LONG" | "ULONG"
            | "SIZE_T" | "HANDLE" | "HMODULE" | "HWND" | "LPVOID" | "PVOID" | "FARPROC"
            | "NTSTATUS" | "LARGE_INTEGER" => ArgType::Integer,
            _ => ArgType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDescriptor {
    pub name: Option<String>,
    pub ty: ArgType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub arguments: Vec<ArgumentDescriptor>,
}

/// The API-signature-database collaborator: bare function name to
/// signature, or unknown.
pub trait ApiResolver {
    fn find_function(&self, name: &str) -> Option<&FunctionSignature>;
}

// signature-pack file shape:
// {"functions": [{"name": "...", "arguments": [{"name": "...", "type": "LPCWSTR"}]}]}
#[derive(Debug, Deserialize)]
struct SignaturePack {
    functions: Vec<PackFunction>,
}

#[derive(Debug, Deserialize)]
struct PackFunction {
    name: String,
    #[serde(default)]
    arguments: Vec<PackArgument>,
}

#[derive(Debug, Deserialize)]
struct PackArgument {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    ty: String,
}

/// Signature database keyed by bare function name. Known limitation,
/// preserved on purpose: lookups are not module-qualified, so identically
/// named exports from different modules share one signature.
#[derive(Debug, Default)]
pub struct SignatureDb {
    functions: HashMap<String, FunctionSignature>,
}

impl SignatureDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in signatures for the default allow-listed system libraries.
    pub fn builtin() -> Self {
        use ArgType::{AnsiString, Integer, WideString};

        let mut db = Self::new();
        db.define("LdrLoadDll", &[
            ("PathToFile", WideString),
            ("Flags", Integer),
            ("ModuleFileName", WideString),
            ("ModuleHandle", Integer),
        ]);
        db.define("GetProcAddress", &[
            ("hModule", Integer),
            ("lpProcName", AnsiString),
        ]);
        db.define("LoadLibraryA", &[("lpLibFileName", AnsiString)]);
        db.define("LoadLibraryW", &[("lpLibFileName", WideString)]);
        db.define("GetModuleHandleA", &[("lpModuleName", AnsiString)]);
        db.define("VirtualAlloc", &[
            ("lpAddress", Integer),
            ("dwSize", Integer),
            ("flAllocationType", Integer),
            ("flProtect", Integer),
        ]);
        db.define("VirtualProtect", &[
            ("lpAddress", Integer),
            ("dwSize", Integer),
            ("flNewProtect", Integer),
            ("lpflOldProtect", Integer),
        ]);
        db.define("RtlDecompressBuffer", &[
            ("CompressionFormat", Integer),
            ("UncompressedBuffer", Integer),
            ("UncompressedBufferSize", Integer),
            ("CompressedBuffer", Integer),
            ("CompressedBufferSize", Integer),
            ("FinalUncompressedSize", Integer),
        ]);
        db.define("GetFileSize", &[
            ("hFile", Integer),
            ("lpFileSizeHigh", Integer),
        ]);
        db.define("WinExec", &[("lpCmdLine", AnsiString), ("uCmdShow", Integer)]);
        db.define("CreateFileA", &[
            ("lpFileName", AnsiString),
            ("dwDesiredAccess", Integer),
            ("dwShareMode", Integer),
            ("lpSecurityAttributes", Integer),
            ("dwCreationDisposition", Integer),
            ("dwFlagsAndAttributes", Integer),
            ("hTemplateFile", Integer),
        ]);
        db.define("WriteFile", &[
            ("hFile", Integer),
            ("lpBuffer", Integer),
            ("nNumberOfBytesToWrite", Integer),
            ("lpNumberOfBytesWritten", Integer),
            ("lpOverlapped", Integer),
        ]);
        db.define("CloseHandle", &[("hObject", Integer)]);
        db.define("Sleep", &[("dwMilliseconds", Integer)]);
        db.define("ExitProcess", &[("uExitCode", Integer)]);
        db
    }

    pub fn define(&mut self, name: &str, arguments: &[(&str, ArgType)]) {
        self.functions.insert(
            name.to_string(),
            FunctionSignature {
                name: name.to_string(),
                arguments: arguments
                    .iter()
                    .map(|(arg_name, ty)| ArgumentDescriptor {
                        name: Some(arg_name.to_string()),
                        ty: *ty,
                    })
                    .collect(),
            },
        );
    }

    /// Merge a JSON signature pack; returns the number of functions added
    /// or replaced.
    pub fn merge_json_file(&mut self, path: &Path) -> Result<usize> {
        let file = std::fs::File::open(path)?;
        let pack: SignaturePack = serde_json::from_reader(file)?;
        let count = pack.functions.len();
        for function in pack.functions {
            let signature = FunctionSignature {
                name: function.name.clone(),
                arguments: function
                    .arguments
                    .into_iter()
                    .map(|arg| ArgumentDescriptor {
                        name: arg.name,
                        ty: ArgType::from_windows_type(&arg.ty),
                    })
                    .collect(),
            };
            self.functions.insert(function.name, signature);
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl ApiResolver for SignatureDb {
    fn find_function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_signatures_resolve_by_bare_name() {
        let db = SignatureDb::builtin();
        let sig = db.find_function("GetFileSize").unwrap();
        assert_eq!(sig.arguments.len(), 2);
        assert_eq!(sig.arguments[0].name.as_deref(), Some("hFile"));
        assert!(db.find_function("NtCreateThreadEx").is_none());
    }

    #[test]
    fn windows_type_names_map_onto_the_closed_enum() {
        assert_eq!(ArgType::from_windows_type("LPCWSTR"), ArgType::WideString);
        assert_eq!(ArgType::from_windows_type("LPSTR"), ArgType::AnsiString);
        assert_eq!(ArgType::from_windows_type("DWORD"), ArgType::Integer);
        assert_eq!(ArgType::from_windows_type("PSECURITY_DESCRIPTOR"), ArgType::Unknown);
    }

    #[test]
    fn merges_a_signature_pack() {
        let pack = r#"{
            "functions": [
                {
                    "name": "CreateFileW",
                    "arguments": [
                        {"name": "lpFileName", "type": "LPCWSTR"},
                        {"name": "dwDesiredAccess", "type": "DWORD"}
                    ]
                }
            ]
        }"#;
        let path = std::env::temp_dir().join(format!("sig_pack_{}.json", std::process::id()));
        std::fs::write(&path, pack).unwrap();

        let mut db = SignatureDb::builtin();
        let added = db.merge_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(added, 1);
        let sig = db.find_function("CreateFileW").unwrap();
        assert_eq!(sig.arguments[0].ty, ArgType::WideString);
        assert_eq!(sig.arguments[1].ty, ArgType::Integer);
    }
}
