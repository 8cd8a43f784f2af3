use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// The debugger / symbol-source collaborator. Symbols resolve to
/// `module!function` names; module-name matching is case-insensitive, the
/// way the Windows loader treats image names.
pub trait Debugger {
    /// Load symbol tables for the named modules. Unknown modules degrade to
    /// a diagnostic, not an error.
    fn load_symbols(&mut self, modules: &[String]) -> Result<()>;

    /// The full `module!symbol` -> address table of every loaded module.
    fn symbols(&self) -> Vec<(String, u64)>;

    fn find_symbol(&self, address: u64) -> Option<String>;

    /// Address of a qualified `module!symbol` name.
    fn symbol_address(&self, symbol: &str) -> Option<u64>;

    fn module_base(&self, module: &str) -> Option<u64>;

    fn module_from_base(&self, base: u64) -> Option<String>;
}

#[derive(Debug, Clone, Deserialize)]
struct ModuleSymbols {
    name: String,
    base: u64,
    #[serde(default)]
    symbols: HashMap<String, u64>,
}

/// In-memory symbol table, loadable from a JSON symbol file of the form
/// `[{"name": "kernel32", "base": ..., "symbols": {"GetFileSize": ...}}]`.
#[derive(Debug, Default)]
pub struct SymbolMap {
    // keyed by lowercased module name
    modules: HashMap<String, ModuleSymbols>,
    loaded: Vec<String>,
    address_to_symbol: HashMap<u64, String>,
}

impl SymbolMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let modules: Vec<ModuleSymbols> = serde_json::from_reader(file)?;
        let mut map = Self::new();
        for module in modules {
            map.modules.insert(module.name.to_lowercase(), module);
        }
        Ok(map)
    }

    pub fn add_module(&mut self, name: &str, base: u64) {
        self.modules.insert(
            name.to_lowercase(),
            ModuleSymbols {
                name: name.to_string(),
                base,
                symbols: HashMap::new(),
            },
        );
    }

    pub fn add_symbol(&mut self, module: &str, symbol: &str, address: u64) {
        if let Some(entry) = self.modules.get_mut(&module.to_lowercase()) {
            entry.symbols.insert(symbol.to_string(), address);
        }
    }
}

impl Debugger for SymbolMap {
    fn load_symbols(&mut self, modules: &[String]) -> Result<()> {
        self.loaded.clear();
        self.address_to_symbol.clear();
        for requested in modules {
            let key = requested.to_lowercase();
            match self.modules.get(&key) {
                Some(module) => {
                    for (symbol, address) in &module.symbols {
                        self.address_to_symbol
                            .insert(*address, format!("{}!{}", module.name, symbol));
                    }
                    self.loaded.push(key);
                }
                None => log::warn!("no symbols for module {}", requested),
            }
        }
        Ok(())
    }

    fn symbols(&self) -> Vec<(String, u64)> {
        let mut symbols = Vec::new();
        for key in &self.loaded {
            let module = &self.modules[key];
            for (symbol, address) in &module.symbols {
                symbols.push((format!("{}!{}", module.name, symbol), *address));
            }
        }
        symbols
    }

    fn find_symbol(&self, address: u64) -> Option<String> {
        self.address_to_symbol.get(&address).cloned()
    }

    fn symbol_address(&self, symbol: &str) -> Option<u64> {
        let (module, function) = symbol.split_once('!')?;
        self.modules
            .get(&module.to_lowercase())?
            .symbols
            .get(function)
            .copied()
    }

    fn module_base(&self, module: &str) -> Option<u64> {
        self.modules.get(&module.to_lowercase()).map(|m| m.base)
    }

    fn module_from_base(&self, base: u64) -> Option<String> {
        self.modules
            .values()
            .find(|m| m.base == base)
            .map(|m| m.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SymbolMap {
        let mut map = SymbolMap::new();
        map.add_module("kernel32", 0x7700_0000);
        map.add_symbol("kernel32", "GetFileSize", 0x7700_1000);
        map.add_symbol("kernel32", "VirtualAlloc", 0x7700_2000);
        map.load_symbols(&["kernel32".to_string()]).unwrap();
        map
    }

    #[test]
    fn resolves_loaded_symbols() {
        let map = sample();
        assert_eq!(
            map.find_symbol(0x7700_1000).as_deref(),
            Some("kernel32!GetFileSize")
        );
        assert_eq!(map.find_symbol(0x1234), None);
        assert_eq!(map.symbol_address("KERNEL32!VirtualAlloc"), Some(0x7700_2000));
        assert_eq!(map.symbols().len(), 2);
    }

    #[test]
    fn module_lookup_is_case_insensitive() {
        let map = sample();
        assert_eq!(map.module_base("KERNEL32"), Some(0x7700_0000));
        assert_eq!(map.module_base("ntdll"), None);
        assert_eq!(map.module_from_base(0x7700_0000).as_deref(), Some("kernel32"));
    }

    #[test]
    fn unknown_modules_degrade_to_a_diagnostic() {
        let mut map = SymbolMap::new();
        assert!(map.load_symbols(&["ntdll".to_string()]).is_ok());
        assert!(map.symbols().is_empty());
    }
}
