use std::collections::HashMap;

use crate::emulator::{Cpu, Protection, Reg};
use crate::error::{Error, Result};

/// In-memory CPU stand-in for the engine tests: a register file plus a set
/// of sparse mapped regions. `mem_map` refuses collisions like a real MMU,
/// which is what the allocation-probe tests lean on.
pub struct FakeCpu {
    regs: HashMap<Reg, u64>,
    regions: Vec<Region>,
}

struct Region {
    start: u64,
    data: Vec<u8>,
}

impl Region {
    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }
}

impl FakeCpu {
    pub fn new() -> Self {
        Self {
            regs: HashMap::new(),
            regions: Vec::new(),
        }
    }

    pub fn map(&mut self, start: u64, size: usize) {
        self.mem_map(start, size, Protection::READ | Protection::WRITE)
            .unwrap();
    }

    pub fn write(&mut self, address: u64, data: &[u8]) {
        self.mem_write(address, data).unwrap();
    }

    pub fn read_vec(&self, address: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.mem_read(address, &mut buf).unwrap();
        buf
    }

    pub fn is_mapped(&self, address: u64) -> bool {
        self.regions
            .iter()
            .any(|r| r.start <= address && address < r.end())
    }

    fn region_offset(&self, address: u64, len: usize) -> Option<(usize, usize)> {
        self.regions
            .iter()
            .position(|r| r.start <= address && address + len as u64 <= r.end())
            .map(|index| (index, (address - self.regions[index].start) as usize))
    }
}

impl Cpu for FakeCpu {
    fn reg_read(&self, reg: Reg) -> Result<u64> {
        Ok(self.regs.get(&reg).copied().unwrap_or(0))
    }

    fn reg_write(&mut self, reg: Reg, value: u64) -> Result<()> {
        self.regs.insert(reg, value);
        Ok(())
    }

    fn mem_read(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        match self.region_offset(address, buf.len()) {
            Some((index, offset)) => {
                buf.copy_from_slice(&self.regions[index].data[offset..offset + buf.len()]);
                Ok(())
            }
            None => Err(Error::MemoryAccess {
                address,
                size: buf.len(),
            }),
        }
    }

    fn mem_write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        match self.region_offset(address, data.len()) {
            Some((index, offset)) => {
                self.regions[index].data[offset..offset + data.len()].copy_from_slice(data);
                Ok(())
            }
            None => Err(Error::MemoryAccess {
                address,
                size: data.len(),
            }),
        }
    }

    fn mem_map(&mut self, address: u64, size: usize, _perms: Protection) -> Result<()> {
        let end = address + size as u64;
        if self
            .regions
            .iter()
            .any(|r| address < r.end() && r.start < end)
        {
            return Err(Error::Emulator(format!(
                "region {:#x} - {:#x} is already mapped",
                address, end
            )));
        }
        self.regions.push(Region {
            start: address,
            data: vec![0u8; size],
        });
        Ok(())
    }
}
