use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use clap::Parser;
use unicorn_engine::unicorn_const::{Arch as UcArch, Mode, Permission};
use unicorn_engine::Unicorn;

use shellcode_tracer::emulator::memory::mem_align_up;
use shellcode_tracer::emulator::unicorn::{install_hooks, Context};
use shellcode_tracer::{ApiHook, Arch, Cpu, Reg, SignatureDb, SymbolMap};

const STACK_BASE: u64 = 0x20000000;
const STACK_SIZE: usize = 0x100000;

/// Trace Windows API calls made by emulated shellcode.
#[derive(Parser)]
struct Args {
    /// raw shellcode blob
    shellcode: PathBuf,

    /// JSON symbol file: [{"name": "kernel32", "base": ..., "symbols": {...}}]
    #[clap(long)]
    symbols: PathBuf,

    /// optional JSON signature pack merged over the built-in table
    #[clap(long)]
    signatures: Option<PathBuf>,

    /// target architecture (x86, amd64)
    #[clap(long, default_value = "x86")]
    arch: String,

    /// load address of the shellcode
    #[clap(long, default_value = "0x400000")]
    base: String,

    /// caller-address filter range, start-end inclusive (repeatable);
    /// no ranges means every caller is logged
    #[clap(long = "log-range")]
    log_range: Vec<String>,

    /// output call-log path
    #[clap(long, default_value = "api_log.json")]
    out: PathBuf,
}

fn parse_address(text: &str) -> anyhow::Result<u64> {
    let text = text.trim();
    match text.strip_prefix("0x") {
        Some(hex) => Ok(u64::from_str_radix(hex, 16)?),
        None => Ok(text.parse()?),
    }
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let arch: Arch = args.arch.parse().map_err(anyhow::Error::msg)?;
    let base = parse_address(&args.base)?;
    let shellcode = std::fs::read(&args.shellcode)
        .with_context(|| format!("cannot read {}", args.shellcode.display()))?;

    let debugger = SymbolMap::from_json_file(&args.symbols)
        .with_context(|| format!("cannot load symbols from {}", args.symbols.display()))?;
    let mut signatures = SignatureDb::builtin();
    if let Some(path) = &args.signatures {
        let added = signatures.merge_json_file(path)?;
        log::info!("merged {} signatures from {}", added, path.display());
    }

    let mut hook = ApiHook::new(arch, debugger, signatures);
    for range in &args.log_range {
        let (start, end) = range
            .split_once('-')
            .with_context(|| format!("bad log range: {}", range))?;
        hook.add_log_address_range(parse_address(start)?, parse_address(end)?);
    }

    let (uc_arch, uc_mode) = match arch {
        Arch::X86 => (UcArch::X86, Mode::MODE_32),
        Arch::Amd64 => (UcArch::X86, Mode::MODE_64),
    };
    let hook = Arc::new(Mutex::new(hook));
    let context = Context {
        arch,
        hook: hook.clone(),
    };
    let mut unicorn = Unicorn::new_with_data(uc_arch, uc_mode, context)
        .map_err(|err| anyhow::anyhow!("Unicorn error: {:?}", err))?;

    let code_size = mem_align_up(shellcode.len() as u64, None) as usize;
    unicorn
        .mem_map(base, code_size, Permission::all())
        .map_err(|err| anyhow::anyhow!("Unicorn mem_map error: {:?}", err))?;
    unicorn
        .mem_write(base, &shellcode)
        .map_err(|err| anyhow::anyhow!("Unicorn mem_write error: {:?}", err))?;

    unicorn
        .mem_map(
            STACK_BASE,
            STACK_SIZE,
            Permission::READ | Permission::WRITE,
        )
        .map_err(|err| anyhow::anyhow!("Unicorn mem_map error: {:?}", err))?;
    Cpu::reg_write(
        &mut unicorn,
        Reg::Sp,
        STACK_BASE + STACK_SIZE as u64 - 0x1000,
    )?;

    install_hooks(&mut unicorn, hook.clone())?;

    log::info!(
        "========== Start emulation (entry: {:#x}, {} bytes) ==========",
        base,
        shellcode.len()
    );
    if let Err(err) = unicorn.emu_start(base, base + shellcode.len() as u64, 0, 0) {
        log::warn!("emulation stopped: {:?}", err);
    }

    let hook = hook.lock().unwrap();
    hook.save_log(&args.out)?;
    log::info!(
        "saved {} api calls to {}",
        hook.log().len(),
        args.out.display()
    );
    Ok(())
}
