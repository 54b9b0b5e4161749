//! `vmrun` — a thin host binary that loads a raw program image from disk
//! and drives the `vm` crate's run/step loop, optionally printing a
//! disassembly trace as it goes.

use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use logger::StdoutSink;
use vm::{StepOutcome, Vm, VmConfig};

/// Load and run a raw VM program image.
#[derive(Debug, Parser)]
#[command(name = "vmrun", version, about)]
struct Args {
    /// Path to a flat binary program image.
    image: String,

    /// Byte address at which to load the image.
    #[arg(long, value_parser = parse_u32, default_value = "0")]
    base: u32,

    /// Stop after this many retired instructions, even if the program
    /// hasn't halted.
    #[arg(long, default_value_t = 1_000_000)]
    max_steps: u32,

    /// Print each instruction's disassembly before executing it.
    #[arg(long)]
    disasm: bool,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("vmrun: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<u32> {
    let image = fs::read(&args.image)
        .with_context(|| format!("reading image {}", args.image))?;

    let mut vm = Vm::with_sink(VmConfig::new(), Box::new(StdoutSink));
    vm.load_image(&image, args.base);

    if args.disasm {
        run_traced(&mut vm, args.max_steps)
    } else {
        match vm.run(args.max_steps) {
            StepOutcome::Fault(fault) => anyhow::bail!("vm fault: {fault}"),
            _ => Ok(()),
        }
    }?;

    Ok(vm.exit_code.unwrap_or(0))
}

fn run_traced(vm: &mut Vm, max_steps: u32) -> Result<()> {
    for _ in 0..max_steps {
        let mut word = [0u8; 4];
        let pc = vm.pc();
        if vm.read_memory(pc, &mut word).is_ok() {
            println!("{pc:08X}: {}", Vm::disassemble(u32::from_le_bytes(word)));
        }
        match vm.step() {
            StepOutcome::Continued | StepOutcome::SingleStep => {}
            StepOutcome::Breakpoint => println!("-- breakpoint --"),
            StepOutcome::Halted => break,
            StepOutcome::Fault(fault) => anyhow::bail!("vm fault: {fault}"),
        }
    }
    Ok(())
}
