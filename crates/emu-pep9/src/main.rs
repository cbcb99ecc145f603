//! Pep/9 batch runner.
//!
//! ```text
//! emu-pep9 run -s prog.pepo [-i input.txt] [-o output.txt]
//!              [--os os.pepo] [--echo-output] [-m maxSteps]
//! ```
//!
//! Executes assembled object code to completion; exit code 0 on clean
//! termination. Input is buffered behind the charIn port; everything the
//! program writes to charOut lands in the output file (or stdout when no
//! file is given). The assembler and microassembler front ends live
//! outside this binary — it consumes their object output.

use std::fs;
use std::path::PathBuf;
use std::process;

use emu_pep9::{MachineConfig, OsImage, Pep9Machine, parse_object_code};
use log::error;

struct CliArgs {
    program_path: PathBuf,
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    os_path: Option<PathBuf>,
    echo_output: bool,
    max_steps: u64,
}

const DEFAULT_MAX_STEPS: u64 = 25_000;

fn usage() -> ! {
    eprintln!(
        "usage: emu-pep9 run -s <obj> [-i <in>] [-o <out>] [--os <obj>] [--echo-output] [-m <maxSteps>]"
    );
    process::exit(2);
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] != "run" {
        usage();
    }

    let mut program_path = None;
    let mut input_path = None;
    let mut output_path = None;
    let mut os_path = None;
    let mut echo_output = false;
    let mut max_steps = DEFAULT_MAX_STEPS;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-s" => {
                i += 1;
                program_path = args.get(i).map(PathBuf::from);
            }
            "-i" => {
                i += 1;
                input_path = args.get(i).map(PathBuf::from);
            }
            "-o" => {
                i += 1;
                output_path = args.get(i).map(PathBuf::from);
            }
            "--os" => {
                i += 1;
                os_path = args.get(i).map(PathBuf::from);
            }
            "--echo-output" => echo_output = true,
            "-m" => {
                i += 1;
                max_steps = args
                    .get(i)
                    .and_then(|value| value.parse().ok())
                    .unwrap_or_else(|| usage());
            }
            _ => usage(),
        }
        i += 1;
    }

    let Some(program_path) = program_path else {
        usage();
    };
    CliArgs {
        program_path,
        input_path,
        output_path,
        os_path,
        echo_output,
        max_steps,
    }
}

fn main() {
    env_logger::init();
    let cli = parse_args();

    let program_text = match fs::read_to_string(&cli.program_path) {
        Ok(text) => text,
        Err(err) => {
            error!("cannot read {}: {err}", cli.program_path.display());
            process::exit(1);
        }
    };
    let program = match parse_object_code(&program_text) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("{}: {err}", cli.program_path.display());
            process::exit(1);
        }
    };

    let mut config = MachineConfig::default();
    if let Some(os_path) = &cli.os_path {
        let os_text = match fs::read_to_string(os_path) {
            Ok(text) => text,
            Err(err) => {
                error!("cannot read {}: {err}", os_path.display());
                process::exit(1);
            }
        };
        let os_bytes = match parse_object_code(&os_text) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("{}: {err}", os_path.display());
                process::exit(1);
            }
        };
        config.os = match OsImage::new(os_bytes, 0xFFFF) {
            Ok(os) => os,
            Err(err) => {
                error!("{}: {err}", os_path.display());
                process::exit(1);
            }
        };
    }

    let mut machine = Pep9Machine::new(config);
    machine.load_program(&program);

    if let Some(input_path) = &cli.input_path {
        match fs::read(input_path) {
            Ok(data) => machine.buffer_input(&data),
            Err(err) => {
                error!("cannot read {}: {err}", input_path.display());
                process::exit(1);
            }
        }
    }
    if cli.echo_output {
        machine.echo_output_to_stdout();
    }

    let outcome = machine.run(cli.max_steps);

    match &cli.output_path {
        Some(path) => {
            if let Err(err) = fs::write(path, &outcome.output) {
                error!("cannot write {}: {err}", path.display());
                process::exit(1);
            }
        }
        None if !cli.echo_output => {
            print!("{}", String::from_utf8_lossy(&outcome.output));
        }
        None => {}
    }

    if !outcome.success {
        error!(
            "simulation failed after {} instructions: {}",
            outcome.instructions,
            outcome.error.unwrap_or_else(|| "unknown error".to_string())
        );
        process::exit(1);
    }
}
