use clap::Parser as ClapParser;
use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process,
};

use yar::{
    ArenaCreateInfo, DEFAULT_ARENA_CAPACITY, DEFAULT_MAX_CALL_DEPTH,
    DEFAULT_MAX_NESTING, DEFAULT_STACK_SIZE, FunctionTable, Value, Vm,
    VmCreateInfo, core_package,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input source files to execute in order
    #[arg(required = false, help = "The .yar files to execute")]
    files: Vec<String>,

    /// Keep reading commands once the files have run
    #[arg(long, help = "Interactive session after the files")]
    repl: bool,

    #[arg(long, default_value_t = DEFAULT_ARENA_CAPACITY)]
    arena_cells: usize,

    #[arg(long, default_value_t = DEFAULT_STACK_SIZE)]
    stack_size: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_NESTING)]
    max_nesting: usize,

    /// Restore a snapshot instead of booting a fresh vm
    #[arg(long, help = "Snapshot to start from")]
    load: Option<PathBuf>,

    /// Write a snapshot once all input has run
    #[arg(long, help = "Snapshot file to write on exit")]
    save: Option<PathBuf>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut vm = match boot(&cli) {
        Ok(vm) => vm,
        Err(err) => {
            eprintln!("yar: cannot start: {}", err);
            process::exit(1);
        }
    };

    for filename in &cli.files {
        let source_code = match fs::read_to_string(filename) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("yar: {}: {}", filename, err);
                process::exit(1);
            }
        };

        if let Err(err) = vm.execute(&source_code) {
            eprintln!("yar: {} failed: {}", filename, err);
            process::exit(1);
        }
    }

    if cli.repl || cli.files.is_empty() {
        run_repl(&mut vm);
    }

    if let Some(path) = &cli.save {
        let saved = vm.save().map_err(|e| e.to_string()).and_then(|bytes| {
            fs::write(path, bytes).map_err(|e| e.to_string())
        });
        if let Err(err) = saved {
            eprintln!("yar: cannot write {}: {}", path.display(), err);
            process::exit(1);
        }
    }
}

fn boot(cli: &Cli) -> Result<Vm, String> {
    let info = VmCreateInfo {
        arena: ArenaCreateInfo {
            capacity: cli.arena_cells,
        },
        stack_size: cli.stack_size,
        max_call_depth: cli.max_call_depth,
        max_nesting: cli.max_nesting,
    };

    if let Some(path) = &cli.load {
        let file = fs::File::open(path).map_err(|e| e.to_string())?;
        let functions = FunctionTable::from_packages([&core_package()]);
        return Vm::load_with(io::BufReader::new(file), &info, &functions)
            .map_err(|e| e.to_string());
    }
    Vm::new(&info).map_err(|e| e.to_string())
}

fn run_repl(vm: &mut Vm) {
    println!("yar {}, `exit` or ctrl-d leaves", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        print!("yar> ");
        if let Err(err) = stdout.flush() {
            eprintln!("yar: stdout: {}", err);
            break;
        }

        input_buffer.clear();
        match stdin.read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                let input = input_buffer.trim();
                if input == "exit" {
                    break;
                }
                if input.is_empty() {
                    continue;
                }

                match vm.execute(input) {
                    Ok(value) => print_value(vm, value),
                    Err(err) => eprintln!("** {}", err),
                }
            }
            Err(err) => {
                eprintln!("yar: stdin: {}", err);
                break;
            }
        }
    }
}

fn print_value(vm: &Vm, value: Value) {
    match vm.to_string(value) {
        Ok(text) => println!("== {}", text),
        Err(_) => println!("== {:?}", value),
    }
}
