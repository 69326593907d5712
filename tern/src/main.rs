use std::process;

use clap::{Parser, Subcommand};
use log::{LevelFilter, debug, error};

use tern::{HeapSettings, Outcome, VM, VMCreateInfo, demos};

const EXIT_USAGE: i32 = 64;
const EXIT_EXCEPTION: i32 = 65;

#[derive(Parser, Debug)]
#[command(name = "tern")]
#[command(about = "Run the bundled tern programs")]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Cells per heap chunk
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Chunks allocated at startup
    #[arg(long, global = true)]
    initial_chunks: Option<usize>,

    /// Upper bound on heap growth, in chunks
    #[arg(long, global = true)]
    max_chunks: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a demo program
    Run { name: String },
    /// List the demo programs
    List,
    /// Print the bytecode of a demo program
    Disasm { name: String },
}

impl Cli {
    fn heap_settings(&self) -> HeapSettings {
        let defaults = HeapSettings::default();
        HeapSettings {
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            initial_chunks: self.initial_chunks.unwrap_or(defaults.initial_chunks),
            max_chunks: self.max_chunks.unwrap_or(defaults.max_chunks),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn find_demo(name: &str) -> &'static demos::Demo {
    match demos::find(name) {
        Some(demo) => demo,
        None => {
            eprintln!("unknown program '{name}'; try `tern list`");
            process::exit(EXIT_USAGE);
        }
    }
}

fn run(settings: HeapSettings, name: &str) -> i32 {
    let demo = find_demo(name);
    let mut vm = VM::new(VMCreateInfo { heap: settings });
    vm.set_exception_handler(|vm, exception| {
        let text = vm
            .repr(exception)
            .unwrap_or_else(|_| vm.type_name(exception));
        eprintln!("uncaught {text}");
    });

    debug!("running {}", demo.name);
    let outcome = vm.execute(demo.program());
    vm.flush_output();
    debug!(
        "{} finished with {} live cells after {} collections",
        demo.name,
        vm.heap.live_count(),
        vm.heap.collections()
    );
    match outcome {
        Outcome::Returned(_) => 0,
        Outcome::Excepted(_) => EXIT_EXCEPTION,
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = cli.heap_settings();
    if let Err(reason) = settings.validate() {
        error!("invalid heap settings: {reason}");
        eprintln!("invalid heap settings: {reason}");
        process::exit(EXIT_USAGE);
    }

    let code = match &cli.command {
        Command::Run { name } => run(settings, name),
        Command::List => {
            for demo in demos::DEMOS {
                println!("{:<12} {}", demo.name, demo.summary);
            }
            0
        }
        Command::Disasm { name } => {
            print!("{}", find_demo(name).program());
            0
        }
    };
    process::exit(code);
}
