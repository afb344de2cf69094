use std::path::PathBuf;

use devices::{ScriptState, Streams};
use nga::{Fault, Op, Vm, VmConfig};
use nga_cli::{Shell, source::Fences};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

/// RETRO on the Nga virtual machine
///
/// With a script file, evaluates its code blocks and exits.  Otherwise,
/// runs any requested includes and then the image's interactive listener.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Script to run in batch mode
    script: Option<PathBuf>,

    /// Run the interactive listener after processing other options
    #[clap(short, long)]
    interactive: bool,

    /// Include a file before starting (may be repeated)
    #[clap(short = 'f', long = "include", value_name = "FILE")]
    include: Vec<PathBuf>,

    /// Include a file and run its test blocks (may be repeated)
    #[clap(short, long, value_name = "FILE")]
    test: Vec<PathBuf>,

    /// Image to load
    #[clap(short = 'u', long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Image to load, then run the interactive listener
    #[clap(short, long, value_name = "PATH", conflicts_with = "image")]
    run: Option<PathBuf>,

    /// Number of cores
    #[clap(long, default_value_t = 8)]
    cores: usize,

    /// Token which opens a code block
    #[clap(long)]
    code_start: Option<String>,

    /// Token which closes a code block
    #[clap(long)]
    code_end: Option<String>,

    /// Token which opens a test block
    #[clap(long)]
    test_start: Option<String>,

    /// Token which closes a test block
    #[clap(long)]
    test_end: Option<String>,

    /// Arguments to pass to the script
    ///
    /// Everything after the script name is passed through, flags included.
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Args {
    fn fences(&self) -> Fences {
        let d = Fences::default();
        let pick = |s: &Option<String>, d| s.clone().unwrap_or(d);
        Fences {
            code_start: pick(&self.code_start, d.code_start),
            code_end: pick(&self.code_end, d.code_end),
            test_start: pick(&self.test_start, d.test_start),
            test_end: pick(&self.test_end, d.test_end),
        }
    }

    /// Runs the listener when asked, or when there is nothing else to do
    fn interactive(&self) -> bool {
        self.interactive
            || self.run.is_some()
            || (self.include.is_empty()
                && self.test.is_empty()
                && self.image.is_none())
    }
}

/// Image loaded when none is given on the command line
const DEFAULT_IMAGE: &str = "ngaImage";

fn main() -> Result<()> {
    let env = env_logger::Env::default()
        .filter_or("NGA_LOG", "warn")
        .write_style_or("NGA_LOG", "always");
    env_logger::init_from_env(env);

    let args = Args::parse();
    match run(args) {
        Err(e) => match e.downcast_ref::<Fault>() {
            Some(f) => {
                report(f);
                std::process::exit(1);
            }
            None => Err(e),
        },
        Ok(()) => Ok(()),
    }
}

/// Prints a fatal fault in the traditional format
fn report(f: &Fault) {
    let lanes = f
        .lanes()
        .map(|b| Op::decode(b).map(|op| op.name()).unwrap_or("??"));
    eprintln!("\nERROR (nga/execute): {}", f.kind);
    eprintln!(
        "At {}, bundle {} [{}], core {}",
        f.ip,
        f.bundle,
        lanes.join(" "),
        f.core
    );
}

fn run(args: Args) -> Result<()> {
    let image = args
        .image
        .as_ref()
        .or(args.run.as_ref())
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE));
    let bytes = std::fs::read(&image)
        .with_context(|| format!("failed to read image {image:?}"))?;

    let name = args
        .script
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let script = ScriptState::new(name, args.args.clone()).shared();
    let devices = devices::standard(Streams::stdio(), script.clone());

    let mut vm = Vm::new(VmConfig {
        cores: args.cores.max(1),
        ..VmConfig::default()
    });
    let start = std::time::Instant::now();
    vm.load_image(&bytes)
        .with_context(|| format!("failed to load image {image:?}"))?;

    let out = Box::new(std::io::stdout());
    let mut shell = Shell::new(vm, devices, script, out);
    shell.set_fences(args.fences());
    shell.startup()?;
    info!("startup complete in {:?}", start.elapsed());

    if let Some(path) = &args.script {
        shell.include(path, false)?;
        return shell.dump_stack();
    }

    let interactive = args.interactive();
    let files = args.include.iter().map(|p| (p, false));
    for (path, tests) in files.chain(args.test.iter().map(|p| (p, true))) {
        match shell.include(path, tests) {
            Err(e) if interactive && e.is::<std::io::Error>() => {
                warn!("{e:#}")
            }
            r => r?,
        }
    }
    if interactive {
        shell.run(0)?;
    }
    shell.dump_stack()
}
