use std::{
    error::Error,
    fs, io,
    path::{Path, PathBuf},
    process,
};

use clap::Parser;
use jack::{
    compiler::{self, CompileError},
    lexer,
    util::fmt::{Context, Show},
};
use log::{info, warn, LevelFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compiles Jack classes into VM code", long_about = None)]
struct Cli {
    /// A `.jack` file, or a directory whose `.jack` files are all compiled
    path: PathBuf,

    /// Write the XML token listing of each file (`<Name>T.xml`) instead of
    /// compiling it
    #[arg(long)]
    tokens: bool,

    /// Write the output files into this directory instead of beside the sources
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Log more (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(error) = simple_logger::SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
    {
        eprintln!("failed to set up logging: {error}");
    }

    match run(&cli) {
        Ok(0) => {}
        Ok(failed) => {
            eprintln!("{failed} file(s) failed");
            process::exit(1);
        }
        Err(error) => {
            eprintln!("jackc: {error}");
            process::exit(1);
        }
    }
}

/// Processes every source under the provided path, returning how many
/// failed.
fn run(cli: &Cli) -> Result<usize, Box<dyn Error>> {
    let sources = collect_sources(&cli.path)?;
    if sources.is_empty() {
        return Err(format!("no .jack files in {}", cli.path.display()).into());
    }
    if let Some(dir) = &cli.out_dir {
        fs::create_dir_all(dir)?;
    }

    let out_dir = cli.out_dir.as_deref();
    let mut failed = 0;
    for path in &sources {
        let target = if cli.tokens {
            output_path(path, out_dir, "T.xml")
        } else {
            output_path(path, out_dir, ".vm")
        };
        let ok = match read_source(path) {
            Some(src) if cli.tokens => write_tokens(path, &src, &target)?,
            Some(src) => compile_file(path, &src, &target)?,
            None => false,
        };
        if !ok {
            failed += 1;
            remove_stale(&target)?;
        }
    }
    Ok(failed)
}

/// Reads a source file, reporting the failure if it can't be read.
fn read_source(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(src) => Some(src),
        Err(error) => {
            eprintln!("{}: failed to read: {error}", path.display());
            None
        }
    }
}

/// Removes the output of a previous run, so that a failed file has none.
fn remove_stale(target: &Path) -> io::Result<()> {
    match fs::remove_file(target) {
        Ok(()) => {
            info!("removed stale {}", target.display());
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

fn collect_sources(path: &Path) -> io::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut sources = Vec::new();
    for entry in fs::read_dir(path)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "jack") {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

fn write_tokens(path: &Path, src: &str, target: &Path) -> io::Result<bool> {
    let ctx = Context { src };
    match lexer::xml_tokens(src) {
        Ok(xml) => {
            fs::write(target, xml)?;
            info!("wrote tokens of {} into {}", path.display(), target.display());
            Ok(true)
        }
        Err(error) => {
            eprintln!("{}:{:#}", path.display(), error.display(&ctx));
            Ok(false)
        }
    }
}

/// Compiles a single source. The output is buffered so that nothing is
/// written for a file which fails to compile.
fn compile_file(path: &Path, src: &str, target: &Path) -> io::Result<bool> {
    let ctx = Context { src };
    let mut out = Vec::with_capacity(src.len());

    let report = match compiler::compile(src, &mut out) {
        Ok(report) => report,
        Err(CompileError::Io(error)) => return Err(error),
        Err(error) => {
            eprintln!("{}:{:#}", path.display(), error.display(&ctx));
            return Ok(false);
        }
    };
    for warning in &report.warnings {
        warn!("{}:{:#}", path.display(), warning.display(&ctx));
    }
    if path
        .file_stem()
        .is_some_and(|stem| stem != report.class_name.as_str())
    {
        warn!(
            "{}: class {} is not named after its file",
            path.display(),
            report.class_name
        );
    }

    fs::write(target, out)?;
    info!(
        "compiled {} ({} functions, {} instructions) into {}",
        report.class_name,
        report.functions.len(),
        report.instructions,
        target.display()
    );
    Ok(true)
}

/// Returns where the output for `path` goes: its file stem followed by
/// `suffix`, in `out_dir` or beside the source.
fn output_path(path: &Path, out_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let mut name = path.file_stem().unwrap_or_default().to_os_string();
    name.push(suffix);
    match out_dir {
        Some(dir) => dir.join(name),
        None => path.with_file_name(name),
    }
}
