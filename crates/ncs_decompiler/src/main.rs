use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use ncs_decompiler::{
    ActionTable, FrameTyper, NcsFile, Program, PrototypeEngine, PrototypeReport, Reach,
    StateArena, ToolConfig,
};

#[derive(Parser, Debug)]
#[command(version, about = "Infer subroutine prototypes of compiled NWScript (NCS)")]
struct Args {
    #[arg(short, long)]
    input: PathBuf,

    /// YAML prototype report; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Engine routine table (YAML); the bundled partial table otherwise.
    #[arg(short, long)]
    actions: Option<PathBuf>,

    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report subroutines that fell back to heuristics.
    #[arg(long)]
    strict: bool,

    /// Write a disassembly listing.
    #[arg(long)]
    listing: Option<PathBuf>,
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn write_listing(path: &Path, program: &Program) -> Result<()> {
    create_parent_dir(path)?;
    let mut out = fs::File::create(path)
        .with_context(|| format!("creating listing: {}", path.display()))?;

    for inst in &program.bootstrap {
        writeln!(out, "{}", inst)?;
    }
    for sub in program.subroutines() {
        writeln!(out)?;
        writeln!(out, "sub_{:08X}:", sub.position)?;
        for (inst, reach) in sub.classified() {
            let note = match reach {
                Reach::Live => "",
                Reach::Deferred => "    ; deferred",
                Reach::Dead => "    ; dead",
            };
            writeln!(out, "{}{}", inst, note)?;
        }
    }
    Ok(())
}

fn run(args: &Args, config: &ToolConfig) -> Result<()> {
    let file = NcsFile::open(&args.input)
        .with_context(|| format!("reading input: {}", args.input.display()))?;
    let program = Program::from_file(&file).context("decoding bytecode")?;
    log::info!(
        "{} subroutines, main at {:?}, globals at {:?}",
        program.subroutine_count(),
        program.main_entry(),
        program.globals_entry()
    );

    if let Some(listing) = &args.listing {
        write_listing(listing, &program)?;
    }

    let actions = match &args.actions {
        Some(path) => ActionTable::load(path)?,
        None => ActionTable::bundled()?,
    };

    let mut inference = config.inference;
    inference.strict |= args.strict;

    let mut states = StateArena::new(&program);
    let mut engine = PrototypeEngine::new(
        &program,
        &mut states,
        FrameTyper::new(&actions),
        &actions,
        inference,
    );
    engine.run();
    let ambiguous = engine.diagnostics().len();

    let yaml = PrototypeReport::collect(&program, &states).to_yaml()?;
    match &args.output {
        Some(path) => {
            create_parent_dir(path)?;
            fs::write(path, yaml)
                .with_context(|| format!("writing output: {}", path.display()))?;
        }
        None => print!("{}", yaml),
    }

    if ambiguous > 0 {
        log::warn!("{} subroutines were prototyped heuristically", ambiguous);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ToolConfig::load(path)?,
        None => ToolConfig::default(),
    };

    env_logger::Builder::new()
        .filter_level(config.logger.level_filter)
        .parse_default_env()
        .init();

    run(&args, &config)
}
