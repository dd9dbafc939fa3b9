use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tenjin::{LocalWorld, Loader, Value};
use tenjin_cli::cli::{self, Args, Command, FmtArgs, GenArgs};
use tenjin_cli::emit;
use tracing_subscriber::EnvFilter;

const DOTFILE_NAME: &str = ".tenjin";

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = match &args.command {
        Command::Gen(gen_args) => run_gen(gen_args),
        Command::Fmt(fmt_args) => run_fmt(fmt_args),
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tenjin={default_level},tenjin_cli={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn find_dotfile(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(DOTFILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn run_gen(args: &GenArgs) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("reading current directory")?;

    let dotfile_path = args.dotfile.clone().or_else(|| find_dotfile(&cwd));
    let dotfile_dir = dotfile_path.as_ref().and_then(|p| p.parent()).map(Path::to_path_buf);
    let dotfile_config = match &dotfile_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            cli::parse_dotfile(&text).map_err(|e| anyhow::anyhow!("{}", e.report(&path.display().to_string(), &text)))?
        }
        None => cli::DotfileConfig::default(),
    };

    let source_root = args.root.clone().or(dotfile_dir).unwrap_or(cwd);
    let build_dir = args.out_dir.clone();
    let default_toolchain = dotfile_config.default_toolchain.clone().unwrap_or_else(|| "//toolchain:default".to_string());
    let script_executable = args.script_executable.clone().or(dotfile_config.script_executable);

    let mut overrides: HashMap<String, Value> = HashMap::new();
    for entry in &args.args {
        let (name, value) = cli::parse_arg_override(entry).map_err(|e| anyhow::anyhow!("{e}"))?;
        overrides.insert(name, value);
    }

    if args.ide.is_some() {
        tracing::warn!("--ide is accepted but no IDE project backend is implemented; ignoring");
    }

    let build_dir_str = build_dir.to_string_lossy().into_owned();
    let world = LocalWorld;
    let mut loader = Loader::new(&world, source_root.clone(), build_dir_str.clone(), default_toolchain, overrides, script_executable);

    let graph = loader.generate().map_err(|e| anyhow::anyhow!("{}", describe_error(&e)))?;

    let files = emit::emit(&graph, loader.labels());

    let out_dir = source_root.join(&build_dir_str);
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    for (stem, text) in &files.toolchain_files {
        let path = out_dir.join(format!("{stem}.ninja"));
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    }
    let root_path = out_dir.join("build.ninja");
    std::fs::write(&root_path, &files.root_file).with_context(|| format!("writing {}", root_path.display()))?;

    let args_gn_path = out_dir.join("args.gn");
    std::fs::write(&args_gn_path, render_args_gn(&args.args)).with_context(|| format!("writing {}", args_gn_path.display()))?;

    let deps_path = out_dir.join("build.ninja.d");
    std::fs::write(&deps_path, render_deps_file(&root_path, loader.generator_deps()))
        .with_context(|| format!("writing {}", deps_path.display()))?;

    Ok(())
}

fn render_args_gn(overrides: &[String]) -> String {
    let mut out = String::from("# Generated by tenjin. Edit the dotfile or --args instead.\n");
    for entry in overrides {
        out.push_str(entry);
        out.push('\n');
    }
    out
}

fn render_deps_file(target: &Path, deps: &[impl std::fmt::Display]) -> String {
    use std::fmt::Write as _;
    let mut out = format!("{}:", target.display());
    for dep in deps {
        let _ = write!(out, " {dep}");
    }
    out.push('\n');
    out
}

fn describe_error(err: &tenjin::Err) -> String {
    match err.location {
        Some(loc) => format!("{loc}: {}", err.kind),
        None => err.kind.to_string(),
    }
}

fn run_fmt(args: &FmtArgs) -> anyhow::Result<()> {
    if args.files.is_empty() {
        bail!("no files given");
    }
    let mut any_unformatted = false;
    for path in &args.files {
        let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let formatted = tenjin_fmt::format_source(&source)
            .map_err(|e| anyhow::anyhow!("{}", e.report(&path.display().to_string(), &source)))?;
        if formatted == source {
            continue;
        }
        if args.check {
            any_unformatted = true;
            eprintln!("{} is not formatted", path.display());
        } else {
            std::fs::write(path, &formatted).with_context(|| format!("writing {}", path.display()))?;
        }
    }
    if any_unformatted {
        bail!("one or more files are not formatted");
    }
    Ok(())
}
