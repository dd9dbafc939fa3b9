use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tenjin::ast::{Expr, Stmt, StringChunk};
use tenjin::error::Location;
use tenjin::{Err, Value};

#[derive(Debug, Parser)]
#[clap(name = "tenjin", version, author)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (repeatable); overridden by `RUST_LOG` when set.
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load the build description and write Ninja files for it.
    Gen(GenArgs),
    /// Reformat a build description file into canonical form.
    Fmt(FmtArgs),
}

#[derive(Debug, Parser)]
pub struct GenArgs {
    /// Directory to write the generated Ninja files into.
    pub out_dir: PathBuf,

    /// Override a declared argument, `name=value`, parsed as a scalar
    /// literal in the build-description language's own grammar. Repeatable.
    #[clap(long = "args", value_name = "KEY=VALUE")]
    pub args: Vec<String>,

    /// Source root directory (default: the directory containing the dotfile,
    /// or the current directory).
    #[clap(long)]
    pub root: Option<PathBuf>,

    /// Path to the `.tenjin` dotfile (default: `.tenjin` in the current
    /// directory, searched upward).
    #[clap(long)]
    pub dotfile: Option<PathBuf>,

    /// IDE project metadata to additionally emit (unused placeholder name;
    /// no IDE backends are implemented).
    #[clap(long)]
    pub ide: Option<String>,

    /// Interpreter to run `action`/`action_foreach` scripts through, e.g.
    /// `python3`. When unset, scripts are run directly as executables.
    #[clap(long)]
    pub script_executable: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct FmtArgs {
    /// Files to reformat in place.
    pub files: Vec<PathBuf>,

    /// Check that files are already formatted; exit nonzero and change
    /// nothing if not.
    #[clap(long)]
    pub check: bool,
}

/// The handful of settings the `.tenjin` dotfile configures, in the same
/// spirit as GN's `.gn` file: string-valued top-level assignments, with the
/// dotfile's own directory acting as the source root.
#[derive(Debug, Default)]
pub struct DotfileConfig {
    pub build_dir: Option<String>,
    pub default_toolchain: Option<String>,
    pub script_executable: Option<PathBuf>,
}

/// Parses a `.tenjin` dotfile's top-level string assignments. Unrecognized
/// keys are ignored rather than rejected, so a dotfile can carry
/// IDE-specific or future settings without breaking older binaries.
pub fn parse_dotfile(source: &str) -> Result<DotfileConfig, Err> {
    let program = tenjin::parser::parse_program(source)?;
    let mut config = DotfileConfig::default();
    for stmt in program.statements {
        let Stmt::Assign { target, value, .. } = stmt.node else { continue };
        let parsed = literal_to_value(&value.node, value.location())?;
        match target.as_str() {
            "build_dir" => config.build_dir = Some(parsed.as_str()?.to_string()),
            "default_toolchain" => config.default_toolchain = Some(parsed.as_str()?.to_string()),
            "script_executable" => config.script_executable = Some(PathBuf::from(parsed.as_str()?)),
            _ => {}
        }
    }
    Ok(config)
}

/// Parses one `--args=name=value` entry into `(name, Value)`. The value
/// side is parsed with the real parser by wrapping it in a throwaway
/// assignment (`spec.md`'s scalar-literal grammar is part of the language
/// itself, so this reuses it rather than hand-rolling a second one) and
/// reading back only the handful of literal expression forms a CLI override
/// may reasonably take: `none`, integers, booleans, strings, and lists of
/// those.
pub fn parse_arg_override(entry: &str) -> Result<(String, Value), Err> {
    let (name, raw_value) =
        entry.split_once('=').ok_or_else(|| Err::usage(format!("`--args` entry `{entry}` must be `name=value`")))?;
    if name.is_empty() {
        return Err(Err::usage(format!("`--args` entry `{entry}` has an empty name")));
    }
    let wrapped = format!("__tenjin_cli_arg = {raw_value}\n");
    let program = tenjin::parser::parse_program(&wrapped)?;
    let value_expr = match program.statements.into_iter().next().map(|s| s.node) {
        Some(Stmt::Assign { value, .. }) => value,
        _ => return Err(Err::usage(format!("`--args` entry `{entry}` is not a valid value"))),
    };
    let value = literal_to_value(&value_expr.node, value_expr.location())?;
    Ok((name.to_string(), value))
}

pub(crate) fn literal_to_value(expr: &Expr, at: Location) -> Result<Value, Err> {
    match expr {
        Expr::None => Ok(Value::none(at)),
        Expr::Integer(v) => Ok(Value::integer(*v, at)),
        Expr::Boolean(v) => Ok(Value::boolean(*v, at)),
        Expr::StringLiteral(chunks) => {
            let mut s = String::new();
            for chunk in chunks {
                match chunk {
                    StringChunk::Literal(lit) => s.push_str(lit),
                    _ => return Err(Err::usage("`--args` string values may not contain `$` interpolation").at(at)),
                }
            }
            Ok(Value::string(s, at))
        }
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(literal_to_value(&item.node, item.location())?);
            }
            Ok(Value::list(values, at))
        }
        _ => Err(Err::usage("`--args` values must be a literal: none, integer, boolean, string, or list").at(at)),
    }
}
