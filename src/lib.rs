pub mod ast;
pub mod builtins;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod resolver;
pub mod scope;
pub mod target;
pub mod value;
pub mod world;

pub use error::{Err, Location, Result};
pub use eval::{EvalHost, Evaluator};
pub use loader::Loader;
pub use resolver::{ResolvedGraph, ResolvedTarget, Resolver};
pub use value::{Value, ValueKind};
pub use world::{LocalWorld, World};
