//! Host runtime - a small class-based scripting language
//!
//! Design:
//! - `value.rs` - values, arrays, objects, callables, `HostForeign`, `HostError`
//! - `class.rs` - single-inheritance classes and the built-in throwables
//! - `lexer.rs` / `parser.rs` / `ast.rs` - source to syntax tree
//! - `interp.rs` - evaluation, call protocol, equality
//! - `builtins.rs` - native library functions

pub mod ast;
mod builtins;
pub mod class;
pub mod interp;
mod lexer;
mod parser;
pub mod value;

pub use class::HostClass;
pub use interp::{format_float, strict_eq, HostInterp};
pub use value::{
    new_scope, ArrayKey, HostArray, HostCallable, HostError, HostForeign, HostFunction, HostObject,
    HostScope, HostValue, NativeContext, NativeFn,
};
