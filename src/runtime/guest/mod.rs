//! Guest runtime - a small indentation-structured scripting language
//!
//! Design:
//! - `value.rs` - values, modules, classes, `GuestForeign`, `NameResolver`, `GuestError`
//! - `parser.rs` / `ast.rs` - `rustpython-parser` output lowered to the evaluated tree
//! - `interp.rs` - evaluation, module cache, call protocol, equality
//! - `builtins.rs` / `modules.rs` - builtin functions and native library modules

pub mod ast;
mod builtins;
pub mod interp;
mod modules;
pub mod parser;
pub mod value;

pub use interp::{format_float, GuestInterp};
pub use parser::REF_DECORATOR;
pub use value::{
    exception_class, BoundMethod, DictKey, GuestBuiltin, GuestClass, GuestError, GuestForeign,
    GuestFunction, GuestModule, GuestObject, GuestValue, Kwargs, NameResolver,
};
