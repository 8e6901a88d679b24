//! Native library modules, loaded on first import

use super::builtins::to_f64;
use super::interp::GuestInterp;
use super::value::{GuestClass, GuestError, GuestModule, GuestValue};
use std::rc::Rc;

/// Build the native module `name`, or `None` when no such module exists
pub fn load(interp: &GuestInterp, name: &str) -> Option<Rc<GuestModule>> {
    match name {
        "math" => Some(math()),
        "os" => Some(os(interp)),
        "os.path" => Some(os_path()),
        "sys" => Some(sys()),
        "itertools" => Some(itertools()),
        _ => None,
    }
}

fn define(
    module: &GuestModule,
    name: &'static str,
    f: impl Fn(&GuestInterp, Vec<GuestValue>) -> Result<GuestValue, GuestError> + 'static,
) {
    module.set(name, GuestValue::builtin(name, move |interp, args, _| f(interp, args)));
}

fn arg<'a>(args: &'a [GuestValue], index: usize, function: &str) -> Result<&'a GuestValue, GuestError> {
    args.get(index).ok_or_else(|| {
        GuestError::new("TypeError", format!("{}() missing required argument {}", function, index + 1))
    })
}

fn math() -> Rc<GuestModule> {
    let module = GuestModule::new("math");
    module.set("pi", GuestValue::Float(std::f64::consts::PI));
    module.set("e", GuestValue::Float(std::f64::consts::E));
    module.set("inf", GuestValue::Float(f64::INFINITY));
    module.set("nan", GuestValue::Float(f64::NAN));
    define(&module, "pow", |_, args| {
        let x = to_f64(arg(&args, 0, "pow")?)?;
        let y = to_f64(arg(&args, 1, "pow")?)?;
        Ok(GuestValue::Float(x.powf(y)))
    });
    define(&module, "sqrt", |_, args| {
        let x = to_f64(arg(&args, 0, "sqrt")?)?;
        if x < 0.0 {
            return Err(GuestError::new("ValueError", "math domain error"));
        }
        Ok(GuestValue::Float(x.sqrt()))
    });
    define(&module, "floor", |_, args| {
        Ok(GuestValue::Int(to_f64(arg(&args, 0, "floor")?)?.floor() as i64))
    });
    define(&module, "ceil", |_, args| {
        Ok(GuestValue::Int(to_f64(arg(&args, 0, "ceil")?)?.ceil() as i64))
    });
    define(&module, "fabs", |_, args| Ok(GuestValue::Float(to_f64(arg(&args, 0, "fabs")?)?.abs())));
    define(&module, "isnan", |_, args| Ok(GuestValue::Bool(to_f64(arg(&args, 0, "isnan")?)?.is_nan())));
    module
}

fn os(interp: &GuestInterp) -> Rc<GuestModule> {
    let module = GuestModule::new("os");
    module.set("sep", GuestValue::str(std::path::MAIN_SEPARATOR_STR));
    module.set("name", GuestValue::str(if cfg!(windows) { "nt" } else { "posix" }));
    define(&module, "getpid", |_, _| Ok(GuestValue::Int(std::process::id() as i64)));
    define(&module, "getcwd", |_, _| {
        let cwd = std::env::current_dir().map_err(|e| GuestError::new("RuntimeError", e.to_string()))?;
        Ok(GuestValue::str(&cwd.to_string_lossy()))
    });
    // `import os` alone makes `os.path` usable
    let path = match interp.lookup_module("os.path") {
        Some(path) => path,
        None => {
            let path = os_path();
            interp.register_module("os.path", path.clone());
            path
        }
    };
    module.set("path", GuestValue::Module(path));
    module
}

fn os_path() -> Rc<GuestModule> {
    let module = GuestModule::new("os.path");
    module.set("sep", GuestValue::str("/"));
    define(&module, "join", |_, args| {
        let mut joined = String::new();
        for (i, part) in args.iter().enumerate() {
            let GuestValue::Str(part) = part else {
                return Err(GuestError::new(
                    "TypeError",
                    format!("join() argument {} must be str, not '{}'", i + 1, part.type_name()),
                ));
            };
            if part.starts_with('/') {
                joined.clear();
            } else if !joined.is_empty() && !joined.ends_with('/') {
                joined.push('/');
            }
            joined.push_str(part);
        }
        Ok(GuestValue::str(&joined))
    });
    define(&module, "basename", |_, args| {
        let path = path_arg(&args, "basename")?;
        Ok(GuestValue::str(path.rsplit('/').next().unwrap_or("")))
    });
    define(&module, "dirname", |_, args| {
        let path = path_arg(&args, "dirname")?;
        Ok(GuestValue::str(path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")))
    });
    module
}

fn path_arg(args: &[GuestValue], function: &str) -> Result<String, GuestError> {
    match arg(args, 0, function)? {
        GuestValue::Str(s) => Ok(s.to_string()),
        other => Err(GuestError::new(
            "TypeError",
            format!("{}() argument must be str, not '{}'", function, other.type_name()),
        )),
    }
}

fn sys() -> Rc<GuestModule> {
    let module = GuestModule::new("sys");
    module.set("version", GuestValue::str(concat!("crossbind guest ", env!("CARGO_PKG_VERSION"))));
    module.set("platform", GuestValue::str(std::env::consts::OS));
    module.set("maxsize", GuestValue::Int(i64::MAX));
    module.set("path", GuestValue::list(Vec::new()));
    module
}

/// `itertools.count(start=0, step=1)`: an iterator object with `next()`
fn itertools() -> Rc<GuestModule> {
    let module = GuestModule::new("itertools");
    let counter = GuestClass::new("count", None);
    let advance = GuestValue::builtin("__next__", |interp, args, _| {
        let Some(GuestValue::Object(this)) = args.first() else {
            return Err(GuestError::new("TypeError", "descriptor '__next__' requires a 'count' object"));
        };
        let current = this.get("_current").unwrap_or(GuestValue::Int(0));
        let step = this.get("_step").unwrap_or(GuestValue::Int(1));
        this.set("_current", interp.binary(super::ast::BinOp::Add, &current, &step)?);
        Ok(current)
    });
    counter.dict.borrow_mut().insert("__next__".to_string(), advance.clone());
    counter.dict.borrow_mut().insert("next".to_string(), advance);

    module.set("count", GuestValue::builtin("count", move |_, args, kwargs| {
        let mut start = args.first().cloned().unwrap_or(GuestValue::Int(0));
        let mut step = args.get(1).cloned().unwrap_or(GuestValue::Int(1));
        for (name, value) in kwargs {
            match &*name {
                "start" => start = value,
                "step" => step = value,
                other => {
                    return Err(GuestError::new(
                        "TypeError",
                        format!("count() got an unexpected keyword argument '{}'", other),
                    ))
                }
            }
        }
        to_f64(&start)?;
        to_f64(&step)?;
        let instance = super::value::GuestObject::new(counter.clone());
        instance.set("_current", start);
        instance.set("_step", step);
        Ok(GuestValue::Object(instance))
    }));
    module
}

#[cfg(test)]
mod tests {
    use super::super::builtins::to_int;
    use super::*;

    fn run(source: &str) -> (GuestInterp, Result<(), GuestError>) {
        let interp = GuestInterp::new(100);
        let result = interp.run(source);
        (interp, result)
    }

    #[test]
    fn test_math_pow_returns_float() {
        let (interp, result) = run("import math\nprint(math.pow(2, 3))\n");
        result.unwrap();
        assert_eq!(interp.take_output(), "8.0\n");
    }

    #[test]
    fn test_os_path_join_and_submodule_binding() {
        let (interp, result) = run("import os.path\nprint(os.path.join('a', 'b'))\nprint(os.path.join('a', '/b'))\n");
        result.unwrap();
        assert_eq!(interp.take_output(), "a/b\n/b\n");
        assert!(interp.lookup_module("os.path").is_some());
    }

    #[test]
    fn test_count_iterates_with_step() {
        let (interp, result) = run("import itertools\nc = itertools.count(step=666)\nnext(c)\nnext(c)\nprint(next(c))\n");
        result.unwrap();
        assert_eq!(interp.take_output(), "1332\n");
    }

    #[test]
    fn test_unknown_module() {
        let (_, result) = run("import __nope__\n");
        let err = result.unwrap_err();
        assert_eq!(err.class_name(), "ImportError");
        assert_eq!(err.message(), "No module named __nope__");
    }

    #[test]
    fn test_int_helpers() {
        assert_eq!(to_int(&GuestValue::Bool(true)).unwrap(), 1);
        assert!(to_int(&GuestValue::str("x")).is_err());
    }
}
