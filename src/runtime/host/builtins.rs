//! Host builtin functions

use super::interp::HostInterp;
use super::value::{HostError, HostValue, NativeContext, NativeFn};
use std::rc::Rc;

fn native(
    f: impl Fn(&HostInterp, &NativeContext, Vec<HostValue>) -> Result<HostValue, HostError> + 'static,
) -> NativeFn {
    Rc::new(f)
}

fn arg(args: &[HostValue], index: usize, function: &str) -> Result<HostValue, HostError> {
    args.get(index).cloned().ok_or_else(|| {
        HostError::error(format!("{}() expects at least {} argument(s)", function, index + 1))
    })
}

pub fn install(interp: &HostInterp) {
    interp.register_native(
        "count",
        native(|_, _, args| match arg(&args, 0, "count")? {
            HostValue::Array(a) => Ok(HostValue::Int(a.len() as i64)),
            other => Err(HostError::error(format!(
                "count(): Argument #1 must be of type array, {} given",
                other.type_name()
            ))),
        }),
    );
    interp.register_native(
        "strlen",
        native(|interp, _, args| {
            let s = interp.to_display(&arg(&args, 0, "strlen")?)?;
            Ok(HostValue::Int(s.len() as i64))
        }),
    );
    interp.register_native(
        "strtoupper",
        native(|interp, _, args| {
            Ok(HostValue::str(&interp.to_display(&arg(&args, 0, "strtoupper")?)?.to_uppercase()))
        }),
    );
    interp.register_native(
        "strtolower",
        native(|interp, _, args| {
            Ok(HostValue::str(&interp.to_display(&arg(&args, 0, "strtolower")?)?.to_lowercase()))
        }),
    );
    interp.register_native(
        "implode",
        native(|interp, _, args| {
            let glue = interp.to_display(&arg(&args, 0, "implode")?)?;
            let HostValue::Array(pieces) = arg(&args, 1, "implode")? else {
                return Err(HostError::error("implode(): Argument #2 must be of type array"));
            };
            let parts = pieces
                .values()
                .iter()
                .map(|v| interp.to_display(v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(HostValue::str(&parts.join(&glue)))
        }),
    );
    interp.register_native(
        "is_null",
        native(|_, _, args| Ok(HostValue::Bool(matches!(arg(&args, 0, "is_null")?, HostValue::Null)))),
    );
    interp.register_native(
        "gettype",
        native(|_, _, args| {
            let name = match arg(&args, 0, "gettype")? {
                HostValue::Null => "NULL",
                HostValue::Bool(_) => "boolean",
                HostValue::Int(_) => "integer",
                HostValue::Float(_) => "double",
                HostValue::Str(_) => "string",
                HostValue::Array(_) => "array",
                _ => "object",
            };
            Ok(HostValue::str(name))
        }),
    );
}
