//! Guest builtins and the methods of built-in types

use super::interp::GuestInterp;
use super::value::{exception_classes, BoundMethod, DictKey, GuestError, GuestValue, Kwargs};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::rc::Rc;

type Args = Vec<GuestValue>;

pub fn install(interp: &GuestInterp) {
    for class in exception_classes() {
        interp.register_builtin(&class.name, GuestValue::Class(class.clone()));
    }

    interp.register_builtin("print", GuestValue::builtin("print", |interp, args, kwargs| {
        let sep = match kwarg(&kwargs, "sep") {
            Some(value) => interp.to_str(&value)?,
            None => " ".to_string(),
        };
        let end = match kwarg(&kwargs, "end") {
            Some(value) => interp.to_str(&value)?,
            None => "\n".to_string(),
        };
        let parts = args.iter().map(|a| interp.to_str(a)).collect::<Result<Vec<_>, _>>()?;
        interp.write(&parts.join(&sep));
        interp.write(&end);
        Ok(GuestValue::None)
    }));

    simple(interp, "str", 0, 1, |interp, args| match args.first() {
        Some(value) => Ok(GuestValue::str(&interp.to_str(value)?)),
        None => Ok(GuestValue::str("")),
    });
    simple(interp, "repr", 1, 1, |interp, args| Ok(GuestValue::str(&interp.repr(&args[0]))));
    simple(interp, "bool", 0, 1, |_, args| Ok(GuestValue::Bool(args.first().is_some_and(GuestValue::is_truthy))));
    simple(interp, "int", 0, 1, |interp, args| match args.first() {
        None => Ok(GuestValue::Int(0)),
        Some(GuestValue::Int(i)) => Ok(GuestValue::Int(*i)),
        Some(GuestValue::Bool(b)) => Ok(GuestValue::Int(*b as i64)),
        Some(GuestValue::Float(f)) if f.is_finite() => Ok(GuestValue::Int(f.trunc() as i64)),
        Some(GuestValue::Float(f)) => Err(GuestError::new(
            "OverflowError",
            format!("cannot convert float {} to integer", f),
        )),
        Some(GuestValue::Str(s)) => s.trim().parse::<i64>().map(GuestValue::Int).map_err(|_| {
            GuestError::new(
                "ValueError",
                format!("invalid literal for int() with base 10: {}", interp.repr(&args[0])),
            )
        }),
        Some(other) => Err(GuestError::new(
            "TypeError",
            format!("int() argument must be a string or a number, not '{}'", other.type_name()),
        )),
    });
    simple(interp, "float", 0, 1, |interp, args| match args.first() {
        None => Ok(GuestValue::Float(0.0)),
        Some(GuestValue::Str(s)) => s.trim().parse::<f64>().map(GuestValue::Float).map_err(|_| {
            GuestError::new(
                "ValueError",
                format!("could not convert string to float: {}", interp.repr(&args[0])),
            )
        }),
        Some(other) => to_f64(other).map(GuestValue::Float),
    });
    simple(interp, "len", 1, 1, |interp, args| Ok(GuestValue::Int(interp.len(&args[0])? as i64)));
    simple(interp, "id", 1, 1, |interp, args| Ok(GuestValue::Int(interp.id(&args[0]))));
    simple(interp, "isinstance", 2, 2, |interp, args| {
        Ok(GuestValue::Bool(interp.isinstance(&args[0], &args[1])?))
    });
    simple(interp, "range", 1, 3, |_, args| {
        let ints = args.iter().map(to_int).collect::<Result<Vec<_>, _>>()?;
        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => return Err(GuestError::new("TypeError", "range expected at most 3 arguments")),
        };
        if step == 0 {
            return Err(GuestError::new("ValueError", "range() arg 3 must not be zero"));
        }
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(GuestValue::Int(i));
            i += step;
        }
        Ok(GuestValue::list(out))
    });
    simple(interp, "sum", 1, 2, |interp, args| {
        let mut total = args.get(1).cloned().unwrap_or(GuestValue::Int(0));
        for item in interp.iterate(&args[0])? {
            total = interp.binary(super::ast::BinOp::Add, &total, &item)?;
        }
        Ok(total)
    });
    simple(interp, "list", 0, 1, |interp, args| match args.first() {
        Some(value) => Ok(GuestValue::list(interp.iterate(value)?)),
        None => Ok(GuestValue::list(Vec::new())),
    });
    simple(interp, "tuple", 0, 1, |interp, args| match args.first() {
        Some(value) => Ok(GuestValue::tuple(interp.iterate(value)?)),
        None => Ok(GuestValue::tuple(Vec::new())),
    });
    interp.register_builtin("dict", GuestValue::builtin("dict", |interp, args, kwargs| {
        let mut map = IndexMap::new();
        if let Some(source) = args.first() {
            match source {
                GuestValue::Dict(entries) => map = entries.borrow().clone(),
                other => {
                    for pair in interp.iterate(other)? {
                        let pair = interp.iterate(&pair)?;
                        let [key, value] = <[GuestValue; 2]>::try_from(pair).map_err(|_| {
                            GuestError::new("ValueError", "dictionary update sequence element has wrong length")
                        })?;
                        map.insert(DictKey::from_value(&key)?, value);
                    }
                }
            }
        }
        for (name, value) in kwargs {
            map.insert(DictKey::Str(name), value);
        }
        Ok(GuestValue::dict(map))
    }));
    simple(interp, "min", 1, usize::MAX, |interp, args| extreme(interp, args, Ordering::Less, "min"));
    simple(interp, "max", 1, usize::MAX, |interp, args| extreme(interp, args, Ordering::Greater, "max"));
    simple(interp, "abs", 1, 1, |_, args| match &args[0] {
        GuestValue::Int(i) => i
            .checked_abs()
            .map(GuestValue::Int)
            .ok_or_else(|| GuestError::new("OverflowError", "integer overflow")),
        GuestValue::Bool(b) => Ok(GuestValue::Int(*b as i64)),
        GuestValue::Float(f) => Ok(GuestValue::Float(f.abs())),
        other => Err(GuestError::new(
            "TypeError",
            format!("bad operand type for abs(): '{}'", other.type_name()),
        )),
    });
    simple(interp, "next", 1, 2, |interp, args| {
        let advance = interp.getattr(&args[0], "__next__").map_err(|_| {
            GuestError::new(
                "TypeError",
                format!("'{}' object is not an iterator", args[0].type_name()),
            )
        })?;
        match interp.call(&advance, Vec::new(), Vec::new()) {
            Err(e) if e.class_name() == "StopIteration" && args.len() == 2 => Ok(args[1].clone()),
            other => other,
        }
    });
    simple(interp, "hasattr", 2, 2, |interp, args| {
        let name = expect_str(&args[1], "hasattr")?;
        match interp.getattr(&args[0], &name) {
            Ok(_) => Ok(GuestValue::Bool(true)),
            Err(e) if e.class_name() == "AttributeError" => Ok(GuestValue::Bool(false)),
            Err(e) => Err(e),
        }
    });
    simple(interp, "getattr", 2, 3, |interp, args| {
        let name = expect_str(&args[1], "getattr")?;
        match interp.getattr(&args[0], &name) {
            Err(e) if e.class_name() == "AttributeError" && args.len() == 3 => Ok(args[2].clone()),
            other => other,
        }
    });
    simple(interp, "setattr", 3, 3, |interp, args| {
        let name = expect_str(&args[1], "setattr")?;
        interp.setattr(&args[0], &name, args[2].clone())?;
        Ok(GuestValue::None)
    });
    simple(interp, "sorted", 1, 1, |interp, args| {
        let mut items = interp.iterate(&args[0])?;
        let mut failure = None;
        items.sort_by(|a, b| match interp.compare(super::ast::CmpOp::Lt, a, b) {
            Ok(true) => Ordering::Less,
            Ok(false) => match interp.compare(super::ast::CmpOp::Lt, b, a) {
                Ok(true) => Ordering::Greater,
                Ok(false) => Ordering::Equal,
                Err(e) => {
                    failure.get_or_insert(e);
                    Ordering::Equal
                }
            },
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(GuestValue::list(items)),
        }
    });
    simple(interp, "enumerate", 1, 1, |interp, args| {
        let items = interp.iterate(&args[0])?;
        Ok(GuestValue::list(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| GuestValue::tuple(vec![GuestValue::Int(i as i64), v]))
                .collect(),
        ))
    });
}

/// Register a builtin that takes only positional arguments
fn simple(
    interp: &GuestInterp,
    name: &'static str,
    min: usize,
    max: usize,
    f: impl Fn(&GuestInterp, Args) -> Result<GuestValue, GuestError> + 'static,
) {
    interp.register_builtin(name, GuestValue::builtin(name, move |interp, args, kwargs| {
        check_call(name, &args, &kwargs, min, max)?;
        f(interp, args)
    }));
}

fn check_call(name: &str, args: &[GuestValue], kwargs: &Kwargs, min: usize, max: usize) -> Result<(), GuestError> {
    if let Some((key, _)) = kwargs.first() {
        return Err(GuestError::new(
            "TypeError",
            format!("{}() got an unexpected keyword argument '{}'", name, key),
        ));
    }
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(GuestError::new(
            "TypeError",
            format!("{}() takes {} arguments ({} given)", name, expected, args.len()),
        ));
    }
    Ok(())
}

fn kwarg(kwargs: &Kwargs, name: &str) -> Option<GuestValue> {
    kwargs.iter().find(|(k, _)| &**k == name).map(|(_, v)| v.clone())
}

fn extreme(interp: &GuestInterp, args: Args, wanted: Ordering, name: &str) -> Result<GuestValue, GuestError> {
    let items = if args.len() == 1 { interp.iterate(&args[0])? } else { args };
    let mut items = items.into_iter();
    let mut best = items
        .next()
        .ok_or_else(|| GuestError::new("ValueError", format!("{}() arg is an empty sequence", name)))?;
    let op = if wanted == Ordering::Less { super::ast::CmpOp::Lt } else { super::ast::CmpOp::Gt };
    for item in items {
        if interp.compare(op, &item, &best)? {
            best = item;
        }
    }
    Ok(best)
}

pub(super) fn to_f64(value: &GuestValue) -> Result<f64, GuestError> {
    match value {
        GuestValue::Int(i) => Ok(*i as f64),
        GuestValue::Bool(b) => Ok(*b as i64 as f64),
        GuestValue::Float(f) => Ok(*f),
        other => Err(GuestError::new(
            "TypeError",
            format!("must be real number, not {}", other.type_name()),
        )),
    }
}

pub(super) fn to_int(value: &GuestValue) -> Result<i64, GuestError> {
    match value {
        GuestValue::Int(i) => Ok(*i),
        GuestValue::Bool(b) => Ok(*b as i64),
        other => Err(GuestError::new(
            "TypeError",
            format!("'{}' object cannot be interpreted as an integer", other.type_name()),
        )),
    }
}

fn expect_str(value: &GuestValue, function: &str) -> Result<String, GuestError> {
    match value {
        GuestValue::Str(s) => Ok(s.to_string()),
        other => Err(GuestError::new(
            "TypeError",
            format!("{}(): attribute name must be string, not '{}'", function, other.type_name()),
        )),
    }
}

/// Method `name` of a str, list or dict value, bound to `receiver`
pub fn method(receiver: &GuestValue, name: &str) -> Option<GuestValue> {
    let function = match (receiver, name) {
        (GuestValue::Str(_), "join") => GuestValue::builtin("join", |interp, args, _| {
            let sep = receiver_str(&args)?;
            let items = interp.iterate(args.get(1).unwrap_or(&GuestValue::None))?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    GuestValue::Str(s) => parts.push(s.to_string()),
                    other => {
                        return Err(GuestError::new(
                            "TypeError",
                            format!("sequence item {}: expected str instance, {} found", i, other.type_name()),
                        ))
                    }
                }
            }
            Ok(GuestValue::str(&parts.join(&sep)))
        }),
        (GuestValue::Str(_), "upper") => {
            GuestValue::builtin("upper", |_, args, _| Ok(GuestValue::str(&receiver_str(&args)?.to_uppercase())))
        }
        (GuestValue::Str(_), "lower") => {
            GuestValue::builtin("lower", |_, args, _| Ok(GuestValue::str(&receiver_str(&args)?.to_lowercase())))
        }
        (GuestValue::Str(_), "strip") => {
            GuestValue::builtin("strip", |_, args, _| Ok(GuestValue::str(receiver_str(&args)?.trim())))
        }
        (GuestValue::Str(_), "split") => GuestValue::builtin("split", |_, args, _| {
            let s = receiver_str(&args)?;
            let parts: Vec<GuestValue> = match args.get(1) {
                Some(GuestValue::Str(sep)) if !sep.is_empty() => s.split(&**sep).map(GuestValue::str).collect(),
                Some(GuestValue::Str(_)) => return Err(GuestError::new("ValueError", "empty separator")),
                _ => s.split_whitespace().map(GuestValue::str).collect(),
            };
            Ok(GuestValue::list(parts))
        }),
        (GuestValue::Str(_), "startswith") => GuestValue::builtin("startswith", |_, args, _| {
            let s = receiver_str(&args)?;
            Ok(GuestValue::Bool(matches!(args.get(1), Some(GuestValue::Str(p)) if s.starts_with(&**p))))
        }),
        (GuestValue::Str(_), "endswith") => GuestValue::builtin("endswith", |_, args, _| {
            let s = receiver_str(&args)?;
            Ok(GuestValue::Bool(matches!(args.get(1), Some(GuestValue::Str(p)) if s.ends_with(&**p))))
        }),
        (GuestValue::Str(_), "replace") => GuestValue::builtin("replace", |_, args, _| {
            let s = receiver_str(&args)?;
            match (args.get(1), args.get(2)) {
                (Some(GuestValue::Str(from)), Some(GuestValue::Str(to))) => {
                    Ok(GuestValue::str(&s.replace(&**from, to)))
                }
                _ => Err(GuestError::new("TypeError", "replace() arguments must be str")),
            }
        }),
        (GuestValue::List(_), "append") => GuestValue::builtin("append", |_, args, _| {
            let (list, rest) = receiver_list(args)?;
            let item = rest
                .into_iter()
                .next()
                .ok_or_else(|| GuestError::new("TypeError", "append() takes exactly one argument (0 given)"))?;
            list.borrow_mut().push(item);
            Ok(GuestValue::None)
        }),
        (GuestValue::List(_), "extend") => GuestValue::builtin("extend", |interp, args, _| {
            let (list, rest) = receiver_list(args)?;
            let items = interp.iterate(rest.first().unwrap_or(&GuestValue::None))?;
            list.borrow_mut().extend(items);
            Ok(GuestValue::None)
        }),
        (GuestValue::List(_), "insert") => GuestValue::builtin("insert", |_, args, _| {
            let (list, rest) = receiver_list(args)?;
            let [index, item] = <[GuestValue; 2]>::try_from(rest)
                .map_err(|_| GuestError::new("TypeError", "insert expected 2 arguments"))?;
            let len = list.borrow().len() as i64;
            let index = to_int(&index)?;
            let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
            list.borrow_mut().insert(index as usize, item);
            Ok(GuestValue::None)
        }),
        (GuestValue::List(_), "pop") => GuestValue::builtin("pop", |_, args, _| {
            let (list, rest) = receiver_list(args)?;
            let len = list.borrow().len() as i64;
            if len == 0 {
                return Err(GuestError::new("IndexError", "pop from empty list"));
            }
            let index = match rest.first() {
                Some(i) => to_int(i)?,
                None => -1,
            };
            let index = if index < 0 { index + len } else { index };
            if !(0..len).contains(&index) {
                return Err(GuestError::new("IndexError", "pop index out of range"));
            }
            let item = list.borrow_mut().remove(index as usize);
            Ok(item)
        }),
        (GuestValue::List(_), "index") => GuestValue::builtin("index", |interp, args, _| {
            let (list, rest) = receiver_list(args)?;
            let needle = rest.into_iter().next().unwrap_or(GuestValue::None);
            let items = list.borrow().clone();
            for (i, item) in items.iter().enumerate() {
                if interp.equals(item, &needle)? {
                    return Ok(GuestValue::Int(i as i64));
                }
            }
            Err(GuestError::new("ValueError", format!("{} is not in list", interp.repr(&needle))))
        }),
        (GuestValue::Dict(_), "get") => GuestValue::builtin("get", |_, args, _| {
            let Some(GuestValue::Dict(entries)) = args.first() else { return Err(bad_receiver("dict")) };
            let key = DictKey::from_value(args.get(1).unwrap_or(&GuestValue::None))?;
            let found = entries.borrow().get(&key).cloned();
            Ok(found.or_else(|| args.get(2).cloned()).unwrap_or(GuestValue::None))
        }),
        (GuestValue::Dict(_), "keys") => GuestValue::builtin("keys", |_, args, _| {
            let Some(GuestValue::Dict(entries)) = args.first() else { return Err(bad_receiver("dict")) };
            Ok(GuestValue::list(entries.borrow().keys().map(DictKey::to_value).collect()))
        }),
        (GuestValue::Dict(_), "values") => GuestValue::builtin("values", |_, args, _| {
            let Some(GuestValue::Dict(entries)) = args.first() else { return Err(bad_receiver("dict")) };
            Ok(GuestValue::list(entries.borrow().values().cloned().collect()))
        }),
        (GuestValue::Dict(_), "items") => GuestValue::builtin("items", |_, args, _| {
            let Some(GuestValue::Dict(entries)) = args.first() else { return Err(bad_receiver("dict")) };
            Ok(GuestValue::list(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| GuestValue::tuple(vec![k.to_value(), v.clone()]))
                    .collect(),
            ))
        }),
        _ => return None,
    };
    Some(GuestValue::BoundMethod(Rc::new(BoundMethod { receiver: receiver.clone(), function })))
}

fn receiver_str(args: &[GuestValue]) -> Result<String, GuestError> {
    match args.first() {
        Some(GuestValue::Str(s)) => Ok(s.to_string()),
        _ => Err(bad_receiver("str")),
    }
}

type SharedList = Rc<std::cell::RefCell<Vec<GuestValue>>>;

fn receiver_list(mut args: Args) -> Result<(SharedList, Args), GuestError> {
    if args.is_empty() {
        return Err(bad_receiver("list"));
    }
    match args.remove(0) {
        GuestValue::List(list) => Ok((list, args)),
        _ => Err(bad_receiver("list")),
    }
}

fn bad_receiver(kind: &str) -> GuestError {
    GuestError::new("TypeError", format!("descriptor requires a '{}' object", kind))
}
