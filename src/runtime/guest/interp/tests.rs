use super::*;
use crate::runtime::signature::CallFrame;

fn run(src: &str) -> String {
    let interp = GuestInterp::new(100);
    interp.run(src).unwrap();
    interp.take_output()
}

fn run_err(src: &str) -> GuestError {
    GuestInterp::new(100).run(src).unwrap_err()
}

#[test]
fn test_recursion_and_percent_formatting() {
    let out = run(
        "def fib(n):
    if n < 2: return n
    return fib(n - 1) + fib(n - 2)
print(fib(10))
print('%s-%s-%s' % (123, True, 666))
print('%.2f|%d|%r|%%' % (2.5, 7.9, 'q'))
",
    );
    assert_eq!(out, "55\n123-True-666\n2.50|7|'q'|%\n");
}

#[test]
fn test_variadic_and_keyword_defaults() {
    let out = run(
        "def cat(sep, *parts):
    return sep.join([str(p) for p in parts])
def kw(a='abc', b='def', c=1):
    return '%s-%s-%s' % (a, b, c)
print(cat('-', 5, 4, 3, 2, 1, 'Go'))
print(kw(c=333))
",
    );
    assert_eq!(out, "5-4-3-2-1-Go\nabc-def-333\n");
}

#[test]
fn test_bad_call_is_type_error() {
    let err = run_err("def f(a):\n    pass\nf(1, 2)\n");
    assert_eq!(err.class_name(), "TypeError");
    let err = run_err("def f(a):\n    pass\nf(b=2)\n");
    assert_eq!(err.class_name(), "TypeError");
}

#[test]
fn test_classes_methods_and_isinstance() {
    let out = run(
        "class A:
    kind = 'a'
    def __init__(self, v):
        self.v = v
    def get(self):
        return self.v * 2
class B(A):
    pass
b = B(21)
print(b.get(), b.kind, isinstance(b, A), isinstance(b, (int, B)), isinstance(1, A))
",
    );
    assert_eq!(out, "42 a True True False\n");
}

#[test]
fn test_exceptions_hierarchy_reraise_and_finally() {
    let out = run(
        "class MyError(ValueError):
    pass
def boom():
    raise MyError('bad')
try:
    try:
        boom()
    except KeyError:
        print('wrong')
    except ValueError as e:
        print('caught', e)
        raise
    finally:
        print('finally')
except Exception as outer:
    print('outer', outer)
",
    );
    assert_eq!(out, "caught bad\nfinally\nouter bad\n");
}

#[test]
fn test_uncaught_exception_message() {
    let err = run_err("x = {}\nx['missing']\n");
    assert_eq!(err.class_name(), "KeyError");
    assert_eq!(err.to_string(), "KeyError: 'missing'");

    let err = run_err("print(undefined_name)\n");
    assert_eq!(err.message(), "name 'undefined_name' is not defined");
}

#[test]
fn test_recursion_limit() {
    let err = run_err("def f(n):\n    return f(n + 1)\nf(0)\n");
    assert_eq!(err.class_name(), "RecursionError");
}

#[test]
fn test_closures_and_global() {
    let out = run(
        "counter = 0
def bump():
    global counter
    counter += 1
def adder(n):
    def add(x):
        return x + n
    return add
bump()
bump()
print(counter, adder(10)(5))
",
    );
    assert_eq!(out, "2 15\n");
}

#[test]
fn test_sequences_slices_and_containers() {
    let out = run(
        "xs = [1, 2, 3, 4, 5]
xs.append(6)
d = {'a': 1}
d['b'] = 2
a, b = xs[-1], xs[1:3]
print(a, b, xs[:2], 'bc' in 'abc', 3 not in xs, len(d), d.get('z', 0))
print([x * x for x in xs if x % 2 == 0])
",
    );
    assert_eq!(out, "6 [2, 3] [1, 2] True False 2 0\n[4, 16, 36]\n");
}

#[test]
fn test_numeric_semantics() {
    let out = run("print(7 // -2, -7 % 3, 2 ** -1, 1 == 1.0, 3 / 2, True + 1)\n");
    assert_eq!(out, "-4 2 0.5 True 1.5 2\n");
    assert_eq!(run_err("1 / 0\n").class_name(), "ZeroDivisionError");
    assert_eq!(run_err("9223372036854775807 + 1\n").class_name(), "OverflowError");
}

#[test]
fn test_sequence_repetition_is_bounded() {
    let out = run("print([1, 2] * 3, 'ab' * 2, [0] * -1, [] * 9223372036854775807, '' * 9223372036854775807)\n");
    assert_eq!(out, "[1, 2, 1, 2, 1, 2] abab [] [] \n");
    assert_eq!(run_err("len([1, 2] * 9223372036854775807)\n").class_name(), "MemoryError");
    assert_eq!(run_err("'ab' * 9223372036854775807\n").class_name(), "MemoryError");
    let out = run("try:\n    xs = [1, 2] * 9223372036854775807\nexcept MemoryError:\n    print('caught')\n");
    assert_eq!(out, "caught\n");
}

#[test]
fn test_syntax_error_is_raised_as_guest_exception() {
    let err = run_err("def f(:\n");
    assert_eq!(err.class_name(), "SyntaxError");
}

struct Scope {
    assigned: RefCell<Vec<(String, GuestValue)>>,
}

impl NameResolver for Scope {
    fn lookup_variable(&self, name: &str) -> Result<Option<GuestValue>, GuestError> {
        Ok(match name {
            "x" => Some(GuestValue::Int(1)),
            _ => None,
        })
    }

    fn assign_variable(&self, name: &str, value: &GuestValue) -> Result<bool, GuestError> {
        if name == "x" {
            self.assigned.borrow_mut().push((name.to_string(), value.clone()));
            return Ok(true);
        }
        Ok(false)
    }

    fn lookup_symbol(&self, name: &str) -> Result<Option<GuestValue>, GuestError> {
        Ok(match name {
            "len" | "y" => Some(GuestValue::Int(99)),
            _ => None,
        })
    }
}

#[test]
fn test_resolver_order_and_write_through() {
    let interp = GuestInterp::new(100);
    let scope = Rc::new(Scope { assigned: RefCell::new(Vec::new()) });
    let module = interp
        .compile_module(
            "<embedded>",
            "def f():
    x = 5
    z = 6
    print(x, len('ab'), y, z)
",
            Some(scope.clone()),
        )
        .unwrap();
    let f = module.get("f").unwrap();
    interp.call(&f, Vec::new(), Vec::new()).unwrap();
    // builtins win over resolver symbols; resolver variables win over builtins
    assert_eq!(interp.take_output(), "1 2 99 6\n");
    assert_eq!(scope.assigned.borrow().as_slice(), &[("x".to_string(), GuestValue::Int(5))]);
}

#[test]
fn test_call_function_applies_own_defaults_to_empty_slots() {
    let interp = GuestInterp::new(100);
    interp.run("def f(a, b=10, *rest):\n    return a + b + len(rest)\n").unwrap();
    let Some(GuestValue::Function(f)) = interp.main_module().get("f") else { panic!("f") };
    let frame = CallFrame { slots: vec![Some(GuestValue::Int(1)), None], variadic: vec![GuestValue::None] };
    assert_eq!(interp.call_function(&f, frame).unwrap(), GuestValue::Int(12));
}

#[test]
fn test_import_binds_child_module_on_parent() {
    let out = run("import os\nimport os.path as p\nprint(os.path is p, p.basename('a/b.txt'))\n");
    assert_eq!(out, "True b.txt\n");
}

#[test]
fn test_format_float() {
    assert_eq!(format_float(8.0), "8.0");
    assert_eq!(format_float(0.1), "0.1");
    assert_eq!(format_float(f64::INFINITY), "inf");
    assert_eq!(format_float(-2.5), "-2.5");
}
