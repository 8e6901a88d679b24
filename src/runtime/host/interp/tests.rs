use super::*;

fn run(src: &str) -> Vec<HostValue> {
    let interp = HostInterp::new(100);
    interp.run(src).unwrap();
    interp.take_output()
}

fn run_err(src: &str) -> HostError {
    HostInterp::new(100).run(src).unwrap_err()
}

#[test]
fn test_functions_are_hoisted_and_case_insensitive() {
    let out = run("echo ADD(2, 3); function add($a, $b = 10) { return $a + $b; } echo add(1);");
    assert_eq!(out, vec![HostValue::Int(5), HostValue::Int(11)]);
}

#[test]
fn test_variadic_collects_surplus_and_extra_args_are_dropped() {
    let out = run(
        "function f($a, ...$rest) { return count($rest); }
         function g($a) { return $a; }
         echo f(1, 2, 3, 4); echo g(7, 8, 9);",
    );
    assert_eq!(out, vec![HostValue::Int(3), HostValue::Int(7)]);
}

#[test]
fn test_classes_inheritance_and_constructor() {
    let out = run(
        "class A { public $v = 1; function get() { return $this->v; } }
         class B extends A { function __construct($v) { $this->v = $v; } }
         $b = new B(5);
         echo $b->get();
         echo $b instanceof A;",
    );
    assert_eq!(out, vec![HostValue::Int(5), HostValue::Bool(true)]);
}

#[test]
fn test_try_catch_matches_parent_class() {
    let out = run(
        "try { throw new BridgeException('boom'); echo 'no'; }
         catch (Error $e) { echo 'wrong'; }
         catch (Exception $e) { echo $e->getMessage(); }",
    );
    assert_eq!(out, vec![HostValue::str("boom")]);
}

#[test]
fn test_uncaught_exception_reports_class() {
    let err = run_err("throw new Exception('x');");
    assert_eq!(err.class_name(), "Exception");
    assert_eq!(err.message(), "x");
}

#[test]
fn test_arrays_share_handles_and_autovivify() {
    let out = run(
        "$a = [1, 2];
         $b = $a;
         $b[] = 3;
         $m['k']['j'] = 'v';
         echo count($a); echo $m['k']['j']; echo implode(',', $a);",
    );
    assert_eq!(out, vec![HostValue::Int(3), HostValue::str("v"), HostValue::str("1,2,3")]);
}

#[test]
fn test_loose_equality_of_objects() {
    let out = run(
        "class C { public $val; function __construct($v) { $this->val = $v; } }
         class D { public $val; function __construct($v) { $this->val = $v; } }
         echo new C(1) == new C(1);
         echo new C(1) == new C(2);
         echo new C(1) == new D(1);
         $x = new C(1); echo $x === $x; echo new C(1) === new C(1);",
    );
    assert_eq!(
        out,
        vec![
            HostValue::Bool(true),
            HostValue::Bool(false),
            HostValue::Bool(false),
            HostValue::Bool(true),
            HostValue::Bool(false)
        ]
    );
}

#[test]
fn test_loose_equality_of_cyclic_objects_stops_at_nesting_limit() {
    let err = run_err("class N {} $a = new N(); $a->me = $a; $b = new N(); $b->me = $b; echo $a == $b;");
    assert_eq!(err.class_name(), "Error");
    assert_eq!(err.message(), "Nesting level too deep - recursive dependency?");

    let out = run("class N {} $a = new N(); $a->me = $a; echo $a == $a;");
    assert_eq!(out, vec![HostValue::Bool(true)]);
}

#[test]
fn test_loose_equality_of_scalars() {
    let interp = HostInterp::new(10);
    assert!(interp.loose_eq(&HostValue::Int(1), &HostValue::str("1")).unwrap());
    assert!(interp.loose_eq(&HostValue::Int(2), &HostValue::Float(2.0)).unwrap());
    assert!(interp.loose_eq(&HostValue::Null, &HostValue::Bool(false)).unwrap());
    assert!(!interp.loose_eq(&HostValue::str("abc"), &HostValue::Int(0)).unwrap());
}

#[test]
fn test_loops_and_increment() {
    let out = run(
        "$t = 0; for ($i = 0; $i < 5; $i++) { if ($i == 3) { continue; } $t += $i; }
         echo $t;
         foreach (['a' => 1, 'b' => 2] as $k => $v) { echo $k . $v; }
         $n = 0; while (true) { $n++; if ($n > 2) break; } echo $n;",
    );
    assert_eq!(
        out,
        vec![HostValue::Int(7), HostValue::str("a1"), HostValue::str("b2"), HostValue::Int(3)]
    );
}

#[test]
fn test_recursion_limit_raises_error() {
    let interp = HostInterp::new(20);
    let err = interp.run("function f($n) { return f($n + 1); } f(0);").unwrap_err();
    assert_eq!(err.class_name(), "Error");
    assert!(err.message().contains("nesting level"));
}

#[test]
fn test_invoke_bound_applies_declared_defaults() {
    let interp = HostInterp::new(10);
    interp.run("function f($a, $b = 20, $c = 300) { return $a + $b + $c; }").unwrap();
    let f = interp.lookup_function("f").unwrap();
    let frame = CallFrame {
        slots: vec![Some(HostValue::Int(1)), None, Some(HostValue::Int(3))],
        variadic: Vec::new(),
    };
    assert_eq!(interp.invoke_bound(&f, frame, None).unwrap(), HostValue::Int(24));
}

#[test]
fn test_parse_error_is_catchable_type() {
    let err = run_err("echo (;");
    assert_eq!(err.class_name(), "ParseError");
}

#[test]
fn test_format_float() {
    assert_eq!(format_float(3.0), "3");
    assert_eq!(format_float(0.1 + 0.2), "0.3");
    assert_eq!(format_float(std::f64::consts::PI), "3.1415926535898");
    assert_eq!(format_float(f64::NAN), "NAN");
}
