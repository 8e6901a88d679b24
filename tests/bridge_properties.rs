//! Behavioural guarantees of the bridge that hold across inputs

use crossbind::interop::marshal::{guest_to_host, host_to_guest};
use crossbind::{Bridge, BridgeError, EmbeddingError, GuestValue, HostValue, PassMode};
use proptest::prelude::*;

fn run(src: &str) -> Vec<HostValue> {
    let bridge = Bridge::with_defaults();
    if let Err(err) = bridge.run_host(src) {
        panic!("host script failed: {}", err);
    }
    bridge.host().take_output()
}

fn all_true(out: &[HostValue]) -> bool {
    !out.is_empty() && out.iter().all(|v| *v == HostValue::Bool(true))
}

// ----------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------

#[test]
fn test_guest_objects_keep_identity_in_host() {
    let out = run(
        r#"
        $src = <<<EOD
        class K:
            pass
        k = K()
        def get(): return k
        def fn(): return get
        EOD;
        $m = embed_guest_mod("keep", $src);
        echo $m->get() === $m->get();
        echo $m->get() == $m->get();
        echo $m->fn() === $m->fn();
        echo import_guest_mod("keep") === $m;
        "#,
    );
    assert_eq!(out.len(), 4);
    assert!(all_true(&out));
}

#[test]
fn test_host_objects_keep_identity_in_guest() {
    let out = run(
        r#"
        function f() {}
        class C {}
        $c = new C();
        $same = embed_guest_func("@host_refs('a', 'b')\ndef same(a, b): return a is b and a == b");
        echo $same($c, $c);
        $fns = embed_guest_func("def fns(): return f is f");
        echo $fns();
        "#,
    );
    assert!(all_true(&out));
}

#[test]
fn test_distinct_objects_are_never_identical() {
    let out = run(
        r#"
        class C {}
        $a = new C();
        $b = new C();
        $chk = embed_guest_func("@host_refs('x', 'y')\ndef chk(x, y): return [x is y, x == y]");
        $r = $chk($a, $b);
        echo $r[0];
        echo $r[1];

        $m = embed_guest_mod("pair", "class P:\n    pass\ndef mk(): return P()");
        echo $m->mk() === $m->mk();
        "#,
    );
    assert_eq!(out, vec![HostValue::Bool(false), HostValue::Bool(true), HostValue::Bool(false)]);
}

// ----------------------------------------------------------------------
// Primitive round trip
// ----------------------------------------------------------------------

fn host_primitive() -> impl Strategy<Value = HostValue> {
    prop_oneof![
        Just(HostValue::Null),
        any::<bool>().prop_map(HostValue::Bool),
        any::<i64>().prop_map(HostValue::Int),
        any::<f64>().prop_map(HostValue::Float),
        ".*".prop_map(|s: String| HostValue::str(&s)),
    ]
}

proptest! {
    #[test]
    fn test_primitives_survive_round_trip(value in host_primitive()) {
        let bridge = Bridge::with_defaults();
        let guest = host_to_guest(&bridge, &value, PassMode::ByValue).unwrap();
        let back = guest_to_host(&bridge, &guest).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn test_integers_keep_their_bits(n in any::<i64>()) {
        let bridge = Bridge::with_defaults();
        let guest = host_to_guest(&bridge, &HostValue::Int(n), PassMode::ByValue).unwrap();
        prop_assert!(matches!(guest, GuestValue::Int(m) if m == n));
    }
}

#[test]
fn test_nan_crosses_as_nan() {
    let bridge = Bridge::with_defaults();
    let guest = host_to_guest(&bridge, &HostValue::Float(f64::NAN), PassMode::ByValue).unwrap();
    assert!(matches!(guest, GuestValue::Float(f) if f.is_nan()));
    let back = guest_to_host(&bridge, &guest).unwrap();
    assert!(matches!(back, HostValue::Float(f) if f.is_nan()));
}

// ----------------------------------------------------------------------
// Argument binding
// ----------------------------------------------------------------------

#[test]
fn test_named_argument_skips_defaulted_parameter() {
    let out = run(
        r#"
        $f = embed_guest_func("def f(a, b=0, c=0): return a + b + c");
        $g = embed_guest_func("def g(a, b=0): return a + b + 3");
        $h = embed_guest_func("def h(): return f(1, c=3)");
        echo $h();
        echo $g(1);
        "#,
    );
    assert_eq!(out, vec![HostValue::Int(4), HostValue::Int(4)]);
}

#[test]
fn test_variadic_tail_keeps_order() {
    let out = run(
        r#"
        $f = embed_guest_func("def f(first, *rest): return rest");
        $r = $f(0, 1, 2, 3, 4, 5);
        echo count($r);
        foreach ($r as $v) { echo $v; }
        "#,
    );
    let expected: Vec<HostValue> = [5, 1, 2, 3, 4, 5].into_iter().map(HostValue::Int).collect();
    assert_eq!(out, expected);
}

#[test]
fn test_host_refs_shares_while_plain_parameters_copy() {
    let out = run(
        r#"
        $arr = [1, 2];
        $plain = embed_guest_func("def plain(xs): xs.append(3)");
        $shared = embed_guest_func("@host_refs('xs')\ndef shared(xs):\n    xs[2] = 3");
        $plain($arr);
        echo count($arr);
        $shared($arr);
        echo count($arr);
        "#,
    );
    assert_eq!(out, vec![HostValue::Int(2), HostValue::Int(3)]);
}

// ----------------------------------------------------------------------
// Embedding
// ----------------------------------------------------------------------

#[test]
fn test_embedding_needs_exactly_one_function() {
    let bridge = Bridge::with_defaults();
    for source in ["x = 1", "def a(): pass\ndef b(): pass"] {
        assert!(matches!(
            bridge.embed_guest_function(source),
            Err(BridgeError::Embedding(EmbeddingError::NotExactlyOneFunction { .. }))
        ));
    }
    assert!(bridge.embed_guest_function("import math\ndef a(): return math.pi").is_ok());
}

#[test]
fn test_injected_method_is_inherited_unless_overridden() {
    let out = run(
        r#"
        class B {}
        embed_guest_meth("B", "def who(self): return 'B'");
        class D extends B {}
        class E extends B { function who() { return 'E'; } }
        $b = new B();
        $d = new D();
        $e = new E();
        echo $b->who();
        echo $d->who();
        echo $e->who();
        "#,
    );
    assert_eq!(out, vec![HostValue::str("B"), HostValue::str("B"), HostValue::str("E")]);
}

#[test]
fn test_attribute_mutation_is_visible_on_every_path() {
    let out = run(
        r#"
        class Box { public $v = 1; }
        $o = new Box();
        $set = embed_guest_func("def set(x):\n    x.v = 5");
        $get = embed_guest_func("def get():\n    return o.v");
        $set($o);
        echo $get();
        echo $o->v;

        $m = embed_guest_mod("holder", "class H:\n    pass\nh = H()\nh.v = 1\ndef get(): return h\ndef read(): return h.v");
        $h = $m->get();
        $h->v = 9;
        echo $m->read();
        "#,
    );
    assert_eq!(out, vec![HostValue::Int(5), HostValue::Int(5), HostValue::Int(9)]);
}
