use super::marshal::{guest_to_host, host_to_guest};
use super::*;
use crate::errors::{ConversionError, EmbeddingError, Runtime};
use crate::runtime::host::HostForeign;

fn run(bridge: &Rc<Bridge>, src: &str) -> Vec<HostValue> {
    bridge.run_host(src).unwrap();
    bridge.host().take_output()
}

fn same_proxy(a: &HostValue, b: &HostValue) -> bool {
    match (a, b) {
        (HostValue::Foreign(a), HostValue::Foreign(b)) => {
            Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
        }
        _ => false,
    }
}

#[test]
fn test_import_guest_module_and_call() {
    let bridge = Bridge::with_defaults();
    let out = run(&bridge, "$m = import_guest_mod('math'); echo $m->pow(2, 3);");
    assert_eq!(out, vec![HostValue::Float(8.0)]);
}

#[test]
fn test_module_crossing_twice_yields_same_proxy() {
    let bridge = Bridge::with_defaults();
    let module = GuestValue::Module(bridge.guest().import_module("math").unwrap());
    let a = guest_to_host(&bridge, &module).unwrap();
    let b = guest_to_host(&bridge, &module).unwrap();
    assert!(same_proxy(&a, &b));
    assert_eq!(bridge.stats().registry.hits, 1);
}

#[test]
fn test_proxy_returning_home_is_unwrapped() {
    let bridge = Bridge::with_defaults();
    let module = bridge.guest().import_module("math").unwrap();
    let proxy = guest_to_host(&bridge, &GuestValue::Module(module.clone())).unwrap();
    match host_to_guest(&bridge, &proxy, PassMode::ByValue).unwrap() {
        GuestValue::Module(back) => assert!(Rc::ptr_eq(&back, &module)),
        other => panic!("expected the original module, got {}", other.type_name()),
    }
}

#[test]
fn test_proxy_kind_follows_target() {
    let bridge = Bridge::with_defaults();
    let module = GuestValue::Module(bridge.guest().import_module("math").unwrap());
    match guest_to_host(&bridge, &module).unwrap() {
        HostValue::Foreign(f) => {
            let proxy = f.as_any().downcast_ref::<HostProxy>().unwrap();
            assert_eq!(proxy.kind(), ProxyKind::Module);
        }
        _ => panic!("expected a proxy"),
    }
}

#[test]
fn test_recursive_embedded_function() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "$fib = embed_guest_func(<<<'EOD'
            def fib(n):
                if n < 2:
                    return n
                return fib(n - 1) + fib(n - 2)
            EOD);
         echo $fib(15);",
    );
    assert_eq!(out, vec![HostValue::Int(610)]);
}

#[test]
fn test_arrays_are_copied_by_value() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "$a = [1, 2];
         $f = embed_guest_func(<<<'EOD'
            def grow(xs):
                xs.append(3)
                return len(xs)
            EOD);
         echo $f($a);
         echo count($a);",
    );
    assert_eq!(out, vec![HostValue::Int(3), HostValue::Int(2)]);
}

#[test]
fn test_host_refs_parameter_shares_the_array() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "$a = [1, 2];
         $f = embed_guest_func(<<<'EOD'
            @host_refs('xs')
            def grow(xs):
                xs[2] = 3
                return len(xs)
            EOD);
         echo $f($a);
         echo count($a);",
    );
    assert_eq!(out, vec![HostValue::Int(3), HostValue::Int(3)]);
}

#[test]
fn test_guest_dict_with_tuple_keys_cannot_cross() {
    let bridge = Bridge::with_defaults();
    bridge.run_guest("d = {(1, 2): 'x'}").unwrap();
    let dict = bridge.guest().main_module().get("d").unwrap();
    match guest_to_host(&bridge, &dict) {
        Err(BridgeError::Conversion(ConversionError::UnsupportedKey { kind })) => assert_eq!(kind, "tuple"),
        other => panic!("expected an unsupported key, got {:?}", other.err()),
    }
}

#[test]
fn test_depth_limit_applies_to_copies() {
    let mut config = crate::frontend::config::BridgeConfig::default();
    config.conversion.max_depth = 2;
    let bridge = Bridge::new(config);
    bridge.run_guest("deep = [[[1]]]").unwrap();
    let deep = bridge.guest().main_module().get("deep").unwrap();
    assert!(matches!(
        guest_to_host(&bridge, &deep),
        Err(BridgeError::Conversion(ConversionError::DepthExceeded { limit: 2 }))
    ));
}

#[test]
fn test_guest_exception_is_catchable_in_host() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "$f = embed_guest_func(<<<'EOD'
            def fail():
                raise ValueError('nope')
            EOD);
         try { $f(); } catch (GuestException $e) { echo $e->getMessage(); echo $e->guestType; }",
    );
    assert_eq!(out, vec![HostValue::str("nope"), HostValue::str("ValueError")]);
}

#[test]
fn test_host_exception_round_trip_restores_original() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "class MyErr extends Exception {}
         function thrower() { throw new MyErr('inner'); }
         $f = embed_guest_func(<<<'EOD'
            def relay():
                return thrower()
            EOD);
         try { $f(); } catch (MyErr $e) { echo $e->getMessage(); }",
    );
    assert_eq!(out, vec![HostValue::str("inner")]);
}

#[test]
fn test_guest_can_catch_host_exception() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "function thrower() { throw new Exception('boom'); }
         $f = embed_guest_func(<<<'EOD'
            def guarded():
                try:
                    thrower()
                except HostException as e:
                    return 'caught ' + str(e)
            EOD);
         echo $f();",
    );
    assert_eq!(out, vec![HostValue::str("caught boom")]);
}

#[test]
fn test_arity_error_is_bridge_exception() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "$f = embed_guest_func(<<<'EOD'
            def one(a):
                return a
            EOD);
         try { $f(1, 2); } catch (BridgeException $e) { echo 'arity'; }",
    );
    assert_eq!(out, vec![HostValue::str("arity")]);
}

#[test]
fn test_named_arguments_bind_host_signature() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "function add($a, $b = 0, $c = 0) { return $a + $b * 10 + $c * 100; }
         $f = embed_guest_func(<<<'EOD'
            def call_add():
                return add(1, c=3)
            EOD);
         echo $f();",
    );
    assert_eq!(out, vec![HostValue::Int(301)]);
}

#[test]
fn test_guest_function_declared_in_host_keeps_named_arguments() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "embed_guest_func_global(<<<'EOD'
            def f(a=1, b=0, c=0):
                return a + b + c
            EOD);
         $g = embed_guest_func(<<<'EOD'
            def g():
                return f(1, c=3)
            EOD);
         echo $g();
         echo f(2);",
    );
    assert_eq!(out, vec![HostValue::Int(4), HostValue::Int(2)]);

    // crossing back yields the guest function itself, not a wrapper
    let f = bridge.host().lookup_function("f").unwrap();
    let back = host_to_guest(&bridge, &HostValue::Function(f), PassMode::ByValue).unwrap();
    assert!(matches!(back, GuestValue::Function(ref func) if &*func.name == "f"));
}

#[test]
fn test_injected_method_keeps_named_arguments() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "class O {}
         embed_guest_meth('O', <<<'EOD'
            def add(self, a, b=0, c=0):
                return a + b + c
            EOD);
         $t = embed_guest_func(<<<'EOD'
            def t(o):
                return o.add(1, c=3)
            EOD);
         $o = new O();
         echo $t($o);
         echo $o->add(1, 2);",
    );
    assert_eq!(out, vec![HostValue::Int(4), HostValue::Int(3)]);
}

#[test]
fn test_cyclic_host_objects_compared_in_guest_raise() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "class N {}
         $a = new N(); $a->me = $a;
         $b = new N(); $b->me = $b;
         $cmp = embed_guest_func(<<<'EOD'
            def cmp(x, y):
                try:
                    return x == y
                except HostException as e:
                    return str(e)
            EOD);
         echo $cmp($a, $b);
         echo $cmp($a, $a);",
    );
    assert_eq!(
        out,
        vec![HostValue::str("Nesting level too deep - recursive dependency?"), HostValue::Bool(true)]
    );
}

#[test]
fn test_embed_guest_func_rejects_two_functions() {
    let bridge = Bridge::with_defaults();
    let err = bridge.embed_guest_function("def a():\n    pass\ndef b():\n    pass").unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Embedding(EmbeddingError::NotExactlyOneFunction { runtime: Runtime::Guest, found: 2, .. })
    ));
    assert_eq!(err.to_string(), "embed_guest_func: guest source must define exactly one function");
}

#[test]
fn test_embed_guest_func_counts_an_alias_once() {
    let bridge = Bridge::with_defaults();
    let f = bridge.embed_guest_function("def f():\n    return 1\ng = f").unwrap();
    match f {
        HostValue::Foreign(f) => assert_eq!(f.invoke(Vec::new()).unwrap(), HostValue::Int(1)),
        _ => panic!("expected a proxy"),
    }
}

#[test]
fn test_embed_guest_func_allows_imports() {
    let bridge = Bridge::with_defaults();
    let f = bridge.embed_guest_function("import math\ndef root(x):\n    return math.sqrt(x)").unwrap();
    match f {
        HostValue::Foreign(f) => assert_eq!(f.invoke(vec![HostValue::Int(16)]).unwrap(), HostValue::Float(4.0)),
        _ => panic!("expected a proxy"),
    }
}

#[test]
fn test_embedded_function_sees_host_globals() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "$base = 40;
         $f = embed_guest_func(<<<'EOD'
            def plus(n):
                return base + n
            EOD);
         echo $f(2);",
    );
    assert_eq!(out, vec![HostValue::Int(42)]);
}

#[test]
fn test_embed_guest_method_binds_instance() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "class Counter { public $x = 1; }
         embed_guest_meth('Counter', <<<'EOD'
            def bump(self, n):
                self.x = self.x + n
                return self.x
            EOD);
         $c = new Counter();
         echo $c->bump(5);
         echo $c->x;",
    );
    assert_eq!(out, vec![HostValue::Int(6), HostValue::Int(6)]);
}

#[test]
fn test_embed_guest_method_needs_receiver_and_class() {
    let bridge = Bridge::with_defaults();
    bridge.run_host("class K {}").unwrap();
    assert!(matches!(
        bridge.embed_guest_method("K", "def nothing():\n    pass"),
        Err(BridgeError::Embedding(EmbeddingError::MissingReceiver { .. }))
    ));
    assert!(matches!(
        bridge.embed_guest_method("Missing", "def m(self):\n    pass"),
        Err(BridgeError::Embedding(EmbeddingError::UnknownClass { .. }))
    ));
}

#[test]
fn test_embed_guest_module_is_importable() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "embed_guest_mod('helpers', <<<'EOD'
            def twice(x):
                return x * 2
            EOD);
         $f = embed_guest_func(<<<'EOD'
            import helpers
            def go():
                return helpers.twice(21)
            EOD);
         echo $f();",
    );
    assert_eq!(out, vec![HostValue::Int(42)]);
}

#[test]
fn test_embed_guest_func_global_writes_through() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "function outer() {
             $total = 1;
             embed_guest_func_global(<<<'EOD'
                def add_ten():
                    total = total + 10
                EOD);
             return $total;
         }
         echo outer();",
    );
    assert_eq!(out, vec![HostValue::Int(11)]);
    assert!(bridge.host().lookup_function("add_ten").is_some());
}

#[test]
fn test_embed_host_func_from_guest() {
    let bridge = Bridge::with_defaults();
    bridge
        .run_guest("g = embed_host_func('function g($a, $b) { return $a + $b; }')\nprint(g(1, 2))\n")
        .unwrap();
    assert_eq!(bridge.guest().take_output(), "3\n");
    assert!(bridge.host().lookup_function("g").is_none());
}

#[test]
fn test_embed_host_func_rejects_statements() {
    let bridge = Bridge::with_defaults();
    let err = bridge.embed_host_function("$x = 1; function g() {}").unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Embedding(EmbeddingError::NotExactlyOneFunction { runtime: Runtime::Host, found: 1, .. })
    ));
}

#[test]
fn test_host_objects_compare_and_keep_identity() {
    let bridge = Bridge::with_defaults();
    let out = run(
        &bridge,
        "class P { public $v = 0; function __construct($v) { $this->v = $v; } }
         $eq = embed_guest_func(<<<'EOD'
            def eq(a, b):
                return a == b
            EOD);
         $same = embed_guest_func(<<<'EOD'
            def same(a, b):
                return a is b
            EOD);
         $isa = embed_guest_func(<<<'EOD'
            def isa(o):
                return isinstance(o, P)
            EOD);
         $o = new P(1);
         echo $eq(new P(1), new P(1));
         echo $eq(new P(1), new P(2));
         echo $same($o, $o);
         echo $isa($o);",
    );
    assert_eq!(
        out,
        vec![HostValue::Bool(true), HostValue::Bool(false), HostValue::Bool(true), HostValue::Bool(true)]
    );
}

#[test]
fn test_crossings_are_counted() {
    let bridge = Bridge::with_defaults();
    let before = bridge.stats();
    run(&bridge, "$m = import_guest_mod('math'); echo $m->floor(2.5);");
    let after = bridge.stats();
    assert!(after.host_to_guest_calls > before.host_to_guest_calls);
    assert!(after.registry.live >= 1);
}
