use super::*;

struct Marker(u32);

fn registry(threshold: usize) -> IdentityRegistry {
    IdentityRegistry::new(&RegistryConfig { sweep_threshold: threshold, initial_capacity: 4 })
}

fn key(identity: usize) -> RegistryKey {
    RegistryKey::new(Direction::HostToGuest, identity)
}

fn always() -> Box<dyn Fn() -> bool> {
    Box::new(|| true)
}

#[test]
fn test_same_key_returns_same_proxy() {
    let mut reg = registry(100);
    let a = reg.get_or_create(key(1), always(), |_| Rc::new(Marker(1)));
    let b = reg.get_or_create(key(1), always(), |_| Rc::new(Marker(2)));
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(b.0, 1);

    let stats = reg.stats();
    assert_eq!((stats.hits, stats.misses, stats.created, stats.live), (1, 1, 1, 1));
}

#[test]
fn test_directions_are_separate() {
    let mut reg = registry(100);
    let a = reg.get_or_create(key(7), always(), |_| Rc::new(Marker(1)));
    let b = reg.get_or_create(
        RegistryKey::new(Direction::GuestToHost, 7),
        always(),
        |_| Rc::new(Marker(2)),
    );
    assert!(!Rc::ptr_eq(&a, &b));
    assert_eq!(reg.len(), 2);
}

#[test]
fn test_dropped_proxy_is_a_miss_not_an_error() {
    let mut reg = registry(100);
    let first = reg.get_or_create(key(3), always(), |_| Rc::new(Marker(1)));
    drop(first);
    let second = reg.get_or_create(key(3), always(), |_| Rc::new(Marker(2)));
    assert_eq!(second.0, 2);
    assert_eq!(reg.stats().evictions, 1);
    assert_eq!(reg.len(), 1);
}

#[test]
fn test_dead_underlying_evicts_even_with_live_proxy() {
    let mut reg = registry(100);
    let owner = Rc::new(());
    let weak = Rc::downgrade(&owner);
    let first = reg.get_or_create(key(9), Box::new(move || weak.strong_count() > 0), |_| Rc::new(Marker(1)));
    drop(owner);
    let second = reg.get_or_create(key(9), always(), |_| Rc::new(Marker(2)));
    assert!(!Rc::ptr_eq(&first, &second));
}

#[test]
fn test_mistyped_entry_is_replaced() {
    let mut reg = registry(100);
    let _marker = reg.get_or_create(key(5), always(), |_| Rc::new(Marker(1)));
    let text = reg.get_or_create(key(5), always(), |_| Rc::new(String::from("other")));
    assert_eq!(*text, "other");
    assert_eq!(reg.stats().evictions, 1);
}

#[test]
fn test_release_and_stale_token() {
    let mut reg = registry(100);
    let mut token = None;
    let _p = reg.get_or_create(key(11), always(), |t| {
        token = Some(t);
        Rc::new(Marker(0))
    });
    let token = token.unwrap();
    assert!(reg.release(token).is_ok());
    assert!(reg.is_empty());
    assert!(!reg.contains(&key(11)));

    let err = reg.release(token).unwrap_err();
    assert_eq!(err, IdentityRegistryError::StaleToken { slot: token.slot, generation: token.generation });
}

#[test]
fn test_slots_are_reused_with_new_generation() {
    let mut reg = registry(100);
    let mut tokens = Vec::new();
    let p = reg.get_or_create(key(1), always(), |t| {
        tokens.push(t);
        Rc::new(Marker(0))
    });
    reg.release(tokens[0]).unwrap();
    drop(p);
    let _q = reg.get_or_create(key(2), always(), |t| {
        tokens.push(t);
        Rc::new(Marker(0))
    });
    assert_eq!(tokens[0].slot, tokens[1].slot);
    assert_ne!(tokens[0].generation, tokens[1].generation);
}

#[test]
fn test_sweep_runs_at_threshold() {
    let mut reg = registry(3);
    for i in 0..2 {
        let _ = reg.get_or_create(key(100 + i), always(), |_| Rc::new(Marker(0)));
    }
    assert_eq!(reg.len(), 2);
    let _kept = reg.get_or_create(key(200), always(), |_| Rc::new(Marker(0)));
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.stats().evictions, 2);
}

#[test]
fn test_with_requires_init_and_rejects_reentry() {
    std::thread::spawn(|| {
        assert_eq!(with(|r| r.len()).unwrap_err(), IdentityRegistryError::Uninitialized);
        init(&RegistryConfig::default());
        assert_eq!(with(|r| r.len()).unwrap(), 0);
        let nested = with(|_| with(|r| r.len())).unwrap();
        assert_eq!(nested.unwrap_err(), IdentityRegistryError::Reentrant);
    })
    .join()
    .unwrap();
}

#[test]
fn test_first_init_wins_on_a_thread() {
    std::thread::spawn(|| {
        let first = RegistryConfig { sweep_threshold: 8, initial_capacity: 4 };
        init(&first);
        init(&RegistryConfig { sweep_threshold: 99, initial_capacity: 4 });
        assert_eq!(with(|r| r.config.clone()).unwrap(), first);
    })
    .join()
    .unwrap();
}
