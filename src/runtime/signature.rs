//! Declared-parameter signatures and argument binding
//!
//! Both runtimes bind their own calls through `Signature::bind`, and the
//! call marshaler binds cross-runtime calls against the destination's
//! signature before converting a single argument.

use crate::errors::CallError;
use smallvec::SmallVec;
use std::rc::Rc;

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Rc<str>,
    pub has_default: bool,
    /// Host aggregates bound here are proxied instead of copied
    pub preserve_ref: bool,
}

impl Param {
    pub fn required(name: &str) -> Self {
        Self { name: Rc::from(name), has_default: false, preserve_ref: false }
    }

    pub fn optional(name: &str) -> Self {
        Self { name: Rc::from(name), has_default: true, preserve_ref: false }
    }
}

/// Declared parameters of a callable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: Rc<str>,
    pub params: Vec<Param>,
    pub variadic: Option<Rc<str>>,
}

/// Arguments as written at a call site
#[derive(Debug, Clone)]
pub struct CallArgs<V> {
    pub positional: Vec<V>,
    pub named: SmallVec<[(Rc<str>, V); 2]>,
}

impl<V> CallArgs<V> {
    pub fn positional(values: Vec<V>) -> Self {
        Self { positional: values, named: SmallVec::new() }
    }

    pub fn with_named(mut self, name: &str, value: V) -> Self {
        self.named.push((Rc::from(name), value));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prepend a receiver (`self` / `$this`) as the first positional argument
    pub fn with_receiver(mut self, receiver: V) -> Self {
        self.positional.insert(0, receiver);
        self
    }

    pub fn map<W, E>(self, mut f: impl FnMut(V) -> Result<W, E>) -> Result<CallArgs<W>, E> {
        let positional = self.positional.into_iter().map(&mut f).collect::<Result<Vec<_>, _>>()?;
        let mut named = SmallVec::new();
        for (name, value) in self.named {
            named.push((name, f(value)?));
        }
        Ok(CallArgs { positional, named })
    }
}

/// Arguments bound to declared parameters.
///
/// `slots[i]` is `None` when parameter `i` received nothing and declares a
/// default: the callee evaluates its own default.
#[derive(Debug, Clone)]
pub struct CallFrame<V> {
    pub slots: Vec<Option<V>>,
    pub variadic: Vec<V>,
}

impl<V> CallFrame<V> {
    pub fn map<W, E>(
        self,
        mut f: impl FnMut(Option<usize>, V) -> Result<W, E>,
    ) -> Result<CallFrame<W>, E> {
        let mut slots = Vec::with_capacity(self.slots.len());
        for (i, slot) in self.slots.into_iter().enumerate() {
            slots.push(match slot {
                Some(v) => Some(f(Some(i), v)?),
                None => None,
            });
        }
        let variadic = self.variadic.into_iter().map(|v| f(None, v)).collect::<Result<_, _>>()?;
        Ok(CallFrame { slots, variadic })
    }
}

impl Signature {
    pub fn new(name: &str, params: Vec<Param>, variadic: Option<&str>) -> Self {
        Self { name: Rc::from(name), params, variadic: variadic.map(Rc::from) }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| &*p.name == name)
    }

    pub fn preserves_ref(&self, index: usize) -> bool {
        self.params.get(index).is_some_and(|p| p.preserve_ref)
    }

    /// Mark the named parameters as reference-preserving.
    ///
    /// Fails with the first name that is not a declared parameter.
    pub fn preserve_refs<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), String> {
        for name in names {
            let name = name.as_ref();
            match self.index_of(name) {
                Some(i) => self.params[i].preserve_ref = true,
                None => return Err(name.to_string()),
            }
        }
        Ok(())
    }

    /// Signature seen through a bound method: the receiver is already supplied
    pub fn without_receiver(&self) -> Signature {
        Signature {
            name: self.name.clone(),
            params: self.params.iter().skip(1).cloned().collect(),
            variadic: self.variadic.clone(),
        }
    }

    /// Bind positional arguments first, then named ones, then collect
    /// leftover positionals into the variadic tail.
    pub fn bind<V>(&self, args: CallArgs<V>) -> Result<CallFrame<V>, CallError> {
        let declared = self.params.len();
        let given = args.positional.len();
        let mut slots: Vec<Option<V>> = Vec::with_capacity(declared);
        let mut positional = args.positional.into_iter();
        for _ in 0..declared {
            slots.push(positional.next());
        }

        let variadic: Vec<V> = positional.collect();
        if !variadic.is_empty() && self.variadic.is_none() {
            return Err(CallError::TooManyPositional {
                callee: self.name.to_string(),
                expected: declared,
                got: given,
            });
        }

        for (name, value) in args.named {
            let index = self.index_of(&name).ok_or_else(|| CallError::UnknownNamed {
                callee: self.name.to_string(),
                name: name.to_string(),
            })?;
            if slots[index].is_some() {
                return Err(CallError::DuplicateArgument {
                    callee: self.name.to_string(),
                    name: name.to_string(),
                });
            }
            slots[index] = Some(value);
        }

        for (param, slot) in self.params.iter().zip(&slots) {
            if slot.is_none() && !param.has_default {
                return Err(CallError::MissingArgument {
                    callee: self.name.to_string(),
                    name: param.name.to_string(),
                });
            }
        }

        Ok(CallFrame { slots, variadic })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Signature {
        Signature::new(
            "f",
            vec![Param::required("a"), Param::optional("b"), Param::optional("c")],
            None,
        )
    }

    #[test]
    fn test_named_fills_later_slot_and_leaves_default_empty() {
        let frame = abc().bind(CallArgs::positional(vec![1]).with_named("c", 3)).unwrap();
        assert_eq!(frame.slots, vec![Some(1), None, Some(3)]);
        assert!(frame.variadic.is_empty());
    }

    #[test]
    fn test_extra_positionals_without_variadic_fail() {
        let err = abc().bind(CallArgs::positional(vec![1, 2, 3, 4])).unwrap_err();
        assert!(matches!(err, CallError::TooManyPositional { expected: 3, got: 4, .. }));
    }

    #[test]
    fn test_variadic_tail_keeps_order() {
        let sig = Signature::new("cat", vec![Param::required("sep")], Some("rest"));
        let frame = sig.bind(CallArgs::positional(vec![0, 5, 4, 3, 2, 1])).unwrap();
        assert_eq!(frame.slots, vec![Some(0)]);
        assert_eq!(frame.variadic, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_unknown_and_duplicate_named() {
        let err = abc().bind(CallArgs::positional(vec![1]).with_named("z", 0)).unwrap_err();
        assert!(matches!(err, CallError::UnknownNamed { ref name, .. } if name == "z"));

        let err = abc().bind(CallArgs::positional(vec![1]).with_named("a", 2)).unwrap_err();
        assert!(matches!(err, CallError::DuplicateArgument { ref name, .. } if name == "a"));
    }

    #[test]
    fn test_missing_required() {
        let err = abc().bind(CallArgs::<i32>::positional(vec![]).with_named("b", 1)).unwrap_err();
        assert_eq!(err.to_string(), "f() missing required argument 'a'");
    }

    #[test]
    fn test_preserve_refs_rejects_unknown_name() {
        let mut sig = abc();
        assert!(sig.preserve_refs(&["a", "c"]).is_ok());
        assert!(sig.preserves_ref(0));
        assert!(!sig.preserves_ref(1));
        assert!(sig.preserves_ref(2));
        assert_eq!(sig.preserve_refs(&["nope"]), Err("nope".to_string()));
    }

    #[test]
    fn test_without_receiver_drops_first_param() {
        let sig = Signature::new("m", vec![Param::required("self"), Param::required("x")], None);
        let bound = sig.without_receiver();
        assert_eq!(bound.params.len(), 1);
        assert_eq!(&*bound.params[0].name, "x");
    }
}
