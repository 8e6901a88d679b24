//! Embedding facade - the bridge operations host and guest code call
//!
//! Host builtins: `import_guest_mod`, `embed_guest_func`,
//! `embed_guest_func_global`, `embed_guest_meth`, `embed_guest_mod`.
//! Guest builtin: `embed_host_func`.
//!
//! Embedded guest fragments resolve names they cannot find against the host:
//! variables of the embedding scope first, then (after guest builtins) host
//! functions and host classes.

use super::marshal::{guest_to_host, host_to_guest};
use super::proxy::guest_proxy;
use super::translate::{guest_raised, to_guest_error, to_host_error};
use super::types::{HostTarget, PassMode};
use super::{call, Bridge};
use crate::errors::{BridgeError, EmbeddingError, IdentityRegistryError, ImportError, Runtime};
use crate::runtime::guest::{GuestError, GuestFunction, GuestModule, GuestValue, NameResolver};
use crate::runtime::host::ast::Stmt;
use crate::runtime::host::{
    HostCallable, HostError, HostFunction, HostInterp, HostScope, HostValue, NativeContext,
};
use crate::runtime::signature::CallArgs;
use std::rc::{Rc, Weak};
use tracing::info;

const EMBEDDED_MODULE: &str = "<embedded>";

/// Install the facade builtins into both runtimes
pub(super) fn install(bridge: &Rc<Bridge>) {
    let host = bridge.host();
    host_builtin(host, bridge, "import_guest_mod", |bridge, interp, _, args| {
        let name = string_arg(interp, &args, 0, "import_guest_mod")?;
        import_guest_module(bridge, &name).map_err(to_host_error)
    });
    host_builtin(host, bridge, "embed_guest_func", |bridge, interp, _, args| {
        let source = string_arg(interp, &args, 0, "embed_guest_func")?;
        embed_guest_function(bridge, &source).map_err(to_host_error)
    });
    host_builtin(host, bridge, "embed_guest_func_global", |bridge, interp, ctx, args| {
        let source = string_arg(interp, &args, 0, "embed_guest_func_global")?;
        embed_guest_function_into_scope(bridge, &source, &ctx.scope)
    });
    host_builtin(host, bridge, "embed_guest_meth", |bridge, interp, _, args| {
        let class = string_arg(interp, &args, 0, "embed_guest_meth")?;
        let source = string_arg(interp, &args, 1, "embed_guest_meth")?;
        embed_guest_method(bridge, &class, &source).map_err(to_host_error)?;
        Ok(HostValue::Null)
    });
    host_builtin(host, bridge, "embed_guest_mod", |bridge, interp, _, args| {
        let name = string_arg(interp, &args, 0, "embed_guest_mod")?;
        let source = string_arg(interp, &args, 1, "embed_guest_mod")?;
        embed_guest_module(bridge, &name, &source).map_err(to_host_error)
    });

    let weak = Rc::downgrade(bridge);
    bridge.guest().register_builtin(
        "embed_host_func",
        GuestValue::builtin("embed_host_func", move |interp, args, _| {
            let bridge = weak
                .upgrade()
                .ok_or_else(|| to_guest_error(IdentityRegistryError::Detached.into()))?;
            let source = match args.first() {
                Some(value) => interp.to_str(value)?,
                None => {
                    return Err(GuestError::new(
                        "TypeError",
                        "embed_host_func() missing required argument 'source'",
                    ))
                }
            };
            embed_host_function(&bridge, &source).map_err(to_guest_error)
        }),
    );
}

fn host_builtin(
    host: &HostInterp,
    bridge: &Rc<Bridge>,
    name: &'static str,
    f: impl Fn(&Rc<Bridge>, &HostInterp, &NativeContext, Vec<HostValue>) -> Result<HostValue, HostError> + 'static,
) {
    let weak = Rc::downgrade(bridge);
    host.register_native(
        name,
        Rc::new(move |interp, ctx, args| {
            let bridge = weak
                .upgrade()
                .ok_or_else(|| to_host_error(IdentityRegistryError::Detached.into()))?;
            f(&bridge, interp, ctx, args)
        }),
    );
}

fn string_arg(interp: &HostInterp, args: &[HostValue], index: usize, function: &str) -> Result<String, HostError> {
    match args.get(index) {
        Some(value) => interp.to_display(value),
        None => Err(HostError::error(format!(
            "{}() expects at least {} argument(s)",
            function,
            index + 1
        ))),
    }
}

/// Load a guest module by its dotted name and return its host-side proxy
pub fn import_guest_module(bridge: &Rc<Bridge>, name: &str) -> Result<HostValue, BridgeError> {
    info!(module = name, "import_guest_mod");
    let module = bridge.guest().import_module(name).map_err(|err| match err {
        GuestError::Raised(exc) if &*exc.class.name == "ImportError" => {
            BridgeError::Import(ImportError::new(name, exc.exception_message()))
        }
        other => guest_raised(other),
    })?;
    guest_to_host(bridge, &GuestValue::Module(module))
}

/// Compile a fragment that defines exactly one function and return the
/// function's host-side proxy
pub fn embed_guest_function(bridge: &Rc<Bridge>, source: &str) -> Result<HostValue, BridgeError> {
    info!("embed_guest_func");
    let resolver = HostScopeResolver::new(bridge, bridge.host().globals(), false);
    let function = compile_single(bridge, "embed_guest_func", source, resolver)?;
    guest_to_host(bridge, &GuestValue::Function(function))
}

/// Compile a single function against the caller's scope, declare it as a
/// host function and call it at once with no arguments.
///
/// Assignments inside the body to names the caller already binds write
/// through to the caller's variables.
pub fn embed_guest_function_into_scope(
    bridge: &Rc<Bridge>,
    source: &str,
    scope: &HostScope,
) -> Result<HostValue, HostError> {
    info!("embed_guest_func_global");
    let resolver = HostScopeResolver::new(bridge, scope.clone(), true);
    let function =
        compile_single(bridge, "embed_guest_func_global", source, resolver).map_err(to_host_error)?;

    let proxy = guest_to_host(bridge, &GuestValue::Function(function.clone())).map_err(to_host_error)?;
    if let HostValue::Foreign(target) = proxy {
        bridge.host().declare_function(HostFunction::foreign(&function.name, target))?;
    }
    call::invoke_guest(bridge, &GuestValue::Function(function), CallArgs::positional(Vec::new()))
        .map_err(to_host_error)
}

/// Install a single guest function as a method of a host class. The
/// function's first parameter receives the instance.
pub fn embed_guest_method(bridge: &Rc<Bridge>, class_name: &str, source: &str) -> Result<(), BridgeError> {
    const OPERATION: &str = "embed_guest_meth";
    info!(class = class_name, "embed_guest_meth");
    let class = bridge.host().lookup_class(class_name).ok_or_else(|| EmbeddingError::UnknownClass {
        operation: OPERATION,
        name: class_name.to_string(),
    })?;
    let resolver = HostScopeResolver::new(bridge, bridge.host().globals(), false);
    let function = compile_single(bridge, OPERATION, source, resolver)?;
    if function.signature.params.is_empty() {
        return Err(EmbeddingError::MissingReceiver {
            operation: OPERATION,
            function: function.name.to_string(),
        }
        .into());
    }

    if let HostValue::Foreign(target) = guest_to_host(bridge, &GuestValue::Function(function.clone()))? {
        class.install_method(&function.name, HostFunction::foreign(&function.name, target));
    }
    Ok(())
}

/// Compile guest source as a named module, make it importable, and return
/// its host-side proxy
pub fn embed_guest_module(bridge: &Rc<Bridge>, name: &str, source: &str) -> Result<HostValue, BridgeError> {
    info!(module = name, "embed_guest_mod");
    let resolver = HostScopeResolver::new(bridge, bridge.host().globals(), false);
    let module = bridge
        .guest()
        .compile_module(name, source, Some(resolver))
        .map_err(|err| compile_failure("embed_guest_mod", err))?;
    bridge.guest().register_module(name, module.clone());
    guest_to_host(bridge, &GuestValue::Module(module))
}

/// Compile host source that is exactly one function declaration and return
/// its guest-side proxy. The function is not declared globally.
pub fn embed_host_function(bridge: &Rc<Bridge>, source: &str) -> Result<GuestValue, BridgeError> {
    const OPERATION: &str = "embed_host_func";
    info!("embed_host_func");
    let program = bridge.host().compile(source).map_err(|err| EmbeddingError::Compile {
        operation: OPERATION,
        message: err.message(),
    })?;
    let decl = match program.as_slice() {
        [Stmt::Function(decl)] => decl.clone(),
        other => {
            return Err(EmbeddingError::NotExactlyOneFunction {
                operation: OPERATION,
                runtime: Runtime::Host,
                found: other.iter().filter(|s| matches!(s, Stmt::Function(_))).count(),
            }
            .into())
        }
    };
    let function = Rc::new(HostFunction {
        name: Rc::from(decl.name.as_str()),
        body: HostCallable::User(decl),
    });
    host_to_guest(bridge, &HostValue::Function(function), PassMode::ByValue)
}

fn compile_failure(operation: &'static str, err: GuestError) -> BridgeError {
    match err {
        GuestError::Raised(exc) if &*exc.class.name == "SyntaxError" => {
            EmbeddingError::Compile { operation, message: exc.exception_message() }.into()
        }
        other => guest_raised(other),
    }
}

/// Run a fragment in a fresh namespace and return the one function it
/// defines. Imports and other bindings do not count.
fn compile_single(
    bridge: &Rc<Bridge>,
    operation: &'static str,
    source: &str,
    resolver: Rc<dyn NameResolver>,
) -> Result<Rc<GuestFunction>, BridgeError> {
    let module = bridge
        .guest()
        .compile_module(EMBEDDED_MODULE, source, Some(resolver))
        .map_err(|err| compile_failure(operation, err))?;
    let mut defined = defined_functions(&module);
    if defined.len() != 1 {
        return Err(EmbeddingError::NotExactlyOneFunction {
            operation,
            runtime: Runtime::Guest,
            found: defined.len(),
        }
        .into());
    }
    Ok(defined.remove(0))
}

/// Functions defined by the module itself; a name aliasing one counts once
fn defined_functions(module: &Rc<GuestModule>) -> Vec<Rc<GuestFunction>> {
    let mut defined: Vec<Rc<GuestFunction>> = Vec::new();
    for value in module.dict.borrow().values() {
        if let GuestValue::Function(f) = value {
            if Rc::ptr_eq(&f.globals, module) && !defined.iter().any(|seen| Rc::ptr_eq(seen, f)) {
                defined.push(f.clone());
            }
        }
    }
    defined
}

/// Resolves names an embedded fragment leaves unbound against a host scope
/// and the host's function and class tables
struct HostScopeResolver {
    bridge: Weak<Bridge>,
    scope: HostScope,
    /// Assignments to names already bound in `scope` update the host variable
    write_through: bool,
}

impl HostScopeResolver {
    fn new(bridge: &Rc<Bridge>, scope: HostScope, write_through: bool) -> Rc<dyn NameResolver> {
        Rc::new(Self { bridge: Rc::downgrade(bridge), scope, write_through })
    }

    fn bridge(&self) -> Result<Rc<Bridge>, GuestError> {
        self.bridge
            .upgrade()
            .ok_or_else(|| to_guest_error(IdentityRegistryError::Detached.into()))
    }
}

impl NameResolver for HostScopeResolver {
    fn lookup_variable(&self, name: &str) -> Result<Option<GuestValue>, GuestError> {
        let value = self.scope.borrow().get(name).cloned();
        match value {
            Some(value) => {
                let bridge = self.bridge()?;
                host_to_guest(&bridge, &value, PassMode::ByValue).map(Some).map_err(to_guest_error)
            }
            None => Ok(None),
        }
    }

    fn assign_variable(&self, name: &str, value: &GuestValue) -> Result<bool, GuestError> {
        if !self.write_through || !self.scope.borrow().contains_key(name) {
            return Ok(false);
        }
        let bridge = self.bridge()?;
        let value = guest_to_host(&bridge, value).map_err(to_guest_error)?;
        self.scope.borrow_mut().insert(name.to_string(), value);
        Ok(true)
    }

    fn lookup_symbol(&self, name: &str) -> Result<Option<GuestValue>, GuestError> {
        let bridge = self.bridge()?;
        let target = if let Some(function) = bridge.host().lookup_function(name) {
            HostTarget::Value(HostValue::Function(function))
        } else if let Some(class) = bridge.host().lookup_class(name) {
            HostTarget::Class(class)
        } else {
            return Ok(None);
        };
        guest_proxy(&bridge, target).map(Some).map_err(to_guest_error)
    }
}
