//! crossbind - a bridge between a class-based host language and a
//! dynamically typed guest language running in one process
//!
//! Host code imports guest modules, embeds guest functions and methods, and
//! guest code embeds host functions. Values cross by conversion (primitives
//! and aggregates) or by proxy (everything with identity), calls are bound
//! against the callee's declared parameters, and errors surface as the
//! receiving runtime's own exceptions.

// Core modules
pub mod errors;
pub mod frontend;
pub mod interop;
pub mod logging;
pub mod runtime;

// Re-export commonly used items
pub use errors::{BridgeError, CallError, ConversionError, EmbeddingError, IdentityRegistryError, ImportError, Runtime};
pub use frontend::{cli_main, BridgeConfig};
pub use interop::{Bridge, BridgeStats, Direction, GuestProxy, HostProxy, PassMode, ProxyKind};
pub use logging::{init_logging, LogConfig, LogFormat, LogOutput};
pub use runtime::guest::{GuestError, GuestInterp, GuestValue};
pub use runtime::host::{HostError, HostInterp, HostValue};
