//! The host dispatch seam.
//!
//! Call targets that are neither script functions nor core builtins fall
//! through to [`ExternalDispatch::call_function`] — this is where the host
//! wires instrument schedulers, audio setup, bus configuration, and the rest
//! of its command set into the score language. Handle arithmetic is likewise
//! delegated, since handles are opaque to the core.

use crate::ast::BinaryOp;
use crate::value::MincValue;

/// Why a host dispatch did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The host does not know this function name.
    NotFound,
    /// The host knows the function but it failed.
    Failed(String),
}

/// Host-provided function and handle-operator dispatch.
pub trait ExternalDispatch {
    /// Calls a host function by name.
    fn call_function(
        &mut self,
        name: &str,
        args: &[MincValue],
    ) -> Result<MincValue, DispatchError>;

    /// Applies a binary operator where at least one operand is a handle.
    ///
    /// The default implementation reports the operator as unavailable; the
    /// interpreter then warns and yields void.
    fn handle_op(
        &mut self,
        _op: BinaryOp,
        _lhs: &MincValue,
        _rhs: &MincValue,
    ) -> Result<MincValue, DispatchError> {
        Err(DispatchError::NotFound)
    }
}

/// A host that provides nothing. Useful for tests and standalone parsing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDispatch;

impl ExternalDispatch for NullDispatch {
    fn call_function(
        &mut self,
        _name: &str,
        _args: &[MincValue],
    ) -> Result<MincValue, DispatchError> {
        Err(DispatchError::NotFound)
    }
}
