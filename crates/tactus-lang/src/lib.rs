//! Score-language runtime for the tactus engine.
//!
//! A score is a small dynamically typed program. An external parser builds a
//! typed AST through the [`ast`] constructors; this crate walks it. The
//! runtime provides:
//!
//! - **Values**: floats, strings, handles, shared lists/maps, structs, and
//!   bound functions, with a typed operator table ([`value`])
//! - **Scopes**: a lexical scope stack with a global struct-type registry
//!   and method-name mangling ([`symbol`])
//! - **Evaluation**: a tree-walking interpreter with nonlocal `return`,
//!   method dispatch, and the builtin function set ([`interp`])
//! - **Host seam**: unresolved call names and handle arithmetic are routed
//!   to the embedding engine through [`ExternalDispatch`]
//!
//! # Example
//!
//! ```rust
//! use tactus_lang::{Interpreter, Node, NullDispatch, ParamDecl};
//! use tactus_lang::value::{MincType, MincValue};
//!
//! // function double(x) { return x * 2 }  double(21)
//! let score = Node::stmts(vec![
//!     Node::func_def(
//!         "double",
//!         vec![ParamDecl::new("x", MincType::Float)],
//!         Node::ret(Node::binary(
//!             tactus_lang::BinaryOp::Mul,
//!             Node::load("x"),
//!             Node::float(2.0),
//!         )),
//!     ),
//!     Node::call_named("double", vec![Node::float(21.0)]),
//! ]);
//!
//! let mut interp = Interpreter::new();
//! let result = interp.run(&score, &mut NullDispatch).unwrap();
//! assert_eq!(result.try_eq(&MincValue::Float(42.0)), Some(true));
//! ```

pub mod ast;
mod builtins;
pub mod dispatch;
pub mod error;
pub mod interp;
pub mod symbol;
pub mod value;

pub use ast::{BinaryOp, MemberDecl, Node, NodeKind, ParamDecl, RelOp};
pub use dispatch::{DispatchError, ExternalDispatch, NullDispatch};
pub use error::MincError;
pub use interp::{InterpSettings, Interpreter};
pub use symbol::{LookupMode, SymbolTable};
pub use value::{MincHandle, MincType, MincValue};
