//! exprtree host runtime: typed expression graphs with reflection.
//!
//! This crate provides everything an expression graph needs to exist and run
//! outside a managed runtime:
//!
//! - Named, generic and array types with full module identity
//! - A type registry answering reflection queries through [`TypeSystem`]
//! - Immutable expression graphs built by validating factories
//! - An evaluator with identity-based parameter scoping
//!
//! # Architecture
//!
//! - [`ty`]: Type representation (Ty, TypeName, ModuleIdentity)
//! - [`type_name`]: Parser for qualified type names
//! - [`registry`]: Type definitions and the registry
//! - [`reflect`]: Member handles and the `TypeSystem` trait
//! - [`value`]: Runtime values
//! - [`expr`]: Expression graph nodes
//! - [`factory`]: Validating node constructors
//! - [`display`]: Source-like rendering
//! - [`rewrite`]: Parameter substitution
//! - [`eval`]: Evaluator
//! - [`builtins`]: Core library registration
//! - [`sample`]: Demo domain and example graphs

pub mod builtins;
pub mod display;
pub mod error;
pub mod eval;
pub mod expr;
pub mod factory;
pub mod reflect;
pub mod registry;
pub mod rewrite;
pub mod sample;
pub mod ty;
pub mod type_name;
pub mod value;

pub use error::{EvalError, HostError};
pub use eval::{Evaluator, Invoker, Scope};
pub use expr::{
    CatchBlock, ElementInit, Expr, ExprKind, GotoKind, LabelTarget, LambdaExpr, MemberBinding,
    NodeType, ParameterExpr, SwitchCase, SymbolDocument,
};
pub use reflect::{
    BindingFlags, ConstructorInfo, FieldInfo, MemberInfo, MemberKind, MethodInfo, ParameterInfo,
    PropertyInfo, TypeSystem,
};
pub use registry::TypeRegistry;
pub use ty::{ModuleIdentity, Ty, TypeName};
pub use type_name::{QualifiedTypeName, TypeNameError};
pub use value::Value;
