//! Runtime support: errors, static context, variable stack, evaluation context
//! and the result-tree-fragment pool.
mod context;
mod error;
mod rtf;
mod static_ctx;
mod variables;

pub use context::{
    ContextConfig, ContextScope, DEFAULT_LINK_CAPACITY, DEFAULT_RECURSION_LIMIT,
    DEFAULT_VARIABLE_SLOTS, StackDepths, XPathContext, XPathContextBuilder,
};
pub use error::{DefaultErrorListener, Error, ErrorCode, ErrorListener, SourceLocator};
pub use rtf::RtfPool;
pub use static_ctx::{
    NamespaceBindings, PrefixResolver, StaticContext, StaticContextBuilder, VarRef,
};
pub use variables::{Thunk, VarSlot, VariableStack};
