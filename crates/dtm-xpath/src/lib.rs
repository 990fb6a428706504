//! XPath 1.0 evaluation over handle-based tree stores.
//!
//! Expressions are compiled once into an immutable [`CompiledPath`] and
//! evaluated against an [`XPathContext`], which owns the tree stores, the
//! variable stack, the result-tree-fragment pool and the state stacks of a
//! (possibly recursive) evaluation.
//!
//! ```
//! use dtm_xpath::model::builder::{doc, elem, text};
//! use dtm_xpath::{CompileMode, CompiledPath, DefaultErrorListener, StaticContext, XPathContext};
//!
//! let mut ctx = XPathContext::default();
//! let store = ctx.stores_mut().register_tree(
//!     doc().child(elem("r").child(elem("a").child(text("1"))).child(elem("a"))).build(),
//! );
//! let root = ctx.stores().fragment_root(store, 0).unwrap();
//! let path = CompiledPath::compile(
//!     "count(/r/a)",
//!     None,
//!     &StaticContext::default(),
//!     CompileMode::Select,
//!     &DefaultErrorListener,
//! )
//! .unwrap();
//! let value = path.execute(&mut ctx, root, None).unwrap().unwrap();
//! assert_eq!(value.to_number(ctx.stores()).unwrap(), 2.0);
//! ```
pub mod cache;
pub mod compiler;
pub mod consts;
mod engine;
pub mod model;
pub mod parser;
pub mod runtime;
pub mod xdm;
pub mod xpath;

pub use cache::PathCache;
pub use compiler::{
    CompileMode, Expr, ExtensionExpr, FragmentNode, MATCH_SCORE_NODETEST, MATCH_SCORE_NONE,
    MATCH_SCORE_NSWILD, MATCH_SCORE_OTHER, MATCH_SCORE_QNAME,
};
pub use model::{NodeHandle, NodeKind, QName, TreeStore, TreeStoreManager};
pub use parser::XPathParser;
pub use runtime::{
    DefaultErrorListener, Error, ErrorCode, ErrorListener, StaticContext, StaticContextBuilder,
    XPathContext, XPathContextBuilder,
};
pub use xdm::{ExpandedName, NodeSequence, Value};
pub use xpath::CompiledPath;
