//! Compiled path driver: the single boundary where evaluation errors are
//! caught, located and routed to the error listener.
use std::sync::Arc;

use crate::compiler::{self, CompileMode, Expr, MATCH_SCORE_NONE};
use crate::model::NodeHandle;
use crate::runtime::{
    Error, ErrorCode, ErrorListener, PrefixResolver, SourceLocator, StaticContext, Thunk,
    XPathContext,
};
use crate::xdm::Value;

const EVALUATION_ERROR: &str = "expression evaluation error";

/// A compiled expression or match pattern. Read-only after compilation; one
/// instance may be evaluated against any number of contexts.
#[derive(Debug, Clone)]
pub struct CompiledPath {
    expr: Arc<Expr>,
    source: String,
    locator: SourceLocator,
    mode: CompileMode,
    static_ctx: Arc<StaticContext>,
}

impl CompiledPath {
    /// Compile `text`. A failure is reported to `listener` as fatal and
    /// returned; no compiled path is produced either way.
    pub fn compile(
        text: &str,
        locator: Option<SourceLocator>,
        static_ctx: &StaticContext,
        mode: CompileMode,
        listener: &dyn ErrorListener,
    ) -> Result<Self, Error> {
        let locator = locator.unwrap_or_default().with_expression(text);
        match compiler::compile(text, static_ctx, mode) {
            Ok(expr) => {
                tracing::debug!(expr = text, ?mode, "compiled path");
                Ok(Self::from_expr(expr, text, locator, mode, static_ctx))
            }
            Err(e) => {
                let e = e.with_locator(&locator);
                Err(match listener.fatal_error(e.clone()) {
                    Err(escalated) => escalated,
                    Ok(()) => e,
                })
            }
        }
    }

    /// Wrap an expression tree built by hand (fragment constructors,
    /// extension nodes).
    pub fn from_expr(
        expr: Expr,
        source: &str,
        locator: SourceLocator,
        mode: CompileMode,
        static_ctx: &StaticContext,
    ) -> Self {
        Self {
            expr: Arc::new(expr),
            source: source.to_string(),
            locator,
            mode,
            static_ctx: Arc::new(static_ctx.clone()),
        }
    }

    pub fn expr(&self) -> &Arc<Expr> {
        &self.expr
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn locator(&self) -> &SourceLocator {
        &self.locator
    }

    pub fn mode(&self) -> CompileMode {
        self.mode
    }

    pub fn static_context(&self) -> &StaticContext {
        &self.static_ctx
    }

    /// Evaluate with `node` as context node. Namespace prefixes resolve through
    /// `resolver`, or the compile-time static context when `None`.
    ///
    /// `Ok(None)` means the error listener suppressed a failure.
    pub fn execute(
        &self,
        ctx: &mut XPathContext,
        node: NodeHandle,
        resolver: Option<Arc<dyn PrefixResolver>>,
    ) -> Result<Option<Value>, Error> {
        let resolver = resolver.unwrap_or_else(|| self.static_ctx.clone() as Arc<dyn PrefixResolver>);
        let result = ctx
            .expression_scope(node, node, Some(resolver))
            .and_then(|mut scope| self.expr.execute(&mut scope));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) => self.report(ctx, e).map(|()| None),
        }
    }

    /// Evaluate and convert to boolean; a suppressed failure is `false`.
    pub fn evaluate_boolean(
        &self,
        ctx: &mut XPathContext,
        node: NodeHandle,
        resolver: Option<Arc<dyn PrefixResolver>>,
    ) -> Result<bool, Error> {
        match self.execute(ctx, node, resolver)? {
            Some(v) => v.to_boolean(),
            None => Ok(false),
        }
    }

    /// Match score of `node`: only the current node is pushed. A suppressed
    /// failure scores as no match.
    pub fn get_match_score(&self, ctx: &mut XPathContext, node: NodeHandle) -> Result<f64, Error> {
        let result = ctx.current_node_scope(node).and_then(|mut scope| {
            let v = self.expr.execute(&mut scope)?;
            v.to_number(scope.stores())
        });
        match result {
            Ok(score) => Ok(score),
            Err(e) => self.report(ctx, e).map(|()| MATCH_SCORE_NONE),
        }
    }

    /// Deferred binding of this expression, to be stored in a variable slot of
    /// the context's current frame (or a global slot).
    pub fn thunk(&self, ctx: &XPathContext, context_node: NodeHandle, is_global: bool) -> Thunk {
        Thunk {
            expr: self.expr.clone(),
            context_node,
            frame: if is_global { 0 } else { ctx.vars().stack_frame() },
            is_global,
        }
    }

    fn report(&self, ctx: &XPathContext, err: Error) -> Result<(), Error> {
        let mut err = err.with_locator(&self.locator);
        if err.code == ErrorCode::DTMX0008 {
            err.message = err.unwrapped_message(EVALUATION_ERROR);
        }
        tracing::debug!(code = %err.code, expr = %self.source, "evaluation failed");
        let listener = ctx.error_listener();
        if err.is_fatal() {
            listener.fatal_error(err)
        } else {
            listener.error(err)
        }
    }
}
