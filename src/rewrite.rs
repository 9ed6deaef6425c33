//! Expression rewriting.
//!
//! A rewriter declares which node kinds it looks at and returns a
//! replacement (or `None`) for a node. [`RecursiveRewriteVisitor`] applies a
//! set of rewriters to a tree until nothing changes: at each node it applies
//! rewriters until none fire, rewrites the children, then tries the node
//! again because rewritten children can expose new shapes.

pub mod pattern;

use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    error::RewriteError,
    expr::{Expr, ExprKind, ExprRef, QueryMethod},
    query::QueryExpression,
};

pub use pattern::{Captures, TreePatternMatcher};

/// Default bound on rewrites applied at a single node.
pub const DEFAULT_MAX_ITERATIONS: usize = 64;

pub trait ExpressionRewriter: Send + Sync {
    /// Node kinds this rewriter wants to see.
    fn visits(&self) -> &[ExprKind];

    /// A replacement for `node`, or `None` to leave it alone.
    fn rewrite(&self, node: &ExprRef) -> Result<Option<ExprRef>, RewriteError>;
}

/// Rewriter over recognised query operator calls.
pub trait QueryRewriter: Send + Sync {
    /// Operators this rewriter wants to see.
    fn operators(&self) -> &[QueryMethod];

    fn rewrite_query(&self, query: &QueryExpression) -> Result<Option<ExprRef>, RewriteError>;
}

/// Adapts a [`QueryRewriter`] to the node-level [`ExpressionRewriter`].
pub struct QueryRewrite<R>(pub R);

impl<R: QueryRewriter> ExpressionRewriter for QueryRewrite<R> {
    fn visits(&self) -> &[ExprKind] {
        &[ExprKind::Call]
    }

    fn rewrite(&self, node: &ExprRef) -> Result<Option<ExprRef>, RewriteError> {
        let query = QueryExpression::wrap(node);
        match query.method() {
            Some(method) if self.0.operators().contains(&method) => self.0.rewrite_query(&query),
            _ => Ok(None),
        }
    }
}

/// A [`TreePatternMatcher`] with a replace pattern is itself a rewriter.
impl ExpressionRewriter for TreePatternMatcher {
    fn visits(&self) -> &[ExprKind] {
        &ExprKind::ALL
    }

    fn rewrite(&self, node: &ExprRef) -> Result<Option<ExprRef>, RewriteError> {
        if node.kind() == ExprKind::Capture {
            return Ok(None);
        }
        self.match_and_rewrite(node)
    }
}

/// Fixed-point application of a set of rewriters.
pub struct RecursiveRewriteVisitor {
    rewriters: Vec<Box<dyn ExpressionRewriter>>,
    max_iterations: usize,
}

impl Default for RecursiveRewriteVisitor {
    fn default() -> Self {
        RecursiveRewriteVisitor {
            rewriters: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl RecursiveRewriteVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rewriter(mut self, rewriter: impl ExpressionRewriter + 'static) -> Self {
        self.rewriters.push(Box::new(rewriter));
        self
    }

    /// Maximum rewrites at a single node before giving up with
    /// [`RewriteError::NoFixedPoint`].
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn rewrite(&self, node: &ExprRef) -> Result<ExprRef, RewriteError> {
        let result = self.visit(node)?;
        if !Arc::ptr_eq(&result, node) {
            debug!(before = %node, after = %result, "expression rewritten");
        }
        Ok(result)
    }

    fn visit(&self, node: &ExprRef) -> Result<ExprRef, RewriteError> {
        let mut iterations = 0;
        let mut current = self.apply_here(node, &mut iterations)?;
        loop {
            let visited = Expr::map_children(&current, |child| self.visit(child))?;
            if Arc::ptr_eq(&visited, &current) {
                return Ok(current);
            }
            let again = self.apply_here(&visited, &mut iterations)?;
            if Arc::ptr_eq(&again, &visited) {
                return Ok(visited);
            }
            current = again;
        }
    }

    /// Applies rewriters at `node` until none of them fires.
    fn apply_here(&self, node: &ExprRef, iterations: &mut usize) -> Result<ExprRef, RewriteError> {
        let mut current = node.clone();
        'fixed_point: loop {
            let kind = current.kind();
            for rewriter in self.rewriters.iter().filter(|r| r.visits().contains(&kind)) {
                let Some(replacement) = rewriter.rewrite(&current)? else {
                    continue;
                };
                if Arc::ptr_eq(&replacement, &current) || replacement == current {
                    continue;
                }
                *iterations += 1;
                trace!(iteration = *iterations, node = %current, "rewriter fired");
                if *iterations > self.max_iterations {
                    return Err(RewriteError::NoFixedPoint(self.max_iterations));
                }
                current = replacement;
                continue 'fixed_point;
            }
            return Ok(current);
        }
    }
}
