//! Search-and-replace over expression trees.
//!
//! A search pattern is an ordinary expression in which [`Expr::Capture`]
//! nodes stand for "any subexpression of this type". Matching walks the
//! pattern and the candidate together, left to right and depth first,
//! binding captures as it goes; the replace pattern is then instantiated by
//! substituting the bound subexpressions for its capture nodes.
//!
//! Captures are returned per call, so one matcher can serve many threads.
//! When a capture name occurs twice in a search pattern the last binding
//! wins; equality between occurrences is not enforced.

use std::{convert::Infallible, sync::Arc};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    error::RewriteError,
    expr::{Expr, ExprKind, ExprRef, Lambda, Parameter},
    types::TypeRef,
};

/// Capture name to bound subexpression, in binding order.
pub type Captures = IndexMap<String, ExprRef>;

#[derive(Debug, Clone, PartialEq)]
pub struct TreePatternMatcher {
    search: ExprRef,
    replace: Option<ExprRef>,
}

impl TreePatternMatcher {
    pub fn new(search: ExprRef, replace: Option<ExprRef>) -> Self {
        TreePatternMatcher { search, replace }
    }

    /// Builds patterns from lambdas: parameter `i` of type `T` becomes the
    /// capture `p{i}:{T}` in both bodies.
    ///
    /// The replace lambda must take the same number of parameters, with the
    /// same types, as the search lambda.
    pub fn from_lambdas(search: &Lambda, replace: Option<&Lambda>) -> Result<Self, RewriteError> {
        if let Some(replace) = replace {
            if replace.parameters.len() != search.parameters.len() {
                return Err(RewriteError::CaptureMismatch(format!(
                    "search pattern has {} capture(s), replace pattern has {}",
                    search.parameters.len(),
                    replace.parameters.len()
                )));
            }
            for (index, (s, r)) in search.parameters.iter().zip(&replace.parameters).enumerate() {
                if s.ty != r.ty {
                    return Err(RewriteError::CaptureMismatch(format!(
                        "capture {} is {} in the search pattern but {} in the replace pattern",
                        index, s.ty, r.ty
                    )));
                }
            }
        }

        Ok(TreePatternMatcher {
            search: captures_for_parameters(search),
            replace: replace.map(captures_for_parameters),
        })
    }

    pub fn search_pattern(&self) -> &ExprRef {
        &self.search
    }

    pub fn replace_pattern(&self) -> Option<&ExprRef> {
        self.replace.as_ref()
    }

    /// The captures bound by matching `candidate`, or `None` when it does
    /// not match.
    pub fn matches(&self, candidate: &ExprRef) -> Result<Option<Captures>, RewriteError> {
        let mut state = MatchState::default();
        if state.match_node(&self.search, candidate)? {
            Ok(Some(state.captures))
        } else {
            Ok(None)
        }
    }

    /// The replace pattern instantiated with the captures of a match, or
    /// `None` when `candidate` does not match (or there is no replace
    /// pattern).
    pub fn match_and_rewrite(&self, candidate: &ExprRef) -> Result<Option<ExprRef>, RewriteError> {
        let Some(replace) = &self.replace else {
            return Ok(None);
        };
        let Some(captures) = self.matches(candidate)? else {
            return Ok(None);
        };
        debug!(candidate = %candidate, captures = captures.len(), "pattern matched");
        Ok(Some(substitute(replace, &captures)))
    }

    /// Rewrites every matching subtree, top down. A replacement is not
    /// searched again.
    pub fn rewrite_all(&self, tree: &ExprRef) -> Result<ExprRef, RewriteError> {
        if let Some(rewritten) = self.match_and_rewrite(tree)? {
            return Ok(rewritten);
        }
        Expr::map_children(tree, |child| self.rewrite_all(child))
    }
}

fn capture_name(index: usize, ty: &TypeRef) -> String {
    format!("p{}:{}", index, ty)
}

fn captures_for_parameters(lambda: &Lambda) -> ExprRef {
    let parameters = &lambda.parameters;
    Expr::replace_parameters(&lambda.body, &|p: &Parameter| {
        parameters
            .iter()
            .position(|candidate| candidate == p)
            .map(|index| Expr::capture(capture_name(index, &p.ty), p.ty.clone()))
    })
}

/// Replaces capture nodes with their bindings; unbound captures stay.
fn substitute(pattern: &ExprRef, captures: &Captures) -> ExprRef {
    if let Expr::Capture { name, .. } = pattern.as_ref()
        && let Some(bound) = captures.get(name)
    {
        return bound.clone();
    }
    let result: Result<ExprRef, Infallible> =
        Expr::map_children(pattern, |child| Ok(substitute(child, captures)));
    match result {
        Ok(rewritten) => rewritten,
        Err(never) => match never {},
    }
}

#[derive(Default)]
struct MatchState {
    captures: Captures,
    /// Lambda parameters of the pattern paired with the candidate's, so
    /// `x => x.Name` matches `y => y.Name`.
    bound_parameters: Vec<(Parameter, Parameter)>,
}

impl MatchState {
    fn match_node(&mut self, pattern: &ExprRef, candidate: &ExprRef) -> Result<bool, RewriteError> {
        if let Expr::Capture { name, ty } = pattern.as_ref() {
            if ty != &TypeRef::Object && ty != &candidate.ty() {
                return Ok(false);
            }
            self.captures.insert(name.clone(), candidate.clone());
            return Ok(true);
        }
        if candidate.kind() == ExprKind::Capture {
            return Err(RewriteError::Unimplemented(ExprKind::Capture.name()));
        }
        if Arc::ptr_eq(pattern, candidate) {
            return Ok(true);
        }

        match (pattern.as_ref(), candidate.as_ref()) {
            (
                Expr::Constant { value: pv, ty: pt },
                Expr::Constant { value: cv, ty: ct },
            ) => Ok(pv == cv && pt == ct),
            (Expr::Parameter(p), Expr::Parameter(c)) => {
                let bound = self
                    .bound_parameters
                    .iter()
                    .rev()
                    .find(|(pattern_param, _)| pattern_param == p);
                Ok(match bound {
                    Some((_, candidate_param)) => candidate_param == c,
                    None => p == c,
                })
            }
            (
                Expr::Member {
                    target: pt,
                    name: pn,
                    ty: pty,
                },
                Expr::Member {
                    target: ct,
                    name: cn,
                    ty: cty,
                },
            ) => Ok(pn == cn && pty == cty && self.match_node(pt, ct)?),
            (
                Expr::Binary {
                    op: po,
                    left: pl,
                    right: pr,
                    ty: pty,
                },
                Expr::Binary {
                    op: co,
                    left: cl,
                    right: cr,
                    ty: cty,
                },
            ) => Ok(po == co && pty == cty && self.match_node(pl, cl)? && self.match_node(pr, cr)?),
            (
                Expr::Unary {
                    op: po,
                    operand: pe,
                    ty: pty,
                },
                Expr::Unary {
                    op: co,
                    operand: ce,
                    ty: cty,
                },
            ) => Ok(po == co && pty == cty && self.match_node(pe, ce)?),
            (
                Expr::Call {
                    method: pm,
                    args: pa,
                    ty: pty,
                },
                Expr::Call {
                    method: cm,
                    args: ca,
                    ty: cty,
                },
            ) => Ok(pm == cm && pty == cty && self.match_all(pa, ca)?),
            (Expr::Lambda(pl), Expr::Lambda(cl)) => {
                if pl.parameters.len() != cl.parameters.len()
                    || pl.parameters.iter().zip(&cl.parameters).any(|(p, c)| p.ty != c.ty)
                {
                    return Ok(false);
                }
                let mark = self.bound_parameters.len();
                self.bound_parameters
                    .extend(pl.parameters.iter().cloned().zip(cl.parameters.iter().cloned()));
                let matched = self.match_node(&pl.body, &cl.body);
                self.bound_parameters.truncate(mark);
                matched
            }
            (
                Expr::Conditional {
                    test: pt,
                    if_true: pa,
                    if_false: pb,
                    ty: pty,
                },
                Expr::Conditional {
                    test: ct,
                    if_true: ca,
                    if_false: cb,
                    ty: cty,
                },
            ) => Ok(pty == cty
                && self.match_node(pt, ct)?
                && self.match_node(pa, ca)?
                && self.match_node(pb, cb)?),
            (
                Expr::NewArray {
                    element_type: pt,
                    items: pi,
                },
                Expr::NewArray {
                    element_type: ct,
                    items: ci,
                },
            ) => Ok(pt == ct && self.match_all(pi, ci)?),
            (Expr::New { ty: pt, members: pm }, Expr::New { ty: ct, members: cm }) => {
                if pt != ct
                    || pm.len() != cm.len()
                    || pm.iter().zip(cm).any(|((pn, _), (cn, _))| pn != cn)
                {
                    return Ok(false);
                }
                for ((_, pv), (_, cv)) in pm.iter().zip(cm) {
                    if !self.match_node(pv, cv)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (
                Expr::TypeIs {
                    operand: pe,
                    test_type: pt,
                },
                Expr::TypeIs {
                    operand: ce,
                    test_type: ct,
                },
            ) => Ok(pt == ct && self.match_node(pe, ce)?),
            _ => Ok(false),
        }
    }

    fn match_all(&mut self, patterns: &[ExprRef], candidates: &[ExprRef]) -> Result<bool, RewriteError> {
        if patterns.len() != candidates.len() {
            return Ok(false);
        }
        for (pattern, candidate) in patterns.iter().zip(candidates) {
            if !self.match_node(pattern, candidate)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
