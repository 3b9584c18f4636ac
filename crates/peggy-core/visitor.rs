//! A tag-indexed traversal over `Expr`: read-only visits,
//! rewrites, and environment-threaded walks, expressed as free functions over
//! the AST sum type rather than a class hierarchy's virtual dispatch.
use crate::types::Expr;

/// A read-only visit: `f` is called on every node, pre-order, including the
/// root. Unknown node tags cannot occur (`Expr` is a closed sum) — there is
/// simply no such case to handle.
pub fn walk<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
  f(expr);
  for child in expr.children() {
    walk(child, f);
  }
}

/// A rewrite: `f` is applied bottom-up (children first) and may replace any
/// subtree. Locations are preserved automatically since `f` receives and
/// returns whole `Expr` values and a pass that doesn't touch `location`
/// fields leaves them untouched.
pub fn rewrite(expr: Expr, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
  let rewritten = map_children(expr, |child| rewrite(child, f));
  f(rewritten)
}

fn map_children(expr: Expr, mut f: impl FnMut(Expr) -> Expr) -> Expr {
  match expr {
    Expr::Sequence { items, location } => Expr::Sequence { items: items.into_iter().map(&mut f).collect(), location },
    Expr::Choice { alternatives, location } => Expr::Choice { alternatives: alternatives.into_iter().map(&mut f).collect(), location },
    Expr::Optional { inner, location } => Expr::Optional { inner: Box::new(f(*inner)), location },
    Expr::ZeroOrMore { inner, location } => Expr::ZeroOrMore { inner: Box::new(f(*inner)), location },
    Expr::OneOrMore { inner, location } => Expr::OneOrMore { inner: Box::new(f(*inner)), location },
    Expr::Repeated { inner, min, max, delimiter, location } => {
      Expr::Repeated { inner: Box::new(f(*inner)), min, max, delimiter: delimiter.map(|d| Box::new(f(*d))), location }
    }
    Expr::Group { inner, location } => Expr::Group { inner: Box::new(f(*inner)), location },
    Expr::Labeled { label, inner, pick, label_location, location } => {
      Expr::Labeled { label, inner: Box::new(f(*inner)), pick, label_location, location }
    }
    Expr::Text { inner, location } => Expr::Text { inner: Box::new(f(*inner)), location },
    Expr::SimpleAnd { inner, location } => Expr::SimpleAnd { inner: Box::new(f(*inner)), location },
    Expr::SimpleNot { inner, location } => Expr::SimpleNot { inner: Box::new(f(*inner)), location },
    Expr::Action { inner, code, location } => Expr::Action { inner: Box::new(f(*inner)), code, location },
    Expr::Named { name, inner, location } => Expr::Named { name, inner: Box::new(f(*inner)), location },
    leaf @ (Expr::Literal { .. }
    | Expr::Class { .. }
    | Expr::Any { .. }
    | Expr::RuleRef { .. }
    | Expr::LibraryRef { .. }
    | Expr::SemanticAnd { .. }
    | Expr::SemanticNot { .. }) => leaf,
  }
}

/// An environment-threaded walk used by scope-tracking passes (e.g. label
/// scoping): `enter`/`exit` bracket the traversal of
/// each node so the caller can push/pop scope state around sequences and
/// actions.
pub fn walk_scoped<'a, E>(expr: &'a Expr, env: &mut E, enter: &mut impl FnMut(&'a Expr, &mut E), exit: &mut impl FnMut(&'a Expr, &mut E)) {
  enter(expr, env);
  for child in expr.children() {
    walk_scoped(child, env, enter, exit);
  }
  exit(expr, env);
}
