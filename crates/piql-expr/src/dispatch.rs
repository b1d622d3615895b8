//! Dispatch of expression nodes to per-variant handlers
//!
//! Two front ends share the same [`NodeKind`] taxonomy:
//!
//! - [`Visitor`] + [`walk`]: handlers are trait methods, resolved by an
//!   exhaustive match at compile time. A more specific family overrides
//!   methods; anything left at the default reports an unhandled variant.
//! - [`VisitorFamily`] + [`Dispatcher`]: handlers registered at runtime per
//!   kind, with families extending a parent family. The dispatcher caches
//!   `Shape -> handler` so each concrete node shape is resolved once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;

use crate::node::{Expr, Literal, NodeKind, Operation, Path, Shape};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Unhandled variant: visitor family '{family}' has no {kind:?} handler")]
    Unhandled { family: String, kind: NodeKind },

    #[error("Handler error: {0}")]
    Handler(String),
}

// ============ Compile-time families ============

/// Visitor family resolved at compile time.
///
/// The defaults make up the root family: every variant is unhandled until a
/// concrete family overrides it.
pub trait Visitor {
    type Output;
    type Error: From<DispatchError>;

    /// Name used when reporting unhandled variants
    fn family(&self) -> &str;

    fn visit_constant(&mut self, _value: &Literal) -> Result<Self::Output, Self::Error> {
        Err(self.unhandled(NodeKind::Constant))
    }

    fn visit_path(&mut self, _path: &Path) -> Result<Self::Output, Self::Error> {
        Err(self.unhandled(NodeKind::Path))
    }

    fn visit_operation(&mut self, op: &Operation) -> Result<Self::Output, Self::Error> {
        Err(self.unhandled(op.operator().kind()))
    }

    fn unhandled(&self, kind: NodeKind) -> Self::Error {
        DispatchError::Unhandled {
            family: self.family().to_string(),
            kind,
        }
        .into()
    }
}

/// Route `expr` to the matching method of `visitor`
pub fn walk<V: Visitor + ?Sized>(visitor: &mut V, expr: &Expr) -> Result<V::Output, V::Error> {
    match expr {
        Expr::Constant(value) => visitor.visit_constant(value),
        Expr::Path(path) => visitor.visit_path(path),
        Expr::Operation(op) => visitor.visit_operation(op),
    }
}

// ============ Runtime families ============

/// Handler for one node kind. Receives the dispatcher so it can descend.
pub type Handler<C> =
    Arc<dyn Fn(&Dispatcher<C>, &mut C, &Expr) -> Result<(), DispatchError> + Send + Sync + 'static>;

/// Named set of handlers, optionally extending a parent family.
///
/// Immutable once built; a [`Dispatcher`] never invalidates its cache.
pub struct VisitorFamily<C> {
    name: String,
    parent: Option<Arc<VisitorFamily<C>>>,
    handlers: HashMap<NodeKind, Handler<C>>,
}

impl<C> VisitorFamily<C> {
    pub fn root(name: impl Into<String>) -> FamilyBuilder<C> {
        FamilyBuilder {
            name: name.into(),
            parent: None,
            handlers: HashMap::new(),
        }
    }

    /// Start a family whose handlers take precedence over `parent`'s
    pub fn extend(parent: &Arc<VisitorFamily<C>>, name: impl Into<String>) -> FamilyBuilder<C> {
        FamilyBuilder {
            name: name.into(),
            parent: Some(Arc::clone(parent)),
            handlers: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<VisitorFamily<C>>> {
        self.parent.as_ref()
    }

    /// This family followed by its ancestors, most specific first
    pub fn ancestry(&self) -> impl Iterator<Item = &VisitorFamily<C>> {
        std::iter::successors(Some(self), |family| family.parent.as_deref())
    }

    /// Whether this family itself (not an ancestor) declares a handler for `kind`
    pub fn declares(&self, kind: NodeKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    fn resolve(&self, kind: NodeKind) -> Option<(&str, &Handler<C>)> {
        self.ancestry().find_map(|family| {
            family
                .handlers
                .get(&kind)
                .map(|handler| (family.name.as_str(), handler))
        })
    }
}

impl<C> fmt::Debug for VisitorFamily<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort_by_key(|kind| format!("{kind:?}"));
        f.debug_struct("VisitorFamily")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("handlers", &kinds)
            .finish()
    }
}

pub struct FamilyBuilder<C> {
    name: String,
    parent: Option<Arc<VisitorFamily<C>>>,
    handlers: HashMap<NodeKind, Handler<C>>,
}

impl<C> FamilyBuilder<C> {
    /// Declare the handler for `kind`, replacing any earlier one in this family
    pub fn on<F>(mut self, kind: NodeKind, handler: F) -> Self
    where
        F: Fn(&Dispatcher<C>, &mut C, &Expr) -> Result<(), DispatchError> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn build(self) -> Arc<VisitorFamily<C>> {
        Arc::new(VisitorFamily {
            name: self.name,
            parent: self.parent,
            handlers: self.handlers,
        })
    }
}

struct Resolution<C> {
    kind: NodeKind,
    family: String,
    handler: Handler<C>,
}

/// Invokes a family's handlers, caching resolution per node [`Shape`].
///
/// The cache tolerates concurrent inserts, so one dispatcher can be shared by
/// reference across threads that each bring their own context.
pub struct Dispatcher<C> {
    family: Arc<VisitorFamily<C>>,
    cache: DashMap<Shape, Resolution<C>>,
    resolutions: AtomicUsize,
}

impl<C> Dispatcher<C> {
    pub fn new(family: Arc<VisitorFamily<C>>) -> Self {
        Self {
            family,
            cache: DashMap::new(),
            resolutions: AtomicUsize::new(0),
        }
    }

    pub fn family(&self) -> &Arc<VisitorFamily<C>> {
        &self.family
    }

    /// Invoke the handler for `expr`'s kind
    pub fn dispatch(&self, ctx: &mut C, expr: &Expr) -> Result<&Self, DispatchError> {
        let handler = self.resolve(expr.shape())?;
        handler(self, ctx, expr)?;
        Ok(self)
    }

    /// Dispatch every child of `expr`, in order
    pub fn dispatch_children(&self, ctx: &mut C, expr: &Expr) -> Result<&Self, DispatchError> {
        for child in expr.children() {
            self.dispatch(ctx, child)?;
        }
        Ok(self)
    }

    /// Handler that only descends into the node's children
    pub fn descend(&self, ctx: &mut C, expr: &Expr) -> Result<(), DispatchError> {
        self.dispatch_children(ctx, expr).map(|_| ())
    }

    /// Look up the handler for `shape`, resolving and caching it on first use
    pub fn resolve(&self, shape: Shape) -> Result<Handler<C>, DispatchError> {
        if let Some(hit) = self.cache.get(&shape) {
            return Ok(Arc::clone(&hit.handler));
        }

        let kind = shape.kind();
        let Some((family, handler)) = self.family.resolve(kind) else {
            return Err(DispatchError::Unhandled {
                family: self.family.name.clone(),
                kind,
            });
        };

        log::debug!(
            "family '{}': {:?} resolved as {:?} via '{}'",
            self.family.name,
            shape,
            kind,
            family
        );
        self.resolutions.fetch_add(1, Ordering::Relaxed);

        let handler = Arc::clone(handler);
        self.cache.insert(
            shape,
            Resolution {
                kind,
                family: family.to_string(),
                handler: Arc::clone(&handler),
            },
        );
        Ok(handler)
    }

    /// Family that supplied the cached handler for `shape`, if resolved
    pub fn resolved_by(&self, shape: Shape) -> Option<String> {
        self.cache.get(&shape).map(|hit| hit.family.clone())
    }

    /// Canonical kind recorded for `shape`, if resolved
    pub fn resolved_kind(&self, shape: Shape) -> Option<NodeKind> {
        self.cache.get(&shape).map(|hit| hit.kind)
    }

    pub fn cached_shapes(&self) -> usize {
        self.cache.len()
    }

    /// Number of cache misses that ended in a successful resolution
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ValueType;

    fn sample_tree() -> Expr {
        let gold = Expr::path("gold", ValueType::Int);
        let tier = gold
            .clone()
            .when(100)
            .unwrap()
            .then(1)
            .unwrap()
            .otherwise(0)
            .unwrap();
        tier.add(1)
            .gt(Expr::count_all())
            .and(gold.is_not_null())
    }

    /// Root family recording the kind of every node, in pre-order
    fn recording_family() -> Arc<VisitorFamily<Vec<NodeKind>>> {
        let mut builder = VisitorFamily::<Vec<NodeKind>>::root("record");
        for kind in NodeKind::ALL {
            builder = builder.on(kind, move |d, seen: &mut Vec<NodeKind>, expr| {
                seen.push(kind);
                d.descend(seen, expr)
            });
        }
        builder.build()
    }

    fn preorder(expr: &Expr, out: &mut Vec<NodeKind>) {
        out.push(expr.kind());
        for child in expr.children() {
            preorder(child, out);
        }
    }

    #[test]
    fn total_family_visits_every_node() {
        let tree = sample_tree();
        let dispatcher = Dispatcher::new(recording_family());

        let mut seen = Vec::new();
        dispatcher.dispatch(&mut seen, &tree).unwrap();

        let mut expected = Vec::new();
        preorder(&tree, &mut expected);
        assert_eq!(seen, expected);
    }

    #[test]
    fn repeated_dispatch_uses_cache() {
        let tree = sample_tree();
        let dispatcher = Dispatcher::new(recording_family());

        let mut first = Vec::new();
        dispatcher.dispatch(&mut first, &tree).unwrap();
        let resolved = dispatcher.resolutions();
        assert_eq!(resolved, dispatcher.cached_shapes());

        let mut second = Vec::new();
        dispatcher.dispatch(&mut second, &tree).unwrap();
        assert_eq!(first, second);
        assert_eq!(dispatcher.resolutions(), resolved);
    }

    #[test]
    fn same_kind_different_shapes_resolve_separately() {
        let dispatcher = Dispatcher::new(recording_family());
        let mut seen = Vec::new();
        dispatcher
            .dispatch(&mut seen, &Expr::constant(1))
            .unwrap()
            .dispatch(&mut seen, &Expr::constant("a"))
            .unwrap()
            .dispatch(&mut seen, &Expr::constant(2))
            .unwrap();
        assert_eq!(seen, vec![NodeKind::Constant; 3]);
        assert_eq!(dispatcher.cached_shapes(), 2);
        assert_eq!(
            dispatcher.resolved_kind(Shape::Constant(ValueType::String)),
            Some(NodeKind::Constant)
        );
    }

    #[test]
    fn subfamily_overrides_parent() {
        let root: Arc<VisitorFamily<Vec<String>>> = VisitorFamily::root("base")
            .on(NodeKind::Constant, |_, out: &mut Vec<String>, _| {
                out.push("base constant".into());
                Ok(())
            })
            .on(NodeKind::Path, |_, out: &mut Vec<String>, _| {
                out.push("base path".into());
                Ok(())
            })
            .on(NodeKind::Comparison, Dispatcher::descend)
            .build();
        let sql = VisitorFamily::extend(&root, "sql")
            .on(NodeKind::Constant, |_, out: &mut Vec<String>, _| {
                out.push("sql constant".into());
                Ok(())
            })
            .build();
        assert!(sql.declares(NodeKind::Constant));
        assert!(!sql.declares(NodeKind::Path));
        assert_eq!(
            sql.ancestry().map(VisitorFamily::name).collect::<Vec<_>>(),
            vec!["sql", "base"]
        );

        let dispatcher = Dispatcher::new(sql);
        let mut out = Vec::new();
        let expr = Expr::path("gold", ValueType::Int).eq(5);
        dispatcher.dispatch(&mut out, &expr).unwrap();

        assert_eq!(out, vec!["base path", "sql constant"]);
        assert_eq!(
            dispatcher.resolved_by(Shape::Constant(ValueType::Int)).as_deref(),
            Some("sql")
        );
        assert_eq!(
            dispatcher.resolved_by(Shape::Path(ValueType::Int)).as_deref(),
            Some("base")
        );
    }

    #[test]
    fn missing_handler_is_reported() {
        let family = VisitorFamily::<()>::root("partial")
            .on(NodeKind::Constant, |_, _, _| Ok(()))
            .build();
        let dispatcher = Dispatcher::new(family);

        let err = dispatcher.dispatch(&mut (), &Expr::count_all()).err();
        assert_eq!(
            err,
            Some(DispatchError::Unhandled {
                family: "partial".into(),
                kind: NodeKind::Aggregate,
            })
        );
        assert_eq!(dispatcher.cached_shapes(), 0);
        assert!(dispatcher.dispatch(&mut (), &Expr::constant(1)).is_ok());
    }

    #[test]
    fn handler_errors_propagate() {
        let family = VisitorFamily::<()>::root("strict")
            .on(NodeKind::Constant, |_, _, expr| match expr {
                Expr::Constant(Literal::Null) => Err(DispatchError::Handler("null".into())),
                _ => Ok(()),
            })
            .build();
        let dispatcher = Dispatcher::new(family);
        assert!(dispatcher.dispatch(&mut (), &Expr::constant(1)).is_ok());
        assert_eq!(
            dispatcher.dispatch(&mut (), &Expr::constant(Literal::Null)).err(),
            Some(DispatchError::Handler("null".into()))
        );
    }

    #[test]
    fn shared_dispatcher_across_threads() {
        let tree = sample_tree();
        let dispatcher = Dispatcher::new(recording_family());
        let mut expected = Vec::new();
        preorder(&tree, &mut expected);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut seen = Vec::new();
                        dispatcher.dispatch(&mut seen, &tree).map(|_| seen)
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().unwrap(), expected);
            }
        });

        let mut distinct: Vec<Shape> = Vec::new();
        fn shapes(expr: &Expr, out: &mut Vec<Shape>) {
            if !out.contains(&expr.shape()) {
                out.push(expr.shape());
            }
            for child in expr.children() {
                shapes(child, out);
            }
        }
        shapes(&tree, &mut distinct);
        assert_eq!(dispatcher.cached_shapes(), distinct.len());
    }

    struct ConstantsOnly;

    impl Visitor for ConstantsOnly {
        type Output = Literal;
        type Error = DispatchError;

        fn family(&self) -> &str {
            "constants-only"
        }

        fn visit_constant(&mut self, value: &Literal) -> Result<Literal, DispatchError> {
            Ok(value.clone())
        }
    }

    #[test]
    fn visitor_defaults_are_unhandled() {
        let mut visitor = ConstantsOnly;
        assert_eq!(walk(&mut visitor, &Expr::constant(3)), Ok(Literal::Int(3)));
        assert_eq!(
            walk(&mut visitor, &Expr::constant(3).eq(3)),
            Err(DispatchError::Unhandled {
                family: "constants-only".into(),
                kind: NodeKind::Comparison,
            })
        );
        assert_eq!(
            walk(&mut visitor, &Expr::path("x", ValueType::Int)).unwrap_err(),
            DispatchError::Unhandled {
                family: "constants-only".into(),
                kind: NodeKind::Path,
            }
        );
    }
}
