use super::{ArrayRef, Expr, ExprRef, HashableExprRef, Node, UpdateList};
use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

//
// Public Interface
//

pub type VisitMemo = HashMap<HashableExprRef, ExprRef>;

/// Bottom-up rewriting pass. Results are memoized per node identity, so a
/// shared sub-expression is rewritten once per pass.
pub trait ExprVisitor {
    fn memo(&mut self) -> &mut VisitMemo;

    fn visit(&mut self, expr: &ExprRef) -> ExprRef {
        let key = HashableExprRef::from(expr);
        if let Some(done) = self.memo().get(&key) {
            return done.clone();
        }
        let result = self.visit_node(expr);
        self.memo().insert(key, result.clone());
        result
    }

    fn visit_node(&mut self, expr: &ExprRef) -> ExprRef {
        let rebuilt = match expr.node() {
            Node::Constant(_) => expr.clone(),
            Node::Read { updates, index } => {
                let new_updates = self.visit_updates(updates);
                let new_index = self.visit(index);
                if Rc::ptr_eq(&new_index, index) && same_list(&new_updates, updates) {
                    expr.clone()
                } else {
                    Expr::read(new_updates, new_index)
                }
            }
            _ => {
                let old = expr.kids();
                let new: Vec<ExprRef> = old.iter().map(|kid| self.visit(kid)).collect();
                if old.iter().zip(&new).all(|(a, b)| Rc::ptr_eq(a, b)) {
                    expr.clone()
                } else {
                    rebuild(expr, &new)
                }
            }
        };
        self.post_visit(rebuilt)
    }

    fn visit_updates(&mut self, updates: &UpdateList) -> UpdateList {
        let root = self.visit_array(updates.root());
        let writes: Vec<(ExprRef, ExprRef)> = updates
            .iter()
            .map(|update| (self.visit(update.index()), self.visit(update.value())))
            .collect();

        let unchanged = Rc::ptr_eq(&root, updates.root())
            && updates.iter().zip(&writes).all(|(update, (index, value))| {
                Rc::ptr_eq(update.index(), index) && Rc::ptr_eq(update.value(), value)
            });
        if unchanged {
            return updates.clone();
        }

        let mut rebuilt = UpdateList::from(root);
        for (index, value) in writes.into_iter().rev() {
            rebuilt.extend(index, value);
        }
        rebuilt
    }

    fn visit_array(&mut self, array: &ArrayRef) -> ArrayRef {
        array.clone()
    }

    /// Called on every node after its children have been rewritten.
    fn post_visit(&mut self, expr: ExprRef) -> ExprRef {
        expr
    }
}

/// Builds a node of the same kind and payload as `expr` over new children,
/// going through the canonical constructors.
pub fn rebuild(expr: &ExprRef, kids: &[ExprRef]) -> ExprRef {
    match expr.node() {
        Node::Constant(_) => expr.clone(),
        Node::NotOptimized(_) => Expr::not_optimized(&kids[0]),
        Node::Read { updates, .. } => Expr::read(updates.clone(), kids[0].clone()),
        Node::Select { .. } => Expr::select(&kids[0], &kids[1], &kids[2]),
        Node::Concat { .. } => Expr::concat(&kids[0], &kids[1]),
        Node::Extract { offset, .. } => Expr::extract(&kids[0], *offset, expr.width()),
        Node::ZExt(_) => Expr::zext(&kids[0], expr.width()),
        Node::SExt(_) => Expr::sext(&kids[0], expr.width()),
        Node::Not(_) => Expr::not(&kids[0]),
        Node::Binary { kind, .. } => Expr::binary(*kind, &kids[0], &kids[1]),
    }
}

/// Names of all arrays read by `exprs`, in the order a pre-order traversal
/// first meets them. Arrays behind update lists are included.
pub fn find_array_names<'a, I>(exprs: I) -> IndexSet<String>
where
    I: IntoIterator<Item = &'a ExprRef>,
{
    let mut names = IndexSet::new();
    walk_reads(exprs, |updates| {
        names.insert(updates.root().name().to_string());
    });
    names
}

/// Symbolic arrays read by `exprs`, deduplicated, in discovery order.
pub fn find_symbolic_objects<'a, I>(exprs: I) -> Vec<ArrayRef>
where
    I: IntoIterator<Item = &'a ExprRef>,
{
    let mut objects: IndexSet<ArrayRef> = IndexSet::new();
    walk_reads(exprs, |updates| {
        if updates.root().is_symbolic() {
            objects.insert(updates.root().clone());
        }
    });
    objects.into_iter().collect()
}

//
// Private Implementation
//

fn same_list(a: &UpdateList, b: &UpdateList) -> bool {
    let same_head = match (a.head(), b.head()) {
        (None, None) => true,
        (Some(x), Some(y)) => Rc::ptr_eq(x, y),
        _ => false,
    };
    same_head && Rc::ptr_eq(a.root(), b.root())
}

fn walk_reads<'a, I, F>(exprs: I, mut on_read: F)
where
    I: IntoIterator<Item = &'a ExprRef>,
    F: FnMut(&UpdateList),
{
    let mut visited: HashSet<HashableExprRef> = HashSet::new();
    let mut stack: Vec<ExprRef> = Vec::new();

    for root in exprs {
        stack.push(root.clone());
        while let Some(expr) = stack.pop() {
            if !visited.insert(HashableExprRef::from(&expr)) {
                continue;
            }
            let mut pending: Vec<ExprRef> = Vec::new();
            if let Node::Read { updates, .. } = expr.node() {
                on_read(updates);
                for update in updates.iter() {
                    pending.push(update.index().clone());
                    pending.push(update.value().clone());
                }
            }
            pending.extend(expr.kids().into_iter().cloned());
            // reversed, so the first child is popped first
            stack.extend(pending.into_iter().rev());
        }
    }
}
