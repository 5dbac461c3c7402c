use crate::bitvec::BitVector;
use crate::util::MAGIC_HASH_CONSTANT;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::rc::Rc;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

//
// Public Interface
//

pub mod array;
mod build;
pub mod serialize;
pub mod visitor;

pub use crate::bitvec::Width;
pub use array::{Array, ArrayCache, ArrayRef, UpdateList, UpdateNode};

pub type ExprRef = Rc<Expr>;

#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
pub enum ExprKind {
    Constant,
    NotOptimized,
    Read,
    Select,
    Concat,
    Extract,
    ZExt,
    SExt,
    Add, Sub, Mul, UDiv, SDiv, URem, SRem,
    Not, And, Or, Xor, Shl, LShr, AShr,
    Eq, Ne, Ult, Ule, Ugt, Uge, Slt, Sle, Sgt, Sge,
}

impl ExprKind {
    /// Number of expression children a node of this kind carries. Reads
    /// count their index only, the update list is payload.
    pub fn arity(self) -> usize {
        match self {
            ExprKind::Constant => 0,
            ExprKind::NotOptimized
            | ExprKind::Read
            | ExprKind::Extract
            | ExprKind::ZExt
            | ExprKind::SExt
            | ExprKind::Not => 1,
            ExprKind::Select => 3,
            _ => 2,
        }
    }

    pub fn is_binary(self) -> bool {
        self >= ExprKind::Add && self != ExprKind::Not
    }

    pub fn is_comparison(self) -> bool {
        self >= ExprKind::Eq
    }

    fn code(self) -> u32 {
        self as u32
    }
}

#[derive(Debug)]
pub enum Node {
    Constant(BitVector),
    NotOptimized(ExprRef),
    Read {
        updates: UpdateList,
        index: ExprRef,
    },
    Select {
        cond: ExprRef,
        then: ExprRef,
        otherwise: ExprRef,
    },
    Concat {
        left: ExprRef,
        right: ExprRef,
    },
    Extract {
        expr: ExprRef,
        offset: Width,
    },
    ZExt(ExprRef),
    SExt(ExprRef),
    Not(ExprRef),
    Binary {
        kind: ExprKind,
        left: ExprRef,
        right: ExprRef,
    },
}

/// Immutable expression node. The structural hash is computed once at
/// allocation from the kind, the payload and the hashes of the children.
#[derive(Debug)]
pub struct Expr {
    node: Node,
    width: Width,
    hash: u32,
}

impl Expr {
    pub const BOOL: Width = 1;
    pub const INT8: Width = 8;
    pub const INT16: Width = 16;
    pub const INT32: Width = 32;
    pub const INT64: Width = 64;
    pub const FL80: Width = 80;

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn width(&self) -> Width {
        self.width
    }

    pub fn structural_hash(&self) -> u32 {
        self.hash
    }

    pub fn kind(&self) -> ExprKind {
        match &self.node {
            Node::Constant(_) => ExprKind::Constant,
            Node::NotOptimized(_) => ExprKind::NotOptimized,
            Node::Read { .. } => ExprKind::Read,
            Node::Select { .. } => ExprKind::Select,
            Node::Concat { .. } => ExprKind::Concat,
            Node::Extract { .. } => ExprKind::Extract,
            Node::ZExt(_) => ExprKind::ZExt,
            Node::SExt(_) => ExprKind::SExt,
            Node::Not(_) => ExprKind::Not,
            Node::Binary { kind, .. } => *kind,
        }
    }

    pub fn kids(&self) -> Vec<&ExprRef> {
        match &self.node {
            Node::Constant(_) => vec![],
            Node::NotOptimized(e) | Node::ZExt(e) | Node::SExt(e) | Node::Not(e) => vec![e],
            Node::Read { index, .. } => vec![index],
            Node::Extract { expr, .. } => vec![expr],
            Node::Select {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
            Node::Concat { left, right } | Node::Binary { left, right, .. } => vec![left, right],
        }
    }

    pub fn as_constant(&self) -> Option<&BitVector> {
        match &self.node {
            Node::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.as_constant().is_some()
    }

    pub fn is_true(&self) -> bool {
        self.as_constant().map_or(false, BitVector::is_true)
    }

    pub fn is_false(&self) -> bool {
        self.as_constant().map_or(false, BitVector::is_false)
    }

    /// Three-way structural order: kind, then hash, then payload, then the
    /// children pairwise. Pairs proven equal are remembered for the duration
    /// of the call so shared sub-DAGs are compared once.
    pub fn compare(&self, other: &Expr) -> Ordering {
        let mut equivs = HashSet::new();
        self.compare_with(other, &mut equivs)
    }

    pub(crate) fn alloc(node: Node, width: Width) -> ExprRef {
        let hash = compute_hash(&node, width);
        Rc::new(Expr { node, width, hash })
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Expr {}

impl PartialOrd for Expr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Expr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

/// Pointer identity wrapper, used to memoize traversals over shared DAGs.
#[derive(Debug, Clone)]
pub struct HashableExprRef {
    value: ExprRef,
}

impl From<ExprRef> for HashableExprRef {
    fn from(expr: ExprRef) -> Self {
        Self { value: expr }
    }
}

impl From<&ExprRef> for HashableExprRef {
    fn from(expr: &ExprRef) -> Self {
        Self {
            value: expr.clone(),
        }
    }
}

impl Hash for HashableExprRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.value).hash(state);
    }
}

impl PartialEq for HashableExprRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}

impl Eq for HashableExprRef {}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Node::Constant(value) => write!(f, "(w{} {})", self.width, value),
            Node::Read { updates, index } => {
                write!(f, "(Read w{} {} {}", self.width, index, updates.root().name())?;
                if !updates.is_empty() {
                    write!(f, " [{} writes]", updates.len())?;
                }
                write!(f, ")")
            }
            Node::Extract { expr, offset } => {
                write!(f, "(Extract w{} {} {})", self.width, offset, expr)
            }
            _ => {
                write!(f, "({} w{}", self.kind(), self.width)?;
                for kid in self.kids() {
                    write!(f, " {}", kid)?;
                }
                write!(f, ")")
            }
        }
    }
}

//
// Private Implementation
//

fn mix(hash: u32) -> u32 {
    hash.wrapping_mul(MAGIC_HASH_CONSTANT)
}

#[rustfmt::skip]
fn compute_hash(node: &Node, width: Width) -> u32 {
    match node {
        Node::Constant(value) => value.digest() ^ mix(width),
        Node::Read { updates, index } => mix(index.hash) ^ updates.structural_hash(),
        Node::Extract { expr, offset } => mix(*offset) ^ mix(width) ^ mix(expr.hash),
        Node::ZExt(src) => mix(ExprKind::ZExt.code()) ^ mix(width) ^ mix(src.hash),
        Node::SExt(src) => mix(ExprKind::SExt.code()) ^ mix(width) ^ mix(src.hash),
        Node::Not(src) => mix(src.hash).wrapping_mul(ExprKind::Not.code()),
        Node::NotOptimized(src) => kids_hash(ExprKind::NotOptimized, &[src]),
        Node::Select { cond, then, otherwise } => kids_hash(ExprKind::Select, &[cond, then, otherwise]),
        Node::Concat { left, right } => kids_hash(ExprKind::Concat, &[left, right]),
        Node::Binary { kind, left, right } => kids_hash(*kind, &[left, right]),
    }
}

fn kids_hash(kind: ExprKind, kids: &[&ExprRef]) -> u32 {
    kids.iter()
        .fold(mix(kind.code()), |res, kid| (res << 1) ^ mix(kid.hash))
}

type Equivs = HashSet<(*const Expr, *const Expr)>;

impl Expr {
    fn compare_with(&self, other: &Expr, equivs: &mut Equivs) -> Ordering {
        if ptr::eq(self, other) {
            return Ordering::Equal;
        }

        let order = self
            .kind()
            .cmp(&other.kind())
            .then_with(|| self.hash.cmp(&other.hash))
            .then_with(|| self.compare_contents(other));
        if order != Ordering::Equal {
            return order;
        }

        let pair = if (self as *const Expr) < (other as *const Expr) {
            (self as *const Expr, other as *const Expr)
        } else {
            (other as *const Expr, self as *const Expr)
        };
        if equivs.contains(&pair) {
            return Ordering::Equal;
        }

        for (a, b) in self.kids().into_iter().zip(other.kids()) {
            let order = a.compare_with(b, equivs);
            if order != Ordering::Equal {
                return order;
            }
        }

        equivs.insert(pair);
        Ordering::Equal
    }

    fn compare_contents(&self, other: &Expr) -> Ordering {
        match (&self.node, &other.node) {
            (Node::Constant(a), Node::Constant(b)) => a.compare(b),
            (Node::Extract { offset: a, .. }, Node::Extract { offset: b, .. }) => {
                a.cmp(b).then_with(|| self.width.cmp(&other.width))
            }
            (Node::ZExt(_), Node::ZExt(_)) | (Node::SExt(_), Node::SExt(_)) => {
                self.width.cmp(&other.width)
            }
            (Node::Read { updates: a, .. }, Node::Read { updates: b, .. }) => a.compare(b),
            _ => Ordering::Equal,
        }
    }
}
