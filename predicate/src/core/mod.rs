#![deny(missing_docs)]
//! Core predicate structures shared across the pruning and pushdown passes.

mod builder;
mod operand;
mod value;

use std::{cmp::Ordering, collections::BTreeSet, fmt, sync::Arc};

pub use builder::PredicateBuilder;
pub use operand::{ColumnRef, Operand};
pub use value::ScalarValue;

/// Comparison operator used by binary predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// Equals (`=`).
    Equal,
    /// Not equals (`!=`).
    NotEqual,
    /// Less than (`<`).
    LessThan,
    /// Less than or equal to (`<=`).
    LessThanOrEqual,
    /// Greater than (`>`).
    GreaterThan,
    /// Greater than or equal to (`>=`).
    GreaterThanOrEqual,
}

impl ComparisonOp {
    /// Returns a textual representation of the operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "!=",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessThanOrEqual => "<=",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterThanOrEqual => ">=",
        }
    }

    /// Returns the operator that swaps the left/right side of the comparison.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            ComparisonOp::Equal => ComparisonOp::Equal,
            ComparisonOp::NotEqual => ComparisonOp::NotEqual,
            ComparisonOp::LessThan => ComparisonOp::GreaterThan,
            ComparisonOp::LessThanOrEqual => ComparisonOp::GreaterThanOrEqual,
            ComparisonOp::GreaterThan => ComparisonOp::LessThan,
            ComparisonOp::GreaterThanOrEqual => ComparisonOp::LessThanOrEqual,
        }
    }

    /// Returns the logical negation of this operator.
    #[must_use]
    pub fn negated(self) -> Self {
        match self {
            ComparisonOp::Equal => ComparisonOp::NotEqual,
            ComparisonOp::NotEqual => ComparisonOp::Equal,
            ComparisonOp::LessThan => ComparisonOp::GreaterThanOrEqual,
            ComparisonOp::LessThanOrEqual => ComparisonOp::GreaterThan,
            ComparisonOp::GreaterThan => ComparisonOp::LessThanOrEqual,
            ComparisonOp::GreaterThanOrEqual => ComparisonOp::LessThan,
        }
    }

    /// Evaluates the operator against a comparison ordering (`left.cmp(right)`).
    #[must_use]
    pub fn test_ordering(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ordering == Ordering::Equal,
            ComparisonOp::NotEqual => ordering != Ordering::Equal,
            ComparisonOp::LessThan => ordering == Ordering::Less,
            ComparisonOp::LessThanOrEqual => ordering != Ordering::Greater,
            ComparisonOp::GreaterThan => ordering == Ordering::Greater,
            ComparisonOp::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recursive predicate node; leaf and branch variants coexist.
#[derive(Clone, Debug, PartialEq)]
pub enum PredicateNode {
    /// Always-true literal; matches all rows.
    True,
    /// Always-false literal; matches no rows.
    False,
    /// Binary comparison.
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: ComparisonOp,
        /// Right operand.
        right: Operand,
    },
    /// Membership test against a literal list.
    InList {
        /// Value to test.
        expr: Operand,
        /// Literal candidates.
        list: Vec<ScalarValue>,
        /// True when representing `NOT IN`.
        negated: bool,
    },
    /// Logical negation.
    Not(Box<Predicate>),
    /// Conjunction over multiple predicates.
    And(Vec<Predicate>),
    /// Disjunction over multiple predicates.
    Or(Vec<Predicate>),
}

impl PredicateNode {
    /// Returns true when the node has no child predicates.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            PredicateNode::True
                | PredicateNode::False
                | PredicateNode::Compare { .. }
                | PredicateNode::InList { .. }
        )
    }
}

/// Immutable boolean predicate over columns and literals.
#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    kind: PredicateNode,
}

impl Predicate {
    /// Returns a reference to the underlying node.
    #[must_use]
    pub fn kind(&self) -> &PredicateNode {
        &self.kind
    }

    /// Predicate matching every row.
    #[must_use]
    pub fn always() -> Self {
        Self::from_kind(PredicateNode::True)
    }

    /// Predicate matching no row.
    #[must_use]
    pub fn never() -> Self {
        Self::from_kind(PredicateNode::False)
    }

    /// Builds a binary comparison.
    #[must_use]
    pub fn compare<L, R>(left: L, op: ComparisonOp, right: R) -> Self
    where
        L: Into<Operand>,
        R: Into<Operand>,
    {
        Self::from_kind(PredicateNode::Compare {
            left: left.into(),
            op,
            right: right.into(),
        })
    }

    /// Builds an `IN` (or `NOT IN` when `negated`) membership test.
    #[must_use]
    pub fn in_list<O, I>(expr: O, list: I, negated: bool) -> Self
    where
        O: Into<Operand>,
        I: IntoIterator<Item = ScalarValue>,
    {
        Self::from_kind(PredicateNode::InList {
            expr: expr.into(),
            list: list.into_iter().collect(),
            negated,
        })
    }

    /// Wraps the predicate in a logical negation without rewriting it.
    #[must_use]
    pub fn not(inner: Predicate) -> Self {
        Self::from_kind(PredicateNode::Not(Box::new(inner)))
    }

    /// Builds a conjunction from the supplied clauses.
    ///
    /// # Panics
    ///
    /// Panics if no clauses are provided.
    #[must_use]
    pub fn and<I>(clauses: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        let mut acc = Vec::new();
        for clause in clauses {
            match clause.into_kind() {
                PredicateNode::And(mut nested) => acc.append(&mut nested),
                other => acc.push(Predicate::from_kind(other)),
            }
        }

        assert!(
            !acc.is_empty(),
            "Predicate::and requires at least one clause"
        );

        if acc.len() == 1 {
            acc.pop().expect("length checked")
        } else {
            Self::from_kind(PredicateNode::And(acc))
        }
    }

    /// Builds a disjunction from the supplied clauses.
    ///
    /// # Panics
    ///
    /// Panics if no clauses are provided.
    #[must_use]
    pub fn or<I>(clauses: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        let mut acc = Vec::new();
        for clause in clauses {
            match clause.into_kind() {
                PredicateNode::Or(mut nested) => acc.append(&mut nested),
                other => acc.push(Predicate::from_kind(other)),
            }
        }

        assert!(
            !acc.is_empty(),
            "Predicate::or requires at least one clause"
        );

        if acc.len() == 1 {
            acc.pop().expect("length checked")
        } else {
            Self::from_kind(PredicateNode::Or(acc))
        }
    }

    /// Builds a conjunction from the supplied predicates, if any are provided.
    #[must_use]
    pub fn conjunction(predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.into_iter().next(),
            _ => Some(Predicate::and(predicates).simplify()),
        }
    }

    /// Builds a disjunction from the supplied predicates, if any.
    #[must_use]
    pub fn disjunction(predicates: Vec<Predicate>) -> Option<Predicate> {
        match predicates.len() {
            0 => None,
            1 => predicates.into_iter().next(),
            _ => Some(Predicate::or(predicates).simplify()),
        }
    }

    /// Applies simplification rules: flattens nested AND/OR, folds `TRUE`/`FALSE`
    /// children and collapses double negation.
    #[must_use]
    pub fn simplify(self) -> Self {
        match self.kind {
            PredicateNode::True
            | PredicateNode::False
            | PredicateNode::Compare { .. }
            | PredicateNode::InList { .. } => self,
            PredicateNode::Not(inner) => match inner.simplify().into_kind() {
                PredicateNode::Not(grandchild) => *grandchild,
                PredicateNode::True => Self::never(),
                PredicateNode::False => Self::always(),
                other => Self::not(Self::from_kind(other)),
            },
            PredicateNode::And(clauses) => {
                let mut kept = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    match clause.simplify().into_kind() {
                        PredicateNode::False => return Self::never(),
                        PredicateNode::True => {}
                        PredicateNode::And(nested) => kept.extend(nested),
                        other => kept.push(Self::from_kind(other)),
                    }
                }
                match kept.len() {
                    0 => Self::always(),
                    1 => kept.pop().expect("length checked"),
                    _ => Self::from_kind(PredicateNode::And(kept)),
                }
            }
            PredicateNode::Or(clauses) => {
                let mut kept = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    match clause.simplify().into_kind() {
                        PredicateNode::True => return Self::always(),
                        PredicateNode::False => {}
                        PredicateNode::Or(nested) => kept.extend(nested),
                        other => kept.push(Self::from_kind(other)),
                    }
                }
                match kept.len() {
                    0 => Self::never(),
                    1 => kept.pop().expect("length checked"),
                    _ => Self::from_kind(PredicateNode::Or(kept)),
                }
            }
        }
    }

    /// Returns the logical negation of this predicate in negation normal form.
    ///
    /// Negation is pushed through AND/OR via De Morgan's laws and absorbed into
    /// leaves, so the result never contains a `Not` node.
    #[must_use]
    pub fn negate(self) -> Self {
        match self.kind {
            PredicateNode::True => Self::never(),
            PredicateNode::False => Self::always(),
            PredicateNode::Compare { left, op, right } => Self::from_kind(PredicateNode::Compare {
                left,
                op: op.negated(),
                right,
            }),
            PredicateNode::InList {
                expr,
                list,
                negated,
            } => Self::from_kind(PredicateNode::InList {
                expr,
                list,
                negated: !negated,
            }),
            PredicateNode::Not(inner) => inner.to_nnf(),
            PredicateNode::And(children) => {
                let negated: Vec<_> = children.into_iter().map(Predicate::negate).collect();
                Predicate::disjunction(negated).unwrap_or_else(Predicate::never)
            }
            PredicateNode::Or(children) => {
                let negated: Vec<_> = children.into_iter().map(Predicate::negate).collect();
                Predicate::conjunction(negated).unwrap_or_else(Predicate::always)
            }
        }
    }

    /// Rewrites the predicate into negation normal form.
    ///
    /// The result contains no `Not` nodes and applying the rewrite again yields
    /// an identical tree.
    #[must_use]
    pub fn to_nnf(self) -> Self {
        match self.kind {
            PredicateNode::Not(inner) => inner.negate(),
            PredicateNode::And(children) => {
                let rewritten: Vec<_> = children.into_iter().map(Predicate::to_nnf).collect();
                Predicate::conjunction(rewritten).unwrap_or_else(Predicate::always)
            }
            PredicateNode::Or(children) => {
                let rewritten: Vec<_> = children.into_iter().map(Predicate::to_nnf).collect();
                Predicate::disjunction(rewritten).unwrap_or_else(Predicate::never)
            }
            PredicateNode::True
            | PredicateNode::False
            | PredicateNode::Compare { .. }
            | PredicateNode::InList { .. } => self,
        }
    }

    /// Returns true when the tree contains no `Not` node.
    #[must_use]
    pub fn is_nnf(&self) -> bool {
        match &self.kind {
            PredicateNode::Not(_) => false,
            PredicateNode::And(children) | PredicateNode::Or(children) => {
                children.iter().all(Predicate::is_nnf)
            }
            _ => true,
        }
    }

    /// Returns the constant truth value when the predicate is `TRUE` or `FALSE`.
    #[must_use]
    pub fn as_constant(&self) -> Option<bool> {
        match self.kind {
            PredicateNode::True => Some(true),
            PredicateNode::False => Some(false),
            _ => None,
        }
    }

    /// Collects the names of every column referenced by the predicate.
    #[must_use]
    pub fn columns(&self) -> BTreeSet<Arc<str>> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    /// Returns true when any referenced column satisfies `test`.
    pub fn references<F>(&self, test: F) -> bool
    where
        F: Fn(&str) -> bool + Copy,
    {
        match &self.kind {
            PredicateNode::True | PredicateNode::False => false,
            PredicateNode::Compare { left, right, .. } => {
                operand_references(left, test) || operand_references(right, test)
            }
            PredicateNode::InList { expr, .. } => operand_references(expr, test),
            PredicateNode::Not(inner) => inner.references(test),
            PredicateNode::And(children) | PredicateNode::Or(children) => {
                children.iter().any(|child| child.references(test))
            }
        }
    }

    /// Builds a predicate directly from a single node.
    #[must_use]
    pub fn from_node(node: PredicateNode) -> Self {
        Self::from_kind(node)
    }

    /// Consumes the predicate and returns its root node.
    #[must_use]
    pub fn into_node(self) -> PredicateNode {
        self.kind
    }

    fn collect_columns(&self, out: &mut BTreeSet<Arc<str>>) {
        match &self.kind {
            PredicateNode::True | PredicateNode::False => {}
            PredicateNode::Compare { left, right, .. } => {
                collect_operand_column(left, out);
                collect_operand_column(right, out);
            }
            PredicateNode::InList { expr, .. } => collect_operand_column(expr, out),
            PredicateNode::Not(child) => child.collect_columns(out),
            PredicateNode::And(children) | PredicateNode::Or(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
        }
    }

    pub(crate) fn from_kind(kind: PredicateNode) -> Self {
        Self { kind }
    }

    fn into_kind(self) -> PredicateNode {
        self.kind
    }
}

fn collect_operand_column(operand: &Operand, out: &mut BTreeSet<Arc<str>>) {
    if let Operand::Column(column) = operand {
        out.insert(Arc::clone(&column.name));
    }
}

fn operand_references<F>(operand: &Operand, test: F) -> bool
where
    F: Fn(&str) -> bool,
{
    matches!(operand, Operand::Column(column) if test(&column.name))
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PredicateNode::True => f.write_str("TRUE"),
            PredicateNode::False => f.write_str("FALSE"),
            PredicateNode::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            PredicateNode::InList {
                expr,
                list,
                negated,
            } => {
                write!(f, "{expr} {}IN (", if *negated { "NOT " } else { "" })?;
                for (idx, value) in list.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str(")")
            }
            PredicateNode::Not(inner) => write!(f, "NOT ({inner})"),
            PredicateNode::And(children) => write_joined(f, children, " AND "),
            PredicateNode::Or(children) => write_joined(f, children, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Predicate], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (idx, child) in children.iter().enumerate() {
        if idx > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}
