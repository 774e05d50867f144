//! Builder for composing predicate trees.

use super::{ComparisonOp, Operand, Predicate, PredicateNode, ScalarValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuilderCombine {
    Leaf,
    Conjunction,
    Disjunction,
}

/// Builder for composing predicates incrementally.
#[derive(Debug)]
pub struct PredicateBuilder {
    combine: BuilderCombine,
    clauses: Vec<Predicate>,
}

impl PredicateBuilder {
    const fn new(combine: BuilderCombine) -> Self {
        Self {
            combine,
            clauses: Vec::new(),
        }
    }

    /// Creates a builder that expects a single clause.
    #[must_use]
    pub fn leaf() -> Self {
        Self::new(BuilderCombine::Leaf)
    }

    /// Creates a builder that emits an `AND` of all clauses.
    #[must_use]
    pub fn and() -> Self {
        Self::new(BuilderCombine::Conjunction)
    }

    /// Creates a builder that emits an `OR` of all clauses.
    #[must_use]
    pub fn or() -> Self {
        Self::new(BuilderCombine::Disjunction)
    }

    /// Adds an existing predicate to the builder.
    #[must_use]
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.clauses.push(predicate);
        self
    }

    /// Adds a comparison predicate.
    #[must_use]
    pub fn compare<L, R>(mut self, left: L, op: ComparisonOp, right: R) -> Self
    where
        L: Into<Operand>,
        R: Into<Operand>,
    {
        self.clauses.push(Predicate::compare(left, op, right));
        self
    }

    /// Adds an equality predicate.
    #[must_use]
    pub fn equals<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Operand>,
        R: Into<Operand>,
    {
        self.compare(left, ComparisonOp::Equal, right)
    }

    /// Adds an inequality predicate.
    #[must_use]
    pub fn not_equals<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Operand>,
        R: Into<Operand>,
    {
        self.compare(left, ComparisonOp::NotEqual, right)
    }

    /// Adds a `<` comparison predicate.
    #[must_use]
    pub fn less_than<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Operand>,
        R: Into<Operand>,
    {
        self.compare(left, ComparisonOp::LessThan, right)
    }

    /// Adds a `<=` comparison predicate.
    #[must_use]
    pub fn less_than_or_equal<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Operand>,
        R: Into<Operand>,
    {
        self.compare(left, ComparisonOp::LessThanOrEqual, right)
    }

    /// Adds a `>` comparison predicate.
    #[must_use]
    pub fn greater_than<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Operand>,
        R: Into<Operand>,
    {
        self.compare(left, ComparisonOp::GreaterThan, right)
    }

    /// Adds a `>=` comparison predicate.
    #[must_use]
    pub fn greater_than_or_equal<L, R>(self, left: L, right: R) -> Self
    where
        L: Into<Operand>,
        R: Into<Operand>,
    {
        self.compare(left, ComparisonOp::GreaterThanOrEqual, right)
    }

    /// Adds an `IN` predicate.
    #[must_use]
    pub fn in_list<O, I>(mut self, expr: O, list: I) -> Self
    where
        O: Into<Operand>,
        I: IntoIterator<Item = ScalarValue>,
    {
        self.clauses.push(Predicate::in_list(expr, list, false));
        self
    }

    /// Adds a `NOT IN` predicate.
    #[must_use]
    pub fn not_in_list<O, I>(mut self, expr: O, list: I) -> Self
    where
        O: Into<Operand>,
        I: IntoIterator<Item = ScalarValue>,
    {
        self.clauses.push(Predicate::in_list(expr, list, true));
        self
    }

    fn branch<F>(mut self, combine: BuilderCombine, build: F) -> Self
    where
        F: FnOnce(PredicateBuilder) -> PredicateBuilder,
    {
        let predicate = build(PredicateBuilder::new(combine)).build();
        self.clauses.push(predicate);
        self
    }

    /// Adds a nested conjunction built by the supplied closure.
    #[must_use]
    pub fn and_group<F>(self, build: F) -> Self
    where
        F: FnOnce(PredicateBuilder) -> PredicateBuilder,
    {
        self.branch(BuilderCombine::Conjunction, build)
    }

    /// Adds a nested disjunction built by the supplied closure.
    #[must_use]
    pub fn or_group<F>(self, build: F) -> Self
    where
        F: FnOnce(PredicateBuilder) -> PredicateBuilder,
    {
        self.branch(BuilderCombine::Disjunction, build)
    }

    /// Adds a negated predicate built by the supplied closure.
    ///
    /// The negation is kept as a `Not` node; rewriting happens during planning.
    #[must_use]
    pub fn not_group<F>(mut self, build: F) -> Self
    where
        F: FnOnce(PredicateBuilder) -> PredicateBuilder,
    {
        let predicate = build(PredicateBuilder::and()).build();
        self.clauses
            .push(Predicate::from_kind(PredicateNode::Not(Box::new(predicate))));
        self
    }

    /// Consumes the builder and returns the composed predicate.
    ///
    /// # Panics
    ///
    /// Panics when no clause was added, or when a leaf builder holds more than one clause.
    #[must_use]
    pub fn build(self) -> Predicate {
        assert!(
            !self.clauses.is_empty(),
            "PredicateBuilder requires at least one clause"
        );
        match self.combine {
            BuilderCombine::Leaf => {
                assert!(
                    self.clauses.len() == 1,
                    "PredicateBuilder::leaf must contain exactly one clause"
                );
                self.clauses
                    .into_iter()
                    .next()
                    .expect("length checked for leaf builder")
            }
            BuilderCombine::Conjunction => Predicate::and(self.clauses),
            BuilderCombine::Disjunction => Predicate::or(self.clauses),
        }
    }
}

impl Default for PredicateBuilder {
    fn default() -> Self {
        Self::leaf()
    }
}
