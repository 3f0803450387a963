//! Filter expression syntax tree.
//!
//! The parser keeps AND/OR structure and grouping parentheses in the tree so
//! complexity metrics can be computed from it. Downstream stages only see the
//! flattened clause list (see [`FilterNode::clauses`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Filter comparison operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Membership `=in=`.
    #[serde(rename = "=in=")]
    In,
    /// Negated membership `=out=`.
    #[serde(rename = "=out=")]
    Out,
    /// Equality `==`.
    #[serde(rename = "==")]
    Eq,
    /// Inequality `!=`.
    #[serde(rename = "!=")]
    Ne,
    /// Greater than or equal `>=`.
    #[serde(rename = ">=")]
    Ge,
    /// Less than or equal `<=`.
    #[serde(rename = "<=")]
    Le,
    /// Greater than `>`.
    #[serde(rename = ">")]
    Gt,
    /// Less than `<`.
    #[serde(rename = "<")]
    Lt,
}

impl Operator {
    /// Detection order: membership first, then two-character comparisons.
    pub const ALL: [Operator; 8] = [
        Operator::In,
        Operator::Out,
        Operator::Eq,
        Operator::Ne,
        Operator::Ge,
        Operator::Le,
        Operator::Gt,
        Operator::Lt,
    ];

    /// Source token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::In => "=in=",
            Operator::Out => "=out=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Lt => "<",
        }
    }

    /// True for `=in=` and `=out=`.
    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::Out)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean connective between sibling terms.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Connective {
    /// `;`
    And,
    /// `,`
    Or,
}

/// One leaf comparison before type checking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterClause {
    /// Field path as written (dotted paths are rejected later).
    pub field: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Literal values; quotes are preserved for the type checker.
    pub raw_values: Vec<String>,
}

/// Node of the filter tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterNode {
    /// Grouping parentheses wrapping this node.
    pub parens: usize,
    /// Node payload.
    pub kind: NodeKind,
}

/// Payload of a [`FilterNode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf comparison.
    Clause(FilterClause),
    /// Two or more terms joined by connectives (`connectives.len() == terms.len() - 1`).
    Group {
        /// Sibling terms in source order.
        terms: Vec<FilterNode>,
        /// Connective between each adjacent pair of terms.
        connectives: Vec<Connective>,
    },
}

/// Structural cost of a filter expression.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FilterComplexity {
    /// Maximum nesting depth.
    pub ast_depth: usize,
    /// Number of groups plus leaf clauses.
    pub ast_nodes: usize,
}

impl FilterNode {
    /// Leaf clauses in source order. AND/OR structure is not preserved.
    pub fn clauses(&self) -> Vec<FilterClause> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<FilterClause>) {
        match &self.kind {
            NodeKind::Clause(clause) => out.push(clause.clone()),
            NodeKind::Group { terms, .. } => {
                for term in terms {
                    term.collect(out);
                }
            }
        }
    }

    /// True when any connective in the tree is OR.
    pub fn has_disjunction(&self) -> bool {
        match &self.kind {
            NodeKind::Clause(_) => false,
            NodeKind::Group { terms, connectives } => {
                connectives.contains(&Connective::Or) || terms.iter().any(Self::has_disjunction)
            }
        }
    }

    /// Computes depth and node count for the tree rooted here.
    ///
    /// A node at group depth `d` scores `d` plus the deepest parenthesis
    /// nesting inside it (membership lists count as one level). Parentheses
    /// wrapping the root are ignored.
    pub fn complexity(&self) -> FilterComplexity {
        let mut metrics = FilterComplexity::default();
        self.measure(1, &mut metrics);
        metrics
    }

    fn measure(&self, depth: usize, metrics: &mut FilterComplexity) {
        metrics.ast_nodes += 1;
        metrics.ast_depth = metrics.ast_depth.max(depth + self.inner_nesting());
        if let NodeKind::Group { terms, .. } = &self.kind {
            for term in terms {
                term.measure(depth + 1, metrics);
            }
        }
    }

    fn inner_nesting(&self) -> usize {
        match &self.kind {
            NodeKind::Clause(clause) => usize::from(clause.operator.is_membership()),
            NodeKind::Group { terms, .. } => terms
                .iter()
                .map(|term| term.parens + term.inner_nesting())
                .max()
                .unwrap_or(0),
        }
    }
}
