//! Abstract syntax tree for the derived-column expression language (spec §4.A).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

/// One parsed expression node. `Column` preserves whatever text was inside
/// backticks (or the bare identifier) verbatim so dependency extraction can
/// match it back against live table columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(String),
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Array(Vec<Expr>),
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
}

/// The set of functions whose first argument is evaluated once over the whole
/// column rather than per row (spec §4.B phase 1).
pub const COLUMN_WISE_FUNCTIONS: &[&str] = &[
    "col_mean",
    "col_sd",
    "col_min",
    "col_max",
    "col_median",
    "zscore",
    "center",
    "rank",
    "percentile_rank",
    "ntile",
];

impl Expr {
    /// Collect every column name syntactically referenced by this expression,
    /// deduplicated, preserving first-seen order (spec §4.D `extractColumnRefs`).
    pub fn extract_column_refs(&self) -> Vec<String> {
        let mut seen = indexmap::IndexSet::new();
        self.collect_column_refs(&mut seen);
        seen.into_iter().collect()
    }

    fn collect_column_refs(&self, out: &mut indexmap::IndexSet<String>) {
        match self {
            Expr::Column(name) => {
                out.insert(name.clone());
            }
            Expr::Number(_) | Expr::String(_) | Expr::Boolean(_) | Expr::Null => {}
            Expr::Array(items) => {
                for item in items {
                    item.collect_column_refs(out);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_column_refs(out),
            Expr::Binary { left, right, .. } => {
                left.collect_column_refs(out);
                right.collect_column_refs(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_column_refs(out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_column_refs_dedupes_and_preserves_order() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Column("a".into())),
            right: Box::new(Expr::Binary {
                op: BinaryOp::Mul,
                left: Box::new(Expr::Column("b".into())),
                right: Box::new(Expr::Column("a".into())),
            }),
        };
        assert_eq!(expr.extract_column_refs(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn extract_column_refs_descends_into_calls_and_arrays() {
        let expr = Expr::Call {
            name: "if_else".into(),
            args: vec![
                Expr::Column("flag".into()),
                Expr::Array(vec![Expr::Column("x".into())]),
                Expr::Number(0.0),
            ],
        };
        assert_eq!(expr.extract_column_refs(), vec!["flag".to_string(), "x".to_string()]);
    }
}
