//! Formulas for derived attributes.
//!
//! A formula is a small arithmetic expression over other attributes, written
//! with `{name}` placeholders:
//!
//! ```text
//! {photovoltaics} + {battery_discharge} - {battery_charge}
//! {consumption} if {export_to_grid} > 0 else {system_production}
//! ```
//!
//! Supported: numbers, parentheses, unary minus, `* /`, `+ -`, the comparisons
//! `> < >= <= == !=` (true is 1, false is 0) and `a if cond else b`, which binds
//! loosest. Nothing else is accepted, so a register table cannot smuggle in
//! anything but arithmetic.

use crate::decode::round1;
use crate::prelude::*;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, map_res, opt},
    multi::many0,
    number::complete::recognize_float,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use std::collections::{BTreeMap, HashMap};

/// Values a formula can refer to.
pub trait Context {
    fn value(&self, name: &str) -> Option<f64>;
}

impl Context for BTreeMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl Context for HashMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl Op {
    fn apply(self, l: f64, r: f64) -> Option<f64> {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        Some(match self {
            Op::Add => l + r,
            Op::Sub => l - r,
            Op::Mul => l * r,
            Op::Div if r == 0.0 => return None,
            Op::Div => l / r,
            Op::Gt => truth(l > r),
            Op::Lt => truth(l < r),
            Op::Ge => truth(l >= r),
            Op::Le => truth(l <= r),
            Op::Eq => truth(l == r),
            Op::Ne => truth(l != r),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Reference(String),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Conditional {
        then: Box<Expr>,
        condition: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    fn references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Reference(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Neg(e) => e.references(out),
            Expr::Binary(_, l, r) => {
                l.references(out);
                r.references(out);
            }
            Expr::Conditional {
                then,
                condition,
                otherwise,
            } => {
                then.references(out);
                condition.references(out);
                otherwise.references(out);
            }
        }
    }
}

// parsers {{{
fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn number(i: &str) -> IResult<&str, Expr> {
    map_res(recognize_float, |s: &str| s.parse::<f64>().map(Expr::Number))(i)
}

fn reference(i: &str) -> IResult<&str, Expr> {
    let name = take_while1(|c: char| c.is_alphanumeric() || c == '_');
    map(delimited(char('{'), ws(name), char('}')), |n: &str| {
        Expr::Reference(n.to_string())
    })(i)
}

fn parens(i: &str) -> IResult<&str, Expr> {
    delimited(char('('), conditional, char(')'))(i)
}

fn primary(i: &str) -> IResult<&str, Expr> {
    ws(alt((reference, parens, number)))(i)
}

fn unary(i: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| Expr::Neg(Box::new(e))),
        primary,
    ))(i)
}

fn fold(first: Expr, rest: Vec<(Op, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |l, (op, r)| Expr::Binary(op, Box::new(l), Box::new(r)))
}

fn term(i: &str) -> IResult<&str, Expr> {
    let op = alt((map(char('*'), |_| Op::Mul), map(char('/'), |_| Op::Div)));
    map(pair(unary, many0(pair(ws(op), unary))), |(first, rest)| {
        fold(first, rest)
    })(i)
}

fn additive(i: &str) -> IResult<&str, Expr> {
    let op = alt((map(char('+'), |_| Op::Add), map(char('-'), |_| Op::Sub)));
    map(pair(term, many0(pair(ws(op), term))), |(first, rest)| {
        fold(first, rest)
    })(i)
}

fn comparison(i: &str) -> IResult<&str, Expr> {
    // two-character operators first so `>=` is not read as `>`
    let op = alt((
        map(tag(">="), |_| Op::Ge),
        map(tag("<="), |_| Op::Le),
        map(tag("=="), |_| Op::Eq),
        map(tag("!="), |_| Op::Ne),
        map(tag(">"), |_| Op::Gt),
        map(tag("<"), |_| Op::Lt),
    ));
    map(
        pair(additive, opt(pair(ws(op), additive))),
        |(l, rest)| match rest {
            Some((op, r)) => Expr::Binary(op, Box::new(l), Box::new(r)),
            None => l,
        },
    )(i)
}

fn conditional(i: &str) -> IResult<&str, Expr> {
    map(
        pair(
            comparison,
            opt(tuple((
                ws(tag("if")),
                comparison,
                ws(tag("else")),
                conditional,
            ))),
        ),
        |(then, rest)| match rest {
            Some((_, condition, _, otherwise)) => Expr::Conditional {
                then: Box::new(then),
                condition: Box::new(condition),
                otherwise: Box::new(otherwise),
            },
            None => then,
        },
    )(i)
}
// }}}

/// A parsed formula, ready to evaluate many times.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self> {
        match all_consuming(conditional)(source) {
            Ok((_, expr)) => Ok(Self {
                source: source.to_string(),
                expr,
            }),
            Err(err) => Err(Error::configuration(format!(
                "malformed formula {:?}: {}",
                source, err
            ))),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Attribute names used by the formula, in order of first appearance.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.expr.references(&mut out);
        out
    }

    pub fn evaluate(&self, context: &impl Context) -> Result<f64> {
        self.eval(&self.expr, context).map(round1)
    }

    fn eval(&self, expr: &Expr, context: &impl Context) -> Result<f64> {
        match expr {
            Expr::Number(n) => Ok(*n),
            Expr::Reference(name) => {
                context
                    .value(name)
                    .ok_or_else(|| Error::UndefinedReference { name: name.clone() })
            }
            Expr::Neg(e) => Ok(-self.eval(e, context)?),
            Expr::Binary(op, l, r) => {
                let l = self.eval(l, context)?;
                let r = self.eval(r, context)?;
                op.apply(l, r).ok_or_else(|| Error::Evaluation {
                    expression: self.source.clone(),
                    reason: "division by zero".to_string(),
                })
            }
            Expr::Conditional {
                then,
                condition,
                otherwise,
            } => {
                if self.eval(condition, context)? != 0.0 {
                    self.eval(then, context)
                } else {
                    self.eval(otherwise, context)
                }
            }
        }
    }
}

/// Parse and evaluate `expression` in one go.
pub fn evaluate(expression: &str, context: &impl Context) -> Result<f64> {
    Formula::parse(expression)?.evaluate(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn sums_references() {
        let c = ctx(&[("a", 2.0), ("b", 3.5)]);
        assert_eq!(evaluate("{a} + {b}", &c).unwrap(), 5.5);
    }

    #[test]
    fn conditional_picks_a_branch() {
        let c = ctx(&[("a", 1.0), ("b", 1.0), ("c", 9.0)]);
        assert_eq!(evaluate("{a} if {b} > 0 else {c}", &c).unwrap(), 1.0);

        let c = ctx(&[("a", 1.0), ("b", 0.0), ("c", 9.0)]);
        assert_eq!(evaluate("{a} if {b} > 0 else {c}", &c).unwrap(), 9.0);
    }

    #[test]
    fn precedence_and_parentheses() {
        let c = ctx(&[("a", 2.0), ("b", 3.0), ("c", 4.0)]);
        assert_eq!(evaluate("{a} + {b} * {c}", &c).unwrap(), 14.0);
        assert_eq!(evaluate("({a} + {b}) * {c}", &c).unwrap(), 20.0);
        assert_eq!(evaluate("{c} - {b} - {a}", &c).unwrap(), -1.0);
        assert_eq!(evaluate("{c} / {a} / {a}", &c).unwrap(), 1.0);
        assert_eq!(evaluate("-{a} + 10", &c).unwrap(), 8.0);
        assert_eq!(evaluate("{a} - -1", &c).unwrap(), 3.0);
    }

    #[test]
    fn comparisons_yield_one_or_zero() {
        let c = ctx(&[("a", 2.0)]);
        assert_eq!(evaluate("{a} >= 2", &c).unwrap(), 1.0);
        assert_eq!(evaluate("{a} < 2", &c).unwrap(), 0.0);
        assert_eq!(evaluate("{a} != 2", &c).unwrap(), 0.0);
        assert_eq!(evaluate("({a} == 2) * 5", &c).unwrap(), 5.0);
    }

    #[test]
    fn nested_conditional_in_else() {
        let c = ctx(&[("x", -3.0)]);
        let f = "1 if {x} > 0 else 2 if {x} == 0 else 3";
        assert_eq!(evaluate(f, &c).unwrap(), 3.0);
    }

    #[test]
    fn result_is_rounded() {
        let c = ctx(&[("a", 0.14), ("b", 0.02)]);
        assert_eq!(evaluate("{a} + {b}", &c).unwrap(), 0.2);
    }

    #[test]
    fn missing_reference_is_reported() {
        let c = ctx(&[("a", 1.0)]);
        match evaluate("{a} + {ghost}", &c) {
            Err(Error::UndefinedReference { name }) => assert_eq!(name, "ghost"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let c = ctx(&[("a", 1.0), ("b", 0.0)]);
        assert!(matches!(
            evaluate("{a} / {b}", &c),
            Err(Error::Evaluation { .. })
        ));
    }

    #[test]
    fn rejects_anything_but_arithmetic() {
        for bad in [
            "",
            "{a} +",
            "{a} {b}",
            "__import__('os')",
            "{a} if {b}",
            "{a} ** 2",
            "{}",
            "({a}",
        ] {
            assert!(
                matches!(Formula::parse(bad), Err(Error::Configuration(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn one_shot_evaluate_reports_bad_grammar_as_configuration() {
        let c = ctx(&[("a", 1.0)]);
        assert!(matches!(evaluate("{a} +", &c), Err(Error::Configuration(_))));
    }

    #[test]
    fn lists_references_once() {
        let f = Formula::parse("{a} + {b} if {a} > 0 else {c}").unwrap();
        assert_eq!(f.references(), vec!["a", "b", "c"]);
        assert_eq!(f.source(), "{a} + {b} if {a} > 0 else {c}");
    }
}
