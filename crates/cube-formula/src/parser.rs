//! Formula grammar.
//!
//! Precedence, loosest first:
//!
//! | level | operators |
//! |---|---|
//! | or | `\|` `^` |
//! | and | `&` |
//! | not | `not` |
//! | comparison | `==` `!=` `<=` `>=` `<` `>` (non-associative) |
//! | shift | `<<` `>>` |
//! | sum | `+` `-` |
//! | product | `*` `/` `//` `%` |
//! | unary | `-` `+` `~` |
//! | power | `**` (right-associative, binds tighter than a unary on its left) |
//!
//! Atoms are variable names, integer and float literals, and parenthesised
//! expressions.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_res, not, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::{FormulaError, FormulaResult};

/// Parse a complete formula.
pub fn parse(formula: &str) -> FormulaResult<Expr> {
    match all_consuming(ws(or_expr))(formula) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(FormulaError::Parse {
            formula: formula.to_string(),
            near: e.input.to_string(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(FormulaError::Parse {
            formula: formula.to_string(),
            near: String::new(),
        }),
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn fold_left(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter()
        .fold(first, |lhs, (op, rhs)| Expr::binary(op, lhs, rhs))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let op = alt((value(BinaryOp::Or, char('|')), value(BinaryOp::Xor, char('^'))));
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(pair(ws(op), and_expr))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(pair(ws(value(BinaryOp::And, char('&'))), not_expr))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(keyword("not")), not_expr), |operand| {
            Expr::unary(UnaryOp::Not, operand)
        }),
        comparison,
    ))(input)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(alt((alphanumeric1, tag("_")))))
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let op = alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, char('<')),
        value(BinaryOp::Gt, char('>')),
    ));
    let (input, lhs) = shift(input)?;
    let (input, rhs) = opt(pair(ws(op), shift))(input)?;
    let expr = match rhs {
        Some((op, rhs)) => Expr::binary(op, lhs, rhs),
        None => lhs,
    };
    Ok((input, expr))
}

fn shift(input: &str) -> IResult<&str, Expr> {
    let op = alt((value(BinaryOp::Shl, tag("<<")), value(BinaryOp::Shr, tag(">>"))));
    let (input, first) = sum(input)?;
    let (input, rest) = many0(pair(ws(op), sum))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn sum(input: &str) -> IResult<&str, Expr> {
    let op = alt((value(BinaryOp::Add, char('+')), value(BinaryOp::Sub, char('-'))));
    let (input, first) = product(input)?;
    let (input, rest) = many0(pair(ws(op), product))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn product(input: &str) -> IResult<&str, Expr> {
    let op = alt((
        value(BinaryOp::FloorDiv, tag("//")),
        value(BinaryOp::Div, char('/')),
        value(BinaryOp::Mul, terminated(char('*'), not(char('*')))),
        value(BinaryOp::Mod, char('%')),
    ));
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(ws(op), unary))(input)?;
    Ok((input, fold_left(first, rest)))
}

fn unary(input: &str) -> IResult<&str, Expr> {
    let op = alt((
        value(UnaryOp::Neg, char('-')),
        value(UnaryOp::Pos, char('+')),
        value(UnaryOp::Invert, char('~')),
    ));
    alt((
        map(pair(ws(op), unary), |(op, operand)| Expr::unary(op, operand)),
        power,
    ))(input)
}

fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponent) = opt(preceded(ws(tag("**")), unary))(input)?;
    let expr = match exponent {
        Some(exponent) => Expr::binary(BinaryOp::Pow, base, exponent),
        None => base,
    };
    Ok((input, expr))
}

fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        float_literal,
        int_literal,
        variable,
        delimited(char('('), ws(or_expr), char(')')),
    )))(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn float_literal(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize(alt((
            recognize(tuple((digit1, char('.'), opt(digit1), opt(exponent)))),
            recognize(tuple((char('.'), digit1, opt(exponent)))),
            recognize(pair(digit1, exponent)),
        ))),
        |text: &str| text.parse::<f64>().map(Expr::Float),
    )(input)
}

fn int_literal(input: &str) -> IResult<&str, Expr> {
    map_res(
        terminated(digit1, not(alt((alpha1, tag("_"))))),
        |text: &str| text.parse::<i64>().map(Expr::Int),
    )(input)
}

fn variable(input: &str) -> IResult<&str, Expr> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |name: &str| Expr::Var(name.to_string()),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    #[test]
    fn test_precedence_of_arithmetic() {
        assert_eq!(
            parse("a + b * c").unwrap(),
            Expr::binary(
                BinaryOp::Add,
                var("a"),
                Expr::binary(BinaryOp::Mul, var("b"), var("c"))
            )
        );
        assert_eq!(
            parse("a - b - c").unwrap(),
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, var("a"), var("b")),
                var("c")
            )
        );
    }

    #[test]
    fn test_power_is_right_associative_and_binds_tighter_than_negation() {
        assert_eq!(
            parse("-a ** 2 ** 3").unwrap(),
            Expr::unary(
                UnaryOp::Neg,
                Expr::binary(
                    BinaryOp::Pow,
                    var("a"),
                    Expr::binary(BinaryOp::Pow, Expr::Int(2), Expr::Int(3))
                )
            )
        );
        assert_eq!(
            parse("2 ** -1").unwrap(),
            Expr::binary(BinaryOp::Pow, Expr::Int(2), Expr::unary(UnaryOp::Neg, Expr::Int(1)))
        );
    }

    #[test]
    fn test_floor_division_and_multiplication_operators() {
        assert_eq!(
            parse("a // 2").unwrap(),
            Expr::binary(BinaryOp::FloorDiv, var("a"), Expr::Int(2))
        );
        assert_eq!(
            parse("a * b % 3").unwrap(),
            Expr::binary(
                BinaryOp::Mod,
                Expr::binary(BinaryOp::Mul, var("a"), var("b")),
                Expr::Int(3)
            )
        );
    }

    #[test]
    fn test_comparison_binds_looser_than_shift() {
        assert_eq!(
            parse("pq >> 2 == 1").unwrap(),
            Expr::binary(
                BinaryOp::Eq,
                Expr::binary(BinaryOp::Shr, var("pq"), Expr::Int(2)),
                Expr::Int(1)
            )
        );
    }

    #[test]
    fn test_logical_levels() {
        assert_eq!(
            parse("not a & b | c").unwrap(),
            Expr::binary(
                BinaryOp::Or,
                Expr::binary(BinaryOp::And, Expr::unary(UnaryOp::Not, var("a")), var("b")),
                var("c")
            )
        );
        assert_eq!(
            parse("(a > 0) & (b < 5)").unwrap(),
            Expr::binary(
                BinaryOp::And,
                Expr::binary(BinaryOp::Gt, var("a"), Expr::Int(0)),
                Expr::binary(BinaryOp::Lt, var("b"), Expr::Int(5))
            )
        );
    }

    #[test]
    fn test_keyword_prefix_is_a_variable() {
        assert_eq!(parse("nothing").unwrap(), var("nothing"));
        assert_eq!(parse("not_valid").unwrap(), var("not_valid"));
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("42").unwrap(), Expr::Int(42));
        assert_eq!(parse("0.5").unwrap(), Expr::Float(0.5));
        assert_eq!(parse(".25").unwrap(), Expr::Float(0.25));
        assert_eq!(parse("1e3").unwrap(), Expr::Float(1000.0));
        assert_eq!(parse("10000.").unwrap(), Expr::Float(10000.0));
        assert_eq!(parse("nbart_red_2").unwrap(), var("nbart_red_2"));
    }

    #[test]
    fn test_display_parses_back() {
        let expr = parse("(nir - red) / (nir + red) * 10000 // 3 ** 2").unwrap();
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse("a +"), Err(FormulaError::Parse { .. })));
        assert!(matches!(parse("(a + b"), Err(FormulaError::Parse { .. })));
        assert!(matches!(parse("a < b < c"), Err(FormulaError::Parse { .. })));
        assert!(matches!(parse(""), Err(FormulaError::Parse { .. })));
        assert!(matches!(parse("2a"), Err(FormulaError::Parse { .. })));
    }
}
