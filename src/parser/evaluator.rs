//! 从推导重建语法树
//!
//! 按操作日志重放：移进时从左到右取下一个记号转成值，
//! 归约时用产生式的语义动作合并栈顶的右部值。

use crate::error::{CoolResult, evaluation_error};
use super::engine::{Derivation, Operation};
use super::grammar::Grammar;

pub fn evaluate<V, T, I, F>(
    grammar: &Grammar<V>,
    derivation: &Derivation,
    tokens: I,
    mut leaf: F,
) -> CoolResult<V>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> V,
{
    let mut tokens = tokens.into_iter();
    let mut productions = derivation.productions.iter();
    let mut stack: Vec<V> = Vec::new();

    for operation in &derivation.operations {
        match *operation {
            Operation::Shift => {
                let token = tokens
                    .next()
                    .ok_or_else(|| evaluation_error("token stream ended during replay"))?;
                stack.push(leaf(token));
            }
            Operation::Reduce(id) => {
                if productions.next() != Some(&id) {
                    return Err(evaluation_error(
                        "operation log disagrees with the production sequence",
                    ));
                }
                let production = grammar.production_at(id);
                let arity = production.right.len();
                let split = stack.len().checked_sub(arity).ok_or_else(|| {
                    evaluation_error(format!(
                        "not enough values to reduce {}",
                        grammar.display_production(id)
                    ))
                })?;
                let mut values = stack.split_off(split);

                let value = match production.action {
                    Some(action) => action(values)?,
                    // 无动作的单符号产生式直接传递
                    None if arity == 1 => values.pop().ok_or_else(|| {
                        evaluation_error("missing value for pass-through production")
                    })?,
                    None => {
                        return Err(evaluation_error(format!(
                            "production {} has no semantic action",
                            grammar.display_production(id)
                        )));
                    }
                };
                stack.push(value);
            }
            Operation::Accept => {
                return match (stack.pop(), stack.is_empty()) {
                    (Some(value), true) => Ok(value),
                    _ => Err(evaluation_error("replay did not end with a single value")),
                };
            }
        }
    }

    Err(evaluation_error("derivation has no accept operation"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceLocation;
    use crate::parser::engine::{Lookahead, Lr1Parser};

    #[derive(Debug, Clone, PartialEq)]
    enum Value {
        Token(String),
        Num(i64),
    }

    fn num(v: &Value) -> CoolResult<i64> {
        match v {
            Value::Num(n) => Ok(*n),
            Value::Token(t) => t.parse().map_err(|_| evaluation_error("not a number")),
        }
    }

    /// E → E + T | E - T | T ; T → int
    fn calculator() -> Lr1Parser<Value> {
        let mut g: Grammar<Value> = Grammar::new();
        let [e, t] = g.non_terminals("E T");
        let [plus, minus, int] = g.terminals("+ - int");
        g.production(e, &[e, plus, t], Some(|v| Ok(Value::Num(num(&v[0])? + num(&v[2])?))));
        g.production(e, &[e, minus, t], Some(|v| Ok(Value::Num(num(&v[0])? - num(&v[2])?))));
        g.production(e, &[t], None);
        g.production(t, &[int], Some(|v| Ok(Value::Num(num(&v[0])?))));
        g.set_start(e);
        Lr1Parser::new(g.augment().unwrap()).unwrap()
    }

    #[test]
    fn test_replay_preserves_left_associativity() {
        let p = calculator();
        let lexemes = ["10", "-", "3", "-", "2"];
        let mut input: Vec<Lookahead> = lexemes
            .iter()
            .map(|lex| Lookahead {
                symbol: p
                    .grammar()
                    .lookup(if *lex == "-" { "-" } else { "int" })
                    .unwrap(),
                lexeme: *lex,
                loc: SourceLocation::default(),
            })
            .collect();
        input.push(Lookahead {
            symbol: p.grammar().eof(),
            lexeme: "$",
            loc: SourceLocation::default(),
        });

        let derivation = p.parse(&input).unwrap();
        let value = evaluate(p.grammar(), &derivation, lexemes, |lex| {
            Value::Token(lex.to_string())
        })
        .unwrap();
        assert_eq!(value, Value::Num(5));
    }

    #[test]
    fn test_missing_accept() {
        let p = calculator();
        let derivation = Derivation::default();
        let result = evaluate(p.grammar(), &derivation, Vec::<&str>::new(), |lex| {
            Value::Token(lex.to_string())
        });
        assert!(result.is_err());
    }
}
