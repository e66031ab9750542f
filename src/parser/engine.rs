//! 移进-归约引擎
//!
//! 状态为（自动机状态栈，记号游标）。输出按归约顺序排列的产生式序列，
//! 以及移进/归约/接受的操作日志，供求值器重放。

use crate::error::{CoolError, CoolResult, SourceLocation, evaluation_error, parser_error};
use super::grammar::{Firsts, Grammar, ProductionId, SymbolId};
use super::lr1::{Action, Automaton, ParseTable, StateId};

/// 引擎看到的一个输入符号
#[derive(Debug, Clone, Copy)]
pub struct Lookahead<'a> {
    pub symbol: SymbolId,
    pub lexeme: &'a str,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Shift,
    Reduce(ProductionId),
    Accept,
}

/// 一次成功分析的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Derivation {
    /// 归约顺序（最右推导的逆序）
    pub productions: Vec<ProductionId>,
    pub operations: Vec<Operation>,
}

impl Derivation {
    /// 最右推导：把归约序列倒过来
    pub fn rightmost(&self) -> impl Iterator<Item = ProductionId> + '_ {
        self.productions.iter().rev().copied()
    }
}

/// 由文法构造、持有 action/goto 表的 LR(1) 分析器
pub struct Lr1Parser<V> {
    grammar: Grammar<V>,
    table: ParseTable,
}

impl<V> Lr1Parser<V> {
    /// 构造自动机并填表；文法必须已经增广
    pub fn new(grammar: Grammar<V>) -> CoolResult<Self> {
        let firsts = Firsts::compute(&grammar);
        let automaton = Automaton::build(&grammar, &firsts)?;
        let table = ParseTable::build(&grammar, &automaton)?;
        Ok(Self { grammar, table })
    }

    pub fn grammar(&self) -> &Grammar<V> {
        &self.grammar
    }

    pub fn table(&self) -> &ParseTable {
        &self.table
    }

    /// 驱动分析。没有表项即为致命错误，不做错误恢复
    pub fn parse(&self, input: &[Lookahead<'_>]) -> CoolResult<Derivation> {
        let mut stack: Vec<StateId> = vec![0];
        let mut cursor = 0;
        let mut derivation = Derivation::default();

        loop {
            let state = *stack
                .last()
                .ok_or_else(|| evaluation_error("parser stack underflow"))?;
            let lookahead = input.get(cursor).ok_or_else(|| {
                let loc = input.last().map(|l| l.loc).unwrap_or_default();
                parser_error(loc.line, loc.column, "unexpected end of input")
            })?;

            let Some(action) = self.table.action(state, lookahead.symbol) else {
                return Err(self.unexpected(state, lookahead));
            };

            match action {
                Action::Shift(next) => {
                    tracing::trace!(state, next, lexeme = lookahead.lexeme, "shift");
                    stack.push(next);
                    cursor += 1;
                    derivation.operations.push(Operation::Shift);
                }
                Action::Reduce(id) => {
                    let production = self.grammar.production_at(id);
                    let remaining = stack
                        .len()
                        .checked_sub(production.right.len())
                        .filter(|&n| n > 0)
                        .ok_or_else(|| evaluation_error("parser stack underflow"))?;
                    stack.truncate(remaining);

                    let top = stack[remaining - 1];
                    let next = self.table.goto(top, production.left).ok_or_else(|| {
                        evaluation_error(format!(
                            "missing goto from state {} on '{}'",
                            top,
                            self.grammar.symbol_name(production.left)
                        ))
                    })?;
                    tracing::trace!(
                        production = %self.grammar.display_production(id),
                        next,
                        "reduce"
                    );
                    stack.push(next);
                    derivation.productions.push(id);
                    derivation.operations.push(Operation::Reduce(id));
                }
                Action::Accept => {
                    stack.pop();
                    if stack != [0] {
                        return Err(evaluation_error(format!(
                            "accepted with unexpected stack {:?}",
                            stack
                        )));
                    }
                    derivation.operations.push(Operation::Accept);
                    tracing::debug!(
                        reductions = derivation.productions.len(),
                        "input accepted"
                    );
                    return Ok(derivation);
                }
            }
        }
    }

    fn unexpected(&self, state: StateId, lookahead: &Lookahead<'_>) -> CoolError {
        let expected: Vec<&str> = self
            .table
            .expected(state)
            .into_iter()
            .map(|s| self.grammar.symbol_name(s))
            .collect();
        let found = if lookahead.symbol == self.grammar.eof() {
            "end of input".to_string()
        } else {
            format!("'{}'", lookahead.lexeme)
        };
        parser_error(
            lookahead.loc.line,
            lookahead.loc.column,
            format!("Unexpected {}, expected one of: {}", found, expected.join(" ")),
        )
    }
}
