//! COOL 语法分析器
//!
//! 由文法生成规范 LR(1) 分析表，用移进-归约引擎得到推导，
//! 再由求值器按推导重放语义动作构造 AST。

pub mod cool_grammar;
pub mod engine;
pub mod evaluator;
pub mod grammar;
pub mod lr1;

use std::sync::OnceLock;

use crate::ast::Program;
use crate::error::{CoolError, CoolResult, evaluation_error, grammar_error};
use crate::lexer::{LexOutput, TokenWithLocation};
use cool_grammar::{Value, cool_grammar};
use engine::{Derivation, Lookahead, Lr1Parser};

/// 分析表只构造一次
static COOL_PARSER: OnceLock<Result<Lr1Parser<Value>, CoolError>> = OnceLock::new();

pub fn cool_parser() -> CoolResult<&'static Lr1Parser<Value>> {
    COOL_PARSER
        .get_or_init(|| {
            let parser = Lr1Parser::new(cool_grammar()?)?;
            tracing::debug!(states = parser.table().state_count(), "built COOL parse table");
            Ok(parser)
        })
        .as_ref()
        .map_err(Clone::clone)
}

/// 语法分析结果
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub program: Program,
    pub derivation: Derivation,
}

/// 分析词法结果。存在无法识别的词素时直接报告词法错误
pub fn parse(lexed: &LexOutput) -> CoolResult<ParseOutput> {
    if !lexed.is_clean() {
        return Err(CoolError::Lexical(lexed.errors.clone()));
    }
    parse_tokens(&lexed.tokens)
}

/// 分析以 `$` 结尾的记号流
pub fn parse_tokens(tokens: &[TokenWithLocation]) -> CoolResult<ParseOutput> {
    let parser = cool_parser()?;
    let grammar = parser.grammar();

    let input = tokens
        .iter()
        .map(|t| {
            let symbol = grammar.lookup(t.token.terminal()).ok_or_else(|| {
                grammar_error(format!("no terminal named '{}'", t.token.terminal()))
            })?;
            Ok(Lookahead {
                symbol,
                lexeme: t.lexeme.as_str(),
                loc: t.loc,
            })
        })
        .collect::<CoolResult<Vec<_>>>()?;

    let derivation = parser.parse(&input)?;
    let value = evaluator::evaluate(grammar, &derivation, tokens, |t| Value::Token(t.clone()))?;
    match value {
        Value::Program(program) => {
            tracing::debug!(classes = program.classes.len(), "parsed program");
            Ok(ParseOutput { program, derivation })
        }
        _ => Err(evaluation_error("derivation did not produce a program")),
    }
}
