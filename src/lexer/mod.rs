use logos::Logos;
use crate::error::{Diagnostic, DiagnosticKind, SourceLocation};

/// 文法中输入结束终结符的名字
pub const EOF_TERMINAL: &str = "$";

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"--[^\n]*")]
#[logos(skip r"\(\*([^*]|\*+[^*)])*\*+\)")]
pub enum Token {
    // 关键字
    #[token("class")]
    Class,
    #[token("inherits")]
    Inherits,
    #[token("def")]
    Def,
    #[token("let")]
    Let,
    #[token("in")]
    In,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("fi")]
    Fi,
    #[token("while")]
    While,
    #[token("loop")]
    Loop,
    #[token("pool")]
    Pool,
    #[token("case")]
    Case,
    #[token("of")]
    Of,
    #[token("esac")]
    Esac,
    #[token("new")]
    New,
    #[token("isvoid")]
    IsVoid,
    #[token("not")]
    Not,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // 标识符
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // 字面量，溢出的整数交给错误处理
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    IntegerLiteral(i64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    StringLiteral(String),

    // 运算符
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("~")]
    Tilde,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token("=")]
    Eq,
    #[token("<-")]
    Assign,
    #[token("=>")]
    Arrow,

    // 分隔符
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("@")]
    At,

    // 输入结束，词法器从不产生它，由 tokenize 追加
    Eof,
}

impl Token {
    /// 该记号对应的文法终结符名字
    pub fn terminal(&self) -> &'static str {
        match self {
            Token::Class => "class",
            Token::Inherits => "inherits",
            Token::Def => "def",
            Token::Let => "let",
            Token::In => "in",
            Token::If => "if",
            Token::Then => "then",
            Token::Else => "else",
            Token::Fi => "fi",
            Token::While => "while",
            Token::Loop => "loop",
            Token::Pool => "pool",
            Token::Case => "case",
            Token::Of => "of",
            Token::Esac => "esac",
            Token::New => "new",
            Token::IsVoid => "isvoid",
            Token::Not => "not",
            Token::True => "true",
            Token::False => "false",
            Token::Identifier(_) => "id",
            Token::IntegerLiteral(_) => "int",
            Token::StringLiteral(_) => "string",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Tilde => "~",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Eq => "=",
            Token::Assign => "<-",
            Token::Arrow => "=>",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::At => "@",
            Token::Eof => EOF_TERMINAL,
        }
    }
}

fn unescape(slice: &str) -> String {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct TokenWithLocation {
    pub token: Token,
    pub lexeme: String,
    pub loc: SourceLocation,
    /// 源码中的字节偏移，也用作 AST 节点标识
    pub offset: usize,
}

/// 词法分析结果：记号流（总以 `$` 结尾）和无法识别的词素
#[derive(Debug, Clone, Default)]
pub struct LexOutput {
    pub tokens: Vec<TokenWithLocation>,
    pub errors: Vec<Diagnostic>,
}

impl LexOutput {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Lexer<'a> {
    inner: logos::Lexer<'a, Token>,
    line_starts: Vec<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            inner: Token::lexer(source),
            line_starts,
        }
    }

    fn location(&self, offset: usize) -> SourceLocation {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let column = offset - self.line_starts[line - 1] + 1;
        SourceLocation { line, column }
    }

    pub fn tokenize(mut self) -> LexOutput {
        let mut output = LexOutput::default();

        while let Some(result) = self.inner.next() {
            let span = self.inner.span();
            let lexeme = self.inner.slice().to_string();
            let loc = self.location(span.start);
            match result {
                Ok(token) => output.tokens.push(TokenWithLocation {
                    token,
                    lexeme,
                    loc,
                    offset: span.start,
                }),
                Err(()) => {
                    tracing::trace!(%lexeme, %loc, "unrecognized lexeme");
                    output.errors.push(Diagnostic::new(
                        DiagnosticKind::UnknownLexeme,
                        loc,
                        format!("Unrecognized lexeme '{}'", lexeme),
                    ));
                }
            }
        }

        let end = self.inner.source().len();
        output.tokens.push(TokenWithLocation {
            token: Token::Eof,
            lexeme: EOF_TERMINAL.to_string(),
            loc: self.location(end),
            offset: end,
        });

        tracing::debug!(
            tokens = output.tokens.len(),
            errors = output.errors.len(),
            "tokenized"
        );
        output
    }
}

pub fn lex(source: &str) -> LexOutput {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<&'static str> {
        lex(source).tokens.iter().map(|t| t.token.terminal()).collect()
    }

    #[test]
    fn test_class_header() {
        assert_eq!(
            kinds("class A inherits B { };"),
            vec!["class", "id", "inherits", "id", "{", "}", ";", "$"]
        );
    }

    #[test]
    fn test_longest_operator_match() {
        assert_eq!(kinds("x <- y <= z < w => v"), vec!["id", "<-", "id", "<=", "id", "<", "id", "=>", "id", "$"]);
    }

    #[test]
    fn test_comments_and_locations() {
        let out = lex("-- header\n(* block\n comment *)  foo");
        assert!(out.is_clean());
        assert_eq!(out.tokens.len(), 2);
        assert_eq!(out.tokens[0].loc, SourceLocation { line: 3, column: 14 });
        assert_eq!(out.tokens[0].lexeme, "foo");
    }

    #[test]
    fn test_literals() {
        let out = lex(r#"42 "a\"b" true"#);
        assert_eq!(out.tokens[0].token, Token::IntegerLiteral(42));
        assert_eq!(out.tokens[1].token, Token::StringLiteral("a\"b".to_string()));
        assert_eq!(out.tokens[2].token, Token::True);
    }

    #[test]
    fn test_unknown_lexemes_are_collected() {
        let out = lex("a # b $ c");
        assert_eq!(out.errors.len(), 2);
        assert!(out.errors.iter().all(|e| e.kind == DiagnosticKind::UnknownLexeme));
        // 出错后继续扫描
        assert_eq!(out.tokens.len(), 4);
    }
}
