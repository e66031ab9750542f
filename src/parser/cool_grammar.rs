//! COOL 的具体文法
//!
//! 运算符优先级通过分层非终结符表达（comp < arith < term < unary < dispatch < atom），
//! 左递归保证左结合。列表用右递归构造。

use crate::ast::*;
use crate::error::{CoolResult, SourceLocation, evaluation_error};
use crate::lexer::{Token, TokenWithLocation};
use super::grammar::{Grammar, SemanticAction};

/// 归约栈上的值
#[derive(Debug, Clone)]
pub enum Value {
    Token(TokenWithLocation),
    Program(Program),
    Classes(Vec<ClassDecl>),
    Class(ClassDecl),
    Features(Vec<Feature>),
    Feature(Feature),
    Params(Vec<Param>),
    Param(Param),
    Expr(Expr),
    Exprs(Vec<Expr>),
    Bindings(Vec<LetBinding>),
    Binding(LetBinding),
    Branches(Vec<CaseBranch>),
    Branch(CaseBranch),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Token(_) => "Token",
            Value::Program(_) => "Program",
            Value::Classes(_) => "Classes",
            Value::Class(_) => "Class",
            Value::Features(_) => "Features",
            Value::Feature(_) => "Feature",
            Value::Params(_) => "Params",
            Value::Param(_) => "Param",
            Value::Expr(_) => "Expr",
            Value::Exprs(_) => "Exprs",
            Value::Bindings(_) => "Bindings",
            Value::Binding(_) => "Binding",
            Value::Branches(_) => "Branches",
            Value::Branch(_) => "Branch",
        }
    }
}

/// 按顺序取出右部的值
struct Rhs(std::vec::IntoIter<Value>);

macro_rules! take {
    ($name:ident, $variant:ident, $ty:ty) => {
        fn $name(&mut self) -> CoolResult<$ty> {
            match self.next()? {
                Value::$variant(value) => Ok(value),
                other => Err(mismatch(stringify!($variant), &other)),
            }
        }
    };
}

impl Rhs {
    fn new(values: Vec<Value>) -> Self {
        Self(values.into_iter())
    }

    fn next(&mut self) -> CoolResult<Value> {
        self.0
            .next()
            .ok_or_else(|| evaluation_error("semantic action ran out of values"))
    }

    /// 跳过一个标点或关键字
    fn skip(&mut self) -> CoolResult<()> {
        self.token().map(|_| ())
    }

    fn ident(&mut self) -> CoolResult<TokenWithLocation> {
        let token = self.token()?;
        match token.token {
            Token::Identifier(_) => Ok(token),
            _ => Err(evaluation_error(format!(
                "expected identifier, found '{}'",
                token.lexeme
            ))),
        }
    }

    fn boxed(&mut self) -> CoolResult<Box<Expr>> {
        self.expr().map(Box::new)
    }

    take!(token, Token, TokenWithLocation);
    take!(classes, Classes, Vec<ClassDecl>);
    take!(class, Class, ClassDecl);
    take!(features, Features, Vec<Feature>);
    take!(feature, Feature, Feature);
    take!(params, Params, Vec<Param>);
    take!(param, Param, Param);
    take!(expr, Expr, Expr);
    take!(exprs, Exprs, Vec<Expr>);
    take!(bindings, Bindings, Vec<LetBinding>);
    take!(binding, Binding, LetBinding);
    take!(branches, Branches, Vec<CaseBranch>);
    take!(branch, Branch, CaseBranch);
}

fn mismatch(expected: &str, found: &Value) -> crate::error::CoolError {
    evaluation_error(format!(
        "semantic action expected {}, found {}",
        expected,
        found.kind()
    ))
}

fn act(action: SemanticAction<Value>) -> Option<SemanticAction<Value>> {
    Some(action)
}

/// 构造并增广 COOL 文法
pub fn cool_grammar() -> CoolResult<Grammar<Value>> {
    let mut g = Grammar::new();

    let [
        class, inherits, def, let_, in_, if_, then, else_, fi, while_,
        loop_, pool, case, of, esac, new, isvoid, not, true_, false_,
    ] = g.terminals(
        "class inherits def let in if then else fi while \
         loop pool case of esac new isvoid not true false",
    );
    let [id, int, string] = g.terminals("id int string");
    let [plus, minus, star, slash, tilde, lt, le, eq, assign, arrow] =
        g.terminals("+ - * / ~ < <= = <- =>");
    let [lparen, rparen, lbrace, rbrace, semi, colon, comma, dot, at] =
        g.terminals("( ) { } ; : , . @");

    let [program, class_list, def_class, class_body, feature_list, feature] =
        g.non_terminals("program class_list def_class class_body feature_list feature");
    let [formals, formal_list, formal] = g.non_terminals("formals formal_list formal");
    let [expr, comp, arith, term, unary, dispatch, atom, block] =
        g.non_terminals("expr comp arith term unary dispatch atom block");
    let [let_list, binding, branches, branch, args, arg_list] =
        g.non_terminals("let_list binding branches branch args arg_list");

    // 程序与类
    g.production(program, &[class_list], act(|v| {
        Ok(Value::Program(Program { classes: Rhs::new(v).classes()? }))
    }));
    g.production(class_list, &[def_class], act(|v| {
        Ok(Value::Classes(vec![Rhs::new(v).class()?]))
    }));
    g.production(class_list, &[def_class, class_list], act(|v| {
        let mut rhs = Rhs::new(v);
        let head = rhs.class()?;
        let mut rest = rhs.classes()?;
        rest.insert(0, head);
        Ok(Value::Classes(rest))
    }));
    g.production(def_class, &[class, id, class_body], act(class_decl));
    g.production(def_class, &[class, id, inherits, id, class_body], act(derived_class_decl));
    g.production(def_class, &[class, id, colon, id, class_body], act(derived_class_decl));
    g.production(class_body, &[lbrace, feature_list, rbrace], act(class_body_features));
    g.production(class_body, &[lbrace, feature_list, rbrace, semi], act(class_body_features));

    // 特征
    g.production(feature_list, &[], act(|_| Ok(Value::Features(Vec::new()))));
    g.production(feature_list, &[feature, semi, feature_list], act(|v| {
        let mut rhs = Rhs::new(v);
        let head = rhs.feature()?;
        rhs.skip()?;
        let mut rest = rhs.features()?;
        rest.insert(0, head);
        Ok(Value::Features(rest))
    }));
    g.production(feature, &[id, colon, id], act(|v| attribute(v, false)));
    g.production(feature, &[id, colon, id, assign, expr], act(|v| attribute(v, true)));
    g.production(
        feature,
        &[id, lparen, formals, rparen, colon, id, lbrace, expr, rbrace],
        act(|v| method(v, false)),
    );
    g.production(
        feature,
        &[def, id, lparen, formals, rparen, colon, id, lbrace, expr, rbrace],
        act(|v| method(v, true)),
    );

    // 形参
    g.production(formals, &[], act(|_| Ok(Value::Params(Vec::new()))));
    g.production(formals, &[formal_list], None);
    g.production(formal_list, &[formal], act(|v| {
        Ok(Value::Params(vec![Rhs::new(v).param()?]))
    }));
    g.production(formal_list, &[formal, comma, formal_list], act(|v| {
        let mut rhs = Rhs::new(v);
        let head = rhs.param()?;
        rhs.skip()?;
        let mut rest = rhs.params()?;
        rest.insert(0, head);
        Ok(Value::Params(rest))
    }));
    g.production(formal, &[id, colon, id], act(|v| {
        let mut rhs = Rhs::new(v);
        let name = rhs.ident()?;
        rhs.skip()?;
        let type_name = rhs.ident()?;
        Ok(Value::Param(Param {
            name: name.lexeme,
            type_name: type_name.lexeme,
            loc: name.loc,
        }))
    }));

    // 表达式
    g.production(expr, &[id, assign, expr], act(|v| {
        let mut rhs = Rhs::new(v);
        let name = rhs.ident()?;
        rhs.skip()?;
        let value = rhs.boxed()?;
        Ok(Value::Expr(Expr::Assignment(AssignmentExpr {
            name: name.lexeme,
            value,
            loc: name.loc,
        })))
    }));
    g.production(expr, &[not, expr], act(|v| unary_expr(v, UnaryOp::Not)));
    g.production(expr, &[let_, let_list, in_, expr], act(|v| {
        let mut rhs = Rhs::new(v);
        let keyword = rhs.token()?;
        let bindings = rhs.bindings()?;
        rhs.skip()?;
        let body = rhs.boxed()?;
        Ok(Value::Expr(Expr::Let(LetExpr {
            bindings,
            body,
            loc: keyword.loc,
        })))
    }));
    g.production(expr, &[comp], None);

    g.production(comp, &[arith, lt, arith], act(|v| binary_expr(v, BinaryOp::Lt)));
    g.production(comp, &[arith, le, arith], act(|v| binary_expr(v, BinaryOp::Le)));
    g.production(comp, &[arith, eq, arith], act(|v| binary_expr(v, BinaryOp::Eq)));
    g.production(comp, &[arith], None);

    g.production(arith, &[arith, plus, term], act(|v| binary_expr(v, BinaryOp::Add)));
    g.production(arith, &[arith, minus, term], act(|v| binary_expr(v, BinaryOp::Sub)));
    g.production(arith, &[term], None);

    g.production(term, &[term, star, unary], act(|v| binary_expr(v, BinaryOp::Mul)));
    g.production(term, &[term, slash, unary], act(|v| binary_expr(v, BinaryOp::Div)));
    g.production(term, &[unary], None);

    g.production(unary, &[isvoid, unary], act(|v| unary_expr(v, UnaryOp::IsVoid)));
    g.production(unary, &[tilde, unary], act(|v| unary_expr(v, UnaryOp::Neg)));
    g.production(unary, &[dispatch], None);

    g.production(dispatch, &[dispatch, dot, id, lparen, args, rparen], act(|v| {
        let mut rhs = Rhs::new(v);
        let receiver = rhs.boxed()?;
        rhs.skip()?;
        let name = rhs.ident()?;
        rhs.skip()?;
        let args = rhs.exprs()?;
        Ok(Value::Expr(Expr::Dispatch(DispatchExpr {
            target: DispatchTarget::Dynamic(receiver),
            method: name.lexeme,
            args,
            loc: name.loc,
        })))
    }));
    g.production(
        dispatch,
        &[dispatch, at, id, dot, id, lparen, args, rparen],
        act(|v| {
            let mut rhs = Rhs::new(v);
            let receiver = rhs.boxed()?;
            rhs.skip()?;
            let type_name = rhs.ident()?;
            rhs.skip()?;
            let name = rhs.ident()?;
            rhs.skip()?;
            let args = rhs.exprs()?;
            Ok(Value::Expr(Expr::Dispatch(DispatchExpr {
                target: DispatchTarget::Ancestor {
                    receiver,
                    type_name: type_name.lexeme,
                },
                method: name.lexeme,
                args,
                loc: name.loc,
            })))
        }),
    );
    g.production(dispatch, &[atom], None);

    // 原子
    g.production(atom, &[int], act(|v| {
        let token = Rhs::new(v).token()?;
        match token.token {
            Token::IntegerLiteral(n) => Ok(literal(LiteralValue::Int(n), token.loc)),
            _ => Err(evaluation_error(format!("'{}' is not an integer", token.lexeme))),
        }
    }));
    g.production(atom, &[string], act(|v| {
        let token = Rhs::new(v).token()?;
        match token.token {
            Token::StringLiteral(s) => Ok(literal(LiteralValue::String(s), token.loc)),
            _ => Err(evaluation_error(format!("'{}' is not a string", token.lexeme))),
        }
    }));
    g.production(atom, &[true_], act(|v| {
        let token = Rhs::new(v).token()?;
        Ok(literal(LiteralValue::Bool(true), token.loc))
    }));
    g.production(atom, &[false_], act(|v| {
        let token = Rhs::new(v).token()?;
        Ok(literal(LiteralValue::Bool(false), token.loc))
    }));
    g.production(atom, &[id], act(|v| {
        let name = Rhs::new(v).ident()?;
        Ok(Value::Expr(Expr::Identifier(Identifier {
            name: name.lexeme,
            loc: name.loc,
        })))
    }));
    g.production(atom, &[id, lparen, args, rparen], act(|v| {
        let mut rhs = Rhs::new(v);
        let name = rhs.ident()?;
        rhs.skip()?;
        let args = rhs.exprs()?;
        Ok(Value::Expr(Expr::Dispatch(DispatchExpr {
            target: DispatchTarget::SelfObject,
            method: name.lexeme,
            args,
            loc: name.loc,
        })))
    }));
    g.production(atom, &[new, id], act(|v| {
        let mut rhs = Rhs::new(v);
        let keyword = rhs.token()?;
        let type_name = rhs.ident()?;
        Ok(Value::Expr(Expr::New(NewExpr {
            type_name: type_name.lexeme,
            loc: keyword.loc,
        })))
    }));
    g.production(atom, &[lparen, expr, rparen], act(|v| {
        let mut rhs = Rhs::new(v);
        rhs.skip()?;
        Ok(Value::Expr(rhs.expr()?))
    }));
    g.production(atom, &[lbrace, block, rbrace], act(|v| {
        let mut rhs = Rhs::new(v);
        let open = rhs.token()?;
        let exprs = rhs.exprs()?;
        Ok(Value::Expr(Expr::Block(BlockExpr { exprs, loc: open.loc })))
    }));
    g.production(atom, &[if_, expr, then, expr, else_, expr, fi], act(|v| {
        let mut rhs = Rhs::new(v);
        let keyword = rhs.token()?;
        let condition = rhs.boxed()?;
        rhs.skip()?;
        let then_branch = rhs.boxed()?;
        rhs.skip()?;
        let else_branch = rhs.boxed()?;
        Ok(Value::Expr(Expr::If(IfExpr {
            condition,
            then_branch,
            else_branch,
            loc: keyword.loc,
        })))
    }));
    g.production(atom, &[while_, expr, loop_, expr, pool], act(|v| {
        let mut rhs = Rhs::new(v);
        let keyword = rhs.token()?;
        let condition = rhs.boxed()?;
        rhs.skip()?;
        let body = rhs.boxed()?;
        Ok(Value::Expr(Expr::While(WhileExpr {
            condition,
            body,
            loc: keyword.loc,
        })))
    }));
    g.production(atom, &[case, expr, of, branches, esac], act(|v| {
        let mut rhs = Rhs::new(v);
        let keyword = rhs.token()?;
        let scrutinee = rhs.boxed()?;
        rhs.skip()?;
        let branches = rhs.branches()?;
        Ok(Value::Expr(Expr::Case(CaseExpr {
            scrutinee,
            branches,
            loc: keyword.loc,
        })))
    }));

    g.production(block, &[expr, semi], act(|v| {
        Ok(Value::Exprs(vec![Rhs::new(v).expr()?]))
    }));
    g.production(block, &[expr, semi, block], act(|v| {
        let mut rhs = Rhs::new(v);
        let head = rhs.expr()?;
        rhs.skip()?;
        let mut rest = rhs.exprs()?;
        rest.insert(0, head);
        Ok(Value::Exprs(rest))
    }));

    // let 绑定
    g.production(let_list, &[binding], act(|v| {
        Ok(Value::Bindings(vec![Rhs::new(v).binding()?]))
    }));
    g.production(let_list, &[binding, comma, let_list], act(|v| {
        let mut rhs = Rhs::new(v);
        let head = rhs.binding()?;
        rhs.skip()?;
        let mut rest = rhs.bindings()?;
        rest.insert(0, head);
        Ok(Value::Bindings(rest))
    }));
    g.production(binding, &[id, colon, id], act(|v| let_binding(v, false)));
    g.production(binding, &[id, colon, id, assign, expr], act(|v| let_binding(v, true)));

    // case 分支
    g.production(branches, &[branch], act(|v| {
        Ok(Value::Branches(vec![Rhs::new(v).branch()?]))
    }));
    g.production(branches, &[branch, branches], act(|v| {
        let mut rhs = Rhs::new(v);
        let head = rhs.branch()?;
        let mut rest = rhs.branches()?;
        rest.insert(0, head);
        Ok(Value::Branches(rest))
    }));
    g.production(branch, &[id, colon, id, arrow, expr, semi], act(|v| {
        let mut rhs = Rhs::new(v);
        let name = rhs.ident()?;
        rhs.skip()?;
        let type_name = rhs.ident()?;
        rhs.skip()?;
        let body = rhs.expr()?;
        Ok(Value::Branch(CaseBranch {
            id: NodeId(name.offset),
            name: name.lexeme,
            type_name: type_name.lexeme,
            body,
            loc: name.loc,
        }))
    }));

    // 实参
    g.production(args, &[], act(|_| Ok(Value::Exprs(Vec::new()))));
    g.production(args, &[arg_list], None);
    g.production(arg_list, &[expr], act(|v| {
        Ok(Value::Exprs(vec![Rhs::new(v).expr()?]))
    }));
    g.production(arg_list, &[expr, comma, arg_list], act(|v| {
        let mut rhs = Rhs::new(v);
        let head = rhs.expr()?;
        rhs.skip()?;
        let mut rest = rhs.exprs()?;
        rest.insert(0, head);
        Ok(Value::Exprs(rest))
    }));

    g.set_start(program);
    g.augment()
}

fn class_decl(values: Vec<Value>) -> CoolResult<Value> {
    let mut rhs = Rhs::new(values);
    let keyword = rhs.token()?;
    let name = rhs.ident()?;
    let features = rhs.features()?;
    Ok(Value::Class(ClassDecl {
        id: NodeId(keyword.offset),
        name: name.lexeme,
        parent: None,
        features,
        loc: keyword.loc,
    }))
}

/// `class A inherits B {...}` 与 `class A : B {...}`
fn derived_class_decl(values: Vec<Value>) -> CoolResult<Value> {
    let mut rhs = Rhs::new(values);
    let keyword = rhs.token()?;
    let name = rhs.ident()?;
    rhs.skip()?;
    let parent = rhs.ident()?;
    let features = rhs.features()?;
    Ok(Value::Class(ClassDecl {
        id: NodeId(keyword.offset),
        name: name.lexeme,
        parent: Some(parent.lexeme),
        features,
        loc: keyword.loc,
    }))
}

fn class_body_features(values: Vec<Value>) -> CoolResult<Value> {
    let mut rhs = Rhs::new(values);
    rhs.skip()?;
    Ok(Value::Features(rhs.features()?))
}

fn attribute(values: Vec<Value>, initialized: bool) -> CoolResult<Value> {
    let mut rhs = Rhs::new(values);
    let name = rhs.ident()?;
    rhs.skip()?;
    let type_name = rhs.ident()?;
    let initializer = if initialized {
        rhs.skip()?;
        Some(rhs.expr()?)
    } else {
        None
    };
    Ok(Value::Feature(Feature::Attribute(AttrDecl {
        name: name.lexeme,
        type_name: type_name.lexeme,
        initializer,
        loc: name.loc,
    })))
}

fn method(values: Vec<Value>, keyword: bool) -> CoolResult<Value> {
    let mut rhs = Rhs::new(values);
    let first = if keyword { Some(rhs.token()?) } else { None };
    let name = rhs.ident()?;
    rhs.skip()?;
    let params = rhs.params()?;
    rhs.skip()?;
    rhs.skip()?;
    let return_type = rhs.ident()?;
    rhs.skip()?;
    let body = rhs.expr()?;
    let (offset, loc) = first
        .map(|t| (t.offset, t.loc))
        .unwrap_or((name.offset, name.loc));
    Ok(Value::Feature(Feature::Method(MethodDecl {
        id: NodeId(offset),
        name: name.lexeme,
        params,
        return_type: return_type.lexeme,
        body,
        loc,
    })))
}

fn let_binding(values: Vec<Value>, initialized: bool) -> CoolResult<Value> {
    let mut rhs = Rhs::new(values);
    let name = rhs.ident()?;
    rhs.skip()?;
    let type_name = rhs.ident()?;
    let initializer = if initialized {
        rhs.skip()?;
        Some(rhs.expr()?)
    } else {
        None
    };
    Ok(Value::Binding(LetBinding {
        id: NodeId(name.offset),
        name: name.lexeme,
        type_name: type_name.lexeme,
        initializer,
        loc: name.loc,
    }))
}

fn binary_expr(values: Vec<Value>, op: BinaryOp) -> CoolResult<Value> {
    let mut rhs = Rhs::new(values);
    let left = rhs.boxed()?;
    let operator = rhs.token()?;
    let right = rhs.boxed()?;
    Ok(Value::Expr(Expr::Binary(BinaryExpr {
        left,
        op,
        right,
        loc: operator.loc,
    })))
}

fn unary_expr(values: Vec<Value>, op: UnaryOp) -> CoolResult<Value> {
    let mut rhs = Rhs::new(values);
    let operator = rhs.token()?;
    let operand = rhs.boxed()?;
    Ok(Value::Expr(Expr::Unary(UnaryExpr {
        op,
        operand,
        loc: operator.loc,
    })))
}

fn literal(value: LiteralValue, loc: SourceLocation) -> Value {
    Value::Expr(Expr::Literal(Literal { value, loc }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_shape() {
        let g = cool_grammar().unwrap();
        assert!(g.is_augmented());
        // 64 条产生式加上增广产生式
        assert_eq!(g.productions().len(), 65);
        assert_eq!(g.symbol_name(g.start().unwrap()), "program'");
        for terminal in ["class", "id", "<-", "=>", "@", "$"] {
            let id = g.lookup(terminal).unwrap();
            assert!(g.is_terminal(id), "{terminal} should be a terminal");
        }
    }

    #[test]
    fn test_rhs_type_mismatch_is_an_error() {
        let mut rhs = Rhs::new(vec![Value::Exprs(Vec::new())]);
        let err = rhs.class().unwrap_err();
        assert!(err.to_string().contains("expected Class"));
    }
}
