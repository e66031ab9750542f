//! 类型检查
//!
//! 每个子表达式得到一个静态类型；检查失败时报告诊断，并以 `Error`
//! 继续，使同一个根因不会在外层再次报告。

use crate::ast::*;
use crate::error::{DiagnosticKind, SourceLocation};
use crate::types::{MethodInfo, TypeId};
use super::analyzer::SemanticAnalyzer;
use super::scope::{ScopeId, SELF_NAME};

impl SemanticAnalyzer {
    pub(super) fn check_types(&mut self, program: &Program) {
        let before = self.diagnostics.len();
        for (class, id) in self.canonical_classes(program) {
            self.current_class = id;
            self.check_class(class, id);
        }
        tracing::debug!(
            diagnostics = self.diagnostics.len() - before,
            "type checking finished"
        );
    }

    fn check_class(&mut self, class: &ClassDecl, id: TypeId) {
        let Some(class_scope) = self.scopes.scope_of(class.id) else {
            return;
        };
        for feature in &class.features {
            match feature {
                Feature::Attribute(attr) => {
                    let Some(init) = &attr.initializer else {
                        continue;
                    };
                    let init_type = self.check_expr(init, class_scope);
                    // 被拒绝的属性（重名、名为 self）不再检查初始化式的类型
                    let declared = self
                        .context
                        .class(id)
                        .fields
                        .get(&attr.name)
                        .filter(|field| field.loc == attr.loc)
                        .map(|field| self.context.resolve_self(field.field_type, id));
                    if let Some(declared) = declared {
                        self.expect_conforms(
                            init_type,
                            declared,
                            attr.loc,
                            &format!("attribute '{}'", attr.name),
                        );
                    }
                }
                Feature::Method(method) => self.check_method(method, id),
            }
        }
    }

    fn check_method(&mut self, method: &MethodDecl, id: TypeId) {
        let Some(scope) = self.scopes.scope_of(method.id) else {
            return;
        };
        let body_type = self.check_expr(&method.body, scope);

        let Some(info) = self.context.method_for_decl(id, method.id).cloned() else {
            return;
        };
        let declared = self.context.resolve_self(info.return_type, id);
        if !self.context.conforms_to(body_type, declared) {
            self.report(
                DiagnosticKind::IncompatibleTypes,
                method.loc,
                format!(
                    "Method '{}' returns '{}' but is declared to return '{}'",
                    method.name,
                    self.type_name(body_type),
                    self.type_name(declared)
                ),
            );
        }

        self.check_override(method, &info, id);
    }

    /// 覆盖父类方法时签名必须一致，只有声明为 SELF_TYPE 的返回类型可以不同。
    /// 只和直接父类（及其继承到的定义）比较
    fn check_override(&mut self, method: &MethodDecl, info: &MethodInfo, id: TypeId) {
        let Some(parent) = self.context.parent(id) else {
            return;
        };
        let Ok(inherited) = self.context.get_method(parent, &method.name) else {
            return;
        };
        let same = |a: TypeId, b: TypeId| a == b || a == TypeId::ERROR || b == TypeId::ERROR;

        let params_match = inherited.params.len() == info.params.len()
            && inherited
                .params
                .iter()
                .zip(&info.params)
                .all(|(p, q)| same(p.param_type, q.param_type));
        let return_matches = method.return_type == "SELF_TYPE"
            || same(inherited.return_type, info.return_type);

        if !(params_match && return_matches) {
            let owner = self.type_name(inherited.owner).to_string();
            self.report(
                DiagnosticKind::WrongSignature,
                method.loc,
                format!(
                    "Method '{}' does not match the signature it overrides in '{}'",
                    method.name, owner
                ),
            );
        }
    }

    fn expect_conforms(&mut self, actual: TypeId, expected: TypeId, loc: SourceLocation, target: &str) {
        if !self.context.conforms_to(actual, expected) {
            self.report(
                DiagnosticKind::IncompatibleTypes,
                loc,
                format!(
                    "Cannot assign '{}' to {} of type '{}'",
                    self.type_name(actual),
                    target,
                    self.type_name(expected)
                ),
            );
        }
    }

    fn expect_condition(&mut self, condition: TypeId, loc: SourceLocation) {
        if !self.context.conforms_to(condition, TypeId::BOOL) {
            self.report(
                DiagnosticKind::IncompatibleTypes,
                loc,
                format!("Condition must be 'Bool', found '{}'", self.type_name(condition)),
            );
        }
    }

    fn join(&self, types: &[TypeId]) -> TypeId {
        self.context.least_upper_bound(types).unwrap_or(TypeId::OBJECT)
    }

    fn check_expr(&mut self, expr: &Expr, scope: ScopeId) -> TypeId {
        match expr {
            Expr::Literal(literal) => match literal.value {
                LiteralValue::Int(_) => TypeId::INT,
                LiteralValue::String(_) => TypeId::STRING,
                LiteralValue::Bool(_) => TypeId::BOOL,
            },
            Expr::Identifier(ident) => self
                .variable_type(scope, &ident.name)
                .unwrap_or(TypeId::ERROR),
            Expr::Assignment(assign) => {
                let value_type = self.check_expr(&assign.value, scope);
                if assign.name != SELF_NAME {
                    if let Some(target) = self.variable_type(scope, &assign.name) {
                        self.expect_conforms(
                            value_type,
                            target,
                            assign.loc,
                            &format!("variable '{}'", assign.name),
                        );
                    }
                }
                value_type
            }
            Expr::Dispatch(dispatch) => self.check_dispatch(dispatch, scope),
            Expr::Block(block) => {
                let mut last = TypeId::OBJECT;
                for e in &block.exprs {
                    last = self.check_expr(e, scope);
                }
                last
            }
            Expr::If(if_expr) => {
                let condition = self.check_expr(&if_expr.condition, scope);
                self.expect_condition(condition, if_expr.condition.loc());
                let then_type = self.check_expr(&if_expr.then_branch, scope);
                let else_type = self.check_expr(&if_expr.else_branch, scope);
                self.join(&[then_type, else_type])
            }
            Expr::While(while_expr) => {
                let condition = self.check_expr(&while_expr.condition, scope);
                self.expect_condition(condition, while_expr.condition.loc());
                self.check_expr(&while_expr.body, scope);
                TypeId::OBJECT
            }
            Expr::Let(let_expr) => {
                let mut current = scope;
                for binding in &let_expr.bindings {
                    let init_type = binding
                        .initializer
                        .as_ref()
                        .map(|init| self.check_expr(init, current));
                    let Some(child) = self.scopes.scope_of(binding.id) else {
                        continue;
                    };
                    current = child;
                    let declared = self
                        .scopes
                        .find(child, &binding.name)
                        .ok()
                        .filter(|(owner, _)| *owner == child)
                        .map(|(_, info)| info.var_type);
                    if let (Some(init_type), Some(declared)) = (init_type, declared) {
                        self.expect_conforms(
                            init_type,
                            declared,
                            binding.loc,
                            &format!("variable '{}'", binding.name),
                        );
                    }
                }
                self.check_expr(&let_expr.body, current)
            }
            Expr::Case(case) => self.check_case(case, scope),
            Expr::New(new) => match self.context.get(&new.type_name) {
                Ok(id) => self.context.resolve_self(id, self.current_class),
                Err(err) => {
                    self.report_error(err, new.loc);
                    TypeId::ERROR
                }
            },
            Expr::Binary(binary) => {
                let left = self.check_expr(&binary.left, scope);
                let right = self.check_expr(&binary.right, scope);
                self.check_binary(binary, left, right)
            }
            Expr::Unary(unary) => {
                let operand = self.check_expr(&unary.operand, scope);
                let (required, result, symbol) = match unary.op {
                    UnaryOp::Neg => (Some(TypeId::INT), TypeId::INT, "~"),
                    UnaryOp::Not => (Some(TypeId::BOOL), TypeId::BOOL, "not"),
                    UnaryOp::IsVoid => (None, TypeId::BOOL, "isvoid"),
                };
                if let Some(required) = required {
                    if !self.context.conforms_to(operand, required) {
                        self.report(
                            DiagnosticKind::InvalidOperation,
                            unary.loc,
                            format!(
                                "Operator '{}' requires '{}', found '{}'",
                                symbol,
                                self.type_name(required),
                                self.type_name(operand)
                            ),
                        );
                    }
                }
                result
            }
        }
    }

    fn check_binary(&mut self, binary: &BinaryExpr, left: TypeId, right: TypeId) -> TypeId {
        if binary.op == BinaryOp::Eq {
            let absorbing = |t: TypeId| t == TypeId::ERROR || t == TypeId::AUTO;
            let basic = left.is_basic() || right.is_basic();
            if basic && left != right && !absorbing(left) && !absorbing(right) {
                self.report(
                    DiagnosticKind::InvalidOperation,
                    binary.loc,
                    format!(
                        "Cannot compare '{}' with '{}'",
                        self.type_name(left),
                        self.type_name(right)
                    ),
                );
            }
            return TypeId::BOOL;
        }

        let operands_ok = self.context.conforms_to(left, TypeId::INT)
            && self.context.conforms_to(right, TypeId::INT);
        if !operands_ok {
            self.report(
                DiagnosticKind::InvalidOperation,
                binary.loc,
                format!(
                    "Operator '{}' requires 'Int' operands, found '{}' and '{}'",
                    binary.op.symbol(),
                    self.type_name(left),
                    self.type_name(right)
                ),
            );
        }
        if binary.op.is_arithmetic() { TypeId::INT } else { TypeId::BOOL }
    }

    fn check_dispatch(&mut self, dispatch: &DispatchExpr, scope: ScopeId) -> TypeId {
        // 查找方法用的类型和调用点接收者的静态类型；只有静态分派时两者不同
        let (lookup, call_site) = match &dispatch.target {
            DispatchTarget::SelfObject => (self.current_class, self.current_class),
            DispatchTarget::Dynamic(receiver) => {
                let actual = self.check_expr(receiver, scope);
                (actual, actual)
            }
            DispatchTarget::Ancestor { receiver, type_name } => {
                let actual = self.check_expr(receiver, scope);
                let ancestor = self.resolve_type(type_name, dispatch.loc);
                if !self.context.conforms_to(actual, ancestor) {
                    self.report(
                        DiagnosticKind::IncompatibleTypes,
                        dispatch.loc,
                        format!(
                            "'{}' does not conform to '{}' in static dispatch",
                            self.type_name(actual),
                            self.type_name(ancestor)
                        ),
                    );
                }
                (ancestor, actual)
            }
        };
        let arg_types: Vec<TypeId> = dispatch
            .args
            .iter()
            .map(|arg| self.check_expr(arg, scope))
            .collect();

        if lookup == TypeId::ERROR || lookup == TypeId::AUTO {
            return TypeId::ERROR;
        }
        let lookup = self.context.resolve_self(lookup, self.current_class);
        let call_site = self.context.resolve_self(call_site, self.current_class);
        let method = match self.context.get_method(lookup, &dispatch.method) {
            Ok(method) => method.clone(),
            Err(err) => {
                self.report_error(err, dispatch.loc);
                return TypeId::ERROR;
            }
        };

        if method.params.len() != arg_types.len() {
            self.report(
                DiagnosticKind::ArgumentCount,
                dispatch.loc,
                format!(
                    "Method '{}' expects {} argument(s), found {}",
                    method.name,
                    method.params.len(),
                    arg_types.len()
                ),
            );
        } else {
            for (index, (param, &arg_type)) in method.params.iter().zip(&arg_types).enumerate() {
                let expected = self.context.resolve_self(param.param_type, lookup);
                if !self.context.conforms_to(arg_type, expected) {
                    self.report(
                        DiagnosticKind::IncompatibleTypes,
                        dispatch.args[index].loc(),
                        format!(
                            "Argument {} of '{}' has type '{}', expected '{}'",
                            index + 1,
                            method.name,
                            self.type_name(arg_type),
                            self.type_name(expected)
                        ),
                    );
                }
            }
        }

        // SELF_TYPE 返回值取接收者的静态类型
        self.context.resolve_self(method.return_type, call_site)
    }

    /// 被分析表达式必须符合每个分支声明的类型；第一个不符合的分支报告一次并得到 Error
    fn check_case(&mut self, case: &CaseExpr, scope: ScopeId) -> TypeId {
        let scrutinee = self.check_expr(&case.scrutinee, scope);
        let mut branch_types = Vec::with_capacity(case.branches.len());
        let mut bound_types = Vec::with_capacity(case.branches.len());
        for branch in &case.branches {
            let branch_scope = self.scopes.scope_of(branch.id).unwrap_or(scope);
            let bound = self
                .scopes
                .find(branch_scope, &branch.name)
                .ok()
                .filter(|(owner, _)| *owner == branch_scope)
                .map(|(_, info)| info.var_type)
                .unwrap_or(TypeId::ERROR);
            bound_types.push((bound, branch.loc));
            branch_types.push(self.check_expr(&branch.body, branch_scope));
        }

        for (bound, loc) in bound_types {
            if !self.context.conforms_to(scrutinee, bound) {
                self.report(
                    DiagnosticKind::IncompatibleTypes,
                    loc,
                    format!(
                        "Case expression of type '{}' does not conform to branch type '{}'",
                        self.type_name(scrutinee),
                        self.type_name(bound)
                    ),
                );
                return TypeId::ERROR;
            }
        }
        self.join(&branch_types)
    }
}
