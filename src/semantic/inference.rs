//! Auto 类型推断
//!
//! 反复遍历整个程序，直到没有任何 `Auto` 槽位被改写。每次改写都把一个
//! `Auto` 换成具体类型，所以迭代必然终止。收敛后仍为 `Auto` 的槽位报告一次，
//! 并改为 `Error`，避免类型检查再次报告。

use crate::ast::*;
use crate::error::DiagnosticKind;
use crate::types::{TypeContext, TypeId};
use super::analyzer::SemanticAnalyzer;
use super::scope::{ScopeId, ScopeTree};

fn is_known(id: TypeId) -> bool {
    id != TypeId::AUTO
}

/// 一轮推断遍历的状态
struct Inferencer<'a> {
    context: &'a mut TypeContext,
    scopes: &'a mut ScopeTree,
    class: TypeId,
    changed: bool,
}

impl Inferencer<'_> {
    fn infer_class(&mut self, class: &ClassDecl) {
        let Some(class_scope) = self.scopes.scope_of(class.id) else {
            return;
        };
        for feature in &class.features {
            match feature {
                Feature::Attribute(attr) => {
                    if let Some(init) = &attr.initializer {
                        let init_type = self.infer_expr(init, class_scope);
                        self.refine(class_scope, &attr.name, init_type);
                    }
                }
                Feature::Method(method) => {
                    let Some(scope) = self.scopes.scope_of(method.id) else {
                        continue;
                    };
                    let body_type = self.infer_expr(&method.body, scope);
                    if let Some(info) = self.context.method_for_decl_mut(self.class, method.id) {
                        if info.return_type == TypeId::AUTO && is_known(body_type) {
                            info.return_type = body_type;
                            self.changed = true;
                        }
                    }
                }
            }
        }
    }

    /// 变量当前的类型；找不到时为 `Error`
    fn variable_type(&self, scope: ScopeId, name: &str) -> TypeId {
        if let Ok((_, info)) = self.scopes.find(scope, name) {
            return self.context.resolve_self(info.var_type, self.class);
        }
        self.context
            .get_field(self.class, name)
            .map(|field| self.context.resolve_self(field.field_type, self.class))
            .unwrap_or(TypeId::ERROR)
    }

    /// 若变量仍是 `Auto`，把它改写为 `inferred`
    fn refine(&mut self, scope: ScopeId, name: &str, inferred: TypeId) {
        if !is_known(inferred) {
            return;
        }
        if let Ok(variable) = self.scopes.find_mut(scope, name) {
            if variable.var_type == TypeId::AUTO {
                tracing::trace!(name, "inferred variable type");
                variable.var_type = inferred;
                self.changed = true;
            }
            return;
        }
        // 继承来的属性
        let owner = self
            .context
            .ancestors(self.class)
            .find(|&id| self.context.class(id).fields.contains_key(name));
        if let Some(field) = owner.and_then(|owner| self.context.field_mut(owner, name)) {
            if field.field_type == TypeId::AUTO {
                field.field_type = inferred;
                self.changed = true;
            }
        }
    }

    /// 运算符对 `Auto` 操作数的约束
    fn force(&mut self, expr: &Expr, scope: ScopeId, required: TypeId) {
        if let Expr::Identifier(ident) = expr {
            if self.variable_type(scope, &ident.name) == TypeId::AUTO {
                self.refine(scope, &ident.name, required);
            }
        }
    }

    fn join(&self, types: &[TypeId]) -> TypeId {
        if types.contains(&TypeId::AUTO) {
            return TypeId::AUTO;
        }
        self.context.least_upper_bound(types).unwrap_or(TypeId::OBJECT)
    }

    fn infer_expr(&mut self, expr: &Expr, scope: ScopeId) -> TypeId {
        match expr {
            Expr::Literal(literal) => match literal.value {
                LiteralValue::Int(_) => TypeId::INT,
                LiteralValue::String(_) => TypeId::STRING,
                LiteralValue::Bool(_) => TypeId::BOOL,
            },
            Expr::Identifier(ident) => self.variable_type(scope, &ident.name),
            Expr::Assignment(assign) => {
                let value_type = self.infer_expr(&assign.value, scope);
                self.refine(scope, &assign.name, value_type);
                value_type
            }
            Expr::Dispatch(dispatch) => self.infer_dispatch(dispatch, scope),
            Expr::Block(block) => {
                let mut last = TypeId::OBJECT;
                for e in &block.exprs {
                    last = self.infer_expr(e, scope);
                }
                last
            }
            Expr::If(if_expr) => {
                self.infer_expr(&if_expr.condition, scope);
                self.force(&if_expr.condition, scope, TypeId::BOOL);
                let then_type = self.infer_expr(&if_expr.then_branch, scope);
                let else_type = self.infer_expr(&if_expr.else_branch, scope);
                self.join(&[then_type, else_type])
            }
            Expr::While(while_expr) => {
                self.infer_expr(&while_expr.condition, scope);
                self.force(&while_expr.condition, scope, TypeId::BOOL);
                self.infer_expr(&while_expr.body, scope);
                TypeId::OBJECT
            }
            Expr::Let(let_expr) => {
                let mut current = scope;
                for binding in &let_expr.bindings {
                    let init_type = binding
                        .initializer
                        .as_ref()
                        .map(|init| self.infer_expr(init, current));
                    let Some(child) = self.scopes.scope_of(binding.id) else {
                        continue;
                    };
                    if let Some(init_type) = init_type {
                        self.refine(child, &binding.name, init_type);
                    }
                    current = child;
                }
                self.infer_expr(&let_expr.body, current)
            }
            Expr::Case(case) => {
                self.infer_expr(&case.scrutinee, scope);
                let mut branch_types = Vec::with_capacity(case.branches.len());
                for branch in &case.branches {
                    let branch_scope = self.scopes.scope_of(branch.id).unwrap_or(scope);
                    branch_types.push(self.infer_expr(&branch.body, branch_scope));
                }
                self.join(&branch_types)
            }
            Expr::New(new) => self
                .context
                .get(&new.type_name)
                .map(|id| self.context.resolve_self(id, self.class))
                .unwrap_or(TypeId::ERROR),
            Expr::Binary(binary) => {
                self.infer_expr(&binary.left, scope);
                self.infer_expr(&binary.right, scope);
                match binary.op {
                    BinaryOp::Eq => TypeId::BOOL,
                    op => {
                        self.force(&binary.left, scope, TypeId::INT);
                        self.force(&binary.right, scope, TypeId::INT);
                        if op.is_arithmetic() { TypeId::INT } else { TypeId::BOOL }
                    }
                }
            }
            Expr::Unary(unary) => {
                self.infer_expr(&unary.operand, scope);
                match unary.op {
                    UnaryOp::Neg => {
                        self.force(&unary.operand, scope, TypeId::INT);
                        TypeId::INT
                    }
                    UnaryOp::Not => {
                        self.force(&unary.operand, scope, TypeId::BOOL);
                        TypeId::BOOL
                    }
                    UnaryOp::IsVoid => TypeId::BOOL,
                }
            }
        }
    }

    fn infer_dispatch(&mut self, dispatch: &DispatchExpr, scope: ScopeId) -> TypeId {
        let (lookup, call_site) = match &dispatch.target {
            DispatchTarget::SelfObject => (self.class, self.class),
            DispatchTarget::Dynamic(receiver) => {
                let actual = self.infer_expr(receiver, scope);
                (actual, actual)
            }
            DispatchTarget::Ancestor { receiver, type_name } => {
                let actual = self.infer_expr(receiver, scope);
                (self.context.get(type_name).unwrap_or(TypeId::ERROR), actual)
            }
        };
        let arg_types: Vec<TypeId> = dispatch
            .args
            .iter()
            .map(|arg| self.infer_expr(arg, scope))
            .collect();

        if lookup == TypeId::AUTO || lookup == TypeId::ERROR {
            return lookup;
        }
        let lookup = self.context.resolve_self(lookup, self.class);
        let call_site = self.context.resolve_self(call_site, self.class);
        let Ok(method) = self.context.get_method(lookup, &dispatch.method) else {
            return TypeId::ERROR;
        };
        let (owner, decl, return_type) = (method.owner, method.decl, method.return_type);

        // 实参类型传给仍是 Auto 的形参
        if let Some(decl) = decl {
            if let Some(callee) = self.context.method_for_decl_mut(owner, decl) {
                for (param, &arg_type) in callee.params.iter_mut().zip(&arg_types) {
                    if param.param_type == TypeId::AUTO && is_known(arg_type) {
                        param.param_type = arg_type;
                        self.changed = true;
                    }
                }
            }
        }
        self.context.resolve_self(return_type, call_site)
    }
}

impl SemanticAnalyzer {
    pub(super) fn infer_types(&mut self, program: &Program) {
        let classes = self.canonical_classes(program);
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for &(class, id) in &classes {
                let mut inferencer = Inferencer {
                    context: &mut self.context,
                    scopes: &mut self.scopes,
                    class: id,
                    changed: false,
                };
                inferencer.infer_class(class);
                changed |= inferencer.changed;
            }
            changed |= self.sync_signatures(&classes);
            if !changed {
                break;
            }
        }
        tracing::debug!(rounds, "inference converged");

        self.report_uninferred(&classes);
    }

    /// 让类型上下文中的签名与作用域中的绑定保持一致，两边谁先推断出来都传给另一边
    fn sync_signatures(&mut self, classes: &[(&ClassDecl, TypeId)]) -> bool {
        let mut changed = false;
        for &(class, id) in classes {
            let Some(class_scope) = self.scopes.scope_of(class.id) else {
                continue;
            };

            let field_names: Vec<String> = self.context.class(id).fields.keys().cloned().collect();
            for name in field_names {
                if let Some(field) = self.context.field_mut(id, &name) {
                    changed |= sync_slot(&mut field.field_type, &mut self.scopes, class_scope, &name);
                }
            }

            for method in class.methods() {
                let Some(method_scope) = self.scopes.scope_of(method.id) else {
                    continue;
                };
                if let Some(info) = self.context.method_for_decl_mut(id, method.id) {
                    for param in info.params.iter_mut() {
                        changed |= sync_slot(&mut param.param_type, &mut self.scopes, method_scope, &param.name);
                    }
                }
            }
        }
        changed
    }

    /// 收敛后仍为 Auto 的绑定和返回类型：报告并改为 Error
    fn report_uninferred(&mut self, classes: &[(&ClassDecl, TypeId)]) {
        for &(class, id) in classes {
            let Some(class_scope) = self.scopes.scope_of(class.id) else {
                continue;
            };
            let mut unresolved = Vec::new();
            for scope in self.scopes.descendants(class_scope) {
                for variable in self.scopes.variables_mut(scope) {
                    if variable.var_type == TypeId::AUTO {
                        variable.var_type = TypeId::ERROR;
                        unresolved.push((variable.name.clone(), variable.loc));
                    }
                }
            }
            for (name, loc) in unresolved {
                self.report(
                    DiagnosticKind::UninferredType,
                    loc,
                    format!("Cannot infer the type of '{}'", name),
                );
            }

            for method in class.methods() {
                let Some(info) = self.context.method_for_decl_mut(id, method.id) else {
                    continue;
                };
                for param in info.params.iter_mut() {
                    if param.param_type == TypeId::AUTO {
                        param.param_type = TypeId::ERROR;
                    }
                }
                if info.return_type == TypeId::AUTO {
                    info.return_type = TypeId::ERROR;
                    self.report(
                        DiagnosticKind::UninferredType,
                        method.loc,
                        format!("Cannot infer the return type of method '{}'", method.name),
                    );
                }
            }

            let class_info_fields: Vec<String> = self.context.class(id).fields.keys().cloned().collect();
            for name in class_info_fields {
                if let Some(field) = self.context.field_mut(id, &name) {
                    if field.field_type == TypeId::AUTO {
                        field.field_type = TypeId::ERROR;
                    }
                }
            }
        }
    }
}

/// 签名槽位与作用域中只属于 `scope` 的同名绑定互相补全
fn sync_slot(slot: &mut TypeId, scopes: &mut ScopeTree, scope: ScopeId, name: &str) -> bool {
    let Ok((owner, _)) = scopes.find(scope, name) else {
        return false;
    };
    if owner != scope {
        return false;
    }
    let Ok(variable) = scopes.find_mut(scope, name) else {
        return false;
    };
    match (*slot == TypeId::AUTO, variable.var_type == TypeId::AUTO) {
        (true, false) => {
            *slot = variable.var_type;
            true
        }
        (false, true) => {
            variable.var_type = *slot;
            true
        }
        _ => false,
    }
}
