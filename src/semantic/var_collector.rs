//! 变量收集：为类、方法、let 绑定和 case 分支建立作用域

use crate::ast::*;
use crate::error::{SemanticError, SourceLocation};
use crate::types::TypeId;
use super::analyzer::SemanticAnalyzer;
use super::scope::{ScopeId, SELF_NAME};

impl SemanticAnalyzer {
    pub(super) fn collect_variables(&mut self, program: &Program) {
        for (class, id) in self.canonical_classes(program) {
            self.current_class = id;
            self.collect_class(class, id);
        }
        tracing::debug!(scopes = self.scopes.len(), "collected variables");
    }

    fn collect_class(&mut self, class: &ClassDecl, id: TypeId) {
        let class_scope = self.scopes.create_child(ScopeId::ROOT, Some(class.id));
        self.define_variable(class_scope, SELF_NAME, TypeId::SELF_TYPE, class.loc);

        let fields: Vec<(String, TypeId, SourceLocation)> = self
            .context
            .class(id)
            .fields
            .values()
            .map(|f| (f.name.clone(), f.field_type, f.loc))
            .collect();
        for (name, field_type, loc) in fields {
            self.define_variable(class_scope, &name, field_type, loc);
        }

        for feature in &class.features {
            match feature {
                Feature::Attribute(attr) => {
                    if let Some(init) = &attr.initializer {
                        self.collect_expr(init, class_scope);
                    }
                }
                Feature::Method(method) => {
                    let scope = self.scopes.create_child(class_scope, Some(method.id));
                    let registered: Vec<TypeId> = self
                        .context
                        .method_for_decl(id, method.id)
                        .map(|m| m.params.iter().map(|p| p.param_type).collect())
                        .unwrap_or_default();
                    for (index, param) in method.params.iter().enumerate() {
                        // 重复声明的方法没有登记签名，这里静默解析
                        let param_type = registered.get(index).copied().unwrap_or_else(|| {
                            self.context.get(&param.type_name).unwrap_or(TypeId::ERROR)
                        });
                        self.define_variable(scope, &param.name, param_type, param.loc);
                    }
                    self.collect_expr(&method.body, scope);
                }
            }
        }
    }

    fn define_variable(&mut self, scope: ScopeId, name: &str, var_type: TypeId, loc: SourceLocation) {
        if let Err(err) = self.scopes.define(scope, name, var_type, loc) {
            self.report_error(err, loc);
        }
    }

    /// 名字既不在作用域链上也不是继承来的属性时报告，并以 `Error` 绑定
    fn resolve_name(&mut self, scope: ScopeId, name: &str, loc: SourceLocation) {
        if self.variable_type(scope, name).is_some() {
            return;
        }
        self.report_error(SemanticError::UndefinedVariable(name.to_string()), loc);
        self.scopes.bind_unresolved(scope, name, loc);
    }

    fn collect_expr(&mut self, expr: &Expr, scope: ScopeId) {
        match expr {
            Expr::Literal(_) | Expr::New(_) => {}
            Expr::Identifier(ident) => self.resolve_name(scope, &ident.name, ident.loc),
            Expr::Assignment(assign) => {
                if assign.name == SELF_NAME {
                    self.report_error(SemanticError::ReservedSelf("assigned"), assign.loc);
                } else {
                    self.resolve_name(scope, &assign.name, assign.loc);
                }
                self.collect_expr(&assign.value, scope);
            }
            Expr::Dispatch(dispatch) => {
                match &dispatch.target {
                    DispatchTarget::SelfObject => {}
                    DispatchTarget::Dynamic(receiver)
                    | DispatchTarget::Ancestor { receiver, .. } => self.collect_expr(receiver, scope),
                }
                for arg in &dispatch.args {
                    self.collect_expr(arg, scope);
                }
            }
            Expr::Block(block) => {
                for e in &block.exprs {
                    self.collect_expr(e, scope);
                }
            }
            Expr::If(if_expr) => {
                self.collect_expr(&if_expr.condition, scope);
                self.collect_expr(&if_expr.then_branch, scope);
                self.collect_expr(&if_expr.else_branch, scope);
            }
            Expr::While(while_expr) => {
                self.collect_expr(&while_expr.condition, scope);
                self.collect_expr(&while_expr.body, scope);
            }
            Expr::Let(let_expr) => {
                // 每个绑定一个作用域：初始化式只能看到前面的绑定
                let mut current = scope;
                for binding in &let_expr.bindings {
                    if let Some(init) = &binding.initializer {
                        self.collect_expr(init, current);
                    }
                    let var_type = self.resolve_type(&binding.type_name, binding.loc);
                    let child = self.scopes.create_child(current, Some(binding.id));
                    self.define_variable(child, &binding.name, var_type, binding.loc);
                    current = child;
                }
                self.collect_expr(&let_expr.body, current);
            }
            Expr::Case(case) => {
                self.collect_expr(&case.scrutinee, scope);
                for branch in &case.branches {
                    let var_type = self.resolve_type(&branch.type_name, branch.loc);
                    let child = self.scopes.create_child(scope, Some(branch.id));
                    self.define_variable(child, &branch.name, var_type, branch.loc);
                    self.collect_expr(&branch.body, child);
                }
            }
            Expr::Binary(binary) => {
                self.collect_expr(&binary.left, scope);
                self.collect_expr(&binary.right, scope);
            }
            Expr::Unary(unary) => self.collect_expr(&unary.operand, scope),
        }
    }
}
