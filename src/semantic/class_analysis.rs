//! 类型构建：继承关系、属性和方法签名

use crate::ast::{ClassDecl, Feature, Program};
use crate::error::{DiagnosticKind, SemanticError};
use crate::types::{MethodInfo, ParameterInfo, TypeId};
use super::analyzer::SemanticAnalyzer;
use super::scope::SELF_NAME;

impl SemanticAnalyzer {
    pub(super) fn build_types(&mut self, program: &Program) {
        let mut classes = self.canonical_classes(program);

        self.check_inheritance(&classes);

        // 父类先于子类登记成员，才能发现重定义继承来的属性
        classes.sort_by_key(|&(_, id)| self.context.depth(id));
        for (class, id) in classes {
            self.register_features(class, id);
        }
        tracing::debug!(diagnostics = self.diagnostics.len(), "built type hierarchy");
    }

    /// 检查继承关系
    /// 1. 父类必须存在，缺省为 Object
    /// 2. 不能继承 Int、String、Bool 或哨兵类型
    /// 3. 设置父类时检测循环继承
    fn check_inheritance(&mut self, classes: &[(&ClassDecl, TypeId)]) {
        for &(class, id) in classes {
            let parent = match &class.parent {
                None => TypeId::OBJECT,
                Some(name) => match self.context.get(name) {
                    Ok(parent) if parent.is_basic() || parent.is_sentinel() => {
                        self.report(
                            DiagnosticKind::InvalidInheritance,
                            class.loc,
                            format!("Class '{}' cannot inherit from '{}'", class.name, name),
                        );
                        TypeId::OBJECT
                    }
                    Ok(parent) => parent,
                    Err(err) => {
                        self.report_error(err, class.loc);
                        TypeId::OBJECT
                    }
                },
            };

            if let Err(err) = self.context.set_parent(id, parent) {
                self.report_error(err, class.loc);
            }
        }
    }

    fn register_features(&mut self, class: &ClassDecl, id: TypeId) {
        for feature in &class.features {
            match feature {
                Feature::Attribute(attr) => {
                    if attr.name == SELF_NAME {
                        self.report_error(SemanticError::ReservedSelf("an attribute name"), attr.loc);
                        continue;
                    }
                    let field_type = self.resolve_type(&attr.type_name, attr.loc);
                    if let Err(err) = self.context.define_field(id, &attr.name, field_type, attr.loc) {
                        self.report_error(err, attr.loc);
                    }
                }
                Feature::Method(method) => {
                    let params = method
                        .params
                        .iter()
                        .map(|param| ParameterInfo {
                            name: param.name.clone(),
                            param_type: self.resolve_type(&param.type_name, param.loc),
                        })
                        .collect();
                    let return_type = self.resolve_type(&method.return_type, method.loc);
                    let info = MethodInfo {
                        name: method.name.clone(),
                        owner: id,
                        params,
                        return_type,
                        decl: Some(method.id),
                    };
                    if let Err(err) = self.context.define_method(id, info) {
                        self.report_error(err, method.loc);
                    }
                }
            }
        }
    }
}
