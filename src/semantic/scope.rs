//! 作用域树
//!
//! 所有作用域存放在一个数组里，用 `ScopeId` 互相引用。引入作用域的
//! AST 节点（类、方法、let 绑定、case 分支）通过 `NodeId` 登记，
//! 后面的遍可以直接回到同一个作用域。

use std::collections::HashMap;
use indexmap::IndexMap;
use crate::ast::NodeId;
use crate::error::{SemanticError, SourceLocation};
use crate::types::{TypeContext, TypeId};

pub const SELF_NAME: &str = "self";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);
}

#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub name: String,
    pub var_type: TypeId,
    /// 只有 `self` 不可赋值
    pub mutable: bool,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
struct Scope {
    parent: Option<ScopeId>,
    variables: IndexMap<String, VariableInfo>,
    children: Vec<ScopeId>,
}

#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    by_node: HashMap<NodeId, ScopeId>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                variables: IndexMap::new(),
                children: Vec::new(),
            }],
            by_node: HashMap::new(),
        }
    }

    /// 新建空的子作用域；给出 `node` 时登记为该节点的作用域
    pub fn create_child(&mut self, parent: ScopeId, node: Option<NodeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(parent),
            variables: IndexMap::new(),
            children: Vec::new(),
        });
        self.scopes[parent.0].children.push(id);
        if let Some(node) = node {
            self.by_node.insert(node, id);
        }
        id
    }

    /// 在 `scope` 中定义变量。同一层重名失败，`self` 一旦可见就不能再定义
    pub fn define(
        &mut self,
        scope: ScopeId,
        name: &str,
        var_type: TypeId,
        loc: SourceLocation,
    ) -> Result<(), SemanticError> {
        if name == SELF_NAME && self.find(scope, SELF_NAME).is_ok() {
            return Err(SemanticError::ReservedSelf("redefined"));
        }
        let variables = &mut self.scopes[scope.0].variables;
        if variables.contains_key(name) {
            return Err(SemanticError::RedefinedVariable(name.to_string()));
        }
        variables.insert(
            name.to_string(),
            VariableInfo {
                name: name.to_string(),
                var_type,
                mutable: name != SELF_NAME,
                loc,
            },
        );
        Ok(())
    }

    /// 把无法解析的名字以 `Error` 类型绑定在当前作用域，后续查找不再失败
    pub fn bind_unresolved(&mut self, scope: ScopeId, name: &str, loc: SourceLocation) {
        self.scopes[scope.0]
            .variables
            .entry(name.to_string())
            .or_insert_with(|| VariableInfo {
                name: name.to_string(),
                var_type: TypeId::ERROR,
                mutable: true,
                loc,
            });
    }

    /// 沿父链查找变量，返回找到它的作用域
    pub fn find(&self, scope: ScopeId, name: &str) -> Result<(ScopeId, &VariableInfo), SemanticError> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let current = &self.scopes[id.0];
            if let Some(info) = current.variables.get(name) {
                return Ok((id, info));
            }
            cursor = current.parent;
        }
        Err(SemanticError::UndefinedVariable(name.to_string()))
    }

    pub fn find_mut(&mut self, scope: ScopeId, name: &str) -> Result<&mut VariableInfo, SemanticError> {
        let (owner, _) = self.find(scope, name)?;
        self.scopes[owner.0]
            .variables
            .get_mut(name)
            .ok_or_else(|| SemanticError::UndefinedVariable(name.to_string()))
    }

    pub fn scope_of(&self, node: NodeId) -> Option<ScopeId> {
        self.by_node.get(&node).copied()
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    pub fn children(&self, scope: ScopeId) -> &[ScopeId] {
        &self.scopes[scope.0].children
    }

    pub fn variables(&self, scope: ScopeId) -> impl Iterator<Item = &VariableInfo> {
        self.scopes[scope.0].variables.values()
    }

    pub fn variables_mut(&mut self, scope: ScopeId) -> impl Iterator<Item = &mut VariableInfo> {
        self.scopes[scope.0].variables.values_mut()
    }

    /// 先序遍历 `scope` 及其所有后代
    pub fn descendants(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut order = Vec::new();
        let mut stack = vec![scope];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// 缩进形式的作用域树，类型名取自上下文
    pub fn render(&self, context: &TypeContext) -> String {
        let mut out = String::new();
        self.render_scope(ScopeId::ROOT, 0, context, &mut out);
        out
    }

    fn render_scope(&self, scope: ScopeId, depth: usize, context: &TypeContext, out: &mut String) {
        let indent = "    ".repeat(depth);
        let variables: Vec<String> = self
            .variables(scope)
            .map(|v| format!("{}: {}", v.name, context.name(v.var_type)))
            .collect();
        out.push_str(&format!("{}scope {} {{{}}}\n", indent, scope.0, variables.join(", ")));
        for &child in self.children(scope) {
            self.render_scope(child, depth + 1, context, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::default()
    }

    #[test]
    fn test_shadowing_across_levels() {
        let mut tree = ScopeTree::new();
        let class = tree.create_child(ScopeId::ROOT, Some(NodeId(0)));
        tree.define(class, "x", TypeId::INT, loc()).unwrap();
        let inner = tree.create_child(class, Some(NodeId(10)));
        tree.define(inner, "x", TypeId::STRING, loc()).unwrap();

        let (owner, info) = tree.find(inner, "x").unwrap();
        assert_eq!(owner, inner);
        assert_eq!(info.var_type, TypeId::STRING);
        assert_eq!(tree.find(class, "x").unwrap().1.var_type, TypeId::INT);
        assert_eq!(tree.scope_of(NodeId(10)), Some(inner));
    }

    #[test]
    fn test_redefinition_in_same_scope() {
        let mut tree = ScopeTree::new();
        let scope = tree.create_child(ScopeId::ROOT, None);
        tree.define(scope, "x", TypeId::INT, loc()).unwrap();
        assert_eq!(
            tree.define(scope, "x", TypeId::BOOL, loc()),
            Err(SemanticError::RedefinedVariable("x".to_string()))
        );
    }

    #[test]
    fn test_self_is_never_redefined() {
        let mut tree = ScopeTree::new();
        let class = tree.create_child(ScopeId::ROOT, None);
        tree.define(class, SELF_NAME, TypeId::SELF_TYPE, loc()).unwrap();
        assert!(!tree.find(class, SELF_NAME).unwrap().1.mutable);
        let method = tree.create_child(class, None);
        assert!(matches!(
            tree.define(method, SELF_NAME, TypeId::INT, loc()),
            Err(SemanticError::ReservedSelf(_))
        ));
    }

    #[test]
    fn test_undefined_variable_and_error_binding() {
        let mut tree = ScopeTree::new();
        let scope = tree.create_child(ScopeId::ROOT, None);
        assert!(matches!(
            tree.find(scope, "y"),
            Err(SemanticError::UndefinedVariable(_))
        ));
        tree.bind_unresolved(scope, "y", loc());
        assert_eq!(tree.find(scope, "y").unwrap().1.var_type, TypeId::ERROR);
        tree.find_mut(scope, "y").unwrap().var_type = TypeId::INT;
        assert_eq!(tree.find(scope, "y").unwrap().1.var_type, TypeId::INT);
    }

    #[test]
    fn test_descendants_preorder() {
        let mut tree = ScopeTree::new();
        let a = tree.create_child(ScopeId::ROOT, None);
        let b = tree.create_child(a, None);
        let c = tree.create_child(ScopeId::ROOT, None);
        assert_eq!(tree.descendants(ScopeId::ROOT), vec![ScopeId::ROOT, a, b, c]);
        assert_eq!(tree.descendants(a), vec![a, b]);
    }
}
