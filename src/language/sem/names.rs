use super::scope::{Namespace, ScopeStack, Symbol};
use super::{Phase, SemanticError};
use crate::language::ast::*;
use crate::language::span::Span;
use std::rc::Rc;

/// Binds every identifier in the program to its declaration. Errors never
/// abort the pass; an unresolved name gets a placeholder declaration so the
/// type checker still has something to work with.
pub fn resolve_names(program: &Program) -> Vec<SemanticError> {
    let mut resolver = NameResolver::new();
    resolver.run(program);
    resolver.errors
}

struct NameResolver {
    scopes: ScopeStack,
    errors: Vec<SemanticError>,
}

impl NameResolver {
    fn new() -> Self {
        let mut resolver = Self {
            scopes: ScopeStack::new(),
            errors: Vec::new(),
        };
        for builtin in builtins() {
            resolver
                .scopes
                .declare(builtin.name.clone(), Symbol::Func(builtin), Namespace::Ordinary);
        }
        resolver
    }

    fn run(&mut self, program: &Program) {
        for decl in &program.structs {
            self.declare_struct(decl);
        }
        for decl in &program.globals {
            self.declare_var(decl);
        }
        for decl in &program.functions {
            self.declare_fun(decl);
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(SemanticError::new(Phase::Name, message, span));
    }

    fn declare_struct(&mut self, decl: &Rc<StructDecl>) {
        if self
            .scopes
            .lookup_current(&decl.name, Namespace::StructTag)
            .is_some()
        {
            self.error(
                format!("struct '{}' is declared more than once", decl.name),
                decl.span,
            );
            return;
        }
        self.scopes
            .declare(decl.name.clone(), Symbol::Struct(decl.clone()), Namespace::StructTag);

        // Fields get their own little scope so duplicate-field checks do not
        // leak into the surrounding one.
        self.scopes.push();
        for field in &decl.fields {
            if self
                .scopes
                .lookup_current(&field.name, Namespace::Ordinary)
                .is_some()
            {
                self.error(
                    format!(
                        "field '{}' is declared more than once in struct '{}'",
                        field.name, decl.name
                    ),
                    field.span,
                );
                continue;
            }
            self.resolve_type(&field.ty, field.span);
            self.scopes
                .declare(field.name.clone(), Symbol::Var(field.clone()), Namespace::Ordinary);
        }
        self.scopes.pop();
    }

    fn declare_var(&mut self, decl: &Rc<VarDecl>) {
        if self
            .scopes
            .lookup_current(&decl.name, Namespace::Ordinary)
            .is_some()
        {
            self.error(
                format!("'{}' is declared more than once in this scope", decl.name),
                decl.span,
            );
            return;
        }
        self.resolve_type(&decl.ty, decl.span);
        self.scopes
            .declare(decl.name.clone(), Symbol::Var(decl.clone()), Namespace::Ordinary);
    }

    fn declare_fun(&mut self, decl: &Rc<FunDecl>) {
        if self
            .scopes
            .lookup_current(&decl.name, Namespace::Ordinary)
            .is_some()
        {
            // The body of a duplicate is skipped entirely; the first
            // declaration is the one every call binds to.
            self.error(
                format!("'{}' is declared more than once in this scope", decl.name),
                decl.span,
            );
            return;
        }
        self.resolve_type(&decl.ret, decl.span);
        self.scopes
            .declare(decl.name.clone(), Symbol::Func(decl.clone()), Namespace::Ordinary);

        // Parameters and top-level locals share one scope, so a local that
        // collides with a parameter is a redeclaration error.
        self.scopes.push();
        for param in &decl.params {
            self.declare_var(param);
        }
        self.resolve_block(&decl.body, false);
        self.scopes.pop();
    }

    fn resolve_block(&mut self, block: &Block, new_scope: bool) {
        if new_scope {
            self.scopes.push();
        }
        for var in &block.vars {
            self.declare_var(var);
        }
        for stmt in &block.stmts {
            self.resolve_stmt(stmt);
        }
        if new_scope {
            self.scopes.pop();
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(block) => self.resolve_block(block, true),
            Stmt::While { cond, body } => {
                self.resolve_expr(cond);
                self.resolve_stmt(body);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.resolve_expr(cond);
                self.resolve_stmt(then);
                if let Some(otherwise) = otherwise {
                    self.resolve_stmt(otherwise);
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            Stmt::Expr(expr) => self.resolve_expr(expr),
            Stmt::Assign { lhs, rhs } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::IntLit(_) | ExprKind::ChrLit(_) | ExprKind::StrLit { .. } => {}
            ExprKind::Var { name, decl } => {
                let bound = match self.scopes.lookup(name, Namespace::Ordinary) {
                    Some(Symbol::Var(var)) => var.clone(),
                    Some(_) => {
                        self.error(format!("'{}' is not a variable", name), expr.span);
                        placeholder_var(name)
                    }
                    None => {
                        self.error(format!("'{}' is not declared", name), expr.span);
                        placeholder_var(name)
                    }
                };
                let _ = decl.set(bound);
            }
            ExprKind::Call { name, args, target } => {
                let bound = match self.scopes.lookup(name, Namespace::Ordinary) {
                    Some(Symbol::Func(fun)) => fun.clone(),
                    Some(_) => {
                        self.error(format!("'{}' is not a function", name), expr.span);
                        placeholder_fun(name)
                    }
                    None => {
                        self.error(format!("'{}' is not declared", name), expr.span);
                        placeholder_fun(name)
                    }
                };
                let _ = target.set(bound);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::BinOp { lhs, rhs, .. } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            ExprKind::ArrayAccess { base, index } => {
                self.resolve_expr(base);
                self.resolve_expr(index);
            }
            ExprKind::FieldAccess { base, .. } => self.resolve_expr(base),
            ExprKind::ValueAt(inner) => self.resolve_expr(inner),
            ExprKind::SizeOf(ty) => self.resolve_type(ty, expr.span),
            ExprKind::Cast { to, expr: inner } => {
                self.resolve_type(to, expr.span);
                self.resolve_expr(inner);
            }
        }
    }

    /// Checks that every struct tag mentioned by a type is in scope.
    fn resolve_type(&mut self, ty: &Type, span: Span) {
        match ty {
            Type::Int | Type::Char | Type::Void => {}
            Type::Pointer(inner) | Type::Array(inner, _) => self.resolve_type(inner, span),
            Type::Struct(name) => {
                if self.scopes.lookup(name, Namespace::StructTag).is_none() {
                    self.error(format!("struct '{}' is not declared", name), span);
                }
            }
        }
    }
}

fn placeholder_var(name: &str) -> Rc<VarDecl> {
    Rc::new(VarDecl::new(Type::Void, name, Span::new(0, 0)))
}

fn placeholder_fun(name: &str) -> Rc<FunDecl> {
    Rc::new(FunDecl::builtin(Type::Void, name, Vec::new()))
}

/// The runtime surface every program sees without declaring it. Code
/// generation recognises these by name and lowers calls straight to
/// syscalls instead of the ordinary call sequence.
pub fn builtins() -> Vec<Rc<FunDecl>> {
    vec![
        Rc::new(FunDecl::builtin(
            Type::Void,
            "print_s",
            vec![(Type::pointer_to(Type::Char), "s")],
        )),
        Rc::new(FunDecl::builtin(Type::Void, "print_i", vec![(Type::Int, "i")])),
        Rc::new(FunDecl::builtin(Type::Void, "print_c", vec![(Type::Char, "c")])),
        Rc::new(FunDecl::builtin(Type::Char, "read_c", Vec::new())),
        Rc::new(FunDecl::builtin(Type::Int, "read_i", Vec::new())),
        Rc::new(FunDecl::builtin(
            Type::pointer_to(Type::Void),
            "mcmalloc",
            vec![(Type::Int, "size")],
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse;

    fn resolve(source: &str) -> (Program, Vec<SemanticError>) {
        let program = parse(source).expect("parse");
        let errors = resolve_names(&program);
        (program, errors)
    }

    fn first_expr_of_main(program: &Program) -> &Expr {
        let main = program
            .functions
            .iter()
            .find(|f| f.name == "main")
            .expect("main");
        match &main.body.stmts[0] {
            Stmt::Expr(expr) => expr,
            Stmt::Assign { lhs, .. } => lhs,
            Stmt::Return {
                value: Some(expr), ..
            } => expr,
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn binds_globals_and_locals() {
        let (program, errors) = resolve("int g; int main() { int l; g = 1; l = g; return l; }");
        assert!(errors.is_empty(), "{:?}", errors);
        match &first_expr_of_main(&program).kind {
            ExprKind::Var { decl, .. } => {
                assert_eq!(decl.get().expect("bound").name, "g");
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn undeclared_variable_reports_and_binds_placeholder() {
        let (program, errors) = resolve("int main() { return x; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'x' is not declared"));
        match &first_expr_of_main(&program).kind {
            ExprKind::Var { decl, .. } => {
                let bound = decl.get().expect("placeholder bound");
                assert_eq!(bound.ty, Type::Void);
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }

    #[test]
    fn duplicate_function_reports_once_and_first_wins() {
        let (program, errors) = resolve(
            "int f() { return 1; } int f() { return oops; } int main() { return f(); }",
        );
        // One error for the redeclaration; the duplicate's body is not
        // visited, so `oops` never gets reported.
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("declared more than once"));
        let main = program.functions.iter().find(|f| f.name == "main").unwrap();
        match &main.body.stmts[0] {
            Stmt::Return {
                value: Some(expr), ..
            } => match &expr.kind {
                ExprKind::Call { target, .. } => {
                    let bound = target.get().expect("bound");
                    assert!(Rc::ptr_eq(bound, &program.functions[0]));
                }
                other => panic!("unexpected expression: {:?}", other),
            },
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn local_shadowing_a_parameter_is_an_error() {
        let (_, errors) = resolve("int f(int x) { int x; return x; } int main() { return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("declared more than once"));
    }

    #[test]
    fn inner_block_may_shadow() {
        let (_, errors) =
            resolve("int main() { int x; { int x; x = 1; } x = 2; return x; }");
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn struct_tag_and_variable_namespaces_are_separate() {
        let (_, errors) = resolve(
            "struct p { int x; }; int p; int main() { struct p q; p = 1; q.x = p; return q.x; }",
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn unknown_struct_tag_in_type_is_reported() {
        let (_, errors) = resolve("struct q v; int main() { return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("struct 'q' is not declared"));
    }

    #[test]
    fn builtins_resolve_without_declaration() {
        let (_, errors) = resolve("int main() { print_i(42); return read_i(); }");
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn calling_a_variable_is_an_error() {
        let (_, errors) = resolve("int x; int main() { return x(); }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("'x' is not a function"));
    }
}
