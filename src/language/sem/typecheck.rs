use super::{Phase, SemanticError};
use crate::language::ast::*;
use crate::language::span::Span;
use std::collections::HashSet;

/// Decorates every expression with a `Type` and validates the typing rules.
/// Best-effort throughout: a failed check records an error and carries on
/// with a plausible type, so one mistake does not bury the rest of the
/// program in noise.
pub fn check_types(program: &Program) -> Vec<SemanticError> {
    let mut checker = TypeChecker {
        structs: StructTable::of(program),
        errors: Vec::new(),
    };
    checker.run(program);
    checker.errors
}

struct TypeChecker {
    structs: StructTable,
    errors: Vec<SemanticError>,
}

/// Statements that can carry a return type out of their enclosing block.
fn returnable(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Block(_) | Stmt::If { .. } | Stmt::While { .. } | Stmt::Return { .. }
    )
}

impl TypeChecker {
    fn run(&mut self, program: &Program) {
        for decl in &program.structs {
            for field in &decl.fields {
                self.check_var_decl(field);
            }
        }
        for decl in &program.globals {
            self.check_var_decl(decl);
        }
        // Duplicate declarations were reported by name resolution and their
        // bodies left unresolved; only the winning declaration is checked.
        let mut seen = HashSet::new();
        for decl in &program.functions {
            if seen.insert(decl.name.clone()) {
                self.check_fun_decl(decl);
            }
        }
    }

    fn error(&mut self, message: String, span: Span) {
        self.errors.push(SemanticError::new(Phase::Type, message, span));
    }

    fn check_var_decl(&mut self, decl: &VarDecl) {
        if decl.ty == Type::Void {
            self.error(
                format!("variable '{}' cannot have type void", decl.name),
                decl.span,
            );
        }
    }

    fn check_fun_decl(&mut self, decl: &FunDecl) {
        if decl.is_builtin {
            return;
        }
        for param in &decl.params {
            self.check_var_decl(param);
        }
        let body_ty = self.check_block(&decl.body).unwrap_or(Type::Void);
        if body_ty != decl.ret {
            self.error(
                format!(
                    "function '{}' is declared to return {} but its body returns {}",
                    decl.name, decl.ret, body_ty
                ),
                decl.span,
            );
        }
    }

    /// Unifies the return types contributed by the block's statements.
    /// Returns `None` when no statement returns.
    fn check_block(&mut self, block: &Block) -> Option<Type> {
        for var in &block.vars {
            self.check_var_decl(var);
        }

        let mut return_types = Vec::new();
        for stmt in &block.stmts {
            let ty = self.check_stmt(stmt);
            if let (true, Some(ty)) = (returnable(stmt), ty) {
                return_types.push((ty, stmt_span(stmt)));
            }
        }

        let (first, _) = return_types.first()?.clone();
        for (ty, span) in &return_types[1..] {
            if *ty != first {
                self.error(
                    format!("return types do not agree: {} and {}", first, ty),
                    *span,
                );
                break;
            }
        }
        Some(first)
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> Option<Type> {
        match stmt {
            Stmt::Block(block) => self.check_block(block),
            Stmt::While { cond, body } => {
                let cond_ty = self.check_expr(cond);
                if cond_ty != Type::Int {
                    self.error(
                        format!("while condition must be int, not {}", cond_ty),
                        cond.span,
                    );
                }
                let body_ty = self.check_stmt(body);
                if returnable(body) {
                    body_ty
                } else {
                    None
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let cond_ty = self.check_expr(cond);
                if cond_ty != Type::Int {
                    self.error(
                        format!("if condition must be int, not {}", cond_ty),
                        cond.span,
                    );
                }

                let then_ty = self.check_stmt(then);
                let mut return_ty = if returnable(then) { then_ty.clone() } else { None };

                if let Some(otherwise) = otherwise {
                    let else_ty = self.check_stmt(otherwise);
                    if let Some(else_ty) = else_ty {
                        if return_ty.is_none() && returnable(otherwise) {
                            return_ty = Some(else_ty);
                        } else if returnable(otherwise) && then_ty.as_ref() != Some(&else_ty) {
                            self.error(
                                format!(
                                    "if and else branches return different types: {} and {}",
                                    then_ty
                                        .as_ref()
                                        .map(|ty| ty.to_string())
                                        .unwrap_or_else(|| "void".into()),
                                    else_ty
                                ),
                                cond.span,
                            );
                        }
                    }
                }
                return_ty
            }
            Stmt::Return { value, .. } => match value {
                Some(value) => Some(self.check_expr(value)),
                None => Some(Type::Void),
            },
            Stmt::Expr(expr) => {
                self.check_expr(expr);
                None
            }
            Stmt::Assign { lhs, rhs } => {
                self.check_assign(lhs, rhs);
                None
            }
        }
    }

    fn check_assign(&mut self, lhs: &Expr, rhs: &Expr) {
        if !matches!(
            lhs.kind,
            ExprKind::Var { .. }
                | ExprKind::FieldAccess { .. }
                | ExprKind::ArrayAccess { .. }
                | ExprKind::ValueAt(_)
        ) {
            self.error("left-hand side of assignment is not assignable".into(), lhs.span);
        }

        let lhs_ty = self.check_expr(lhs);
        let rhs_ty = self.check_expr(rhs);

        if lhs_ty == Type::Void || matches!(lhs_ty, Type::Array(..)) {
            self.error(
                format!("cannot assign to a value of type {}", lhs_ty),
                lhs.span,
            );
        }
        if lhs_ty != rhs_ty {
            self.error(
                format!("cannot assign {} to {}", rhs_ty, lhs_ty),
                rhs.span,
            );
        }
    }

    /// Computes, records and returns the expression's type.
    fn check_expr(&mut self, expr: &Expr) -> Type {
        let ty = match &expr.kind {
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::ChrLit(_) => Type::Char,
            ExprKind::StrLit { value, .. } => Type::array_of(Type::Char, value.len() + 1),
            ExprKind::Var { decl, .. } => {
                decl.get().expect("name resolution has run").ty.clone()
            }
            ExprKind::Call { args, target, .. } => {
                let target = target.get().expect("name resolution has run").clone();
                if args.len() != target.params.len() {
                    self.error(
                        format!(
                            "'{}' expects {} arguments but received {}",
                            target.name,
                            target.params.len(),
                            args.len()
                        ),
                        expr.span,
                    );
                } else {
                    for (arg, param) in args.iter().zip(&target.params) {
                        let arg_ty = self.check_expr(arg);
                        if arg_ty != param.ty {
                            self.error(
                                format!(
                                    "argument for parameter '{}' of '{}' has type {}, expected {}",
                                    param.name, target.name, arg_ty, param.ty
                                ),
                                arg.span,
                            );
                        }
                    }
                }
                target.ret.clone()
            }
            ExprKind::BinOp { op, lhs, rhs } => {
                let lhs_ty = self.check_expr(lhs);
                let rhs_ty = self.check_expr(rhs);
                match op {
                    Op::Eq | Op::Ne => {
                        let comparable = lhs_ty == rhs_ty
                            && !matches!(lhs_ty, Type::Struct(_) | Type::Array(..) | Type::Void);
                        if !comparable {
                            self.error(
                                format!(
                                    "operator {} expects matching scalar types, received {} and {}",
                                    op, lhs_ty, rhs_ty
                                ),
                                expr.span,
                            );
                        }
                    }
                    _ => {
                        if lhs_ty != Type::Int || rhs_ty != Type::Int {
                            self.error(
                                format!(
                                    "operator {} expects int and int, received {} and {}",
                                    op, lhs_ty, rhs_ty
                                ),
                                expr.span,
                            );
                        }
                    }
                }
                Type::Int
            }
            ExprKind::ArrayAccess { base, index } => {
                let base_ty = self.check_expr(base);
                let index_ty = self.check_expr(index);
                if index_ty != Type::Int {
                    self.error(
                        format!("array index must be int, not {}", index_ty),
                        index.span,
                    );
                }
                match &base_ty {
                    Type::Array(elem, _) | Type::Pointer(elem) => (**elem).clone(),
                    _ => {
                        self.error(
                            format!("cannot index a value of type {}", base_ty),
                            base.span,
                        );
                        base_ty
                    }
                }
            }
            ExprKind::FieldAccess { base, field } => {
                let base_ty = self.check_expr(base);
                match &base_ty {
                    Type::Struct(name) => match self.structs.get(name) {
                        Some(decl) => match decl.field(field) {
                            Some(var) => var.ty.clone(),
                            None => {
                                self.error(
                                    format!("struct {} has no field '{}'", name, field),
                                    expr.span,
                                );
                                Type::Void
                            }
                        },
                        None => Type::Void,
                    },
                    _ => {
                        self.error(
                            format!("cannot access field '{}' of type {}", field, base_ty),
                            base.span,
                        );
                        Type::Void
                    }
                }
            }
            ExprKind::ValueAt(inner) => {
                let inner_ty = self.check_expr(inner);
                match inner_ty {
                    Type::Pointer(pointee) => *pointee,
                    _ => {
                        self.error(
                            format!("cannot dereference a value of type {}", inner_ty),
                            inner.span,
                        );
                        Type::Void
                    }
                }
            }
            ExprKind::SizeOf(_) => Type::Int,
            ExprKind::Cast { to, expr: inner } => {
                let from = self.check_expr(inner);
                let valid = match (&from, to) {
                    (Type::Char, Type::Int) => true,
                    (Type::Array(from_elem, _), Type::Pointer(to_elem)) => from_elem == to_elem,
                    (Type::Pointer(_), Type::Pointer(_)) => true,
                    _ => false,
                };
                if !valid {
                    self.error(format!("invalid cast from {} to {}", from, to), expr.span);
                }
                to.clone()
            }
        };
        expr.set_ty(ty.clone());
        ty
    }
}

fn stmt_span(stmt: &Stmt) -> Span {
    match stmt {
        Stmt::Block(block) => block
            .stmts
            .first()
            .map(stmt_span)
            .unwrap_or_else(|| Span::new(0, 0)),
        Stmt::While { cond, .. } => cond.span,
        Stmt::If { cond, .. } => cond.span,
        Stmt::Return { span, .. } => *span,
        Stmt::Expr(expr) => expr.span,
        Stmt::Assign { lhs, .. } => lhs.span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse;
    use crate::language::sem::analyse;

    fn check(source: &str) -> Vec<SemanticError> {
        let program = parse(source).expect("parse");
        analyse(&program)
    }

    #[test]
    fn well_typed_program_is_clean() {
        let errors = check(
            "struct vec { int x; int y; };\
             int g;\
             int add(int a, int b) { return a + b; }\
             int main() { struct vec v; v.x = 1; v.y = 2; g = add(v.x, v.y); return g; }",
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn string_assignment_to_pointer_is_a_mismatch() {
        let errors = check("char* y; int main() { y = \"hi\"; return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot assign char[3] to char*"));
    }

    #[test]
    fn array_decays_only_through_a_cast() {
        let errors = check("char* y; int main() { y = (char*) \"hi\"; return 0; }");
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn arithmetic_requires_ints() {
        let errors = check("int main() { char c; c = 'a'; return c + 1; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("expects int and int"));
    }

    #[test]
    fn char_compares_with_eq_but_not_lt() {
        let clean = check("int main() { char c; c = 'a'; if (c == 'b') { return 1; } return 0; }");
        assert!(clean.is_empty(), "{:?}", clean);
        let errors = check("int main() { char c; c = 'a'; if (c < 'b') { return 1; } return 0; }");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn void_comparison_is_rejected() {
        let errors = check("int main() { if (print_i(1) == print_i(2)) { return 1; } return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("matching scalar types"));
    }

    #[test]
    fn return_types_must_unify() {
        let errors = check(
            "int main() { if (1) { return 'a'; } else { return 0; } return 0; }",
        );
        assert!(!errors.is_empty());
    }

    #[test]
    fn missing_return_in_int_function_is_an_error() {
        let errors = check("int f() { print_i(1); } int main() { return f(); }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0]
            .message
            .contains("declared to return int but its body returns void"));
    }

    #[test]
    fn void_variable_is_rejected() {
        let errors = check("void v; int main() { return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot have type void"));
    }

    #[test]
    fn array_lhs_is_not_assignable() {
        let errors = check("int main() { int a[4]; int b[4]; a = b; return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot assign to a value of type int[4]"));
    }

    #[test]
    fn literal_lhs_is_not_assignable() {
        let errors = check("int main() { 1 = 2; return 0; }");
        assert!(errors
            .iter()
            .any(|e| e.message.contains("not assignable")));
    }

    #[test]
    fn pointer_arithmetic_is_rejected() {
        let errors = check("int main() { int* p; p = p + 1; return 0; }");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("expects int and int"));
    }

    #[test]
    fn call_arity_and_argument_types_are_checked() {
        let errors = check(
            "int f(int a) { return a; } int main() { f(); f('a'); return f(1); }",
        );
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("expects 1 arguments but received 0"));
        assert!(errors[1].message.contains("has type char, expected int"));
    }

    #[test]
    fn field_access_checks_struct_and_field() {
        let errors = check(
            "struct p { int x; }; int main() { struct p v; int i; i = 0; v.y; i.x; return i; }",
        );
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("struct p has no field 'y'"));
        assert!(errors[1].message.contains("cannot access field 'x' of type int"));
    }

    #[test]
    fn dereference_needs_a_pointer() {
        let clean = check(
            "int main() { int* p; p = (int*) mcmalloc(sizeof(int)); *p = 3; return *p; }",
        );
        assert!(clean.is_empty(), "{:?}", clean);
        let errors = check("int main() { int i; i = 0; *i; return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot dereference"));
    }

    #[test]
    fn cast_rules() {
        let clean = check(
            "int main() { char c; int* p; void* v; c = 'a'; \
             v = (void*) p; p = (int*) v; return (int) c; }",
        );
        assert!(clean.is_empty(), "{:?}", clean);
        let errors = check("int main() { int i; i = 0; return (int) ((char*) i); }");
        assert!(!errors.is_empty());
    }

    #[test]
    fn sizeof_is_int() {
        let errors = check(
            "struct p { int x; char c; }; int main() { return sizeof(struct p) + sizeof(char*); }",
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn while_condition_must_be_int() {
        let errors = check("int main() { char c; c = 'a'; while (c) { c = 'b'; } return 0; }");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("while condition must be int"));
    }
}
