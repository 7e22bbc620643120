use crate::language::ast::*;

/// Compact single-line serialization of the AST, used by the `ast` driver
/// mode and by tests that want to pin down tree shapes.
pub fn print_program(program: &Program) -> String {
    let mut parts = Vec::new();
    for decl in &program.structs {
        parts.push(print_struct_decl(decl));
    }
    for decl in &program.globals {
        parts.push(print_var_decl(decl));
    }
    for decl in &program.functions {
        parts.push(print_fun_decl(decl));
    }
    format!("Program({})", parts.join(","))
}

fn print_type(ty: &Type) -> String {
    match ty {
        Type::Int => "INT".into(),
        Type::Char => "CHAR".into(),
        Type::Void => "VOID".into(),
        Type::Pointer(inner) => format!("PointerType({})", print_type(inner)),
        Type::Array(inner, len) => format!("ArrayType({},{})", print_type(inner), len),
        Type::Struct(name) => format!("StructType({})", name),
    }
}

fn print_struct_decl(decl: &StructDecl) -> String {
    let mut parts = vec![format!("StructType({})", decl.name)];
    parts.extend(decl.fields.iter().map(|field| print_var_decl(field)));
    format!("StructTypeDecl({})", parts.join(","))
}

fn print_var_decl(decl: &VarDecl) -> String {
    format!("VarDecl({},{})", print_type(&decl.ty), decl.name)
}

fn print_fun_decl(decl: &FunDecl) -> String {
    let mut parts = vec![print_type(&decl.ret), decl.name.clone()];
    parts.extend(decl.params.iter().map(|param| print_var_decl(param)));
    parts.push(print_block(&decl.body));
    format!("FunDecl({})", parts.join(","))
}

fn print_block(block: &Block) -> String {
    let mut parts = Vec::new();
    parts.extend(block.vars.iter().map(|var| print_var_decl(var)));
    parts.extend(block.stmts.iter().map(print_stmt));
    format!("Block({})", parts.join(","))
}

fn print_stmt(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Block(block) => print_block(block),
        Stmt::While { cond, body } => {
            format!("While({},{})", print_expr(cond), print_stmt(body))
        }
        Stmt::If {
            cond,
            then,
            otherwise,
        } => match otherwise {
            Some(otherwise) => format!(
                "If({},{},{})",
                print_expr(cond),
                print_stmt(then),
                print_stmt(otherwise)
            ),
            None => format!("If({},{})", print_expr(cond), print_stmt(then)),
        },
        Stmt::Return { value, .. } => match value {
            Some(value) => format!("Return({})", print_expr(value)),
            None => "Return()".into(),
        },
        Stmt::Expr(expr) => format!("ExprStmt({})", print_expr(expr)),
        Stmt::Assign { lhs, rhs } => {
            format!("Assign({},{})", print_expr(lhs), print_expr(rhs))
        }
    }
}

fn print_expr(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::IntLit(value) => format!("IntLiteral({})", value),
        ExprKind::ChrLit(value) => format!("ChrLiteral({})", value),
        ExprKind::StrLit { value, .. } => format!("StrLiteral({})", value),
        ExprKind::Var { name, .. } => format!("VarExpr({})", name),
        ExprKind::Call { name, args, .. } => {
            let mut parts = vec![name.clone()];
            parts.extend(args.iter().map(print_expr));
            format!("FunCallExpr({})", parts.join(","))
        }
        ExprKind::BinOp { op, lhs, rhs } => {
            format!("BinOp({},{},{})", print_expr(lhs), op, print_expr(rhs))
        }
        ExprKind::ArrayAccess { base, index } => {
            format!("ArrayAccessExpr({},{})", print_expr(base), print_expr(index))
        }
        ExprKind::FieldAccess { base, field } => {
            format!("FieldAccessExpr({},{})", print_expr(base), field)
        }
        ExprKind::ValueAt(inner) => format!("ValueAtExpr({})", print_expr(inner)),
        ExprKind::SizeOf(ty) => format!("SizeOfExpr({})", print_type(ty)),
        ExprKind::Cast { to, expr } => {
            format!("TypecastExpr({},{})", print_type(to), print_expr(expr))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse;

    #[test]
    fn prints_compact_tree() {
        let program = parse("int x; int main() { x = 1 + 2; return x; }").expect("parse");
        assert_eq!(
            print_program(&program),
            "Program(VarDecl(INT,x),FunDecl(INT,main,Block(\
             Assign(VarExpr(x),BinOp(IntLiteral(1),+,IntLiteral(2))),\
             Return(VarExpr(x)))))"
        );
    }
}
