use crate::language::span::Span;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Rounds a byte size up to the next 4-byte boundary.
pub fn align4(size: usize) -> usize {
    (size + 3) & !3
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Int,
    Char,
    Void,
    Pointer(Box<Type>),
    Array(Box<Type>, usize),
    Struct(String),
}

impl Type {
    pub fn pointer_to(inner: Type) -> Type {
        Type::Pointer(Box::new(inner))
    }

    pub fn array_of(inner: Type, len: usize) -> Type {
        Type::Array(Box::new(inner), len)
    }

    pub fn size_of(&self, structs: &StructTable) -> usize {
        self.sized(structs, &mut Vec::new())
    }

    fn sized(&self, structs: &StructTable, visiting: &mut Vec<String>) -> usize {
        match self {
            Type::Int => 4,
            Type::Char => 1,
            Type::Void => 0,
            Type::Pointer(_) => 4,
            Type::Array(inner, len) => align4(len * inner.sized(structs, visiting)),
            Type::Struct(name) => {
                if visiting.iter().any(|seen| seen == name) {
                    panic!("struct '{}' contains itself", name);
                }
                let decl = structs.get(name).unwrap_or_else(|| {
                    panic!("size_of called on unresolved struct '{}'", name)
                });
                visiting.push(name.clone());
                let size = decl
                    .fields
                    .iter()
                    .map(|field| align4(field.ty.sized(structs, visiting)))
                    .sum();
                visiting.pop();
                size
            }
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Char => write!(f, "char"),
            Type::Void => write!(f, "void"),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Array(inner, len) => write!(f, "{}[{}]", inner, len),
            Type::Struct(name) => write!(f, "struct {}", name),
        }
    }
}

/// Where a variable lives once code generation has placed it. Globals get a
/// data-section label (struct globals also get one label per field); locals
/// and parameters get a negative offset from the frame pointer.
#[derive(Clone, Debug)]
pub enum Storage {
    Global {
        label: String,
        field_labels: HashMap<String, String>,
    },
    Frame(i32),
}

#[derive(Debug)]
pub struct VarDecl {
    pub ty: Type,
    pub name: String,
    pub span: Span,
    storage: OnceCell<Storage>,
}

impl VarDecl {
    pub fn new(ty: Type, name: impl Into<String>, span: Span) -> Self {
        Self {
            ty,
            name: name.into(),
            span,
            storage: OnceCell::new(),
        }
    }

    pub fn set_storage(&self, storage: Storage) {
        if self.storage.set(storage).is_err() {
            panic!("storage assigned twice for variable '{}'", self.name);
        }
    }

    pub fn storage(&self) -> &Storage {
        self.storage
            .get()
            .unwrap_or_else(|| panic!("storage read before assignment for '{}'", self.name))
    }

    pub fn is_global(&self) -> bool {
        matches!(self.storage.get(), Some(Storage::Global { .. }))
    }

    pub fn global_label(&self) -> &str {
        match self.storage() {
            Storage::Global { label, .. } => label,
            Storage::Frame(_) => panic!("'{}' is not a global", self.name),
        }
    }

    pub fn field_label(&self, field: &str) -> &str {
        match self.storage() {
            Storage::Global { field_labels, .. } => field_labels
                .get(field)
                .unwrap_or_else(|| panic!("global '{}' has no field '{}'", self.name, field)),
            Storage::Frame(_) => panic!("'{}' is not a global", self.name),
        }
    }

    pub fn frame_offset(&self) -> i32 {
        match self.storage() {
            Storage::Frame(offset) => *offset,
            Storage::Global { .. } => panic!("'{}' is not frame-allocated", self.name),
        }
    }
}

impl std::fmt::Display for VarDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}

#[derive(Debug)]
pub struct FunDecl {
    pub ret: Type,
    pub name: String,
    pub params: Vec<Rc<VarDecl>>,
    pub body: Block,
    pub is_builtin: bool,
    pub span: Span,
    label: OnceCell<String>,
}

impl FunDecl {
    pub fn new(
        ret: Type,
        name: impl Into<String>,
        params: Vec<Rc<VarDecl>>,
        body: Block,
        span: Span,
    ) -> Self {
        Self {
            ret,
            name: name.into(),
            params,
            body,
            is_builtin: false,
            span,
            label: OnceCell::new(),
        }
    }

    pub fn builtin(ret: Type, name: impl Into<String>, params: Vec<(Type, &str)>) -> Self {
        let params = params
            .into_iter()
            .map(|(ty, name)| Rc::new(VarDecl::new(ty, name, Span::new(0, 0))))
            .collect();
        Self {
            ret,
            name: name.into(),
            params,
            body: Block::empty(),
            is_builtin: true,
            span: Span::new(0, 0),
            label: OnceCell::new(),
        }
    }

    pub fn set_label(&self, label: String) {
        if self.label.set(label).is_err() {
            panic!("label assigned twice for function '{}'", self.name);
        }
    }

    pub fn label(&self) -> &str {
        self.label
            .get()
            .unwrap_or_else(|| panic!("label read before assignment for '{}'", self.name))
    }
}

#[derive(Debug)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Rc<VarDecl>>,
    pub span: Span,
}

impl StructDecl {
    pub fn field(&self, name: &str) -> Option<&Rc<VarDecl>> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug)]
pub struct Block {
    pub vars: Vec<Rc<VarDecl>>,
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn empty() -> Self {
        Self {
            vars: Vec::new(),
            stmts: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum Stmt {
    Block(Block),
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Expr(Expr),
    Assign {
        lhs: Expr,
        rhs: Expr,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::And => "&&",
            Op::Or => "||",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Eq => "==",
            Op::Ne => "!=",
        };
        f.write_str(text)
    }
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    ty: OnceCell<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: OnceCell::new(),
        }
    }

    /// Records the type computed by the type checker. Set exactly once.
    pub fn set_ty(&self, ty: Type) {
        if self.ty.set(ty).is_err() {
            panic!("expression type set twice at {:?}", self.span);
        }
    }

    /// The decorated type. Code generation assumes the checker has run.
    pub fn ty(&self) -> &Type {
        self.ty
            .get()
            .unwrap_or_else(|| panic!("expression type read before checking at {:?}", self.span))
    }
}

#[derive(Debug)]
pub enum ExprKind {
    IntLit(i32),
    ChrLit(char),
    StrLit {
        value: String,
        label: OnceCell<String>,
    },
    Var {
        name: String,
        decl: OnceCell<Rc<VarDecl>>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        target: OnceCell<Rc<FunDecl>>,
    },
    BinOp {
        op: Op,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    ArrayAccess {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    FieldAccess {
        base: Box<Expr>,
        field: String,
    },
    ValueAt(Box<Expr>),
    SizeOf(Type),
    Cast {
        to: Type,
        expr: Box<Expr>,
    },
}

impl ExprKind {
    pub fn var(name: impl Into<String>) -> Self {
        ExprKind::Var {
            name: name.into(),
            decl: OnceCell::new(),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        ExprKind::Call {
            name: name.into(),
            args,
            target: OnceCell::new(),
        }
    }

    pub fn str_lit(value: impl Into<String>) -> Self {
        ExprKind::StrLit {
            value: value.into(),
            label: OnceCell::new(),
        }
    }
}

#[derive(Debug)]
pub struct Program {
    pub structs: Vec<Rc<StructDecl>>,
    pub globals: Vec<Rc<VarDecl>>,
    pub functions: Vec<Rc<FunDecl>>,
}

/// Name-to-declaration map for struct types; the nominal side of the type
/// model. Built once from the parsed program; the first declaration of a
/// name wins, matching the resolution pass's duplicate policy.
#[derive(Default)]
pub struct StructTable {
    decls: HashMap<String, Rc<StructDecl>>,
}

impl StructTable {
    pub fn of(program: &Program) -> Self {
        let mut decls = HashMap::new();
        for decl in &program.structs {
            decls.entry(decl.name.clone()).or_insert_with(|| decl.clone());
        }
        Self { decls }
    }

    pub fn get(&self, name: &str) -> Option<&Rc<StructDecl>> {
        self.decls.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(fields: Vec<(Type, &str)>) -> StructTable {
        let fields = fields
            .into_iter()
            .map(|(ty, name)| Rc::new(VarDecl::new(ty, name, Span::new(0, 0))))
            .collect();
        let decl = Rc::new(StructDecl {
            name: "vec".into(),
            fields,
            span: Span::new(0, 0),
        });
        let program = Program {
            structs: vec![decl],
            globals: Vec::new(),
            functions: Vec::new(),
        };
        StructTable::of(&program)
    }

    #[test]
    fn base_type_sizes() {
        let structs = StructTable::default();
        assert_eq!(Type::Int.size_of(&structs), 4);
        assert_eq!(Type::Char.size_of(&structs), 1);
        assert_eq!(Type::Void.size_of(&structs), 0);
        assert_eq!(Type::pointer_to(Type::Char).size_of(&structs), 4);
    }

    #[test]
    fn array_size_is_aligned() {
        let structs = StructTable::default();
        assert_eq!(Type::array_of(Type::Char, 3).size_of(&structs), 4);
        assert_eq!(Type::array_of(Type::Char, 5).size_of(&structs), 8);
        assert_eq!(Type::array_of(Type::Int, 3).size_of(&structs), 12);
    }

    #[test]
    fn struct_size_sums_aligned_fields() {
        let structs = table_with(vec![
            (Type::pointer_to(Type::Char), "name"),
            (Type::Char, "tag"),
            (Type::Int, "x"),
        ]);
        assert_eq!(Type::Struct("vec".into()).size_of(&structs), 12);
    }

    #[test]
    #[should_panic(expected = "struct 'vec' contains itself")]
    fn self_referential_struct_size_is_a_fault() {
        let structs = table_with(vec![(Type::Struct("vec".into()), "inner")]);
        Type::Struct("vec".into()).size_of(&structs);
    }

    #[test]
    fn equivalence_is_reflexive_and_symmetric() {
        let samples = vec![
            Type::Int,
            Type::Char,
            Type::Void,
            Type::pointer_to(Type::Int),
            Type::array_of(Type::Char, 4),
            Type::Struct("vec".into()),
        ];
        for a in &samples {
            assert_eq!(a, a);
            for b in &samples {
                assert_eq!(a == b, b == a);
            }
        }
    }

    #[test]
    fn arrays_compare_element_count() {
        assert_ne!(Type::array_of(Type::Int, 3), Type::array_of(Type::Int, 4));
        assert_eq!(Type::array_of(Type::Int, 3), Type::array_of(Type::Int, 3));
    }

    #[test]
    fn structs_compare_by_name() {
        assert_eq!(Type::Struct("a".into()), Type::Struct("a".into()));
        assert_ne!(Type::Struct("a".into()), Type::Struct("b".into()));
    }

    #[test]
    #[should_panic(expected = "storage assigned twice")]
    fn storage_cannot_be_set_twice() {
        let decl = VarDecl::new(Type::Int, "x", Span::new(0, 0));
        decl.set_storage(Storage::Frame(-4));
        decl.set_storage(Storage::Frame(-8));
    }

    #[test]
    #[should_panic(expected = "storage read before assignment")]
    fn storage_cannot_be_read_before_set() {
        let decl = VarDecl::new(Type::Int, "x", Span::new(0, 0));
        decl.frame_offset();
    }
}
