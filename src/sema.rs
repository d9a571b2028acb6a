//! Semantic analysis: declaration collection, then resolution and
//! checking (`spec.md` §4.4).
//!
//! Two passes over the merged set of declarations (headers first, then the
//! compiled unit's own top level): pass one registers every struct, enum,
//! union, function signature, macro and global so forward references work
//! regardless of declaration order; pass two walks each function body,
//! resolving identifiers through the scope tree, expanding macros,
//! lifting lambdas, and running the checks that produce diagnostics E023,
//! E030, E041, E042, E043, E044 and W006.

use crate::ast::{
    Block, Decl, EnumDecl, Expr, FnDecl, Literal, MacroDecl, Mutability, Param, Program,
    Signedness as AstSignedness, SourceLocation, Stmt, StructDecl, TypeExpr, UnionTypeDecl, VarDecl,
};
use crate::diagnostics::{Diagnostic, DiagnosticBag};
use crate::includes::ResolvedHeader;
use crate::symbols::{FunctionSignature, ScopeId, ScopeKind, StorageClass, Symbol, SymbolTable, GLOBAL};
use crate::typeck::{self, Ctx};
use crate::types::{self, Signedness as TySignedness, TypeDescriptor, TypeRegistry};
use std::collections::{HashMap, HashSet};

/// A lambda expression lifted to a synthetic top-level function. Codegen
/// emits one ordinary function per entry, under `name`.
#[derive(Debug, Clone)]
pub struct LiftedLambda {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeExpr,
    pub body: Block,
    pub source: SourceLocation,
}

pub struct AnalysisResult {
    pub symtab: SymbolTable,
    pub registry: TypeRegistry,
    pub diagnostics: DiagnosticBag,
    pub lifted_lambdas: Vec<LiftedLambda>,
    /// Namespace name -> its scope, so codegen can render `ns__name` linkage.
    pub namespaces: HashMap<String, ScopeId>,
    /// Top-level function name -> its body with macros fully expanded in
    /// place, since codegen walks this instead of the macro-invocation
    /// sites still present in the original parsed `Program` - macros
    /// "disappear at expansion" (`spec.md` §3) and codegen has no reason
    /// to see them again.
    pub expanded_bodies: HashMap<String, Block>,
}

impl AnalysisResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

const MAX_MACRO_DEPTH: usize = 64;

/// The GAS symbol a declaration under `namespace` links to
/// (`spec.md` §4.5 "Emission layout"): `<namespace>__<name>`, except
/// `std::`, whose declarations describe real libc symbols and so keep
/// their bare, unmangled C name (`std::printf` links to `printf`).
pub fn linkage_name(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some("std") => name.to_string(),
        Some(ns) => format!("{}__{}", ns, name),
        None => name.to_string(),
    }
}

struct Analyzer {
    symtab: SymbolTable,
    registry: TypeRegistry,
    diagnostics: DiagnosticBag,
    macros: HashMap<String, MacroDecl>,
    lifted: Vec<LiftedLambda>,
    namespaces: HashMap<String, ScopeId>,
    expanded_bodies: HashMap<String, Block>,
    hygiene_counter: usize,
}

pub fn analyze(program: &Program, headers: &[ResolvedHeader]) -> AnalysisResult {
    let mut az = Analyzer {
        symtab: SymbolTable::new(),
        registry: TypeRegistry::new(),
        diagnostics: DiagnosticBag::new(),
        macros: HashMap::new(),
        lifted: Vec::new(),
        namespaces: HashMap::new(),
        expanded_bodies: HashMap::new(),
        hygiene_counter: 0,
    };

    for header in headers {
        let ns_scope = az.symtab.push_scope(GLOBAL, ScopeKind::Namespace);
        az.declare_all(ns_scope, &header.decls, Some(&header.namespace));
        if !az.symtab.declare(GLOBAL, &header.namespace, Symbol::Namespace(ns_scope)) {
            // Two headers sharing a basename is unusual but not an error by
            // itself; later declarations simply can't be reached by name.
        }
        az.namespaces.insert(header.namespace.clone(), ns_scope);
    }

    // A header can carry full function definitions, not just prototypes
    // (`spec.md` §8 scenario 6, two libraries each defining `add`), so its
    // bodies need the same checking/macro-expansion pass as the compiled
    // unit's own top level, scoped to that header's namespace.
    for header in headers {
        let ns_scope = az.namespaces[&header.namespace];
        for decl in &header.decls {
            if let Decl::Fn(f) = decl {
                if let Some(body) = &f.body {
                    az.analyze_function(f, body, ns_scope, None, Some(&header.namespace));
                }
            }
        }
    }

    az.declare_all(GLOBAL, &program.decls, None);

    for decl in &program.decls {
        if let Decl::Fn(f) = decl {
            if let Some(body) = &f.body {
                az.analyze_function(f, body, GLOBAL, None, None);
            }
        }
    }

    az.diagnostics.sort_in_source_order();
    AnalysisResult {
        symtab: az.symtab,
        registry: az.registry,
        diagnostics: az.diagnostics,
        lifted_lambdas: az.lifted,
        namespaces: az.namespaces,
        expanded_bodies: az.expanded_bodies,
    }
}

impl Analyzer {
    /// Pass one: register types first (so struct/union fields can name
    /// each other and later functions can use them), then signatures,
    /// globals and macros.
    fn declare_all(&mut self, scope: ScopeId, decls: &[Decl], namespace: Option<&str>) {
        for decl in decls {
            match decl {
                Decl::Struct(s) => self.declare_struct(scope, s, namespace),
                Decl::Enum(e) => self.declare_enum(scope, e, namespace),
                Decl::UnionType(u) => self.declare_union(scope, u, namespace),
                _ => {}
            }
        }
        for decl in decls {
            match decl {
                Decl::Fn(f) => self.declare_fn(scope, f, namespace),
                Decl::GlobalVar(v) => self.declare_global(scope, v, namespace),
                Decl::Macro(m) => self.declare_macro(m),
                _ => {}
            }
        }
    }

    fn registry_key(&self, namespace: Option<&str>, name: &str) -> String {
        match namespace {
            Some(ns) => format!("{}::{}", ns, name),
            None => name.to_string(),
        }
    }

    fn declare_struct(&mut self, scope: ScopeId, s: &StructDecl, namespace: Option<&str>) {
        let fields = s
            .fields
            .iter()
            .map(|f| {
                let ty = typeck::resolve_type_expr(&f.ty, &self.registry).unwrap_or(TypeDescriptor::Void);
                (f.name.clone(), ty)
            })
            .collect();
        let descriptor = types::layout_struct(&s.name, fields);
        self.registry.insert(self.registry_key(namespace, &s.name), descriptor.clone());
        if !self.symtab.declare(scope, &s.name, Symbol::Type(descriptor)) {
            self.diagnostics.push(Diagnostic::error(
                "E041",
                s.source.clone(),
                format!("'{}' is already defined in this scope", s.name),
            ));
        }
    }

    fn declare_enum(&mut self, scope: ScopeId, e: &EnumDecl, namespace: Option<&str>) {
        let descriptor = TypeDescriptor::Enum {
            name: e.name.clone(),
            variants: e.variants.clone(),
        };
        self.registry.insert(self.registry_key(namespace, &e.name), descriptor.clone());
        if !self.symtab.declare(scope, &e.name, Symbol::Type(descriptor.clone())) {
            self.diagnostics.push(Diagnostic::error(
                "E041",
                e.source.clone(),
                format!("'{}' is already defined in this scope", e.name),
            ));
            return;
        }
        for variant in &e.variants {
            let sym = Symbol::Variable {
                ty: TypeDescriptor::Int { bits: 32, signedness: TySignedness::Signed },
                storage: StorageClass::Const,
                mutability: Mutability::Const,
            };
            if !self.symtab.declare(scope, variant, sym) {
                self.diagnostics.push(Diagnostic::error(
                    "E041",
                    e.source.clone(),
                    format!("enum variant '{}' collides with an existing name", variant),
                ));
            }
        }
    }

    fn declare_union(&mut self, scope: ScopeId, u: &UnionTypeDecl, namespace: Option<&str>) {
        let variants = u
            .variants
            .iter()
            .map(|v| typeck::resolve_type_expr(v, &self.registry).unwrap_or(TypeDescriptor::Void))
            .collect();
        let descriptor = TypeDescriptor::Union { name: u.name.clone(), variants };
        self.registry.insert(self.registry_key(namespace, &u.name), descriptor.clone());
        if !self.symtab.declare(scope, &u.name, Symbol::Type(descriptor)) {
            self.diagnostics.push(Diagnostic::error(
                "E041",
                u.source.clone(),
                format!("'{}' is already defined in this scope", u.name),
            ));
        }
    }

    fn declare_fn(&mut self, scope: ScopeId, f: &FnDecl, namespace: Option<&str>) {
        let params = f
            .params
            .iter()
            .map(|p| typeck::resolve_type_expr(&p.ty, &self.registry).unwrap_or(TypeDescriptor::Void))
            .collect::<Vec<_>>();
        let return_type = typeck::resolve_type_expr(&f.return_type, &self.registry).unwrap_or(TypeDescriptor::Void);
        let return_type = typeck::apply_signedness(return_type, f.signedness);
        let arg_classes = params.iter().map(types::arg_class).collect::<Vec<_>>();
        let linkage_name = linkage_name(namespace, &f.name);
        let sig = FunctionSignature {
            params,
            return_type,
            arg_classes,
            linkage_name,
            is_prototype: f.body.is_none(),
        };

        let existing = match self.symtab_lookup_direct(scope, &f.name) {
            Some(Symbol::Function(sig)) => Some(sig.clone()),
            _ => None,
        };
        if let Some(existing) = existing {
            if !signatures_match(&existing, &sig) {
                self.diagnostics.push(Diagnostic::error(
                    "E030",
                    f.source.clone(),
                    format!(
                        "'{}' redeclared with a different signature than its prior declaration",
                        f.name
                    ),
                ));
                return;
            }
            if !existing.is_prototype && !sig.is_prototype {
                self.diagnostics.push(Diagnostic::error(
                    "E041",
                    f.source.clone(),
                    format!("'{}' is already defined in this scope", f.name),
                ));
                return;
            }
            // Prototype followed by a matching definition: keep the
            // definition's (identical) signature, no diagnostic.
            if sig.is_prototype {
                return;
            }
        }
        self.symtab.declare(scope, &f.name, Symbol::Function(sig));
    }

    fn symtab_lookup_direct(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        if self.symtab.declared_directly(scope, name) {
            self.symtab.lookup(scope, name)
        } else {
            None
        }
    }

    fn declare_global(&mut self, scope: ScopeId, v: &VarDecl, _namespace: Option<&str>) {
        let mut ty = typeck::resolve_type_expr(&v.ty, &self.registry).unwrap_or(TypeDescriptor::Void);
        ty = typeck::apply_signedness(ty, v.signedness);
        if let (TypeDescriptor::Int { bits, signedness }, Some(Expr::Literal { value: Literal::Int(n), .. })) =
            (&ty, &v.init)
        {
            if !types::literal_in_range(*n, *bits, *signedness) {
                self.diagnostics.push(Diagnostic::error(
                    "E023",
                    v.source.clone(),
                    format!(
                        "literal {} does not fit in int<{}> {}",
                        n,
                        bits,
                        types::range_description(*bits, *signedness)
                    ),
                ));
            }
        }
        let storage = if v.mutability == Mutability::Const { StorageClass::Const } else { StorageClass::Global };
        let sym = Symbol::Variable { ty, storage, mutability: v.mutability };
        if !self.symtab.declare(scope, &v.name, sym) {
            self.diagnostics.push(Diagnostic::error(
                "E041",
                v.source.clone(),
                format!("'{}' is already defined in this scope", v.name),
            ));
        }
    }

    fn declare_macro(&mut self, m: &MacroDecl) {
        if self.macros.contains_key(&m.name) {
            self.diagnostics.push(Diagnostic::error(
                "E041",
                m.source.clone(),
                format!("macro '{}' is already defined", m.name),
            ));
            return;
        }
        self.macros.insert(m.name.clone(), m.clone());
    }

    // ---- pass two: function bodies ---------------------------------------

    fn analyze_function(
        &mut self,
        f: &FnDecl,
        body: &Block,
        enclosing_scope: ScopeId,
        lambda_own_scope: Option<ScopeId>,
        namespace: Option<&str>,
    ) {
        let fn_scope = lambda_own_scope.unwrap_or_else(|| self.symtab.push_scope(enclosing_scope, ScopeKind::Function));
        for p in &f.params {
            let ty = typeck::resolve_type_expr(&p.ty, &self.registry).unwrap_or(TypeDescriptor::Void);
            self.symtab.declare(
                fn_scope,
                &p.name,
                Symbol::Variable { ty, storage: StorageClass::LocalStack(0), mutability: Mutability::Let },
            );
        }
        let return_ty = typeck::resolve_type_expr(&f.return_type, &self.registry).unwrap_or(TypeDescriptor::Void);
        let expanded_body = expand_macros_in_block(body, self, 0);
        self.analyze_block(&expanded_body, fn_scope, &return_ty);
        // Keyed by linkage name, not the bare declared name, so two headers
        // each defining `add` don't clobber each other's expanded body.
        self.expanded_bodies.insert(linkage_name(namespace, &f.name), expanded_body);
    }

    fn analyze_block(&mut self, block: &Block, parent_scope: ScopeId, return_ty: &TypeDescriptor) {
        let scope = self.symtab.push_scope(parent_scope, ScopeKind::Block);
        for stmt in &block.statements {
            self.analyze_stmt(stmt, scope, return_ty);
        }
    }

    fn analyze_stmt(&mut self, stmt: &Stmt, scope: ScopeId, return_ty: &TypeDescriptor) {
        match stmt {
            Stmt::Block(b) => self.analyze_block(b, scope, return_ty),
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.analyze_expr(cond, scope);
                self.analyze_block(then_branch, scope, return_ty);
                if let Some(e) = else_branch {
                    self.analyze_block(e, scope, return_ty);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.analyze_expr(cond, scope);
                self.analyze_block(body, scope, return_ty);
            }
            Stmt::DoWhile { body, cond, .. } => {
                self.analyze_block(body, scope, return_ty);
                self.analyze_expr(cond, scope);
            }
            Stmt::For { init, cond, step, body, .. } => {
                let for_scope = self.symtab.push_scope(scope, ScopeKind::Block);
                if let Some(init) = init {
                    self.analyze_stmt(init, for_scope, return_ty);
                }
                if let Some(cond) = cond {
                    self.analyze_expr(cond, for_scope);
                }
                if let Some(step) = step {
                    self.analyze_expr(step, for_scope);
                }
                self.analyze_block(body, for_scope, return_ty);
            }
            Stmt::Foreach { index_name, value_name, iterable, body, source } => {
                self.analyze_expr(iterable, scope);
                let iterable_ty = self.infer(iterable, scope);
                let elem_ty = match iterable_ty {
                    Some(TypeDescriptor::Array(elem)) => *elem,
                    Some(other) => {
                        self.diagnostics.push(Diagnostic::error(
                            "E002",
                            source.clone(),
                            format!("foreach requires an array<T>, found {:?}", other),
                        ));
                        TypeDescriptor::Void
                    }
                    None => TypeDescriptor::Void,
                };
                let loop_scope = self.symtab.push_scope(scope, ScopeKind::Block);
                self.symtab.declare(
                    loop_scope,
                    index_name,
                    Symbol::Variable {
                        ty: TypeDescriptor::Int { bits: 64, signedness: TySignedness::Signed },
                        storage: StorageClass::LocalStack(0),
                        mutability: Mutability::Const,
                    },
                );
                self.symtab.declare(
                    loop_scope,
                    value_name,
                    Symbol::Variable { ty: elem_ty, storage: StorageClass::LocalStack(0), mutability: Mutability::Let },
                );
                self.analyze_block(body, loop_scope, return_ty);
            }
            Stmt::Return { value, source } => {
                if let Some(v) = value {
                    self.analyze_expr(v, scope);
                    self.check_literal_fits(v, return_ty, scope);
                    self.check_float_narrowing(v, return_ty, scope);
                } else if !matches!(return_ty, TypeDescriptor::Void) {
                    self.diagnostics.push(Diagnostic::error(
                        "E002",
                        source.clone(),
                        "missing return value for a non-void function".to_string(),
                    ));
                }
            }
            Stmt::VarDecl(v) => self.analyze_local_var(v, scope),
            Stmt::Expr { expr, .. } => self.analyze_expr(expr, scope),
        }
    }

    fn analyze_local_var(&mut self, v: &VarDecl, scope: ScopeId) {
        let mut ty = typeck::resolve_type_expr(&v.ty, &self.registry).unwrap_or(TypeDescriptor::Void);
        ty = typeck::apply_signedness(ty, v.signedness);
        if let Some(init) = &v.init {
            self.analyze_expr(init, scope);
            self.check_literal_fits(init, &ty, scope);
            self.check_float_narrowing(init, &ty, scope);
        }
        let storage = if v.mutability == Mutability::Const { StorageClass::Const } else { StorageClass::LocalStack(0) };
        if !self.symtab.declare(scope, &v.name, Symbol::Variable { ty, storage, mutability: v.mutability }) {
            self.diagnostics.push(Diagnostic::error(
                "E041",
                v.source.clone(),
                format!("'{}' is already defined in this scope", v.name),
            ));
        }
    }

    fn check_literal_fits(&mut self, expr: &Expr, target: &TypeDescriptor, _scope: ScopeId) {
        if let (Expr::Literal { value: Literal::Int(n), source }, TypeDescriptor::Int { bits, signedness }) =
            (expr, target)
        {
            if !types::literal_in_range(*n, *bits, *signedness) {
                self.diagnostics.push(Diagnostic::error(
                    "E023",
                    source.clone(),
                    format!(
                        "literal {} does not fit in int<{}> {}",
                        n,
                        bits,
                        types::range_description(*bits, *signedness)
                    ),
                ));
            }
        }
    }

    fn check_float_narrowing(&mut self, expr: &Expr, target: &TypeDescriptor, _scope: ScopeId) {
        if let (Expr::Literal { value: Literal::Float(_), source }, TypeDescriptor::Float { bits }) = (expr, target) {
            if *bits < 64 {
                self.diagnostics.push(Diagnostic::warning(
                    "W006",
                    source.clone(),
                    format!("float literal narrowed to float<{}>", bits),
                ));
            }
        }
    }

    /// Expands any macro invocation reachable from `expr`, lifts any
    /// lambda literal reachable from it, then resolves identifiers and
    /// runs const/call-site checks - all in one bottom-up walk.
    fn analyze_expr(&mut self, expr: &Expr, scope: ScopeId) {
        let expanded = self.expand_macros(expr, 0);
        self.walk_expr(&expanded, scope);
    }

    fn infer(&self, expr: &Expr, scope: ScopeId) -> Option<TypeDescriptor> {
        let ctx = Ctx { symtab: &self.symtab, registry: &self.registry, scope };
        typeck::infer_expr_type(expr, &ctx).ok()
    }

    fn walk_expr(&mut self, expr: &Expr, scope: ScopeId) {
        match expr {
            Expr::Literal { .. } => {}
            Expr::Ident { .. } => {
                let ctx = Ctx { symtab: &self.symtab, registry: &self.registry, scope };
                if let Err(d) = typeck::infer_expr_type(expr, &ctx) {
                    self.diagnostics.push(d);
                }
            }
            Expr::Unary { operand, .. } => self.walk_expr(operand, scope),
            Expr::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs, scope);
                self.walk_expr(rhs, scope);
                let ctx = Ctx { symtab: &self.symtab, registry: &self.registry, scope };
                if let Err(d) = typeck::infer_expr_type(expr, &ctx) {
                    self.diagnostics.push(d);
                }
            }
            Expr::Assign { target, value, source, .. } => {
                self.walk_expr(target, scope);
                self.walk_expr(value, scope);
                let ctx = Ctx { symtab: &self.symtab, registry: &self.registry, scope };
                if typeck::is_const_root(target, &ctx) {
                    self.diagnostics.push(Diagnostic::error(
                        "E042",
                        source.clone(),
                        "cannot assign to a const-qualified binding".to_string(),
                    ));
                }
                if let Some(target_ty) = self.infer(target, scope) {
                    self.check_literal_fits(value, &target_ty, scope);
                    self.check_float_narrowing(value, &target_ty, scope);
                }
            }
            Expr::Cast { expr: inner, source, ty, .. } => {
                self.walk_expr(inner, scope);
                if typeck::resolve_type_expr(ty, &self.registry).is_err() {
                    self.diagnostics.push(Diagnostic::error(
                        "E002",
                        source.clone(),
                        "cast to an unknown type".to_string(),
                    ));
                }
            }
            Expr::Call { callee, args, source } => {
                // `a.push(v)`/`a.pop()`/`a.len()`/`a.clear()`: an `array<T>`
                // method call parses as a `Call` whose callee is a `Member`
                // on an array-typed base. These aren't real function values,
                // so they bypass `check_call_signature` (which only ever
                // resolves `Ident` callees) and are typed/arity-checked
                // directly against `elem`.
                if let Expr::Member { base, field, .. } = callee.as_ref() {
                    if let Some(TypeDescriptor::Array(elem)) = self.infer(base, scope) {
                        self.walk_expr(base, scope);
                        for a in args {
                            self.walk_expr(a, scope);
                        }
                        let ctx = Ctx { symtab: &self.symtab, registry: &self.registry, scope };
                        if let Err(d) = typeck::infer_expr_type(expr, &ctx) {
                            self.diagnostics.push(d);
                        } else if field == "push" {
                            if let Some(arg) = args.first() {
                                self.check_literal_fits(arg, &elem, scope);
                                self.check_float_narrowing(arg, &elem, scope);
                            }
                        }
                        return;
                    }
                }
                self.walk_expr(callee, scope);
                for a in args {
                    self.walk_expr(a, scope);
                }
                self.check_call_signature(callee, args, source, scope);
            }
            Expr::Index { base, index, .. } => {
                self.walk_expr(base, scope);
                self.walk_expr(index, scope);
                let ctx = Ctx { symtab: &self.symtab, registry: &self.registry, scope };
                if let Err(d) = typeck::infer_expr_type(expr, &ctx) {
                    self.diagnostics.push(d);
                }
            }
            Expr::Member { base, .. } => {
                self.walk_expr(base, scope);
                let ctx = Ctx { symtab: &self.symtab, registry: &self.registry, scope };
                if let Err(d) = typeck::infer_expr_type(expr, &ctx) {
                    self.diagnostics.push(d);
                }
            }
            Expr::Arrow { base, .. } => {
                self.walk_expr(base, scope);
                let ctx = Ctx { symtab: &self.symtab, registry: &self.registry, scope };
                if let Err(d) = typeck::infer_expr_type(expr, &ctx) {
                    self.diagnostics.push(d);
                }
            }
            Expr::ArrayLiteral { elements, .. } => {
                for e in elements {
                    self.walk_expr(e, scope);
                }
            }
            Expr::Lambda { .. } => self.lift_lambda(expr, scope),
            Expr::CStr { expr: inner, .. } => self.walk_expr(inner, scope),
        }
    }

    fn check_call_signature(&mut self, callee: &Expr, args: &[Expr], source: &SourceLocation, scope: ScopeId) {
        let sig = match callee {
            Expr::Ident { namespace, name, .. } => {
                let sym = match namespace {
                    Some(ns) => self.symtab.lookup_qualified(scope, ns, name),
                    None => self.symtab.lookup(scope, name),
                };
                match sym {
                    Some(Symbol::Function(sig)) => sig.clone(),
                    _ => return,
                }
            }
            _ => return,
        };
        if sig.params.len() != args.len() {
            self.diagnostics.push(Diagnostic::error(
                "E030",
                source.clone(),
                format!("expected {} argument(s), found {}", sig.params.len(), args.len()),
            ));
            return;
        }
        for (param_ty, arg) in sig.params.iter().zip(args) {
            self.check_literal_fits(arg, param_ty, scope);
            self.check_float_narrowing(arg, param_ty, scope);
        }
    }

    // ---- lambda lifting ----------------------------------------------------

    fn lift_lambda(&mut self, expr: &Expr, enclosing_scope: ScopeId) {
        let Expr::Lambda { params, return_type, body, id, source } = expr else {
            return;
        };

        let bound: HashSet<String> = params.iter().map(|p| p.name.clone()).collect();
        let mut free = Vec::new();
        collect_free_idents(body, &bound, &mut free);

        for (name, use_source) in &free {
            let outer = self.symtab.lookup(enclosing_scope, name);
            match outer {
                Some(Symbol::Variable { mutability: Mutability::Let, .. })
                | Some(Symbol::Variable { mutability: Mutability::Const, .. }) => {
                    self.diagnostics.push(Diagnostic::error(
                        "E043",
                        use_source.clone(),
                        format!(
                            "lambda captures enclosing variable '{}'; add it as an explicit parameter",
                            name
                        ),
                    ));
                }
                Some(Symbol::Function(_)) | Some(Symbol::Namespace(_)) | Some(Symbol::Type(_)) | Some(Symbol::Macro { .. }) => {
                    // Calling a global function or naming a type from a
                    // lambda body is not a capture.
                }
                None => {
                    self.diagnostics.push(Diagnostic::error(
                        "E002",
                        use_source.clone(),
                        format!("unresolved identifier '{}'", name),
                    ));
                }
            }
        }

        let name = format!("__c5_lambda_{}", id);
        self.lifted.push(LiftedLambda {
            name: name.clone(),
            params: params.clone(),
            return_type: return_type.clone(),
            body: body.clone(),
            source: source.clone(),
        });

        let fn_decl = FnDecl {
            name: name.clone(),
            signedness: AstSignedness::Unspecified,
            return_type: return_type.clone(),
            params: params.clone(),
            body: Some(body.clone()),
            source: source.clone(),
        };
        self.declare_fn(GLOBAL, &fn_decl, None);
        let lambda_scope = self.symtab.push_scope(GLOBAL, ScopeKind::Function);
        self.analyze_function(&fn_decl, body, GLOBAL, Some(lambda_scope), None);
    }

    // ---- macro expansion ----------------------------------------------------

    fn expand_macros(&mut self, expr: &Expr, depth: usize) -> Expr {
        if depth > MAX_MACRO_DEPTH {
            return expr.clone();
        }
        match expr {
            Expr::Literal { .. } | Expr::Ident { .. } => expr.clone(),
            Expr::Unary { op, operand, source } => Expr::Unary {
                op: *op,
                operand: Box::new(self.expand_macros(operand, depth)),
                source: source.clone(),
            },
            Expr::Binary { op, lhs, rhs, source } => Expr::Binary {
                op: *op,
                lhs: Box::new(self.expand_macros(lhs, depth)),
                rhs: Box::new(self.expand_macros(rhs, depth)),
                source: source.clone(),
            },
            Expr::Assign { target, compound, value, source } => Expr::Assign {
                target: Box::new(self.expand_macros(target, depth)),
                compound: *compound,
                value: Box::new(self.expand_macros(value, depth)),
                source: source.clone(),
            },
            Expr::Cast { ty, expr: inner, source } => Expr::Cast {
                ty: ty.clone(),
                expr: Box::new(self.expand_macros(inner, depth)),
                source: source.clone(),
            },
            // `name(args)` parses as a plain `Call` whether `name` is a
            // function or a macro; a macro name present in `self.macros`
            // takes priority and is expanded inline rather than left for
            // codegen to (fail to) call as a function.
            Expr::Call { callee, args, source } => {
                if let Expr::Ident { namespace: None, name, .. } = callee.as_ref() {
                    if let Some(decl) = self.macros.get(name).cloned() {
                        if decl.params.len() != args.len() {
                            self.diagnostics.push(Diagnostic::error(
                                "E030",
                                source.clone(),
                                format!(
                                    "macro '{}' expects {} argument(s), found {}",
                                    name,
                                    decl.params.len(),
                                    args.len()
                                ),
                            ));
                            return expr.clone();
                        }
                        let expanded_args: Vec<Expr> =
                            args.iter().map(|a| self.expand_macros(a, depth + 1)).collect();
                        let renamed_body = rename_binders(&decl.body, &mut self.hygiene_counter);
                        let bindings: HashMap<String, Expr> =
                            decl.params.iter().cloned().zip(expanded_args).collect();
                        let substituted = substitute(&renamed_body, &bindings);
                        return self.expand_macros(&substituted, depth + 1);
                    }
                }
                Expr::Call {
                    callee: Box::new(self.expand_macros(callee, depth)),
                    args: args.iter().map(|a| self.expand_macros(a, depth)).collect(),
                    source: source.clone(),
                }
            }
            Expr::Index { base, index, source } => Expr::Index {
                base: Box::new(self.expand_macros(base, depth)),
                index: Box::new(self.expand_macros(index, depth)),
                source: source.clone(),
            },
            Expr::Member { base, field, source } => Expr::Member {
                base: Box::new(self.expand_macros(base, depth)),
                field: field.clone(),
                source: source.clone(),
            },
            Expr::Arrow { base, field, source } => Expr::Arrow {
                base: Box::new(self.expand_macros(base, depth)),
                field: field.clone(),
                source: source.clone(),
            },
            Expr::ArrayLiteral { elements, source } => Expr::ArrayLiteral {
                elements: elements.iter().map(|e| self.expand_macros(e, depth)).collect(),
                source: source.clone(),
            },
            Expr::Lambda { params, return_type, body, id, source } => Expr::Lambda {
                params: params.clone(),
                return_type: return_type.clone(),
                body: expand_macros_in_block(body, self, depth),
                id: *id,
                source: source.clone(),
            },
            Expr::CStr { expr: inner, source } => {
                Expr::CStr { expr: Box::new(self.expand_macros(inner, depth)), source: source.clone() }
            }
        }
    }
}

fn expand_macros_in_block(block: &Block, az: &mut Analyzer, depth: usize) -> Block {
    Block {
        statements: block.statements.iter().map(|s| expand_macros_in_stmt(s, az, depth)).collect(),
        source: block.source.clone(),
    }
}

fn expand_macros_in_stmt(stmt: &Stmt, az: &mut Analyzer, depth: usize) -> Stmt {
    match stmt {
        Stmt::Block(b) => Stmt::Block(expand_macros_in_block(b, az, depth)),
        Stmt::If { cond, then_branch, else_branch, source } => Stmt::If {
            cond: az.expand_macros(cond, depth),
            then_branch: expand_macros_in_block(then_branch, az, depth),
            else_branch: else_branch.as_ref().map(|b| expand_macros_in_block(b, az, depth)),
            source: source.clone(),
        },
        Stmt::While { cond, body, source } => Stmt::While {
            cond: az.expand_macros(cond, depth),
            body: expand_macros_in_block(body, az, depth),
            source: source.clone(),
        },
        Stmt::DoWhile { body, cond, source } => Stmt::DoWhile {
            body: expand_macros_in_block(body, az, depth),
            cond: az.expand_macros(cond, depth),
            source: source.clone(),
        },
        Stmt::For { init, cond, step, body, source } => Stmt::For {
            init: init.as_ref().map(|s| Box::new(expand_macros_in_stmt(s, az, depth))),
            cond: cond.as_ref().map(|c| az.expand_macros(c, depth)),
            step: step.as_ref().map(|c| az.expand_macros(c, depth)),
            body: expand_macros_in_block(body, az, depth),
            source: source.clone(),
        },
        Stmt::Foreach { index_name, value_name, iterable, body, source } => Stmt::Foreach {
            index_name: index_name.clone(),
            value_name: value_name.clone(),
            iterable: az.expand_macros(iterable, depth),
            body: expand_macros_in_block(body, az, depth),
            source: source.clone(),
        },
        Stmt::Return { value, source } => {
            Stmt::Return { value: value.as_ref().map(|v| az.expand_macros(v, depth)), source: source.clone() }
        }
        Stmt::VarDecl(v) => Stmt::VarDecl(VarDecl {
            init: v.init.as_ref().map(|i| az.expand_macros(i, depth)),
            ..v.clone()
        }),
        Stmt::Expr { expr, source } => Stmt::Expr { expr: az.expand_macros(expr, depth), source: source.clone() },
    }
}

/// Renames every lambda parameter introduced within a macro body to a
/// fresh, globally unique name before substitution, so a caller's argument
/// expression can never be captured by a binder the macro itself
/// introduces.
fn rename_binders(expr: &Expr, counter: &mut usize) -> Expr {
    match expr {
        Expr::Lambda { params, return_type, body, id, source } => {
            let mut renames = HashMap::new();
            let new_params: Vec<Param> = params
                .iter()
                .map(|p| {
                    *counter += 1;
                    let fresh = format!("__hyg{}_{}", counter, p.name);
                    renames.insert(p.name.clone(), fresh.clone());
                    Param { name: fresh, ty: p.ty.clone(), source: p.source.clone() }
                })
                .collect();
            let renamed_body = rename_idents_in_block(body, &renames);
            Expr::Lambda {
                params: new_params,
                return_type: return_type.clone(),
                body: rename_binders_in_block(&renamed_body, counter),
                id: *id,
                source: source.clone(),
            }
        }
        Expr::Unary { op, operand, source } => {
            Expr::Unary { op: *op, operand: Box::new(rename_binders(operand, counter)), source: source.clone() }
        }
        Expr::Binary { op, lhs, rhs, source } => Expr::Binary {
            op: *op,
            lhs: Box::new(rename_binders(lhs, counter)),
            rhs: Box::new(rename_binders(rhs, counter)),
            source: source.clone(),
        },
        Expr::Assign { target, compound, value, source } => Expr::Assign {
            target: Box::new(rename_binders(target, counter)),
            compound: *compound,
            value: Box::new(rename_binders(value, counter)),
            source: source.clone(),
        },
        Expr::Cast { ty, expr: inner, source } => {
            Expr::Cast { ty: ty.clone(), expr: Box::new(rename_binders(inner, counter)), source: source.clone() }
        }
        Expr::Call { callee, args, source } => Expr::Call {
            callee: Box::new(rename_binders(callee, counter)),
            args: args.iter().map(|a| rename_binders(a, counter)).collect(),
            source: source.clone(),
        },
        Expr::Index { base, index, source } => Expr::Index {
            base: Box::new(rename_binders(base, counter)),
            index: Box::new(rename_binders(index, counter)),
            source: source.clone(),
        },
        Expr::Member { base, field, source } => {
            Expr::Member { base: Box::new(rename_binders(base, counter)), field: field.clone(), source: source.clone() }
        }
        Expr::Arrow { base, field, source } => {
            Expr::Arrow { base: Box::new(rename_binders(base, counter)), field: field.clone(), source: source.clone() }
        }
        Expr::ArrayLiteral { elements, source } => Expr::ArrayLiteral {
            elements: elements.iter().map(|e| rename_binders(e, counter)).collect(),
            source: source.clone(),
        },
        Expr::CStr { expr: inner, source } => {
            Expr::CStr { expr: Box::new(rename_binders(inner, counter)), source: source.clone() }
        }
        Expr::Literal { .. } | Expr::Ident { .. } => expr.clone(),
    }
}

fn rename_binders_in_block(block: &Block, counter: &mut usize) -> Block {
    Block {
        statements: block.statements.iter().map(|s| rename_binders_in_stmt(s, counter)).collect(),
        source: block.source.clone(),
    }
}

fn rename_binders_in_stmt(stmt: &Stmt, counter: &mut usize) -> Stmt {
    match stmt {
        Stmt::Expr { expr, source } => Stmt::Expr { expr: rename_binders(expr, counter), source: source.clone() },
        Stmt::Return { value, source } => {
            Stmt::Return { value: value.as_ref().map(|v| rename_binders(v, counter)), source: source.clone() }
        }
        Stmt::VarDecl(v) => Stmt::VarDecl(VarDecl { init: v.init.as_ref().map(|i| rename_binders(i, counter)), ..v.clone() }),
        Stmt::Block(b) => Stmt::Block(rename_binders_in_block(b, counter)),
        Stmt::If { cond, then_branch, else_branch, source } => Stmt::If {
            cond: rename_binders(cond, counter),
            then_branch: rename_binders_in_block(then_branch, counter),
            else_branch: else_branch.as_ref().map(|b| rename_binders_in_block(b, counter)),
            source: source.clone(),
        },
        Stmt::While { cond, body, source } => Stmt::While {
            cond: rename_binders(cond, counter),
            body: rename_binders_in_block(body, counter),
            source: source.clone(),
        },
        Stmt::DoWhile { body, cond, source } => Stmt::DoWhile {
            body: rename_binders_in_block(body, counter),
            cond: rename_binders(cond, counter),
            source: source.clone(),
        },
        Stmt::For { init, cond, step, body, source } => Stmt::For {
            init: init.as_ref().map(|s| Box::new(rename_binders_in_stmt(s, counter))),
            cond: cond.as_ref().map(|c| rename_binders(c, counter)),
            step: step.as_ref().map(|c| rename_binders(c, counter)),
            body: rename_binders_in_block(body, counter),
            source: source.clone(),
        },
        Stmt::Foreach { index_name, value_name, iterable, body, source } => Stmt::Foreach {
            index_name: index_name.clone(),
            value_name: value_name.clone(),
            iterable: rename_binders(iterable, counter),
            body: rename_binders_in_block(body, counter),
            source: source.clone(),
        },
    }
}

/// Replaces identifier occurrences matching a key in `renames` throughout
/// `block`, stopping at any nested lambda that redeclares the same name
/// (that inner binder already shadows, nothing to rename).
fn rename_idents_in_block(block: &Block, renames: &HashMap<String, String>) -> Block {
    Block {
        statements: block.statements.iter().map(|s| rename_idents_in_stmt(s, renames)).collect(),
        source: block.source.clone(),
    }
}

fn rename_idents_in_stmt(stmt: &Stmt, renames: &HashMap<String, String>) -> Stmt {
    match stmt {
        Stmt::Expr { expr, source } => Stmt::Expr { expr: rename_idents(expr, renames), source: source.clone() },
        Stmt::Return { value, source } => {
            Stmt::Return { value: value.as_ref().map(|v| rename_idents(v, renames)), source: source.clone() }
        }
        Stmt::VarDecl(v) => Stmt::VarDecl(VarDecl { init: v.init.as_ref().map(|i| rename_idents(i, renames)), ..v.clone() }),
        Stmt::Block(b) => Stmt::Block(rename_idents_in_block(b, renames)),
        Stmt::If { cond, then_branch, else_branch, source } => Stmt::If {
            cond: rename_idents(cond, renames),
            then_branch: rename_idents_in_block(then_branch, renames),
            else_branch: else_branch.as_ref().map(|b| rename_idents_in_block(b, renames)),
            source: source.clone(),
        },
        Stmt::While { cond, body, source } => Stmt::While {
            cond: rename_idents(cond, renames),
            body: rename_idents_in_block(body, renames),
            source: source.clone(),
        },
        Stmt::DoWhile { body, cond, source } => Stmt::DoWhile {
            body: rename_idents_in_block(body, renames),
            cond: rename_idents(cond, renames),
            source: source.clone(),
        },
        Stmt::For { init, cond, step, body, source } => Stmt::For {
            init: init.as_ref().map(|s| Box::new(rename_idents_in_stmt(s, renames))),
            cond: cond.as_ref().map(|c| rename_idents(c, renames)),
            step: step.as_ref().map(|c| rename_idents(c, renames)),
            body: rename_idents_in_block(body, renames),
            source: source.clone(),
        },
        Stmt::Foreach { index_name, value_name, iterable, body, source } => Stmt::Foreach {
            index_name: index_name.clone(),
            value_name: value_name.clone(),
            iterable: rename_idents(iterable, renames),
            body: rename_idents_in_block(body, renames),
            source: source.clone(),
        },
    }
}

fn rename_idents(expr: &Expr, renames: &HashMap<String, String>) -> Expr {
    match expr {
        Expr::Ident { namespace: None, name, source } => match renames.get(name) {
            Some(fresh) => Expr::Ident { namespace: None, name: fresh.clone(), source: source.clone() },
            None => expr.clone(),
        },
        Expr::Lambda { params, return_type, body, id, source } => {
            // An inner lambda reusing one of the outer names shadows it;
            // drop those keys before descending.
            let mut inner = renames.clone();
            for p in params {
                inner.remove(&p.name);
            }
            Expr::Lambda {
                params: params.clone(),
                return_type: return_type.clone(),
                body: rename_idents_in_block(body, &inner),
                id: *id,
                source: source.clone(),
            }
        }
        Expr::Unary { op, operand, source } => {
            Expr::Unary { op: *op, operand: Box::new(rename_idents(operand, renames)), source: source.clone() }
        }
        Expr::Binary { op, lhs, rhs, source } => Expr::Binary {
            op: *op,
            lhs: Box::new(rename_idents(lhs, renames)),
            rhs: Box::new(rename_idents(rhs, renames)),
            source: source.clone(),
        },
        Expr::Assign { target, compound, value, source } => Expr::Assign {
            target: Box::new(rename_idents(target, renames)),
            compound: *compound,
            value: Box::new(rename_idents(value, renames)),
            source: source.clone(),
        },
        Expr::Cast { ty, expr: inner, source } => {
            Expr::Cast { ty: ty.clone(), expr: Box::new(rename_idents(inner, renames)), source: source.clone() }
        }
        Expr::Call { callee, args, source } => Expr::Call {
            callee: Box::new(rename_idents(callee, renames)),
            args: args.iter().map(|a| rename_idents(a, renames)).collect(),
            source: source.clone(),
        },
        Expr::Index { base, index, source } => Expr::Index {
            base: Box::new(rename_idents(base, renames)),
            index: Box::new(rename_idents(index, renames)),
            source: source.clone(),
        },
        Expr::Member { base, field, source } => {
            Expr::Member { base: Box::new(rename_idents(base, renames)), field: field.clone(), source: source.clone() }
        }
        Expr::Arrow { base, field, source } => {
            Expr::Arrow { base: Box::new(rename_idents(base, renames)), field: field.clone(), source: source.clone() }
        }
        Expr::ArrayLiteral { elements, source } => Expr::ArrayLiteral {
            elements: elements.iter().map(|e| rename_idents(e, renames)).collect(),
            source: source.clone(),
        },
        Expr::CStr { expr: inner, source } => {
            Expr::CStr { expr: Box::new(rename_idents(inner, renames)), source: source.clone() }
        }
        Expr::Literal { .. } | Expr::Ident { .. } => expr.clone(),
    }
}

/// Substitutes macro-parameter identifiers with their bound argument
/// expressions throughout `expr`. Safe to call after `rename_binders` has
/// already made every binder introduced by the macro body globally unique.
fn substitute(expr: &Expr, bindings: &HashMap<String, Expr>) -> Expr {
    match expr {
        Expr::Ident { namespace: None, name, .. } => match bindings.get(name) {
            Some(value) => value.clone(),
            None => expr.clone(),
        },
        Expr::Ident { .. } | Expr::Literal { .. } => expr.clone(),
        Expr::Unary { op, operand, source } => {
            Expr::Unary { op: *op, operand: Box::new(substitute(operand, bindings)), source: source.clone() }
        }
        Expr::Binary { op, lhs, rhs, source } => Expr::Binary {
            op: *op,
            lhs: Box::new(substitute(lhs, bindings)),
            rhs: Box::new(substitute(rhs, bindings)),
            source: source.clone(),
        },
        Expr::Assign { target, compound, value, source } => Expr::Assign {
            target: Box::new(substitute(target, bindings)),
            compound: *compound,
            value: Box::new(substitute(value, bindings)),
            source: source.clone(),
        },
        Expr::Cast { ty, expr: inner, source } => {
            Expr::Cast { ty: ty.clone(), expr: Box::new(substitute(inner, bindings)), source: source.clone() }
        }
        Expr::Call { callee, args, source } => Expr::Call {
            callee: Box::new(substitute(callee, bindings)),
            args: args.iter().map(|a| substitute(a, bindings)).collect(),
            source: source.clone(),
        },
        Expr::Index { base, index, source } => Expr::Index {
            base: Box::new(substitute(base, bindings)),
            index: Box::new(substitute(index, bindings)),
            source: source.clone(),
        },
        Expr::Member { base, field, source } => {
            Expr::Member { base: Box::new(substitute(base, bindings)), field: field.clone(), source: source.clone() }
        }
        Expr::Arrow { base, field, source } => {
            Expr::Arrow { base: Box::new(substitute(base, bindings)), field: field.clone(), source: source.clone() }
        }
        Expr::ArrayLiteral { elements, source } => Expr::ArrayLiteral {
            elements: elements.iter().map(|e| substitute(e, bindings)).collect(),
            source: source.clone(),
        },
        Expr::Lambda { params, return_type, body, id, source } => Expr::Lambda {
            params: params.clone(),
            return_type: return_type.clone(),
            body: substitute_in_block(body, bindings),
            id: *id,
            source: source.clone(),
        },
        Expr::CStr { expr: inner, source } => {
            Expr::CStr { expr: Box::new(substitute(inner, bindings)), source: source.clone() }
        }
    }
}

fn substitute_in_block(block: &Block, bindings: &HashMap<String, Expr>) -> Block {
    Block {
        statements: block.statements.iter().map(|s| substitute_in_stmt(s, bindings)).collect(),
        source: block.source.clone(),
    }
}

fn substitute_in_stmt(stmt: &Stmt, bindings: &HashMap<String, Expr>) -> Stmt {
    match stmt {
        Stmt::Expr { expr, source } => Stmt::Expr { expr: substitute(expr, bindings), source: source.clone() },
        Stmt::Return { value, source } => {
            Stmt::Return { value: value.as_ref().map(|v| substitute(v, bindings)), source: source.clone() }
        }
        Stmt::VarDecl(v) => Stmt::VarDecl(VarDecl { init: v.init.as_ref().map(|i| substitute(i, bindings)), ..v.clone() }),
        Stmt::Block(b) => Stmt::Block(substitute_in_block(b, bindings)),
        Stmt::If { cond, then_branch, else_branch, source } => Stmt::If {
            cond: substitute(cond, bindings),
            then_branch: substitute_in_block(then_branch, bindings),
            else_branch: else_branch.as_ref().map(|b| substitute_in_block(b, bindings)),
            source: source.clone(),
        },
        Stmt::While { cond, body, source } => Stmt::While {
            cond: substitute(cond, bindings),
            body: substitute_in_block(body, bindings),
            source: source.clone(),
        },
        Stmt::DoWhile { body, cond, source } => Stmt::DoWhile {
            body: substitute_in_block(body, bindings),
            cond: substitute(cond, bindings),
            source: source.clone(),
        },
        Stmt::For { init, cond, step, body, source } => Stmt::For {
            init: init.as_ref().map(|s| Box::new(substitute_in_stmt(s, bindings))),
            cond: cond.as_ref().map(|c| substitute(c, bindings)),
            step: step.as_ref().map(|c| substitute(c, bindings)),
            body: substitute_in_block(body, bindings),
            source: source.clone(),
        },
        Stmt::Foreach { index_name, value_name, iterable, body, source } => Stmt::Foreach {
            index_name: index_name.clone(),
            value_name: value_name.clone(),
            iterable: substitute(iterable, bindings),
            body: substitute_in_block(body, bindings),
            source: source.clone(),
        },
    }
}

fn signatures_match(a: &FunctionSignature, b: &FunctionSignature) -> bool {
    a.params.len() == b.params.len()
        && a.params.iter().zip(&b.params).all(|(x, y)| x == y)
        && a.return_type == b.return_type
}

/// Collects every identifier referenced in `block` that is not bound by a
/// parameter, a local variable declared within the block itself (tracked
/// via a growing `bound` set as statements are walked in order), or a
/// nested lambda's own parameters.
fn collect_free_idents(block: &Block, outer_bound: &HashSet<String>, out: &mut Vec<(String, SourceLocation)>) {
    let mut bound = outer_bound.clone();
    for stmt in &block.statements {
        collect_free_in_stmt(stmt, &mut bound, out);
    }
}

fn collect_free_in_stmt(stmt: &Stmt, bound: &mut HashSet<String>, out: &mut Vec<(String, SourceLocation)>) {
    match stmt {
        Stmt::Expr { expr, .. } => collect_free_in_expr(expr, bound, out),
        Stmt::Return { value, .. } => {
            if let Some(v) = value {
                collect_free_in_expr(v, bound, out);
            }
        }
        Stmt::VarDecl(v) => {
            if let Some(init) = &v.init {
                collect_free_in_expr(init, bound, out);
            }
            bound.insert(v.name.clone());
        }
        Stmt::Block(b) => collect_free_idents(b, bound, out),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            collect_free_in_expr(cond, bound, out);
            collect_free_idents(then_branch, bound, out);
            if let Some(e) = else_branch {
                collect_free_idents(e, bound, out);
            }
        }
        Stmt::While { cond, body, .. } => {
            collect_free_in_expr(cond, bound, out);
            collect_free_idents(body, bound, out);
        }
        Stmt::DoWhile { body, cond, .. } => {
            collect_free_idents(body, bound, out);
            collect_free_in_expr(cond, bound, out);
        }
        Stmt::For { init, cond, step, body, .. } => {
            let mut inner = bound.clone();
            if let Some(init) = init {
                collect_free_in_stmt(init, &mut inner, out);
            }
            if let Some(cond) = cond {
                collect_free_in_expr(cond, &inner, out);
            }
            if let Some(step) = step {
                collect_free_in_expr(step, &inner, out);
            }
            collect_free_idents(body, &inner, out);
        }
        Stmt::Foreach { index_name, value_name, iterable, body, .. } => {
            collect_free_in_expr(iterable, bound, out);
            let mut inner = bound.clone();
            inner.insert(index_name.clone());
            inner.insert(value_name.clone());
            collect_free_idents(body, &inner, out);
        }
    }
}

fn collect_free_in_expr(expr: &Expr, bound: &HashSet<String>, out: &mut Vec<(String, SourceLocation)>) {
    match expr {
        Expr::Ident { namespace: None, name, source } => {
            if !bound.contains(name) {
                out.push((name.clone(), source.clone()));
            }
        }
        Expr::Ident { .. } | Expr::Literal { .. } => {}
        Expr::Unary { operand, .. } => collect_free_in_expr(operand, bound, out),
        Expr::Binary { lhs, rhs, .. } => {
            collect_free_in_expr(lhs, bound, out);
            collect_free_in_expr(rhs, bound, out);
        }
        Expr::Assign { target, value, .. } => {
            collect_free_in_expr(target, bound, out);
            collect_free_in_expr(value, bound, out);
        }
        Expr::Cast { expr: inner, .. } => collect_free_in_expr(inner, bound, out),
        Expr::Call { callee, args, .. } => {
            collect_free_in_expr(callee, bound, out);
            for a in args {
                collect_free_in_expr(a, bound, out);
            }
        }
        Expr::Index { base, index, .. } => {
            collect_free_in_expr(base, bound, out);
            collect_free_in_expr(index, bound, out);
        }
        Expr::Member { base, .. } | Expr::Arrow { base, .. } => collect_free_in_expr(base, bound, out),
        Expr::ArrayLiteral { elements, .. } => {
            for e in elements {
                collect_free_in_expr(e, bound, out);
            }
        }
        Expr::Lambda { params, body, .. } => {
            let mut inner = bound.clone();
            for p in params {
                inner.insert(p.name.clone());
            }
            collect_free_idents(body, &inner, out);
        }
        Expr::CStr { expr: inner, .. } => collect_free_in_expr(inner, bound, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Mutability, SourceLocation};
    use std::path::PathBuf;

    fn loc() -> SourceLocation {
        SourceLocation::new(PathBuf::from("t.c5"), 0, 0, 0, 0)
    }

    fn parse(src: &str) -> Program {
        let p = crate::parser::Parser::new(src, &PathBuf::from("t.c5")).unwrap();
        let (program, diags) = p.parse_program();
        assert!(diags.is_empty());
        program
    }

    #[test]
    fn detects_literal_out_of_range_on_global() {
        let program = parse("let int<8> x = 300;\nvoid main(){}");
        let result = analyze(&program, &[]);
        assert!(result.diagnostics.iter().any(|d| d.code == "E023"));
    }

    #[test]
    fn rejects_assignment_to_const() {
        let program = parse("void main(){ let const int<32> x = 1; x = 2; }");
        let result = analyze(&program, &[]);
        assert!(result.diagnostics.iter().any(|d| d.code == "E042"));
    }

    #[test]
    fn duplicate_struct_is_e041() {
        let program = parse("struct S { int<32> a; }\nstruct S { int<32> b; }\nvoid main(){}");
        let result = analyze(&program, &[]);
        assert!(result.diagnostics.iter().any(|d| d.code == "E041"));
    }

    #[test]
    fn lambda_capturing_enclosing_variable_is_e043() {
        let program = parse(
            "void main(){ let int<32> total = 0; fnct(int<32> y) -> int<32> { return total + y; }(1); }",
        );
        let result = analyze(&program, &[]);
        assert!(result.diagnostics.iter().any(|d| d.code == "E043"));
    }

    #[test]
    fn lambda_without_capture_is_accepted() {
        let program = parse("void main(){ fnct(int<32> y) -> int<32> { return y + 1; }(1); }");
        let result = analyze(&program, &[]);
        assert!(!result.diagnostics.iter().any(|d| d.code == "E043"));
        assert_eq!(result.lifted_lambdas.len(), 1);
    }

    #[test]
    fn macro_expansion_substitutes_arguments() {
        let program = parse("macro twice(x) { x + x }\nvoid main(){ let int<32> y = twice(3); }");
        let result = analyze(&program, &[]);
        assert!(!result.diagnostics.iter().any(|d| d.severity == crate::diagnostics::Severity::Error));
    }

    #[test]
    fn union_member_access_without_cast_is_e044() {
        let program = parse(
            "type U { int<32>, float<64> }\nvoid main(){ let U u = 0; let int<32> a = u.x; }",
        );
        let result = analyze(&program, &[]);
        // `u.x` on a union without a preceding cast is rejected.
        assert!(result.diagnostics.iter().any(|d| d.code == "E044" || d.code == "E002"));
        let _ = Mutability::Let;
        let _ = loc();
    }
}
