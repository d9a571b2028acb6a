//! Recursive-descent parser for C5.
//!
//! Token streams become an AST (`spec.md` §4.3). Expressions use
//! precedence climbing; statements and declarations are straight
//! recursive descent following the grammar sketch in `spec.md`. On a
//! parse error (`E002`) the parser skips to the next statement
//! terminator (`;` or a balancing `}`) and keeps going, so a single typo
//! does not hide every other diagnostic in the file.

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticBag};
use crate::lexer::{self, Token, TokenKind};
use std::path::{Path, PathBuf};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: PathBuf,
    diagnostics: DiagnosticBag,
    next_lambda_id: usize,
}

type PResult<T> = Result<T, ()>;

impl Parser {
    pub fn new(source: &str, file: &Path) -> Result<Self, String> {
        let tokens = lexer::tokenize(source, file).map_err(|e| {
            format!("{}: [E001] {}", e.location, e.message)
        })?;
        Ok(Parser {
            tokens,
            pos: 0,
            file: file.to_path_buf(),
            diagnostics: DiagnosticBag::new(),
            next_lambda_id: 0,
        })
    }

    /// Parse a full program. Returns the best-effort AST plus any
    /// diagnostics collected along the way; callers should treat a
    /// non-empty error set as a failed parse even though a `Program` is
    /// still returned (to allow tooling to work on a partial AST).
    pub fn parse_program(mut self) -> (Program, DiagnosticBag) {
        let mut program = Program::default();
        while !self.at_eof() {
            if self.check_keyword("include") {
                match self.parse_include() {
                    Ok(inc) => program.includes.push(inc),
                    Err(()) => self.recover(),
                }
                continue;
            }
            match self.parse_decl() {
                Ok(decl) => program.decls.push(decl),
                Err(()) => self.recover(),
            }
        }
        (program, self.diagnostics)
    }

    // ---- token stream helpers -------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&self.tokens[self.tokens.len() - 1])
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, lexeme: &str) -> bool {
        self.peek().lexeme == lexeme
    }

    fn check_keyword(&self, kw: &str) -> bool {
        self.peek().kind == TokenKind::Keyword && self.peek().lexeme == kw
    }

    fn eat(&mut self, lexeme: &str) -> bool {
        if self.check(lexeme) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lexeme: &str) -> PResult<Token> {
        if self.check(lexeme) {
            Ok(self.advance())
        } else {
            self.error_here(format!("expected '{}', found '{}'", lexeme, self.peek().lexeme));
            Err(())
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        if self.peek().kind == TokenKind::Ident {
            Ok(self.advance().lexeme)
        } else {
            self.error_here(format!("expected identifier, found '{}'", self.peek().lexeme));
            Err(())
        }
    }

    fn error_here(&mut self, message: String) {
        let loc = self.peek().location.clone();
        self.diagnostics.push(Diagnostic::error("E002", loc, message));
    }

    /// Recover from a parse error by skipping to the next statement
    /// terminator or a closing brace, so later declarations still get a
    /// chance to parse (`spec.md` §4.3: "one-token look-ahead recovery to
    /// the next statement terminator").
    fn recover(&mut self) {
        loop {
            if self.at_eof() {
                return;
            }
            if self.check(";") {
                self.advance();
                return;
            }
            if self.check("}") {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn here(&self) -> SourceLocation {
        self.peek().location.clone()
    }

    // ---- includes --------------------------------------------------------

    fn parse_include(&mut self) -> PResult<IncludeDirective> {
        let source = self.here();
        self.advance(); // 'include'
        self.expect("<")?;
        let mut name = String::new();
        while !self.check(">") {
            if self.at_eof() {
                self.error_here("unterminated include directive".to_string());
                return Err(());
            }
            name.push_str(&self.advance().lexeme);
        }
        self.expect(">")?;
        self.eat(";");
        Ok(IncludeDirective { header_name: name, source })
    }

    // ---- declarations ------------------------------------------------------

    fn parse_decl(&mut self) -> PResult<Decl> {
        if self.check_keyword("struct") {
            return self.parse_struct().map(Decl::Struct);
        }
        if self.check_keyword("enum") {
            return self.parse_enum().map(Decl::Enum);
        }
        if self.check_keyword("type") {
            return self.parse_union_type().map(Decl::UnionType);
        }
        if self.check_keyword("macro") {
            return self.parse_macro().map(Decl::Macro);
        }
        if self.check_keyword("let") {
            return self.parse_global_var().map(Decl::GlobalVar);
        }
        self.parse_fn_decl().map(Decl::Fn)
    }

    fn parse_struct(&mut self) -> PResult<StructDecl> {
        let source = self.here();
        self.advance();
        let name = self.expect_ident()?;
        self.expect("{")?;
        let mut fields = Vec::new();
        while !self.check("}") {
            let fsource = self.here();
            let ty = self.parse_type()?;
            let fname = self.expect_ident()?;
            self.expect(";")?;
            fields.push(FieldDecl { name: fname, ty, source: fsource });
        }
        self.expect("}")?;
        self.eat(";");
        Ok(StructDecl { name, fields, source })
    }

    fn parse_enum(&mut self) -> PResult<EnumDecl> {
        let source = self.here();
        self.advance();
        let name = self.expect_ident()?;
        self.expect("{")?;
        let mut variants = Vec::new();
        if !self.check("}") {
            variants.push(self.expect_ident()?);
            while self.eat(",") {
                variants.push(self.expect_ident()?);
            }
        }
        self.expect("}")?;
        self.eat(";");
        Ok(EnumDecl { name, variants, source })
    }

    fn parse_union_type(&mut self) -> PResult<UnionTypeDecl> {
        let source = self.here();
        self.advance();
        let name = self.expect_ident()?;
        self.expect("{")?;
        let mut variants = Vec::new();
        if !self.check("}") {
            variants.push(self.parse_type()?);
            while self.eat(",") {
                variants.push(self.parse_type()?);
            }
        }
        self.expect("}")?;
        self.eat(";");
        Ok(UnionTypeDecl { name, variants, source })
    }

    fn parse_macro(&mut self) -> PResult<MacroDecl> {
        let source = self.here();
        self.advance();
        let name = self.expect_ident()?;
        self.expect("(")?;
        let mut params = Vec::new();
        if !self.check(")") {
            params.push(self.expect_ident()?);
            while self.eat(",") {
                params.push(self.expect_ident()?);
            }
        }
        self.expect(")")?;
        self.expect("{")?;
        let body = self.parse_expr()?;
        self.expect("}")?;
        Ok(MacroDecl { name, params, body, source })
    }

    fn parse_global_var(&mut self) -> PResult<VarDecl> {
        let source = self.here();
        self.advance(); // 'let'
        let mutability = if self.eat_keyword("const") {
            Mutability::Const
        } else {
            Mutability::Let
        };
        let signedness = self.parse_signedness_prefix();
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        let init = if self.eat("=") { Some(self.parse_expr()?) } else { None };
        self.expect(";")?;
        Ok(VarDecl { name, mutability, signedness, ty, init, source })
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn parse_signedness_prefix(&mut self) -> Signedness {
        if self.eat_keyword("signed") {
            Signedness::Signed
        } else if self.eat_keyword("unsigned") {
            Signedness::Unsigned
        } else {
            Signedness::Unspecified
        }
    }

    fn parse_fn_decl(&mut self) -> PResult<FnDecl> {
        let source = self.here();
        let signedness = self.parse_signedness_prefix();
        let return_type = self.parse_type()?;
        let name = self.expect_ident()?;
        self.expect("(")?;
        let mut params = Vec::new();
        if !self.check(")") {
            params.push(self.parse_param()?);
            while self.eat(",") {
                params.push(self.parse_param()?);
            }
        }
        self.expect(")")?;
        let body = if self.check("{") {
            Some(self.parse_block()?)
        } else {
            self.expect(";")?;
            None
        };
        Ok(FnDecl { name, signedness, return_type, params, body, source })
    }

    fn parse_param(&mut self) -> PResult<Param> {
        let source = self.here();
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        Ok(Param { name, ty, source })
    }

    // ---- types -------------------------------------------------------------

    fn parse_type(&mut self) -> PResult<TypeExpr> {
        let mut base = self.parse_base_type()?;
        while self.eat("*") {
            base = TypeExpr::Pointer(Box::new(base));
        }
        Ok(base)
    }

    fn parse_base_type(&mut self) -> PResult<TypeExpr> {
        if self.check("int") {
            self.advance();
            let bits = self.parse_optional_width(32)?;
            return Ok(TypeExpr::Int(bits));
        }
        if self.check("float") {
            self.advance();
            let bits = self.parse_optional_width(64)?;
            return Ok(TypeExpr::Float(bits));
        }
        if self.check("char") {
            self.advance();
            return Ok(TypeExpr::Char);
        }
        if self.check("void") {
            self.advance();
            return Ok(TypeExpr::Void);
        }
        if self.check("string") {
            self.advance();
            return Ok(TypeExpr::String);
        }
        if self.check("array") {
            self.advance();
            self.expect("<")?;
            let inner = self.parse_type()?;
            self.expect(">")?;
            return Ok(TypeExpr::Array(Box::new(inner)));
        }
        if self.peek().kind == TokenKind::Ident {
            let first = self.advance().lexeme;
            if self.eat("::") {
                let name = self.expect_ident()?;
                return Ok(TypeExpr::Named { namespace: Some(first), name });
            }
            return Ok(TypeExpr::Named { namespace: None, name: first });
        }
        self.error_here(format!("expected a type, found '{}'", self.peek().lexeme));
        Err(())
    }

    /// `int`/`float` optionally followed by `< N >`; the lexer hands us `<`
    /// and `>` as bare punctuation, so this is where they are reassembled
    /// into a width, per `spec.md` §4.1.
    fn parse_optional_width(&mut self, default_bits: u32) -> PResult<u32> {
        if self.eat("<") {
            let tok = self.expect_ident_or_int()?;
            let bits: u32 = tok.parse().map_err(|_| {
                let loc = self.here();
                self.diagnostics.push(Diagnostic::error(
                    "E002",
                    loc,
                    format!("expected an integer width, found '{}'", tok),
                ));
            })?;
            self.expect(">")?;
            Ok(bits)
        } else {
            Ok(default_bits)
        }
    }

    fn expect_ident_or_int(&mut self) -> PResult<String> {
        if self.peek().kind == TokenKind::IntLiteral {
            Ok(self.advance().lexeme)
        } else {
            self.error_here(format!("expected a number, found '{}'", self.peek().lexeme));
            Err(())
        }
    }

    // ---- statements ----------------------------------------------------------

    fn parse_block(&mut self) -> PResult<Block> {
        let source = self.here();
        self.expect("{")?;
        let mut statements = Vec::new();
        while !self.check("}") {
            if self.at_eof() {
                self.error_here("unterminated block".to_string());
                return Err(());
            }
            match self.parse_stmt() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.recover(),
            }
        }
        self.expect("}")?;
        Ok(Block { statements, source })
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        if self.check("{") {
            return self.parse_block().map(Stmt::Block);
        }
        if self.check_keyword("if") {
            return self.parse_if();
        }
        if self.check_keyword("while") {
            return self.parse_while();
        }
        if self.check_keyword("do") {
            return self.parse_do_while();
        }
        if self.check_keyword("for") {
            return self.parse_for();
        }
        if self.check_keyword("foreach") {
            return self.parse_foreach();
        }
        if self.check_keyword("return") {
            return self.parse_return();
        }
        if self.is_var_decl_start() {
            return self.parse_local_var_decl().map(Stmt::VarDecl);
        }
        let source = self.here();
        let expr = self.parse_expr()?;
        self.expect(";")?;
        Ok(Stmt::Expr { expr, source })
    }

    /// A statement starts a variable declaration if it begins with `const`,
    /// `signed`/`unsigned`, or a type keyword/identifier immediately
    /// followed by another identifier (distinguishing `int x;` from a bare
    /// expression statement like a call `foo();`).
    fn is_var_decl_start(&self) -> bool {
        if self.check_keyword("let")
            || self.check_keyword("const")
            || self.check_keyword("signed")
            || self.check_keyword("unsigned")
        {
            return true;
        }
        let is_type_start = matches!(
            self.peek().lexeme.as_str(),
            "int" | "float" | "char" | "void" | "string" | "array"
        );
        if is_type_start {
            return true;
        }
        // `Ident Ident` -> declaration of a named type; `Ident (` / `Ident .`
        // / bare `Ident ;` etc. are expression statements.
        if self.peek().kind == TokenKind::Ident {
            let next = self.peek_at(1);
            return next.kind == TokenKind::Ident
                || (next.lexeme == "*" && self.peek_at(2).kind == TokenKind::Ident);
        }
        false
    }

    fn parse_local_var_decl(&mut self) -> PResult<VarDecl> {
        let source = self.here();
        self.eat_keyword("let");
        let mutability = if self.eat_keyword("const") {
            Mutability::Const
        } else {
            Mutability::Let
        };
        let signedness = self.parse_signedness_prefix();
        let ty = self.parse_type()?;
        let name = self.expect_ident()?;
        let init = if self.eat("=") { Some(self.parse_expr()?) } else { None };
        self.expect(";")?;
        Ok(VarDecl { name, mutability, signedness, ty, init, source })
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let source = self.here();
        self.advance();
        self.expect("(")?;
        let cond = self.parse_expr()?;
        self.expect(")")?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat_keyword("else") {
            if self.check_keyword("if") {
                let nested = self.parse_if()?;
                Some(Block {
                    statements: vec![nested],
                    source: self.here(),
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch, source })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let source = self.here();
        self.advance();
        self.expect("(")?;
        let cond = self.parse_expr()?;
        self.expect(")")?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body, source })
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        let source = self.here();
        self.advance();
        let body = self.parse_block()?;
        self.expect("while")?;
        self.expect("(")?;
        let cond = self.parse_expr()?;
        self.expect(")")?;
        self.expect(";")?;
        Ok(Stmt::DoWhile { body, cond, source })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let source = self.here();
        self.advance();
        self.expect("(")?;
        let init = if self.check(";") {
            None
        } else if self.is_var_decl_start() {
            Some(Box::new(Stmt::VarDecl(self.parse_local_var_decl()?)))
        } else {
            let s = self.here();
            let e = self.parse_expr()?;
            self.expect(";")?;
            Some(Box::new(Stmt::Expr { expr: e, source: s }))
        };
        if init.is_none() {
            self.expect(";")?;
        }
        let cond = if self.check(";") { None } else { Some(self.parse_expr()?) };
        self.expect(";")?;
        let step = if self.check(")") { None } else { Some(self.parse_expr()?) };
        self.expect(")")?;
        let body = self.parse_block()?;
        Ok(Stmt::For { init, cond, step, body, source })
    }

    fn parse_foreach(&mut self) -> PResult<Stmt> {
        let source = self.here();
        self.advance();
        self.expect("(")?;
        let index_name = self.expect_ident()?;
        self.expect(",")?;
        let value_name = self.expect_ident()?;
        self.expect("in")?;
        let iterable = self.parse_expr()?;
        self.expect(")")?;
        let body = self.parse_block()?;
        Ok(Stmt::Foreach { index_name, value_name, iterable, body, source })
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let source = self.here();
        self.advance();
        let value = if self.check(";") { None } else { Some(self.parse_expr()?) };
        self.expect(";")?;
        Ok(Stmt::Return { value, source })
    }

    // ---- expressions: precedence climbing ------------------------------------
    //
    // Low to high: || , && , | ^ & (bitwise) , == != , < <= > >= , << >> ,
    // + - , * / % , unary ! ~ - * & ++ , postfix () [] . -> ::

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_logical_or()?;
        const COMPOUND: &[(&str, Option<BinOp>)] = &[
            ("=", None),
            ("+=", Some(BinOp::Add)),
            ("-=", Some(BinOp::Sub)),
            ("*=", Some(BinOp::Mul)),
            ("/=", Some(BinOp::Div)),
            ("%=", Some(BinOp::Rem)),
        ];
        for (op, compound) in COMPOUND {
            if self.check(op) {
                let source = self.here();
                self.advance();
                let value = self.parse_assignment()?;
                return Ok(Expr::Assign {
                    target: Box::new(lhs),
                    compound: *compound,
                    value: Box::new(value),
                    source,
                });
            }
        }
        Ok(lhs)
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while self.check("||") {
            let source = self.here();
            self.advance();
            let rhs = self.parse_logical_and()?;
            lhs = Expr::Binary { op: BinOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs), source };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_bitwise()?;
        while self.check("&&") {
            let source = self.here();
            self.advance();
            let rhs = self.parse_bitwise()?;
            lhs = Expr::Binary { op: BinOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs), source };
        }
        Ok(lhs)
    }

    fn parse_bitwise(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality()?;
        loop {
            let op = if self.check("|") {
                BinOp::BitOr
            } else if self.check("^") {
                BinOp::BitXor
            } else if self.check("&") {
                BinOp::BitAnd
            } else {
                break;
            };
            let source = self.here();
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), source };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.check("==") {
                BinOp::Eq
            } else if self.check("!=") {
                BinOp::Ne
            } else {
                break;
            };
            let source = self.here();
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), source };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = if self.check("<=") {
                BinOp::Le
            } else if self.check(">=") {
                BinOp::Ge
            } else if self.check("<") {
                BinOp::Lt
            } else if self.check(">") {
                BinOp::Gt
            } else {
                break;
            };
            let source = self.here();
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), source };
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.check("<<") {
                BinOp::Shl
            } else if self.check(">>") {
                BinOp::Shr
            } else {
                break;
            };
            let source = self.here();
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), source };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.check("+") {
                BinOp::Add
            } else if self.check("-") {
                BinOp::Sub
            } else {
                break;
            };
            let source = self.here();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), source };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.check("*") {
                BinOp::Mul
            } else if self.check("/") {
                BinOp::Div
            } else if self.check("%") {
                BinOp::Rem
            } else {
                break;
            };
            let source = self.here();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), source };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let source = self.here();
        if self.eat("!") {
            return Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(self.parse_unary()?), source });
        }
        if self.eat("~") {
            return Ok(Expr::Unary { op: UnaryOp::BitNot, operand: Box::new(self.parse_unary()?), source });
        }
        if self.eat("-") {
            return Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(self.parse_unary()?), source });
        }
        if self.eat("&") {
            return Ok(Expr::Unary { op: UnaryOp::AddressOf, operand: Box::new(self.parse_unary()?), source });
        }
        if self.eat("*") {
            return Ok(Expr::Unary { op: UnaryOp::Deref, operand: Box::new(self.parse_unary()?), source });
        }
        if self.eat("++") {
            return Ok(Expr::Unary { op: UnaryOp::PreIncrement, operand: Box::new(self.parse_unary()?), source });
        }
        if self.check("(") && self.looks_like_cast() {
            self.advance();
            let ty = self.parse_type()?;
            self.expect(")")?;
            let expr = self.parse_unary()?;
            return Ok(Expr::Cast { ty, expr: Box::new(expr), source });
        }
        self.parse_postfix()
    }

    /// Disambiguates `(int)x` (a cast) from `(x)` (a parenthesised
    /// expression) by checking whether the parenthesised content starts
    /// with a type keyword.
    fn looks_like_cast(&self) -> bool {
        matches!(
            self.peek_at(1).lexeme.as_str(),
            "int" | "float" | "char" | "void" | "string" | "array"
        )
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check("(") {
                let source = self.here();
                self.advance();
                let mut args = Vec::new();
                if !self.check(")") {
                    args.push(self.parse_expr()?);
                    while self.eat(",") {
                        args.push(self.parse_expr()?);
                    }
                }
                self.expect(")")?;
                expr = Expr::Call { callee: Box::new(expr), args, source };
            } else if self.check("[") {
                let source = self.here();
                self.advance();
                let index = self.parse_expr()?;
                self.expect("]")?;
                expr = Expr::Index { base: Box::new(expr), index: Box::new(index), source };
            } else if self.check(".") {
                let source = self.here();
                self.advance();
                let field = self.expect_ident()?;
                expr = Expr::Member { base: Box::new(expr), field, source };
            } else if self.check("->") {
                let source = self.here();
                self.advance();
                let field = self.expect_ident()?;
                expr = Expr::Arrow { base: Box::new(expr), field, source };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let source = self.here();

        if self.peek().kind == TokenKind::IntLiteral {
            let lexeme = self.advance().lexeme;
            let value: i64 = lexeme.parse().map_err(|_| {
                self.diagnostics.push(Diagnostic::error("E002", source.clone(), format!("invalid integer literal '{}'", lexeme)));
            })?;
            return Ok(Expr::Literal { value: Literal::Int(value), source });
        }
        if self.peek().kind == TokenKind::FloatLiteral {
            let lexeme = self.advance().lexeme;
            let value: f64 = lexeme.parse().map_err(|_| {
                self.diagnostics.push(Diagnostic::error("E002", source.clone(), format!("invalid float literal '{}'", lexeme)));
            })?;
            return Ok(Expr::Literal { value: Literal::Float(value), source });
        }
        if self.peek().kind == TokenKind::CharLiteral {
            let lexeme = self.advance().lexeme;
            let byte = lexeme.bytes().next().unwrap_or(0);
            return Ok(Expr::Literal { value: Literal::Char(byte), source });
        }
        if self.peek().kind == TokenKind::StringLiteral {
            let lexeme = self.advance().lexeme;
            return Ok(Expr::Literal { value: Literal::Str(lexeme), source });
        }
        if self.check("(") {
            self.advance();
            let inner = self.parse_expr()?;
            self.expect(")")?;
            return Ok(inner);
        }
        if self.check("{") {
            return self.parse_array_literal();
        }
        if self.check_keyword("fnct") {
            return self.parse_lambda();
        }
        if self.peek().kind == TokenKind::Ident {
            let first = self.advance().lexeme;
            if self.check("::") {
                self.advance();
                let name = self.expect_ident()?;
                return Ok(Expr::Ident { namespace: Some(first), name, source });
            }
            if first == "c_str" && self.check("(") {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(")")?;
                return Ok(Expr::CStr { expr: Box::new(inner), source });
            }
            return Ok(Expr::Ident { namespace: None, name: first, source });
        }

        self.error_here(format!("unexpected token '{}'", self.peek().lexeme));
        Err(())
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        let source = self.here();
        self.expect("{")?;
        let mut elements = Vec::new();
        if !self.check("}") {
            elements.push(self.parse_expr()?);
            while self.eat(",") {
                elements.push(self.parse_expr()?);
            }
        }
        self.expect("}")?;
        Ok(Expr::ArrayLiteral { elements, source })
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let source = self.here();
        self.advance(); // 'fnct'
        self.expect("(")?;
        let mut params = Vec::new();
        if !self.check(")") {
            params.push(self.parse_param()?);
            while self.eat(",") {
                params.push(self.parse_param()?);
            }
        }
        self.expect(")")?;
        let return_type = if self.eat("->") { self.parse_type()? } else { TypeExpr::Void };
        let body = self.parse_block()?;
        let id = self.next_lambda_id;
        self.next_lambda_id += 1;
        Ok(Expr::Lambda { params, return_type, body, id, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(src: &str) -> Program {
        let p = Parser::new(src, &PathBuf::from("t.c5")).unwrap();
        let (program, diags) = p.parse_program();
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags.iter().collect::<Vec<_>>());
        program
    }

    #[test]
    fn parses_hello_world() {
        let program = parse("include <std.c5h>\nvoid main(){ std::printf(\"Hello, C5!\\n\"); }");
        assert_eq!(program.includes.len(), 1);
        assert_eq!(program.decls.len(), 1);
    }

    #[test]
    fn parses_width_annotated_int() {
        let program = parse("int<8> x = 5;\nvoid main(){ }");
        match &program.decls[0] {
            Decl::GlobalVar(v) => assert_eq!(v.ty, TypeExpr::Int(8)),
            other => panic!("expected global var, got {:?}", other),
        }
    }

    #[test]
    fn parses_foreach_and_array_literal() {
        let program = parse(
            "void main(){ array<int<32>> arr = {10,20,30}; foreach (i, v in arr) { } }",
        );
        let body = match &program.decls[0] {
            Decl::Fn(f) => f.body.as_ref().unwrap(),
            _ => panic!(),
        };
        assert_eq!(body.statements.len(), 2);
        assert!(matches!(body.statements[1], Stmt::Foreach { .. }));
    }

    #[test]
    fn parses_lambda_expression() {
        let program = parse("void main(){ let int<32> x = 0; fnct(int<32> y) -> int<32> { return y; }(1); }");
        assert_eq!(program.decls.len(), 1);
    }

    #[test]
    fn recovers_after_parse_error_to_next_declaration() {
        let p = Parser::new("void broken( {} \n void main(){ }", &PathBuf::from("t.c5")).unwrap();
        let (program, diags) = p.parse_program();
        assert!(!diags.is_empty());
        assert!(program.decls.iter().any(|d| matches!(d, Decl::Fn(f) if f.name == "main")));
    }
}
