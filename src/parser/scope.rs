//! Scope resolver
//!
//! Pre-emission analysis of one function body. The emitter asks three
//! questions before lowering a function:
//!
//! 1. which names does it declare (var-scoped, deep through blocks)?
//! 2. which of those are captured by nested functions (the union of the
//!    nested functions' free names)?
//! 3. do direct `eval`, `with`, or non-simple parameters force generic
//!    (name-keyed) variable records?
//!
//! Free-name sets are computed bottom-up: a nested function's free set
//! already accounts for everything its own nested functions reach, so
//! one level of union per function suffices.

use rustc_hash::FxHashSet;
use std::rc::Rc;

use super::ast::*;

/// Analysis result for one function (or program) body.
#[derive(Debug, Default)]
pub struct ScopeAnalysis {
    /// var-scoped names: parameters excluded, function declarations
    /// included, collected through nested blocks but not functions.
    pub var_names: Vec<String>,
    /// Names referenced by nested functions that this scope may have to
    /// provide (already net of the nested functions' own bindings).
    pub nested_free: FxHashSet<String>,
    /// A direct `eval(...)` call in this body or any nested function.
    pub has_direct_eval: bool,
    /// A `with` statement in this body or any nested function. Deep
    /// like eval: a nested `with` resolves names dynamically, so every
    /// record it can see must stay name-addressable.
    pub has_with: bool,
    /// `arguments` referenced in this body or a nested arrow chain.
    pub uses_arguments: bool,
}

pub fn analyze_function(func: &FunctionNode) -> ScopeAnalysis {
    analyze_body(&func.body)
}

pub fn analyze_body(body: &[Stmt]) -> ScopeAnalysis {
    let mut analysis = ScopeAnalysis::default();
    let mut collector = Collector {
        analysis: &mut analysis,
    };
    for stmt in body {
        collector.stmt(stmt);
    }
    analysis
}

/// Free names of a function: identifiers referenced anywhere inside it
/// (nested functions included) that it does not bind itself.
pub fn free_names(func: &FunctionNode) -> FxHashSet<String> {
    let mut walker = FreeWalker {
        scopes: Vec::new(),
        free: FxHashSet::default(),
    };
    walker.function(func);
    walker.free
}

// Declaration/flag collection, stopping at nested function boundaries.

struct Collector<'a> {
    analysis: &'a mut ScopeAnalysis,
}

impl Collector<'_> {
    fn declare_var(&mut self, name: &str) {
        if !self.analysis.var_names.iter().any(|n| n == name) {
            self.analysis.var_names.push(name.to_string());
        }
    }

    fn nested_function(&mut self, func: &Rc<FunctionNode>) {
        for name in free_names(func) {
            self.analysis.nested_free.insert(name);
        }
        let nested = analyze_function(func);
        if nested.has_direct_eval {
            self.analysis.has_direct_eval = true;
        }
        if nested.has_with {
            self.analysis.has_with = true;
        }
        if func.is_arrow && nested.uses_arguments {
            self.analysis.uses_arguments = true;
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl { kind, decls } => {
                for (name, init) in decls {
                    if *kind == DeclKind::Var {
                        self.declare_var(name);
                    }
                    if let Some(e) = init {
                        self.expr(e);
                    }
                }
            }
            StmtKind::FunctionDecl(func) => {
                if let Some(name) = &func.name {
                    self.declare_var(name);
                }
                self.nested_function(func);
            }
            StmtKind::ClassDecl(class) => self.class(class),
            StmtKind::Expr(e) | StmtKind::Throw(e) | StmtKind::ExportDefault(e) => self.expr(e),
            StmtKind::Return(Some(e)) => self.expr(e),
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
            StmtKind::If { cond, cons, alt } => {
                self.expr(cond);
                self.stmt(cons);
                if let Some(alt) = alt {
                    self.stmt(alt);
                }
            }
            StmtKind::Block(body) => {
                for s in body {
                    self.stmt(s);
                }
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(test) = test {
                    self.expr(test);
                }
                if let Some(update) = update {
                    self.expr(update);
                }
                self.stmt(body);
            }
            StmtKind::ForIn { head, object, body } | StmtKind::ForOf { head, object, body } => {
                match head {
                    ForHead::Decl {
                        kind: DeclKind::Var,
                        name,
                    } => self.declare_var(name),
                    ForHead::Decl { .. } => {}
                    ForHead::Expr(e) => self.expr(e),
                }
                self.expr(object);
                self.stmt(body);
            }
            StmtKind::While { test, body } => {
                self.expr(test);
                self.stmt(body);
            }
            StmtKind::DoWhile { body, test } => {
                self.stmt(body);
                self.expr(test);
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => {
                for s in block {
                    self.stmt(s);
                }
                if let Some((_, body)) = catch {
                    for s in body {
                        self.stmt(s);
                    }
                }
                if let Some(body) = finally {
                    for s in body {
                        self.stmt(s);
                    }
                }
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                self.expr(discriminant);
                for case in cases {
                    if let Some(test) = &case.test {
                        self.expr(test);
                    }
                    for s in &case.body {
                        self.stmt(s);
                    }
                }
            }
            StmtKind::With { object, body } => {
                self.analysis.has_with = true;
                self.expr(object);
                self.stmt(body);
            }
            StmtKind::Import { .. } => {}
            StmtKind::ExportNamed { decl, .. } => {
                if let Some(decl) = decl {
                    self.stmt(decl);
                }
            }
        }
    }

    fn class(&mut self, class: &ClassNode) {
        if let Some(parent) = &class.parent {
            self.expr(parent);
        }
        if let Some(ctor) = &class.constructor {
            self.nested_function(ctor);
        }
        for method in &class.methods {
            if let PropName::Computed(e) = &method.key {
                self.expr(e);
            }
            self.nested_function(&method.func);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => {
                if name == "arguments" {
                    self.analysis.uses_arguments = true;
                }
            }
            ExprKind::Null
            | ExprKind::Undefined
            | ExprKind::Bool(_)
            | ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::This => {}
            ExprKind::Array(elements) => {
                for e in elements.iter().flatten() {
                    self.expr(e);
                }
            }
            ExprKind::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectProp::Init { name, value } => {
                            if let PropName::Computed(e) = name {
                                self.expr(e);
                            }
                            self.expr(value);
                        }
                        ObjectProp::Getter { name, func }
                        | ObjectProp::Setter { name, func } => {
                            if let PropName::Computed(e) = name {
                                self.expr(e);
                            }
                            self.nested_function(func);
                        }
                    }
                }
            }
            ExprKind::Function(func) => self.nested_function(func),
            ExprKind::Class(class) => self.class(class),
            ExprKind::Unary { expr, .. } => self.expr(expr),
            ExprKind::Update { target, .. } => self.expr(target),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Conditional { cond, cons, alt } => {
                self.expr(cond);
                self.expr(cons);
                self.expr(alt);
            }
            ExprKind::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            ExprKind::Call { callee, args } => {
                if let ExprKind::Ident(name) = &callee.kind {
                    if name == "eval" {
                        self.analysis.has_direct_eval = true;
                    }
                }
                self.expr(callee);
                for a in args {
                    self.expr(a);
                }
            }
            ExprKind::New { callee, args } => {
                self.expr(callee);
                for a in args {
                    self.expr(a);
                }
            }
            ExprKind::Member { object, property } => {
                self.expr(object);
                if let MemberProp::Computed(e) = property {
                    self.expr(e);
                }
            }
            ExprKind::Sequence(exprs) => {
                for e in exprs {
                    self.expr(e);
                }
            }
            ExprKind::SuperCall(args) => {
                for a in args {
                    self.expr(a);
                }
            }
        }
    }
}

// Free-name computation

struct FreeWalker {
    /// Innermost scope last. Each scope is the set of names it binds.
    scopes: Vec<FxHashSet<String>>,
    free: FxHashSet<String>,
}

impl FreeWalker {
    fn resolved(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(name))
    }

    fn reference(&mut self, name: &str) {
        if !self.resolved(name) {
            self.free.insert(name.to_string());
        }
    }

    fn function(&mut self, func: &FunctionNode) {
        let mut scope = FxHashSet::default();
        for p in &func.params {
            scope.insert(p.name.clone());
        }
        if !func.is_arrow {
            scope.insert("arguments".to_string());
        }
        if let Some(name) = &func.name {
            scope.insert(name.clone());
        }
        for v in analyze_function(func).var_names {
            scope.insert(v);
        }
        self.scopes.push(scope);
        // Parameter defaults resolve in the function scope.
        for p in &func.params {
            if let Some(d) = &p.default {
                self.expr(d);
            }
        }
        self.block_body(&func.body);
        self.scopes.pop();
    }

    fn block_body(&mut self, body: &[Stmt]) {
        let mut scope = FxHashSet::default();
        for stmt in body {
            match &stmt.kind {
                StmtKind::VarDecl { kind, decls } if kind.is_lexical() => {
                    for (name, _) in decls {
                        scope.insert(name.clone());
                    }
                }
                StmtKind::ClassDecl(class) => {
                    if let Some(name) = &class.name {
                        scope.insert(name.clone());
                    }
                }
                StmtKind::ExportNamed {
                    decl: Some(decl), ..
                } => {
                    if let StmtKind::VarDecl { kind, decls } = &decl.kind {
                        if kind.is_lexical() {
                            for (name, _) in decls {
                                scope.insert(name.clone());
                            }
                        }
                    }
                    if let StmtKind::ClassDecl(class) = &decl.kind {
                        if let Some(name) = &class.name {
                            scope.insert(name.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        self.scopes.push(scope);
        for stmt in body {
            self.stmt(stmt);
        }
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::VarDecl { decls, .. } => {
                for (_, init) in decls {
                    if let Some(e) = init {
                        self.expr(e);
                    }
                }
            }
            StmtKind::FunctionDecl(func) => self.function(func),
            StmtKind::ClassDecl(class) => self.class(class),
            StmtKind::Expr(e) | StmtKind::Throw(e) | StmtKind::ExportDefault(e) => self.expr(e),
            StmtKind::Return(Some(e)) => self.expr(e),
            StmtKind::Return(None) | StmtKind::Break | StmtKind::Continue | StmtKind::Empty => {}
            StmtKind::If { cond, cons, alt } => {
                self.expr(cond);
                self.stmt(cons);
                if let Some(alt) = alt {
                    self.stmt(alt);
                }
            }
            StmtKind::Block(body) => self.block_body(body),
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                // A lexical for-init scopes the whole loop.
                let mut scope = FxHashSet::default();
                if let Some(init) = init {
                    if let StmtKind::VarDecl { kind, decls } = &init.kind {
                        if kind.is_lexical() {
                            for (name, _) in decls {
                                scope.insert(name.clone());
                            }
                        }
                    }
                }
                self.scopes.push(scope);
                if let Some(init) = init {
                    self.stmt(init);
                }
                if let Some(test) = test {
                    self.expr(test);
                }
                if let Some(update) = update {
                    self.expr(update);
                }
                self.stmt(body);
                self.scopes.pop();
            }
            StmtKind::ForIn { head, object, body } | StmtKind::ForOf { head, object, body } => {
                self.expr(object);
                let mut scope = FxHashSet::default();
                match head {
                    ForHead::Decl { name, .. } => {
                        scope.insert(name.clone());
                    }
                    ForHead::Expr(e) => self.expr(e),
                }
                self.scopes.push(scope);
                self.stmt(body);
                self.scopes.pop();
            }
            StmtKind::While { test, body } => {
                self.expr(test);
                self.stmt(body);
            }
            StmtKind::DoWhile { body, test } => {
                self.stmt(body);
                self.expr(test);
            }
            StmtKind::Try {
                block,
                catch,
                finally,
            } => {
                self.block_body(block);
                if let Some((param, body)) = catch {
                    let mut scope = FxHashSet::default();
                    if let Some(p) = param {
                        scope.insert(p.clone());
                    }
                    self.scopes.push(scope);
                    self.block_body(body);
                    self.scopes.pop();
                }
                if let Some(body) = finally {
                    self.block_body(body);
                }
            }
            StmtKind::Switch {
                discriminant,
                cases,
            } => {
                self.expr(discriminant);
                let mut scope = FxHashSet::default();
                for case in cases {
                    for s in &case.body {
                        if let StmtKind::VarDecl { kind, decls } = &s.kind {
                            if kind.is_lexical() {
                                for (name, _) in decls {
                                    scope.insert(name.clone());
                                }
                            }
                        }
                    }
                }
                self.scopes.push(scope);
                for case in cases {
                    if let Some(test) = &case.test {
                        self.expr(test);
                    }
                    for s in &case.body {
                        self.stmt(s);
                    }
                }
                self.scopes.pop();
            }
            StmtKind::With { object, body } => {
                self.expr(object);
                self.stmt(body);
            }
            StmtKind::Import { specifiers, .. } => {
                // Imported locals are bindings of the module scope.
                if let Some(scope) = self.scopes.first_mut() {
                    for spec in specifiers {
                        scope.insert(spec.local.clone());
                    }
                }
            }
            StmtKind::ExportNamed { decl, specifiers } => {
                if let Some(decl) = decl {
                    self.stmt(decl);
                }
                for (local, _) in specifiers {
                    self.reference(local);
                }
            }
        }
    }

    fn class(&mut self, class: &ClassNode) {
        if let Some(parent) = &class.parent {
            self.expr(parent);
        }
        if let Some(ctor) = &class.constructor {
            self.function(ctor);
        }
        for method in &class.methods {
            if let PropName::Computed(e) = &method.key {
                self.expr(e);
            }
            self.function(&method.func);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => self.reference(name),
            ExprKind::Null
            | ExprKind::Undefined
            | ExprKind::Bool(_)
            | ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::This => {}
            ExprKind::Array(elements) => {
                for e in elements.iter().flatten() {
                    self.expr(e);
                }
            }
            ExprKind::Object(props) => {
                for prop in props {
                    match prop {
                        ObjectProp::Init { name, value } => {
                            if let PropName::Computed(e) = name {
                                self.expr(e);
                            }
                            self.expr(value);
                        }
                        ObjectProp::Getter { name, func }
                        | ObjectProp::Setter { name, func } => {
                            if let PropName::Computed(e) = name {
                                self.expr(e);
                            }
                            self.function(func);
                        }
                    }
                }
            }
            ExprKind::Function(func) => self.function(func),
            ExprKind::Class(class) => self.class(class),
            ExprKind::Unary { expr, .. } => self.expr(expr),
            ExprKind::Update { target, .. } => self.expr(target),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Conditional { cond, cons, alt } => {
                self.expr(cond);
                self.expr(cons);
                self.expr(alt);
            }
            ExprKind::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            ExprKind::Call { callee, args } | ExprKind::New { callee, args } => {
                self.expr(callee);
                for a in args {
                    self.expr(a);
                }
            }
            ExprKind::Member { object, property } => {
                self.expr(object);
                if let MemberProp::Computed(e) = property {
                    self.expr(e);
                }
            }
            ExprKind::Sequence(exprs) => {
                for e in exprs {
                    self.expr(e);
                }
            }
            ExprKind::SuperCall(args) => {
                for a in args {
                    self.expr(a);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parser::Parser;

    fn first_function(src: &str) -> Rc<FunctionNode> {
        let program = Parser::new(src, false).parse_program().unwrap();
        for stmt in &program.body {
            if let StmtKind::FunctionDecl(f) = &stmt.kind {
                return f.clone();
            }
        }
        panic!("no function in source");
    }

    #[test]
    fn vars_are_collected_through_blocks() {
        let f = first_function("function f() { var a; { var b; } for (var c in o) {} }");
        let analysis = analyze_function(&f);
        assert_eq!(analysis.var_names, vec!["a", "b", "c"]);
    }

    #[test]
    fn nested_function_free_names_mark_captures() {
        let f = first_function("function f() { var x = 1; var y = 2; return function() { return x; }; }");
        let analysis = analyze_function(&f);
        assert!(analysis.nested_free.contains("x"));
        assert!(!analysis.nested_free.contains("y"));
    }

    #[test]
    fn deeply_nested_references_propagate() {
        let f = first_function(
            "function f() { var x = 1; return function() { return function() { return x; }; }; }",
        );
        let analysis = analyze_function(&f);
        assert!(analysis.nested_free.contains("x"));
    }

    #[test]
    fn nested_bindings_do_not_leak() {
        let f = first_function("function f() { return function() { var z; return z; }; }");
        let analysis = analyze_function(&f);
        assert!(!analysis.nested_free.contains("z"));
    }

    #[test]
    fn direct_eval_is_deep() {
        let f = first_function("function f() { return function() { eval('1'); }; }");
        assert!(analyze_function(&f).has_direct_eval);
        let g = first_function("function g() { other.eval('1'); }");
        assert!(!analyze_function(&g).has_direct_eval);
    }

    #[test]
    fn with_poisons_deeply() {
        let f = first_function("function f() { with (o) {} }");
        assert!(analyze_function(&f).has_with);
        let g = first_function("function g() { return function() { with (o) {} }; }");
        assert!(analyze_function(&g).has_with);
    }

    #[test]
    fn arguments_through_arrows_only() {
        let f = first_function("function f() { return () => arguments; }");
        assert!(analyze_function(&f).uses_arguments);
        let g = first_function("function g() { return function() { return arguments; }; }");
        assert!(!analyze_function(&g).uses_arguments);
    }

    #[test]
    fn block_lexicals_shadow_in_free_sets() {
        let f = first_function("function f() { var x; return function() { let x = 1; return x; }; }");
        let analysis = analyze_function(&f);
        assert!(!analysis.nested_free.contains("x"));
    }

    #[test]
    fn catch_parameter_binds() {
        let f = first_function("function f() { return function() { try {} catch (e) { e; } }; }");
        assert!(!analyze_function(&f).nested_free.contains("e"));
    }
}
