//! First binding pass: finds the declarations that must live in closures.
//!
//! A declaration is hoisted when it is referenced from a nested lambda, from
//! inside a quoted fragment, or through a `Variables` expression. Declarations
//! are numbered in pre-order; the second pass walks the tree in the same
//! order and relies on the numbering matching.

use crate::ast::{Expr, Lambda, Symbol};
use crate::types::SemType;

pub(super) type DeclId = usize;

#[derive(Debug, Clone)]
pub(super) struct Decl {
    pub name: Symbol,
    pub ty: SemType,
    pub frame: usize,
    pub captured: bool,
}

#[derive(Debug, Clone, Copy)]
enum Binding {
    Decl(DeclId),
    /// A name introduced inside a quoted fragment.
    Shadow,
}

#[derive(Debug, Default)]
pub(super) struct CaptureScan {
    pub decls: Vec<Decl>,
    scope: Vec<(Symbol, Binding)>,
    frame: usize,
    next_frame: usize,
    in_quote: bool,
}

impl CaptureScan {
    pub fn run(lambda: &Lambda) -> Self {
        let mut scan = Self {
            next_frame: 1,
            ..Self::default()
        };
        scan.scan_params(lambda);
        scan.scan(&lambda.body);
        scan
    }

    /// Hoisted declarations of one frame, in declaration order.
    pub fn hoisted_in(&self, frame: usize) -> impl Iterator<Item = (DeclId, &Decl)> {
        self.decls
            .iter()
            .enumerate()
            .filter(move |(_, decl)| decl.frame == frame && decl.captured)
    }

    fn declare(&mut self, name: &Symbol, ty: SemType) {
        let id = self.decls.len();
        self.decls.push(Decl {
            name: name.clone(),
            ty,
            frame: self.frame,
            captured: false,
        });
        self.scope.push((name.clone(), Binding::Decl(id)));
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        self.scope
            .iter()
            .rev()
            .find(|(symbol, _)| symbol == name)
            .map(|(_, binding)| *binding)
    }

    fn reference(&mut self, name: &str, force: bool) {
        if let Some(Binding::Decl(id)) = self.lookup(name) {
            let decl = &mut self.decls[id];
            if force || self.in_quote || decl.frame != self.frame {
                decl.captured = true;
            }
        }
    }

    fn scan_params(&mut self, lambda: &Lambda) {
        for param in &lambda.params {
            if self.in_quote {
                self.scope.push((param.name.clone(), Binding::Shadow));
            } else {
                self.declare(&param.name, param.ty.clone());
            }
        }
    }

    fn scan(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) | Expr::Constant(_) | Expr::Bound(_) => {}
            Expr::Var(name) => self.reference(name, false),
            Expr::Assign(name, value) => {
                self.scan(value);
                self.reference(name, false);
            }
            Expr::Let(name, value, body) => {
                self.scan(value);
                let mark = self.scope.len();
                if self.in_quote {
                    self.scope.push((name.clone(), Binding::Shadow));
                } else {
                    self.declare(name, SemType::Any);
                }
                self.scan(body);
                self.scope.truncate(mark);
            }
            Expr::Unary(_, operand) => self.scan(operand),
            Expr::Binary(_, lhs, rhs) | Expr::While(lhs, rhs) => {
                self.scan(lhs);
                self.scan(rhs);
            }
            Expr::If(cond, then, otherwise) => {
                self.scan(cond);
                self.scan(then);
                self.scan(otherwise);
            }
            Expr::Block(exprs) => exprs.iter().for_each(|e| self.scan(e)),
            Expr::Call(callee, args) => {
                self.scan(callee);
                args.iter().for_each(|e| self.scan(e));
            }
            Expr::Lambda(lambda) => {
                let mark = self.scope.len();
                let outer = self.frame;
                if !self.in_quote {
                    self.frame = self.next_frame;
                    self.next_frame += 1;
                }
                self.scan_params(lambda);
                self.scan(&lambda.body);
                self.frame = outer;
                self.scope.truncate(mark);
            }
            Expr::Quote(fragment) => {
                let outer = self.in_quote;
                self.in_quote = true;
                self.scan(fragment);
                self.in_quote = outer;
            }
            Expr::Variables(names) => names.iter().for_each(|name| self.reference(name, true)),
            Expr::BoundAssign(_, value) => self.scan(value),
        }
    }
}
