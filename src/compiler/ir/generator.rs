//! IR Generator - transforms the typed syntax tree into memory IR
//!
//! Every named variable becomes an `alloc`ed memory location; reading it in
//! value position inserts a `load`. Top-level statements are packaged into the
//! entry function `_main`, whose body starts with the global variable
//! initializers. Nested functions are hoisted to siblings of `_main`.

use super::instruction::{LiteralValue, OpKind};
use super::program::{IrModule, OpId, Region, ValueId};
use super::types::ValueType;
use crate::ast::{BinaryOp, Decl, Expr, ExprKind, FuncDef, Literal, Program, Stmt, VarDef};
use crate::compiler::scope::{ScopeId, ScopeTree};
use crate::error::{Error, Result};
use crate::types::Type;

/// Name of the synthesized entry function
pub const ENTRY_FUNCTION: &str = "_main";

/// Functions provided by the runtime rather than the program
const BUILTINS: [&str; 3] = ["print", "len", "input"];

/// What an identifier is bound to
#[derive(Debug, Clone)]
enum Symbol {
    /// Memory location of a variable
    Variable(ValueId),
    /// Label of a function; nested functions are qualified by their parents
    Function(String),
}

/// AST-to-IR translator
pub struct IrGenerator {
    module: IrModule,
    /// Identifier -> variable location or function label
    scopes: ScopeTree<Symbol>,
    /// Scope of the construct being translated
    scope: ScopeId,
    /// Translated user functions, in completion order
    functions: Vec<OpId>,
}

impl IrGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self {
            module: IrModule::new(),
            scopes: ScopeTree::new(),
            scope: ScopeId::GLOBAL,
            functions: Vec::new(),
        }
    }

    /// Translate a whole program
    pub fn generate(&mut self, program: &Program) -> Result<IrModule> {
        let mut main_body = Vec::new();

        // Globals first, so that every function can resolve them
        for decl in &program.decls {
            if let Decl::Var(var) = decl {
                self.translate_var_def(var, &mut main_body)?;
            }
        }

        let mut funcs = Vec::new();
        for decl in &program.decls {
            match decl {
                Decl::Func(func) => {
                    if func.name == ENTRY_FUNCTION {
                        return Err(Error::DuplicateDefinition {
                            name: func.name.clone(),
                        });
                    }
                    funcs.push((func, func.name.clone()));
                }
                Decl::Var(_) => {}
                Decl::Global(name) | Decl::NonLocal(name) => {
                    return Err(Error::internal(format!(
                        "scope declaration for '{}' at module level",
                        name
                    )))
                }
            }
        }
        self.translate_functions(&funcs)?;

        self.translate_block(&program.stmts, &mut main_body)?;
        self.emit_implicit_return(&mut main_body);

        let main = self.module.create_op(
            OpKind::FuncDef {
                name: ENTRY_FUNCTION.to_string(),
                return_type: Type::None,
            },
            vec![],
            None,
            vec![Region::with_ops(main_body)],
        );
        self.module.push_function(main)?;
        for func in std::mem::take(&mut self.functions) {
            self.module.push_function(func)?;
        }

        tracing::debug!(
            ops = self.module.op_count(),
            functions = self.module.body().ops.len(),
            "translated program to memory IR"
        );
        Ok(std::mem::take(&mut self.module))
    }

    // =========================================================================
    // DECLARATIONS
    // =========================================================================

    fn translate_var_def(&mut self, var: &VarDef, block: &mut Vec<OpId>) -> Result<()> {
        let slot = self.module.emit(
            block,
            OpKind::Alloc(var.ty.clone()),
            vec![],
            ValueType::MemLoc(var.ty.clone()),
        );
        let init = self.translate_literal(&var.init, var.init.ty(), block);
        self.module.emit_void(block, OpKind::Store, vec![slot, init]);
        self.scopes.define(self.scope, &var.name, Symbol::Variable(slot))
    }

    /// Sibling functions; all are bound before any body, so they can call
    /// each other and themselves
    fn translate_functions(&mut self, funcs: &[(&FuncDef, String)]) -> Result<()> {
        for (func, label) in funcs {
            let symbol = Symbol::Function(label.clone());
            self.scopes.define(self.scope, &func.name, symbol)?;
        }
        for (func, label) in funcs {
            self.translate_function(func, label)?;
        }
        Ok(())
    }

    fn translate_function(&mut self, func: &FuncDef, label: &str) -> Result<()> {
        let enclosing = self.scope;
        self.scope = self.scopes.push(enclosing);

        let mut region = Region::new();
        let mut body = Vec::new();

        // Parameters are spilled on entry and behave like locals afterwards
        for param in &func.params {
            let arg = self
                .module
                .add_region_arg(&mut region, ValueType::Ty(param.ty.clone()));
            let slot = self.module.emit(
                &mut body,
                OpKind::Alloc(param.ty.clone()),
                vec![],
                ValueType::MemLoc(param.ty.clone()),
            );
            self.module.emit_void(&mut body, OpKind::Store, vec![slot, arg]);
            self.scopes.define(self.scope, &param.name, Symbol::Variable(slot))?;
        }

        let mut nested = Vec::new();
        for decl in &func.decls {
            match decl {
                Decl::Var(var) => self.translate_var_def(var, &mut body)?,
                Decl::Func(inner) => nested.push((inner, format!("{}.{}", label, inner.name))),
                // `global x` skips any enclosing function's `x`
                Decl::Global(name) => {
                    let symbol = self.scopes.resolve(ScopeId::GLOBAL, name)?;
                    self.scopes.define(self.scope, name, symbol)?;
                }
                Decl::NonLocal(_) => {}
            }
        }
        self.translate_functions(&nested)?;

        self.translate_block(&func.body, &mut body)?;
        self.emit_implicit_return(&mut body);
        region.ops = body;

        let op = self.module.create_op(
            OpKind::FuncDef {
                name: label.to_string(),
                return_type: func.return_type.clone(),
            },
            vec![],
            None,
            vec![region],
        );
        self.functions.push(op);
        self.scope = enclosing;
        Ok(())
    }

    fn emit_implicit_return(&mut self, block: &mut Vec<OpId>) {
        let none = self.module.emit(
            block,
            OpKind::Literal(LiteralValue::None),
            vec![],
            ValueType::Ty(Type::None),
        );
        self.module.emit_void(block, OpKind::Return, vec![none]);
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    fn translate_block(&mut self, stmts: &[Stmt], block: &mut Vec<OpId>) -> Result<()> {
        let mut returned = false;
        for stmt in stmts {
            if returned {
                tracing::warn!("unreachable statement after return");
            }
            self.translate_stmt(stmt, block)?;
            returned |= matches!(stmt, Stmt::Return(_));
        }
        Ok(())
    }

    /// Statement list as a standalone region; never empty
    fn translate_region(&mut self, stmts: &[Stmt]) -> Result<Region> {
        let mut ops = Vec::new();
        self.translate_block(stmts, &mut ops)?;
        if ops.is_empty() {
            self.module.emit_void(&mut ops, OpKind::Pass, vec![]);
        }
        Ok(Region::with_ops(ops))
    }

    /// Expression as a region ending in `yield`
    fn translate_yielding_region(&mut self, expr: &Expr) -> Result<Region> {
        let mut ops = Vec::new();
        let value = self.translate_value(expr, &mut ops)?;
        self.module.emit_void(&mut ops, OpKind::Yield, vec![value]);
        Ok(Region::with_ops(ops))
    }

    fn translate_stmt(&mut self, stmt: &Stmt, block: &mut Vec<OpId>) -> Result<()> {
        match stmt {
            Stmt::Expr(expr) => {
                if let ExprKind::Call { func, args } = &expr.kind {
                    self.translate_call(func, args, None, block)?;
                } else {
                    self.translate_value(expr, block)?;
                }
            }

            Stmt::Assign(assign) => {
                let (targets, value) = assign.targets_and_value();
                let value = self.translate_value(value, block)?;
                let mut operands = vec![value];
                for target in targets {
                    operands.push(self.translate_target(target, block)?);
                }
                self.module.emit_void(block, OpKind::Assign, operands);
            }

            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.translate_value(expr, block)?,
                    None => self.translate_literal(&Literal::None, Type::None, block),
                };
                self.module.emit_void(block, OpKind::Return, vec![value]);
            }

            Stmt::Pass => {
                self.module.emit_void(block, OpKind::Pass, vec![]);
            }

            Stmt::If { cond, then, orelse } => {
                let cond = self.translate_value(cond, block)?;
                let then = self.translate_region(then)?;
                let orelse = self.translate_region(orelse)?;
                let op = self
                    .module
                    .create_op(OpKind::If, vec![cond], None, vec![then, orelse]);
                block.push(op);
            }

            Stmt::While { cond, body } => {
                let cond = self.translate_yielding_region(cond)?;
                let body = self.translate_region(body)?;
                let op = self
                    .module
                    .create_op(OpKind::While, vec![], None, vec![cond, body]);
                block.push(op);
            }

            Stmt::For { target, iter, body } => {
                let iter = self.translate_value(iter, block)?;
                let target = self.variable(target)?;
                let body = self.translate_region(body)?;
                let op = self
                    .module
                    .create_op(OpKind::For, vec![iter, target], None, vec![body]);
                block.push(op);
            }
        }
        Ok(())
    }

    /// Assignable location for a target expression
    fn translate_target(&mut self, target: &Expr, block: &mut Vec<OpId>) -> Result<ValueId> {
        match &target.kind {
            ExprKind::Name(name) => self.variable(name),
            ExprKind::Index { value, .. } if value.ty.is_list() => {
                self.translate_expr(target, block)
            }
            _ => Err(Error::internal(format!(
                "expression of type {} is not assignable",
                target.ty
            ))),
        }
    }

    // =========================================================================
    // EXPRESSIONS
    // =========================================================================

    /// Translate in value position, loading from memory locations
    fn translate_value(&mut self, expr: &Expr, block: &mut Vec<OpId>) -> Result<ValueId> {
        let value = self.translate_expr(expr, block)?;
        match self.module.value_type(value)? {
            ValueType::MemLoc(ty) => {
                let ty = ty.clone();
                Ok(self
                    .module
                    .emit(block, OpKind::Load, vec![value], ValueType::Ty(ty)))
            }
            _ => Ok(value),
        }
    }

    /// Translate an expression; names and list elements yield memory locations
    fn translate_expr(&mut self, expr: &Expr, block: &mut Vec<OpId>) -> Result<ValueId> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(self.translate_literal(lit, expr.ty.clone(), block)),

            ExprKind::Name(name) => self.variable(name),

            ExprKind::Unary { op, operand } => {
                let operand = self.translate_value(operand, block)?;
                Ok(self.module.emit(
                    block,
                    OpKind::UnaryExpr(*op),
                    vec![operand],
                    ValueType::Ty(expr.ty.clone()),
                ))
            }

            ExprKind::Binary { op, lhs, rhs } if op.is_short_circuit() => {
                let lhs = self.translate_yielding_region(lhs)?;
                let rhs = self.translate_yielding_region(rhs)?;
                let id = self.module.create_op(
                    OpKind::EffectfulBinaryExpr(*op),
                    vec![],
                    Some(ValueType::Ty(Type::Bool)),
                    vec![lhs, rhs],
                );
                block.push(id);
                self.module
                    .op(id)?
                    .result()
                    .ok_or_else(|| Error::internal("and/or without a result"))
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let ty = binary_result_type(*op, &lhs.ty, &rhs.ty)?;
                let lhs = self.translate_value(lhs, block)?;
                let rhs = self.translate_value(rhs, block)?;
                Ok(self.module.emit(
                    block,
                    OpKind::BinaryExpr(*op),
                    vec![lhs, rhs],
                    ValueType::Ty(ty),
                ))
            }

            ExprKind::IfExpr { cond, then, orelse } => {
                let cond = self.translate_value(cond, block)?;
                let then = self.translate_yielding_region(then)?;
                let orelse = self.translate_yielding_region(orelse)?;
                let id = self.module.create_op(
                    OpKind::IfExpr,
                    vec![cond],
                    Some(ValueType::Ty(expr.ty.clone())),
                    vec![then, orelse],
                );
                block.push(id);
                self.module
                    .op(id)?
                    .result()
                    .ok_or_else(|| Error::internal("if-expression without a result"))
            }

            ExprKind::List(elems) => {
                let mut values = Vec::with_capacity(elems.len());
                for elem in elems {
                    values.push(self.translate_value(elem, block)?);
                }
                Ok(self.module.emit(
                    block,
                    OpKind::ListExpr,
                    values,
                    ValueType::Ty(expr.ty.clone()),
                ))
            }

            ExprKind::Index { value, index } => {
                let base = self.translate_value(value, block)?;
                let index = self.translate_value(index, block)?;
                match &value.ty {
                    Type::Str => {
                        // A fresh one-character string
                        let addr = self.module.emit(
                            block,
                            OpKind::IndexString,
                            vec![base, index],
                            ValueType::MemLoc(Type::Int),
                        );
                        let ch = self.module.emit(
                            block,
                            OpKind::Load,
                            vec![addr],
                            ValueType::Ty(Type::Int),
                        );
                        Ok(self.module.emit(
                            block,
                            OpKind::ListExpr,
                            vec![ch],
                            ValueType::Ty(Type::Str),
                        ))
                    }
                    Type::List(elem) => Ok(self.module.emit(
                        block,
                        OpKind::GetAddress,
                        vec![base, index],
                        ValueType::MemLoc((**elem).clone()),
                    )),
                    other => Err(Error::internal(format!(
                        "cannot index a value of type {}",
                        other
                    ))),
                }
            }

            ExprKind::Call { func, args } => {
                let result = self.translate_call(func, args, Some(expr.ty.clone()), block)?;
                result.ok_or_else(|| Error::internal(format!("call to {} has no result", func)))
            }
        }
    }

    fn translate_literal(&mut self, lit: &Literal, ty: Type, block: &mut Vec<OpId>) -> ValueId {
        self.module.emit(
            block,
            OpKind::Literal(LiteralValue::from(lit)),
            vec![],
            ValueType::Ty(ty),
        )
    }

    /// Call; `result` is None in statement position
    fn translate_call(
        &mut self,
        func: &str,
        args: &[Expr],
        result: Option<Type>,
        block: &mut Vec<OpId>,
    ) -> Result<Option<ValueId>> {
        let func = match self.scopes.lookup(self.scope, func) {
            Some(Symbol::Function(label)) => label,
            Some(Symbol::Variable(_)) => {
                return Err(Error::internal(format!("'{}' is not a function", func)))
            }
            None if BUILTINS.contains(&func) => func.to_string(),
            None => {
                return Err(Error::UndefinedName {
                    name: func.to_string(),
                })
            }
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.translate_value(arg, block)?);
        }
        let id = self.module.create_op(
            OpKind::CallExpr { func },
            values,
            result.map(ValueType::Ty),
            vec![],
        );
        block.push(id);
        Ok(self.module.op(id)?.result())
    }

    /// Memory location of the variable `name` as seen from the current scope
    fn variable(&self, name: &str) -> Result<ValueId> {
        match self.scopes.resolve(self.scope, name)? {
            Symbol::Variable(slot) => Ok(slot),
            Symbol::Function(_) => Err(Error::internal(format!(
                "function '{}' used as a variable",
                name
            ))),
        }
    }
}

impl Default for IrGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Result type of a (non-short-circuit) binary operator
fn binary_result_type(op: BinaryOp, lhs: &Type, rhs: &Type) -> Result<Type> {
    if op.is_comparison() {
        if op != BinaryOp::Is && lhs != rhs {
            return Err(Error::internal(format!(
                "operands of '{}' have mismatched types {} and {}",
                op, lhs, rhs
            )));
        }
        return Ok(Type::Bool);
    }

    match (op, lhs, rhs) {
        (BinaryOp::Add, Type::List(a), Type::List(b)) => Ok(Type::list(a.join(b))),
        (BinaryOp::Add, Type::Empty, other) | (BinaryOp::Add, other, Type::Empty)
            if other.is_list() || *other == Type::Empty =>
        {
            Ok(other.clone())
        }
        _ if lhs == rhs => Ok(lhs.clone()),
        _ => Err(Error::internal(format!(
            "operands of '{}' have mismatched types {} and {}",
            op, lhs, rhs
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::UnaryOp;

    fn count_kind(module: &IrModule, pred: impl Fn(&OpKind) -> bool) -> usize {
        module
            .walk()
            .into_iter()
            .filter(|&id| pred(&module.op(id).unwrap().kind))
            .count()
    }

    #[test]
    fn test_entry_function_first() {
        let program = Program {
            decls: vec![
                Decl::Var(VarDef::new("x", Type::Int, Literal::Int(1))),
                Decl::Func(FuncDef::new("f", vec![], Type::None, vec![Stmt::Pass])),
            ],
            stmts: vec![Stmt::print(Expr::name("x", Type::Int))],
        };
        let module = IrGenerator::new().generate(&program).unwrap();
        module.verify().unwrap();
        let names: Vec<_> = module
            .functions()
            .into_iter()
            .map(|id| match &module.op(id).unwrap().kind {
                OpKind::FuncDef { name, .. } => name.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(names, vec!["_main", "f"]);
    }

    #[test]
    fn test_name_read_inserts_load() {
        let program = Program {
            decls: vec![Decl::Var(VarDef::new("x", Type::Int, Literal::Int(1)))],
            stmts: vec![Stmt::print(Expr::name("x", Type::Int))],
        };
        let module = IrGenerator::new().generate(&program).unwrap();
        assert_eq!(count_kind(&module, |k| matches!(k, OpKind::Load)), 1);
        assert_eq!(count_kind(&module, |k| matches!(k, OpKind::Alloc(_))), 1);
    }

    #[test]
    fn test_params_are_spilled() {
        let f = FuncDef::new(
            "f",
            vec![("a", Type::Int), ("b", Type::Bool)],
            Type::Int,
            vec![Stmt::Return(Some(Expr::name("a", Type::Int)))],
        );
        let program = Program {
            decls: vec![Decl::Func(f)],
            stmts: vec![],
        };
        let module = IrGenerator::new().generate(&program).unwrap();
        module.verify().unwrap();
        let f = module.functions()[1];
        let body = &module.op(f).unwrap().regions()[0];
        assert_eq!(body.args.len(), 2);
        // alloc, store per parameter
        let first: Vec<_> = body.ops[..4]
            .iter()
            .map(|&id| module.op(id).unwrap().kind.mnemonic())
            .collect();
        assert_eq!(first, vec!["alloc", "store", "alloc", "store"]);
        // Each argument's only user is its spill store
        for &arg in &body.args {
            assert_eq!(module.users(arg).len(), 1);
        }
    }

    #[test]
    fn test_duplicate_local_is_rejected() {
        let mut f = FuncDef::new("f", vec![("a", Type::Int)], Type::None, vec![Stmt::Pass]);
        f.decls.push(Decl::Var(VarDef::new("a", Type::Int, Literal::Int(0))));
        let program = Program {
            decls: vec![Decl::Func(f)],
            stmts: vec![],
        };
        let err = IrGenerator::new().generate(&program).unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition { name } if name == "a"));
    }

    #[test]
    fn test_short_circuit_regions() {
        let program = Program {
            decls: vec![],
            stmts: vec![Stmt::print(Expr::binary(
                BinaryOp::And,
                Expr::bool(false),
                Expr::unary(UnaryOp::Not, Expr::bool(true)),
                Type::Bool,
            ))],
        };
        let module = IrGenerator::new().generate(&program).unwrap();
        module.verify().unwrap();
        let and = module
            .walk()
            .into_iter()
            .find(|&id| matches!(module.op(id).unwrap().kind, OpKind::EffectfulBinaryExpr(_)))
            .unwrap();
        let op = module.op(and).unwrap();
        assert_eq!(op.regions().len(), 2);
        for region in op.regions() {
            let last = *region.ops.last().unwrap();
            assert!(matches!(module.op(last).unwrap().kind, OpKind::Yield));
        }
    }

    #[test]
    fn test_chained_assignment_evaluates_value_once() {
        let program = Program {
            decls: vec![
                Decl::Var(VarDef::new("a", Type::Int, Literal::Int(0))),
                Decl::Var(VarDef::new("b", Type::Int, Literal::Int(0))),
            ],
            stmts: vec![Stmt::assign_chain(
                vec![Expr::name("a", Type::Int), Expr::name("b", Type::Int)],
                Expr::int(5),
            )],
        };
        let module = IrGenerator::new().generate(&program).unwrap();
        let assign = module
            .walk()
            .into_iter()
            .find(|&id| matches!(module.op(id).unwrap().kind, OpKind::Assign))
            .unwrap();
        assert_eq!(module.op(assign).unwrap().operands().len(), 3);
    }

    #[test]
    fn test_string_index_builds_fresh_string() {
        let program = Program {
            decls: vec![Decl::Var(VarDef::new("s", Type::Str, Literal::Str("abc".into())))],
            stmts: vec![Stmt::print(Expr::index(
                Expr::name("s", Type::Str),
                Expr::int(1),
                Type::Str,
            ))],
        };
        let module = IrGenerator::new().generate(&program).unwrap();
        assert_eq!(count_kind(&module, |k| matches!(k, OpKind::IndexString)), 1);
        assert_eq!(count_kind(&module, |k| matches!(k, OpKind::ListExpr)), 1);
    }

    #[test]
    fn test_list_concat_typing() {
        assert_eq!(
            binary_result_type(BinaryOp::Add, &Type::list(Type::Int), &Type::list(Type::Bool))
                .unwrap(),
            Type::list(Type::Object)
        );
        assert_eq!(
            binary_result_type(BinaryOp::Add, &Type::Empty, &Type::list(Type::Int)).unwrap(),
            Type::list(Type::Int)
        );
        assert_eq!(
            binary_result_type(BinaryOp::Lt, &Type::Int, &Type::Int).unwrap(),
            Type::Bool
        );
        assert!(binary_result_type(BinaryOp::Sub, &Type::Int, &Type::Bool).is_err());
    }

    #[test]
    fn test_nested_function_is_hoisted() {
        let mut outer = FuncDef::new("outer", vec![], Type::None, vec![Stmt::Pass]);
        outer
            .decls
            .push(Decl::Func(FuncDef::new("inner", vec![], Type::None, vec![Stmt::Pass])));
        let program = Program {
            decls: vec![Decl::Func(outer)],
            stmts: vec![],
        };
        let module = IrGenerator::new().generate(&program).unwrap();
        assert_eq!(function_names(&module), vec!["_main", "outer.inner", "outer"]);
    }

    fn function_names(module: &IrModule) -> Vec<String> {
        module
            .functions()
            .into_iter()
            .map(|id| match &module.op(id).unwrap().kind {
                OpKind::FuncDef { name, .. } => name.clone(),
                _ => String::new(),
            })
            .collect()
    }

    fn callees(module: &IrModule) -> Vec<String> {
        module
            .walk()
            .into_iter()
            .filter_map(|id| match &module.op(id).unwrap().kind {
                OpKind::CallExpr { func } if func != "print" => Some(func.clone()),
                _ => None,
            })
            .collect()
    }

    /// `def <name>() -> int: def helper() -> int: return <value>; return helper()`
    fn with_helper(name: &str, value: i32) -> FuncDef {
        let helper = FuncDef::new(
            "helper",
            vec![],
            Type::Int,
            vec![Stmt::Return(Some(Expr::int(value)))],
        );
        let mut outer = FuncDef::new(
            name,
            vec![],
            Type::Int,
            vec![Stmt::Return(Some(Expr::call("helper", vec![], Type::Int)))],
        );
        outer.decls.push(Decl::Func(helper));
        outer
    }

    #[test]
    fn test_same_nested_name_in_sibling_functions() {
        let program = Program {
            decls: vec![Decl::Func(with_helper("a", 1)), Decl::Func(with_helper("b", 2))],
            stmts: vec![],
        };
        let module = IrGenerator::new().generate(&program).unwrap();
        module.verify().unwrap();
        assert_eq!(
            function_names(&module),
            vec!["_main", "a.helper", "a", "b.helper", "b"]
        );
        assert_eq!(callees(&module), vec!["a.helper", "b.helper"]);
    }

    #[test]
    fn test_nested_function_shadows_top_level() {
        let top = FuncDef::new(
            "helper",
            vec![],
            Type::Int,
            vec![Stmt::Return(Some(Expr::int(0)))],
        );
        let program = Program {
            decls: vec![Decl::Func(top), Decl::Func(with_helper("a", 1))],
            stmts: vec![Stmt::print(Expr::call("helper", vec![], Type::Int))],
        };
        let module = IrGenerator::new().generate(&program).unwrap();
        let mut calls = callees(&module);
        calls.sort();
        assert_eq!(calls, vec!["a.helper", "helper"]);
    }

    #[test]
    fn test_duplicate_function_in_one_scope() {
        let f = || Decl::Func(FuncDef::new("f", vec![], Type::None, vec![Stmt::Pass]));
        let program = Program {
            decls: vec![f(), f()],
            stmts: vec![],
        };
        let err = IrGenerator::new().generate(&program).unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition { name } if name == "f"));
    }

    #[test]
    fn test_call_to_unknown_function() {
        let program = Program {
            decls: vec![],
            stmts: vec![Stmt::Expr(Expr::call("missing", vec![], Type::None))],
        };
        let err = IrGenerator::new().generate(&program).unwrap_err();
        assert!(matches!(err, Error::UndefinedName { name } if name == "missing"));
    }
}
