use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Assign, BinaryOp, Decl, Expr, ExprKind, FuncDef, Program, Stmt, UnaryOp};
use crate::compiler::emulator::Outcome;
use crate::compiler::runtime::{messages, ERROR_EXIT_CODE, INPUT_LIMIT};
use crate::error::{Error, Result};
use crate::runtime::{Environment, Value};

/// Tree-walking evaluator for typed programs
///
/// The reference semantics for the compiled code:
/// - 32-bit wrapping arithmetic, floored `//` and `%`
/// - lists are shared and mutable, strings are immutable byte strings
/// - program errors print the same diagnostics as the runtime library and
///   exit with code 1
pub struct Interpreter {
    env: Environment,
    stdin: Vec<u8>,
    stdin_pos: usize,
    stdout: Vec<u8>,
    max_steps: u64,
    steps: u64,
    /// Active user-function calls
    depth: usize,
    max_depth: usize,
}

/// Where a statement sends control next
enum Flow {
    Next,
    Return(Value),
}

/// Assignable location
enum Location {
    Variable(String),
    Element(Rc<RefCell<Vec<Value>>>, usize),
}

impl Interpreter {
    /// Default budget of loop iterations plus calls
    pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;

    /// Default limit on nested user-function calls
    ///
    /// Every level recurses on the native stack; this fits a 2 MiB thread.
    pub const DEFAULT_MAX_DEPTH: usize = 100;

    /// Creates a new interpreter with empty stdin
    pub fn new() -> Self {
        Interpreter {
            env: Environment::new(),
            stdin: Vec::new(),
            stdin_pos: 0,
            stdout: Vec::new(),
            max_steps: Self::DEFAULT_MAX_STEPS,
            steps: 0,
            depth: 0,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    /// Supply the bytes `input()` reads
    pub fn with_stdin(mut self, input: &str) -> Self {
        self.stdin = input.as_bytes().to_vec();
        self
    }

    /// Limit the number of loop iterations and calls
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Limit call nesting; raise it only when running on a larger stack
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Execute a program
    ///
    /// Runtime errors of the program itself end in an `Outcome` with exit
    /// code 1; everything else is an `Err`.
    pub fn run(&mut self, program: &Program) -> Result<Outcome> {
        self.env = Environment::new();
        self.stdin_pos = 0;
        self.stdout.clear();
        self.steps = 0;
        self.depth = 0;

        let exit_code = match self.execute(program) {
            Ok(()) => 0,
            Err(Error::ProgramError(message)) => {
                self.stdout.extend_from_slice(message.as_bytes());
                self.stdout.push(b'\n');
                ERROR_EXIT_CODE
            }
            Err(other) => return Err(other),
        };
        tracing::debug!(steps = self.steps, exit_code, "interpretation finished");
        Ok(Outcome {
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            exit_code,
        })
    }

    fn execute(&mut self, program: &Program) -> Result<()> {
        self.declare(Environment::GLOBAL, &program.decls)?;
        self.exec_block(Environment::GLOBAL, &program.stmts)?;
        Ok(())
    }

    fn declare(&mut self, frame: usize, decls: &[Decl]) -> Result<()> {
        for decl in decls {
            match decl {
                Decl::Var(var) => {
                    self.env
                        .define(frame, &var.name, Value::from_literal(&var.init))?
                }
                Decl::Func(func) => self.env.define_function(frame, Rc::new(func.clone()))?,
                Decl::Global(name) => self.env.declare_global(frame, name)?,
                // Lookup already walks outward to the nearest definition
                Decl::NonLocal(_) => {}
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(Error::ExecutionLimitExceeded {
                limit: self.max_steps,
            });
        }
        Ok(())
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    fn exec_block(&mut self, frame: usize, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(frame, stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, frame: usize, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(frame, expr)?;
            }
            Stmt::Assign(assign) => self.exec_assign(frame, assign)?,
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(frame, expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Pass => {}
            Stmt::If { cond, then, orelse } => {
                let branch = if self.eval(frame, cond)?.as_bool()? {
                    then
                } else {
                    orelse
                };
                return self.exec_block(frame, branch);
            }
            Stmt::While { cond, body } => loop {
                self.tick()?;
                if !self.eval(frame, cond)?.as_bool()? {
                    break;
                }
                if let Flow::Return(value) = self.exec_block(frame, body)? {
                    return Ok(Flow::Return(value));
                }
            },
            Stmt::For { target, iter, body } => {
                // Evaluated once; elements are re-read each iteration
                let iterable = self.eval(frame, iter)?;
                let mut index = 0;
                loop {
                    self.tick()?;
                    if index >= self.len(&iterable)? {
                        break;
                    }
                    let element = self.element(&iterable, index)?;
                    self.env.set(frame, target, element)?;
                    if let Flow::Return(value) = self.exec_block(frame, body)? {
                        return Ok(Flow::Return(value));
                    }
                    index += 1;
                }
            }
        }
        Ok(Flow::Next)
    }

    /// Right-hand side first, then every target left to right, then the stores
    fn exec_assign(&mut self, frame: usize, assign: &Assign) -> Result<()> {
        let (targets, value) = assign.targets_and_value();
        let value = self.eval(frame, value)?;
        let mut locations = Vec::with_capacity(targets.len());
        for target in targets {
            locations.push(self.location(frame, target)?);
        }
        for location in locations {
            match location {
                Location::Variable(name) => self.env.set(frame, &name, value.clone())?,
                Location::Element(items, index) => items.borrow_mut()[index] = value.clone(),
            }
        }
        Ok(())
    }

    fn location(&mut self, frame: usize, target: &Expr) -> Result<Location> {
        match &target.kind {
            ExprKind::Name(name) => Ok(Location::Variable(name.clone())),
            ExprKind::Index { value, index } => {
                let list = self.eval(frame, value)?;
                let index = self.eval(frame, index)?.as_int()?;
                match list {
                    Value::None => Err(Error::ProgramError(messages::INDEX_NONE.to_string())),
                    Value::List(items) => {
                        let len = items.borrow().len();
                        let slot = checked_index(index, len)?;
                        Ok(Location::Element(items, slot))
                    }
                    other => Err(Error::internal(format!(
                        "cannot assign into {}",
                        other.type_name()
                    ))),
                }
            }
            _ => Err(Error::internal("assignment to a non-location")),
        }
    }

    // =========================================================================
    // EXPRESSIONS
    // =========================================================================

    fn eval(&mut self, frame: usize, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(Value::from_literal(literal)),
            ExprKind::Name(name) => self.env.get(frame, name),
            ExprKind::Unary { op, operand } => {
                let value = self.eval(frame, operand)?;
                Ok(match op {
                    UnaryOp::Neg => Value::Int(value.as_int()?.wrapping_neg()),
                    UnaryOp::Not => Value::Bool(!value.as_bool()?),
                })
            }
            ExprKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => {
                    if !self.eval(frame, lhs)?.as_bool()? {
                        return Ok(Value::Bool(false));
                    }
                    self.eval(frame, rhs)
                }
                BinaryOp::Or => {
                    if self.eval(frame, lhs)?.as_bool()? {
                        return Ok(Value::Bool(true));
                    }
                    self.eval(frame, rhs)
                }
                _ => {
                    let lhs = self.eval(frame, lhs)?;
                    let rhs = self.eval(frame, rhs)?;
                    binary(*op, &lhs, &rhs)
                }
            },
            ExprKind::IfExpr { cond, then, orelse } => {
                if self.eval(frame, cond)?.as_bool()? {
                    self.eval(frame, then)
                } else {
                    self.eval(frame, orelse)
                }
            }
            ExprKind::List(elems) => {
                let mut values = Vec::with_capacity(elems.len());
                for elem in elems {
                    values.push(self.eval(frame, elem)?);
                }
                Ok(Value::list(values))
            }
            ExprKind::Index { value, index } => {
                let value = self.eval(frame, value)?;
                let index = self.eval(frame, index)?.as_int()?;
                if matches!(value, Value::None) {
                    return Err(Error::ProgramError(messages::INDEX_NONE.to_string()));
                }
                let slot = checked_index(index, self.len(&value)?)?;
                self.element(&value, slot)
            }
            ExprKind::Call { func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(frame, arg)?);
                }
                self.call(frame, func, values)
            }
        }
    }

    fn call(&mut self, frame: usize, name: &str, args: Vec<Value>) -> Result<Value> {
        match (name, args.as_slice()) {
            ("print", [value]) => {
                self.print(value)?;
                return Ok(Value::None);
            }
            ("len", [value]) => {
                let len = self.len(value)?;
                return i32::try_from(len)
                    .map(Value::Int)
                    .map_err(|_| Error::internal("length exceeds int range"));
            }
            ("input", []) => return Ok(self.input()),
            _ => {}
        }

        let (scope, func) = self
            .env
            .function(frame, name)
            .ok_or_else(|| Error::UndefinedName {
                name: name.to_string(),
            })?;
        if func.params.len() != args.len() {
            return Err(Error::internal(format!(
                "{} takes {} argument(s), got {}",
                name,
                func.params.len(),
                args.len()
            )));
        }
        if self.depth >= self.max_depth {
            return Err(Error::CallDepthExceeded {
                limit: self.max_depth,
            });
        }
        self.tick()?;

        self.depth += 1;
        let callee = self.env.push(scope);
        let result = self.invoke(callee, &func, args);
        self.env.pop(callee);
        self.depth -= 1;
        result
    }

    fn invoke(&mut self, callee: usize, func: &FuncDef, args: Vec<Value>) -> Result<Value> {
        for (param, arg) in func.params.iter().zip(args) {
            self.env.define(callee, &param.name, arg)?;
        }
        self.declare(callee, &func.decls)?;
        match self.exec_block(callee, &func.body)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::None),
        }
    }

    fn print(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Int(_) | Value::Bool(_) => {
                self.stdout.extend_from_slice(value.to_string().as_bytes());
            }
            Value::Str(bytes) => self.stdout.extend_from_slice(bytes),
            other => {
                return Err(Error::unimplemented(format!(
                    "print of a value of type {}",
                    other.type_name()
                )))
            }
        }
        self.stdout.push(b'\n');
        Ok(())
    }

    /// One line of stdin without its newline; empty at end of input
    fn input(&mut self) -> Value {
        let rest = &self.stdin[self.stdin_pos..];
        let line_len = rest
            .iter()
            .position(|&b| b == b'\n')
            .map_or(rest.len(), |i| i + 1);
        let n = line_len.min(INPUT_LIMIT as usize);
        let mut line = &rest[..n];
        self.stdin_pos += n;
        if let Some(stripped) = line.strip_suffix(b"\n") {
            line = stripped;
        }
        Value::str(line)
    }

    fn len(&self, value: &Value) -> Result<usize> {
        match value {
            Value::None => Err(Error::ProgramError(messages::LEN_NONE.to_string())),
            Value::Str(bytes) => Ok(bytes.len()),
            Value::List(items) => Ok(items.borrow().len()),
            other => Err(Error::internal(format!(
                "len of {}",
                other.type_name()
            ))),
        }
    }

    fn element(&self, value: &Value, index: usize) -> Result<Value> {
        match value {
            Value::Str(bytes) => Ok(Value::str(&bytes[index..=index])),
            Value::List(items) => Ok(items.borrow()[index].clone()),
            other => Err(Error::internal(format!(
                "cannot index {}",
                other.type_name()
            ))),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_index(index: i32, len: usize) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < len)
        .ok_or_else(|| Error::ProgramError(messages::INDEX_OOB.to_string()))
}

fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    Ok(match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
            (Value::Str(a), Value::Str(b)) => Value::str(&[a.as_slice(), b.as_slice()].concat()),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Value::list(items)
            }
            (a, b) => {
                return Err(Error::unimplemented(format!(
                    "'+' on {} and {}",
                    a.type_name(),
                    b.type_name()
                )))
            }
        },
        BinaryOp::Sub => Value::Int(lhs.as_int()?.wrapping_sub(rhs.as_int()?)),
        BinaryOp::Mul => Value::Int(lhs.as_int()?.wrapping_mul(rhs.as_int()?)),
        BinaryOp::FloorDiv => Value::Int(floor_div(lhs.as_int()?, rhs.as_int()?)?),
        BinaryOp::Mod => Value::Int(floor_mod(lhs.as_int()?, rhs.as_int()?)?),
        BinaryOp::Lt => Value::Bool(lhs.as_int()? < rhs.as_int()?),
        BinaryOp::LtEq => Value::Bool(lhs.as_int()? <= rhs.as_int()?),
        BinaryOp::Gt => Value::Bool(lhs.as_int()? > rhs.as_int()?),
        BinaryOp::GtEq => Value::Bool(lhs.as_int()? >= rhs.as_int()?),
        BinaryOp::Eq => Value::Bool(lhs.equals(rhs)),
        BinaryOp::NotEq => Value::Bool(!lhs.equals(rhs)),
        BinaryOp::Is => Value::Bool(lhs.is(rhs)),
        BinaryOp::And | BinaryOp::Or => {
            return Err(Error::internal("short-circuit operator evaluated eagerly"))
        }
    })
}

/// Truncated quotient and remainder, with the machine's overflow behaviour
fn truncated(a: i32, b: i32) -> Result<(i32, i32, i32)> {
    if b == 0 {
        return Err(Error::ProgramError(messages::DIV_ZERO.to_string()));
    }
    let quotient = a.wrapping_div(b);
    let remainder = a.wrapping_rem(b);
    let adjust = i32::from(remainder != 0 && (remainder ^ b) < 0);
    Ok((quotient, remainder, adjust))
}

/// Floored division (`//`)
pub fn floor_div(a: i32, b: i32) -> Result<i32> {
    let (quotient, _, adjust) = truncated(a, b)?;
    Ok(quotient.wrapping_sub(adjust))
}

/// Floored modulo (`%`), taking the divisor's sign
pub fn floor_mod(a: i32, b: i32) -> Result<i32> {
    let (_, remainder, adjust) = truncated(a, b)?;
    Ok(remainder.wrapping_add(b.wrapping_mul(adjust)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Literal, VarDef};
    use crate::types::Type;

    fn run(program: &Program) -> Outcome {
        Interpreter::new().run(program).unwrap()
    }

    #[test]
    fn test_floored_division() {
        assert_eq!(floor_div(7, 2).unwrap(), 3);
        assert_eq!(floor_div(-7, 2).unwrap(), -4);
        assert_eq!(floor_div(7, -2).unwrap(), -4);
        assert_eq!(floor_mod(-7, 2).unwrap(), 1);
        assert_eq!(floor_mod(7, -2).unwrap(), -1);
        assert_eq!(floor_div(i32::MIN, -1).unwrap(), i32::MIN);
        assert_eq!(floor_mod(i32::MIN, -1).unwrap(), 0);
        assert!(matches!(floor_div(1, 0), Err(Error::ProgramError(_))));
    }

    #[test]
    fn test_function_call() {
        let f = FuncDef::new(
            "f",
            vec![("x", Type::Int)],
            Type::Int,
            vec![Stmt::Return(Some(Expr::binary(
                BinaryOp::Add,
                Expr::name("x", Type::Int),
                Expr::int(1),
                Type::Int,
            )))],
        );
        let program = Program {
            decls: vec![Decl::Func(f)],
            stmts: vec![Stmt::print(Expr::call("f", vec![Expr::int(41)], Type::Int))],
        };
        let outcome = run(&program);
        assert_eq!(outcome.stdout, "42\n");
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn test_index_error_exits_with_message() {
        let list = Type::list(Type::Int);
        let program = Program {
            decls: vec![Decl::Var(VarDef::new("a", list.clone(), Literal::None))],
            stmts: vec![
                Stmt::assign(
                    Expr::name("a", list.clone()),
                    Expr::list(vec![Expr::int(1), Expr::int(2), Expr::int(3)], list.clone()),
                ),
                Stmt::print(Expr::index(Expr::name("a", list.clone()), Expr::int(2), Type::Int)),
                Stmt::print(Expr::index(Expr::name("a", list), Expr::int(3), Type::Int)),
            ],
        };
        let outcome = run(&program);
        assert_eq!(outcome.stdout, "3\nIndexError: list index out of range\n");
        assert_eq!(outcome.exit_code, 1);
    }

    #[test]
    fn test_for_over_string_and_input() {
        let program = Program {
            decls: vec![Decl::Var(VarDef::new("c", Type::Str, Literal::Str(String::new())))],
            stmts: vec![Stmt::For {
                target: "c".into(),
                iter: Expr::call("input", vec![], Type::Str),
                body: vec![Stmt::print(Expr::name("c", Type::Str))],
            }],
        };
        let outcome = Interpreter::new().with_stdin("ab\n").run(&program).unwrap();
        assert_eq!(outcome.stdout, "a\nb\n");
    }

    #[test]
    fn test_len_of_none() {
        let program = Program {
            decls: vec![Decl::Var(VarDef::new("s", Type::Str, Literal::None))],
            stmts: vec![Stmt::print(Expr::call(
                "len",
                vec![Expr::name("s", Type::Str)],
                Type::Int,
            ))],
        };
        let outcome = run(&program);
        assert_eq!(
            outcome.stdout,
            "TypeError: object of type 'NoneType' has no len()\n"
        );
    }

    #[test]
    fn test_step_limit() {
        let program = Program {
            decls: vec![],
            stmts: vec![Stmt::While {
                cond: Expr::bool(true),
                body: vec![Stmt::Pass],
            }],
        };
        let err = Interpreter::new()
            .with_max_steps(100)
            .run(&program)
            .unwrap_err();
        assert!(matches!(err, Error::ExecutionLimitExceeded { limit: 100 }));
    }

    /// `def f(n: int) -> int: return 0 if n <= 0 else n + f(n - 1)`
    fn summing_recursion(n: i32) -> Program {
        let arg = || Expr::name("n", Type::Int);
        let f = FuncDef::new(
            "f",
            vec![("n", Type::Int)],
            Type::Int,
            vec![Stmt::Return(Some(Expr::if_expr(
                Expr::binary(BinaryOp::LtEq, arg(), Expr::int(0), Type::Bool),
                Expr::int(0),
                Expr::binary(
                    BinaryOp::Add,
                    arg(),
                    Expr::call(
                        "f",
                        vec![Expr::binary(BinaryOp::Sub, arg(), Expr::int(1), Type::Int)],
                        Type::Int,
                    ),
                    Type::Int,
                ),
            )))],
        );
        Program {
            decls: vec![Decl::Func(f)],
            stmts: vec![Stmt::print(Expr::call("f", vec![Expr::int(n)], Type::Int))],
        }
    }

    #[test]
    fn test_recursion_within_depth_limit() {
        assert_eq!(run(&summing_recursion(50)).stdout, "1275\n");
    }

    #[test]
    fn test_deep_recursion_is_an_error() {
        let err = Interpreter::new()
            .run(&summing_recursion(3000))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CallDepthExceeded {
                limit: Interpreter::DEFAULT_MAX_DEPTH
            }
        ));

        let err = Interpreter::new()
            .with_max_depth(20)
            .run(&summing_recursion(50))
            .unwrap_err();
        assert!(matches!(err, Error::CallDepthExceeded { limit: 20 }));
    }
}
