//! Property-based differential tests
//!
//! Random pure int/bool programs are compiled, run on the emulator and
//! compared with the reference interpreter: same stdout, same exit code.

use chococ::ast::{BinaryOp, Decl, Expr, Literal, Program, Stmt, UnaryOp, VarDef};
use chococ::{CompileOptions, Compiler, Emulator, Interpreter, Type};
use proptest::prelude::*;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

fn int_literal() -> impl Strategy<Value = i32> {
    prop_oneof![
        8 => -20i32..20,
        1 => Just(i32::MAX),
        1 => Just(i32::MIN),
        1 => any::<i32>(),
    ]
}

fn arith_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Sub),
        Just(BinaryOp::Mul),
        Just(BinaryOp::FloorDiv),
        Just(BinaryOp::Mod),
    ]
}

fn compare_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Lt),
        Just(BinaryOp::LtEq),
        Just(BinaryOp::Gt),
        Just(BinaryOp::GtEq),
        Just(BinaryOp::Eq),
        Just(BinaryOp::NotEq),
        Just(BinaryOp::Is),
    ]
}

/// Int expressions over literals and the globals `x` and `y`
fn int_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        int_literal().prop_map(Expr::int),
        Just(Expr::name("x", Type::Int)),
        Just(Expr::name("y", Type::Int)),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (arith_op(), inner.clone(), inner.clone())
                .prop_map(|(op, l, r)| Expr::binary(op, l, r, Type::Int)),
            inner.clone().prop_map(|e| Expr::unary(UnaryOp::Neg, e)),
            (compare_op(), inner.clone(), inner.clone(), inner.clone(), inner)
                .prop_map(|(op, a, b, t, e)| {
                    Expr::if_expr(Expr::binary(op, a, b, Type::Bool), t, e)
                }),
        ]
    })
}

fn bool_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Expr::bool),
        (compare_op(), int_expr(), int_expr())
            .prop_map(|(op, l, r)| Expr::binary(op, l, r, Type::Bool)),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Expr::unary(UnaryOp::Not, e)),
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| Expr::binary(BinaryOp::And, l, r, Type::Bool)),
            (inner.clone(), inner)
                .prop_map(|(l, r)| Expr::binary(BinaryOp::Or, l, r, Type::Bool)),
        ]
    })
}

fn statement() -> impl Strategy<Value = Stmt> {
    prop_oneof![
        int_expr().prop_map(Stmt::print),
        bool_expr().prop_map(Stmt::print),
        int_expr().prop_map(|e| Stmt::assign(Expr::name("x", Type::Int), e)),
        int_expr().prop_map(|e| Stmt::assign(Expr::name("y", Type::Int), e)),
        (bool_expr(), int_expr(), int_expr()).prop_map(|(cond, a, b)| Stmt::If {
            cond,
            then: vec![Stmt::print(a)],
            orelse: vec![Stmt::print(b)],
        }),
    ]
}

fn program() -> impl Strategy<Value = Program> {
    (int_literal(), int_literal(), prop::collection::vec(statement(), 1..8)).prop_map(
        |(x, y, stmts)| Program {
            decls: vec![
                Decl::Var(VarDef::new("x", Type::Int, Literal::Int(x))),
                Decl::Var(VarDef::new("y", Type::Int, Literal::Int(y))),
            ],
            stmts,
        },
    )
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Compiled code prints what the interpreter prints and exits the same way
    #[test]
    fn compiled_matches_interpreter(program in program()) {
        let expected = Interpreter::new().run(&program).unwrap();
        for opt_level in [0, 1] {
            let options = CompileOptions { opt_level, ..CompileOptions::default() };
            let result = Compiler::new(options).compile(&program).unwrap();
            let outcome = Emulator::new().run(&result.asm).unwrap();
            prop_assert_eq!(&outcome, &expected);
        }
    }

    /// Every output line of a pure program is an int or a bool
    #[test]
    fn output_is_well_formed(program in program()) {
        let result = Compiler::new(CompileOptions::default()).compile(&program).unwrap();
        let outcome = Emulator::new().run(&result.asm).unwrap();
        if outcome.exit_code == 0 {
            for line in outcome.stdout.lines() {
                prop_assert!(
                    line == "True" || line == "False" || line.parse::<i32>().is_ok(),
                    "unexpected line {:?}", line
                );
            }
        }
    }
}
