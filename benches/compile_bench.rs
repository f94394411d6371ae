use chococ::ast::{BinaryOp, Decl, Expr, FuncDef, Literal, Program, Stmt, VarDef};
use chococ::{CompileOptions, Compiler, Emulator, Type};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// `fib(n)` by recursion plus a summing while loop
fn sample_program() -> Program {
    let n = || Expr::name("n", Type::Int);
    let fib_call = |arg: Expr| Expr::call("fib", vec![arg], Type::Int);
    let minus = |k: i32| Expr::binary(BinaryOp::Sub, n(), Expr::int(k), Type::Int);
    let fib = FuncDef::new(
        "fib",
        vec![("n", Type::Int)],
        Type::Int,
        vec![
            Stmt::If {
                cond: Expr::binary(BinaryOp::Lt, n(), Expr::int(2), Type::Bool),
                then: vec![Stmt::Return(Some(n()))],
                orelse: vec![Stmt::Pass],
            },
            Stmt::Return(Some(Expr::binary(
                BinaryOp::Add,
                fib_call(minus(1)),
                fib_call(minus(2)),
                Type::Int,
            ))),
        ],
    );

    let i = || Expr::name("i", Type::Int);
    let total = || Expr::name("total", Type::Int);
    Program {
        decls: vec![
            Decl::Var(VarDef::new("i", Type::Int, Literal::Int(0))),
            Decl::Var(VarDef::new("total", Type::Int, Literal::Int(0))),
            Decl::Func(fib),
        ],
        stmts: vec![
            Stmt::While {
                cond: Expr::binary(BinaryOp::Lt, i(), Expr::int(100), Type::Bool),
                body: vec![
                    Stmt::assign(total(), Expr::binary(BinaryOp::Add, total(), i(), Type::Int)),
                    Stmt::assign(i(), Expr::binary(BinaryOp::Add, i(), Expr::int(1), Type::Int)),
                ],
            },
            Stmt::print(total()),
            Stmt::print(fib_call(Expr::int(15))),
        ],
    }
}

fn compile_benchmark(c: &mut Criterion) {
    let program = sample_program();
    let compiler = Compiler::new(CompileOptions::default());

    c.bench_function("compile sample program", |b| {
        b.iter(|| compiler.compile(black_box(&program)).unwrap())
    });
}

fn emulate_benchmark(c: &mut Criterion) {
    let program = sample_program();
    let asm = Compiler::new(CompileOptions::default())
        .compile(&program)
        .unwrap()
        .asm;

    c.bench_function("emulate sample program", |b| {
        b.iter(|| Emulator::new().run(black_box(&asm)).unwrap())
    });
}

criterion_group!(benches, compile_benchmark, emulate_benchmark);
criterion_main!(benches);
