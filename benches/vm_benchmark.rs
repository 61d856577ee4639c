//! VM performance benchmarks: calls, loops, string interning and compilation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

use lox_vm::{OutputBuffer, VM, compiler};

/// Interpret `source` on a fresh VM, discarding what it prints
fn run_lox(source: &str) {
    let output = OutputBuffer::new();
    let mut vm = VM::with_output(Box::new(output));
    if let Err(e) = vm.interpret(source) {
        panic!("benchmark should succeed: {}", e);
    }
}

/// Fibonacci benchmark - tests recursive function calls
fn fibonacci_source(n: u32) -> String {
    format!(
        r#"
fun fib(n) {{
  if (n < 2) return n;
  return fib(n - 1) + fib(n - 2);
}}

print fib({});
"#,
        n
    )
}

/// Sum loop benchmark - tests local variable access and arithmetic
fn sum_loop_source(n: u32) -> String {
    format!(
        r#"
fun sum_to(n) {{
  var total = 0;
  for (var i = 1; i <= n; i = i + 1) {{
    total = total + i;
  }}
  return total;
}}

print sum_to({});
"#,
        n
    )
}

/// Global loop benchmark - every access goes through the globals table
fn global_loop_source(n: u32) -> String {
    format!(
        r#"
var total = 0;
var i = 0;
while (i < {}) {{
  total = total + i;
  i = i + 1;
}}
print total;
"#,
        n
    )
}

/// String benchmark - concatenation allocates and interns a new string each time
fn string_concat_source(n: u32) -> String {
    format!(
        r#"
var s = "";
for (var i = 0; i < {}; i = i + 1) {{
  s = s + "x";
}}
print s == s;
"#,
        n
    )
}

fn bench_fibonacci(c: &mut Criterion) {
    let mut group = c.benchmark_group("fibonacci");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    for n in [15, 20, 25] {
        let source = fibonacci_source(n);
        group.bench_with_input(BenchmarkId::new("interpret", n), &source, |b, s| {
            b.iter(|| run_lox(black_box(s)))
        });
    }

    group.finish();
}

fn bench_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("loops");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    let source = sum_loop_source(200_000);
    group.bench_function("local_sum", |b| b.iter(|| run_lox(black_box(&source))));

    let source = global_loop_source(200_000);
    group.bench_function("global_sum", |b| b.iter(|| run_lox(black_box(&source))));

    group.finish();
}

fn bench_strings(c: &mut Criterion) {
    let mut group = c.benchmark_group("strings");
    group.sample_size(10);

    for n in [100, 1_000] {
        let source = string_concat_source(n);
        group.bench_with_input(BenchmarkId::new("concat", n), &source, |b, s| {
            b.iter(|| run_lox(black_box(s)))
        });
    }

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let source = format!("{}\n{}", fibonacci_source(10), sum_loop_source(10)).repeat(40);
    c.bench_function("compile", |b| {
        b.iter(|| compiler::check(black_box(&source)).is_ok())
    });
}

criterion_group!(benches, bench_fibonacci, bench_loops, bench_strings, bench_compile);
criterion_main!(benches);
