//! Benchmarks for signature decoding and breakpoint resolution.
//!
//! Tests decoding performance for the signature shapes a debugger sees most:
//! - Method signatures (simple, generic, varargs)
//! - Field signatures (primitives, arrays, generics)
//! - Local variable signatures
//! - Generic instantiations with substitution
//!
//! and the cost of mapping a source position to an IL offset over a large method.

extern crate corscope;

use std::{hint::black_box, sync::Arc};

use corscope::{
    debugger::breakpoints::BreakpointResolver,
    metadata::{
        sequencepoints::{SequencePoint, SequencePointIndex},
        signatures::{
            decode_field_signature, decode_local_signature, decode_method_signature,
            decode_type_with, Instantiation, TypeDescriptor,
        },
        token::Token,
        typesystem::ElementType,
    },
};
use criterion::{criterion_group, criterion_main, Criterion};

/// Benchmark decoding a simple void method with no parameters.
/// Signature: void Method()
fn bench_method_signature_void_no_params(c: &mut Criterion) {
    // DEFAULT calling convention, 0 params, VOID return
    let signature = [0x00, 0x00, 0x01];

    c.bench_function("sig_method_void_no_params", |b| {
        b.iter(|| {
            let sig = decode_method_signature(black_box(&signature), Instantiation::empty()).unwrap();
            black_box(sig)
        });
    });
}

/// Benchmark decoding a method with primitive parameters.
/// Signature: int Method(int a, string b, bool c)
fn bench_method_signature_primitives(c: &mut Criterion) {
    // DEFAULT, 3 params, I4 return, I4, STRING, BOOLEAN params
    let signature = [0x00, 0x03, 0x08, 0x08, 0x0E, 0x02];

    c.bench_function("sig_method_primitives", |b| {
        b.iter(|| {
            let sig = decode_method_signature(black_box(&signature), Instantiation::empty()).unwrap();
            black_box(sig)
        });
    });
}

/// Benchmark decoding a generic method.
/// Signature: T Method<T>(T a, List<T> b)
fn bench_method_signature_generic(c: &mut Criterion) {
    // GENERIC, 1 generic param, 2 params, MVAR 0 return, MVAR 0, GENERICINST CLASS TypeRef 1 <MVAR 0>
    let signature = [0x10, 0x01, 0x02, 0x1E, 0x00, 0x1E, 0x00, 0x15, 0x12, 0x05, 0x01, 0x1E, 0x00];

    c.bench_function("sig_method_generic", |b| {
        b.iter(|| {
            let sig = decode_method_signature(black_box(&signature), Instantiation::empty()).unwrap();
            black_box(sig)
        });
    });
}

/// Benchmark decoding a vararg call site signature.
/// Signature: void Method(int a, ..., string b)
fn bench_method_signature_vararg(c: &mut Criterion) {
    // VARARG, 2 params, VOID return, I4, SENTINEL, STRING
    let signature = [0x05, 0x02, 0x01, 0x08, 0x41, 0x0E];

    c.bench_function("sig_method_vararg", |b| {
        b.iter(|| {
            let sig = decode_method_signature(black_box(&signature), Instantiation::empty()).unwrap();
            black_box(sig)
        });
    });
}

/// Benchmark decoding a method with many parameters.
fn bench_method_signature_many_params(c: &mut Criterion) {
    // HASTHIS, 16 params, VOID return, alternating I4 and STRING
    let mut signature = vec![0x20, 0x10, 0x01];
    for i in 0..16 {
        signature.push(if i % 2 == 0 { 0x08 } else { 0x0E });
    }

    c.bench_function("sig_method_many_params", |b| {
        b.iter(|| {
            let sig = decode_method_signature(black_box(&signature), Instantiation::empty()).unwrap();
            black_box(sig)
        });
    });
}

/// Benchmark decoding a primitive field.
/// Signature: int field
fn bench_field_signature_primitive(c: &mut Criterion) {
    let signature = [0x06, 0x08];

    c.bench_function("sig_field_primitive", |b| {
        b.iter(|| {
            let sig = decode_field_signature(black_box(&signature), Instantiation::empty()).unwrap();
            black_box(sig)
        });
    });
}

/// Benchmark decoding a multi-dimensional array field.
/// Signature: int[0..4, 0..]
fn bench_field_signature_array(c: &mut Criterion) {
    // FIELD, ARRAY I4 rank 2, 1 size (5), 2 lower bounds (0, 0)
    let signature = [0x06, 0x14, 0x08, 0x02, 0x01, 0x05, 0x02, 0x00, 0x00];

    c.bench_function("sig_field_array", |b| {
        b.iter(|| {
            let sig = decode_field_signature(black_box(&signature), Instantiation::empty()).unwrap();
            black_box(sig)
        });
    });
}

/// Benchmark decoding a class field with custom modifiers.
/// Signature: modreq(IsVolatile) object field
fn bench_field_signature_modified(c: &mut Criterion) {
    let signature = [0x06, 0x1F, 0x09, 0x1C];

    c.bench_function("sig_field_modified", |b| {
        b.iter(|| {
            let sig = decode_field_signature(black_box(&signature), Instantiation::empty()).unwrap();
            black_box(sig)
        });
    });
}

/// Benchmark decoding locals including pinned and byref slots.
fn bench_local_signature(c: &mut Criterion) {
    // LOCAL_SIG, 4 locals: I4, PINNED BYREF U1, STRING, SZARRAY OBJECT
    let signature = [0x07, 0x04, 0x08, 0x45, 0x10, 0x05, 0x0E, 0x1D, 0x1C];

    c.bench_function("sig_locals_mixed", |b| {
        b.iter(|| {
            let sig = decode_local_signature(black_box(&signature), Instantiation::empty()).unwrap();
            black_box(sig)
        });
    });
}

/// Benchmark substituting class type arguments while decoding.
/// Signature: Dictionary<!0, !1[]> with !0 = string, !1 = int
fn bench_instantiated_type(c: &mut Criterion) {
    let signature = [0x15, 0x12, 0x09, 0x02, 0x13, 0x00, 0x1D, 0x13, 0x01];
    let instantiation = Instantiation::new(vec![
        TypeDescriptor::Primitive(ElementType::String),
        TypeDescriptor::Primitive(ElementType::I4),
    ]);

    c.bench_function("sig_type_instantiated", |b| {
        b.iter(|| {
            let ty = decode_type_with(black_box(&signature), &instantiation).unwrap();
            black_box(ty)
        });
    });
}

/// Benchmark resolving a breakpoint in the middle of a large method.
fn bench_breakpoint_resolution(c: &mut Criterion) {
    let document: Arc<str> = Arc::from("/src/Generated.cs");
    let points = (0..2000u32)
        .map(|i| SequencePoint {
            offset: i * 8,
            start_line: 10 + i,
            start_column: 9,
            end_line: 10 + i,
            end_column: 40,
            document: document.clone(),
        })
        .collect();
    let index = SequencePointIndex::new(Token::new(0x0600_0001), points);

    c.bench_function("resolve_breakpoint_2000_points", |b| {
        b.iter(|| {
            let resolution =
                BreakpointResolver::resolve(black_box("/src/Generated.cs"), 1010, 12, [&index]);
            black_box(resolution)
        });
    });
}

criterion_group!(
    benches,
    // Method signatures
    bench_method_signature_void_no_params,
    bench_method_signature_primitives,
    bench_method_signature_generic,
    bench_method_signature_vararg,
    bench_method_signature_many_params,
    // Field signatures
    bench_field_signature_primitive,
    bench_field_signature_array,
    bench_field_signature_modified,
    // Local variable signatures
    bench_local_signature,
    // Instantiations
    bench_instantiated_type,
    // Breakpoints
    bench_breakpoint_resolution,
);
criterion_main!(benches);
