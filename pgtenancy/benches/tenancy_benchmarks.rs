use criterion::{Criterion, criterion_group, criterion_main};
use pgtenancy::schema::{create_statements, drop_statements};
use pgtenancy::{CredentialCipher, generate_password, role_name, schema_name};
use std::hint::black_box;

fn bench_naming(c: &mut Criterion) {
    let mut group = c.benchmark_group("naming");
    let long = "long-tenant-slug-".repeat(8);

    for slug in ["acme", "Acme Corp. (EU)", long.as_str()] {
        group.bench_function(format!("schema_name/{}", slug.len()), |b| {
            b.iter(|| schema_name(black_box(slug)))
        });
    }

    group.bench_function("role_name", |b| b.iter(|| role_name(black_box("acme-corp"))));

    group.finish();
}

fn bench_credentials(c: &mut Criterion) {
    let mut group = c.benchmark_group("credentials");
    let cipher = CredentialCipher::new([7u8; 32]);
    let password = generate_password();
    let encrypted = cipher.encrypt(&password).unwrap();

    group.bench_function("generate_password", |b| b.iter(generate_password));
    group.bench_function("encrypt", |b| b.iter(|| cipher.encrypt(black_box(&password)).unwrap()));
    group.bench_function("decrypt", |b| b.iter(|| cipher.decrypt(black_box(&encrypted)).unwrap()));

    group.finish();
}

fn bench_statements(c: &mut Criterion) {
    let mut group = c.benchmark_group("statements");

    group.bench_function("create", |b| {
        b.iter(|| create_statements(black_box("t_acme"), black_box("u_acme"), black_box("pw")))
    });
    group.bench_function("drop", |b| {
        b.iter(|| drop_statements(black_box("t_acme"), black_box("u_acme")))
    });

    group.finish();
}

criterion_group!(benches, bench_naming, bench_credentials, bench_statements);
criterion_main!(benches);
