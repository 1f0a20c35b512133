use bundlefs::{Bundle, BundleOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::NamedTempFile;

fn bench_write(c: &mut Criterion) {
    let data = vec![42u8; 4 * 1024];

    c.bench_function("write_100_files_4k", |b| {
        b.iter(|| {
            let tmp = NamedTempFile::new().unwrap();
            let mut bundle = Bundle::create(tmp.path(), BundleOptions::default()).unwrap();
            for i in 0..100 {
                bundle.write_file(&format!("dir/file_{i}.bin"), black_box(&data)).unwrap();
            }
        })
    });
}

fn bench_lookup(c: &mut Criterion) {
    let tmp = NamedTempFile::new().unwrap();
    let mut bundle = Bundle::create(tmp.path(), BundleOptions::for_expected_entries(1000)).unwrap();
    for i in 0..1000 {
        bundle.write_file(&format!("assets/{i}.dat"), b"payload").unwrap();
    }

    c.bench_function("lookup_cached", |b| {
        b.iter(|| bundle.size(black_box("assets/7.dat")).unwrap())
    });

    let mut i = 0u32;
    c.bench_function("lookup_chain_scan", |b| {
        b.iter(|| {
            i = (i + 37) % 1000;
            bundle.size(black_box(&format!("assets/{i}.dat"))).unwrap()
        })
    });
}

fn bench_churn(c: &mut Criterion) {
    let tmp = NamedTempFile::new().unwrap();
    let mut bundle = Bundle::create(tmp.path(), BundleOptions::default()).unwrap();
    for i in 0..200 {
        bundle.write_file(&format!("f{i}"), &vec![1u8; 100 + i]).unwrap();
    }

    let mut i = 0usize;
    c.bench_function("delete_and_reuse", |b| {
        b.iter(|| {
            i = (i + 1) % 200;
            let name = format!("f{i}");
            bundle.delete(&name).unwrap();
            bundle.write_file(&name, black_box(&vec![2u8; 100 + i])).unwrap();
        })
    });
}

criterion_group!(benches, bench_write, bench_lookup, bench_churn);
criterion_main!(benches);
