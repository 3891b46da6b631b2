use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pkix_cd_proto::{
    AccessConfig, AuthorityKeyId, Certificate, TrustEntry, TrustMap, Verifier, VerifyOptions,
    VerifyPolicy,
};

const DEVICE: &str = include_str!("../tests/fixtures/device.cert.pem");

fn create_access_list(num_lines: usize) -> String {
    let mut contents = String::new();
    for i in 0..num_lines {
        contents.push_str(&format!("SSID{}|device{}._device.example.com\n", i % 16, i));
    }
    contents
}

fn create_trust_map(num_identities: usize) -> TrustMap {
    let mut map = TrustMap::new();
    for i in 0..num_identities {
        map.insert(
            format!("SSID{}", i % 16),
            format!("device{}._device.example.com", i),
            TrustEntry::simple([AuthorityKeyId::from_bytes(&(i as u32).to_be_bytes())]),
        );
    }
    map.insert(
        "SSID1",
        "my._device.example.com",
        TrustEntry::simple([AuthorityKeyId::normalize("aa:bb:cc")]),
    );
    map
}

fn bench_access_list_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("access_list_parse");

    for num_lines in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_lines),
            num_lines,
            |b, &num_lines| {
                let contents = create_access_list(num_lines);
                b.iter(|| AccessConfig::parse_str(black_box(&contents)));
            },
        );
    }

    group.finish();
}

fn bench_trust_map_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("trust_map_json");

    for num_identities in [10, 1000].iter() {
        let map = create_trust_map(*num_identities);
        let json = map.to_json().expect("Failed to encode trust map");
        group.bench_with_input(
            BenchmarkId::new("decode", num_identities),
            &json,
            |b, json| {
                b.iter(|| serde_json::from_str::<TrustMap>(black_box(json)).expect("decode"));
            },
        );
        group.bench_with_input(BenchmarkId::new("encode", num_identities), &map, |b, map| {
            b.iter(|| black_box(map).to_json().expect("encode"));
        });
    }

    group.finish();
}

fn bench_offline_decision(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("Failed to build runtime");
    let verifier = Verifier::new(VerifyPolicy::default());
    let map = create_trust_map(1000);

    c.bench_function("offline_decision", |b| {
        b.iter(|| {
            runtime.block_on(verifier.decide(
                black_box(&map),
                "NAS:SSID1",
                "my._device.example.com",
                DEVICE,
                VerifyOptions::default(),
            ))
        });
    });

    c.bench_function("certificate_authority_key_id", |b| {
        let cert = Certificate::from_pem(DEVICE).expect("fixture");
        b.iter(|| black_box(&cert).authority_key_id().expect("aki"));
    });
}

criterion_group!(
    benches,
    bench_access_list_parse,
    bench_trust_map_json,
    bench_offline_decision
);
criterion_main!(benches);
