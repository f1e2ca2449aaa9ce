use serde_json::{json, Value};
use zkb_crypto::{decrypt_bytes, encrypt_bytes, hash_document, hash_file, DocumentKind, SessionKey};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn make_invoice(lines: usize) -> Value {
    let lignes: Vec<Value> = (0..lines)
        .map(|i| json!({ "designation": format!("Prestation {i}"), "qty": i % 5 + 1, "pu": 99.9, "tva": 20 }))
        .collect();
    json!({
        "id": "f-bench",
        "entete": { "numero": "FAC-2026-042", "client": { "nom": "ACME", "ville": "Lyon" } },
        "lignes": lignes,
        "reduction": { "type": "pourcent", "valeur": 5 },
        "sousTotal": 1000,
        "total": 1200,
        "tvaMontant": 200,
        "totalTTC": 1200,
        "blockPositions": { "header": [0, 0] },
    })
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let key = SessionKey::from_bytes([0xABu8; 32]);
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt_bytes(divan::black_box(&data), divan::black_box(&key)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let key = SessionKey::from_bytes([0xABu8; 32]);
    let envelope = encrypt_bytes(&make_data(size), &key).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decrypt_bytes(divan::black_box(&envelope), divan::black_box(&key)).unwrap());
}

#[divan::bench(args = [1, 50, 500])]
fn bench_hash_document(bencher: divan::Bencher, lines: usize) {
    let doc = make_invoice(lines);
    bencher.bench(|| hash_document(divan::black_box(Some(&doc)), DocumentKind::Invoice));
}

#[divan::bench(args = [65536, 1048576])]
fn bench_hash_file(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| hash_file(divan::black_box(&data)));
}

fn main() {
    divan::main();
}
