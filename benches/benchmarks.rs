//! Performance benchmarks for wsduplex.
//!
//! Run with: `cargo bench`

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;
use wsduplex::codec::FrameReader;
use wsduplex::protocol::handshake::{UpgradeRequest, compute_accept_key};
use wsduplex::protocol::mask::{apply_mask, apply_mask_fast, apply_mask_offset};
use wsduplex::protocol::{Frame, FrameHeader};
use wsduplex::{Config, WebSocket};

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

// =============================================================================
// Frame Codec Benchmarks
// =============================================================================

fn encoded(payload_size: usize, mask: Option<[u8; 4]>) -> Vec<u8> {
    Frame::binary(vec![0xAB; payload_size]).encode(mask)
}

fn bench_frame_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_parsing");

    for (name, size) in [("10b", 10), ("1kb", 1024), ("64kb", 65536)] {
        let unmasked = encoded(size, None);
        let masked = encoded(size, Some(MASK));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{name}_unmasked"), |b| {
            b.iter(|| Frame::parse(black_box(&unmasked)))
        });
        group.bench_function(format!("{name}_masked"), |b| {
            b.iter(|| Frame::parse(black_box(&masked)))
        });
    }

    let header = encoded(65536, Some(MASK));
    group.bench_function("header_only", |b| {
        b.iter(|| FrameHeader::parse(black_box(&header[..14])))
    });

    group.finish();
}

fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");

    for (name, size) in [("10b", 10), ("1kb", 1024), ("10kb", 0x2800)] {
        let frame = Frame::binary(vec![0xAB; size]);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{name}_unmasked"), |b| {
            b.iter(|| black_box(&frame).encode(None))
        });
        group.bench_function(format!("{name}_masked"), |b| {
            b.iter(|| black_box(&frame).encode(Some(MASK)))
        });
    }

    group.finish();
}

// =============================================================================
// Masking Benchmarks
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");

    for (name, size) in [("64b", 64), ("1kb", 1024), ("64kb", 65536), ("1mb", 1 << 20)] {
        let mut data = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("apply_mask_{name}"), |b| {
            b.iter(|| apply_mask(black_box(&mut data), black_box(MASK)))
        });
        group.bench_function(format!("apply_mask_fast_{name}"), |b| {
            b.iter(|| apply_mask_fast(black_box(&mut data), black_box(MASK)))
        });
        // streamed unmasking in read-sized chunks
        group.bench_function(format!("apply_mask_offset_8kb_chunks_{name}"), |b| {
            b.iter(|| {
                let mut offset = 0u64;
                for chunk in data.chunks_mut(8192) {
                    apply_mask_offset(black_box(chunk), MASK, offset);
                    offset += chunk.len() as u64;
                }
            })
        });
    }

    group.finish();
}

// =============================================================================
// Handshake Benchmarks
// =============================================================================

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");

    let key = "dGhlIHNhbXBsZSBub25jZQ==";
    group.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box(key)))
    });

    let headers = [
        ("Host", "server.example.com"),
        ("Upgrade", "websocket"),
        ("Connection", "keep-alive, Upgrade"),
        ("Sec-WebSocket-Key", key),
        ("Sec-WebSocket-Version", "13"),
        ("Origin", "http://example.com"),
        ("Sec-WebSocket-Protocol", "chat, superchat"),
    ];

    group.bench_function("verify_and_respond", |b| {
        b.iter(|| {
            let req = UpgradeRequest::from_headers(black_box(headers));
            let resp = req.verify(Some("chat")).unwrap();
            let mut buf = Vec::with_capacity(256);
            resp.write(&mut buf).unwrap();
            black_box(buf)
        })
    });

    group.finish();
}

// =============================================================================
// Engine Benchmarks
// =============================================================================

/// Push `size` bytes through the engine and read every frame on the far side.
async fn transfer(config: Config, size: usize) {
    let (local, remote) = tokio::io::duplex(1 << 16);
    let ws = WebSocket::new(local, config);
    let mut peer = FrameReader::new(remote, None);

    let writer = async {
        ws.write(vec![0xAB; size]).await.unwrap();
        ws.flush().await.unwrap();
    };
    let reader = async {
        let mut received = 0;
        loop {
            let header = peer.read_header().await.unwrap();
            received += peer.read_payload(&header).await.unwrap().len();
            if header.fin {
                break;
            }
        }
        received
    };

    let ((), received) = tokio::join!(writer, reader);
    assert_eq!(received, size);
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let runtime = Runtime::new().unwrap();
    let size = 1 << 20;

    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("transfer_1mb_server", |b| {
        b.iter(|| runtime.block_on(transfer(Config::server(), size)))
    });
    group.bench_function("transfer_1mb_client_masked", |b| {
        b.iter(|| runtime.block_on(transfer(Config::client(), size)))
    });

    group.finish();
}

// =============================================================================
// Criterion Setup
// =============================================================================

criterion_group!(
    benches,
    bench_frame_parsing,
    bench_frame_encoding,
    bench_masking,
    bench_handshake,
    bench_engine
);

criterion_main!(benches);
