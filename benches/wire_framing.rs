use bytes::BytesMut;
use camera_tcp_streamer::wire::{self, FrameDecoder, DEFAULT_MAX_FRAME_LEN};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn create_test_jpeg(size: usize) -> Vec<u8> {
    let mut jpeg = vec![0xFF, 0xD8]; // SOI
    jpeg.extend((0..size).map(|i| (i % 256) as u8));
    jpeg.extend(&[0xFF, 0xD9]); // EOI
    jpeg
}

fn benchmark_encode_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_message");

    // 640x480 at quality 50 lands around 20-50 KB
    for size in [5_000, 20_000, 40_000, 100_000].iter() {
        let jpeg = create_test_jpeg(*size);
        group.bench_with_input(BenchmarkId::new("jpeg_size", size), &jpeg, |b, jpeg| {
            b.iter(|| wire::encode_message(black_box(jpeg)))
        });
    }

    group.finish();
}

fn benchmark_decode_stream(c: &mut Criterion) {
    let jpeg = create_test_jpeg(40_000);
    let mut stream = BytesMut::new();
    for _ in 0..10 {
        if let Ok(message) = wire::encode_message(&jpeg) {
            stream.extend_from_slice(&message);
        }
    }
    let stream = stream.freeze();

    c.bench_function("decode_10_frames_in_4k_chunks", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_LEN);
            let mut buf = BytesMut::with_capacity(stream.len());
            let mut frames = 0;
            for chunk in stream.chunks(4096) {
                buf.extend_from_slice(chunk);
                while let Ok(Some(frame)) = decoder.decode(&mut buf) {
                    frames += black_box(frame).len();
                }
            }
            frames
        })
    });
}

criterion_group!(benches, benchmark_encode_message, benchmark_decode_stream);
criterion_main!(benches);
