use std::hint::black_box;

use courier_buffer::MemoryBuffer;
use courier_codecs::{GenericPacket, Identifier, Message, ProtocolBuilder, Serializer, TypeCatalog};
use courier_core::SerializationConfig;
use criterion::{Criterion, criterion_group, criterion_main};
use tracing_subscriber::EnvFilter;

/// 以 `RUST_LOG` 控制基准运行期间的日志输出，缺省关闭。
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")),
        )
        .try_init();
}

fn serializer() -> Serializer {
    Serializer::from_config(
        &SerializationConfig::default(),
        ProtocolBuilder::new(TypeCatalog::new()),
    )
    .expect("构建序列化器失败")
}

fn sample_message() -> Message {
    let mut packet = GenericPacket::new("telemetry");
    packet.insert("device", String::from("sensor-17"));
    packet.insert("reading", 21.5_f64);
    packet.insert("sequence", 4_096_i64);
    packet.insert("payload", vec![0xAB_u8; 64]);
    Message::new(Identifier::from_u128(0x1234), packet)
}

/// 衡量嵌套消息的一次完整编解码。
///
/// # 执行逻辑（How）
/// - 每轮复用同一个缓冲，`clear` 后重新写入，观察池化上下文与缓存命中后的稳态开销。
fn bench_message_round_trip(c: &mut Criterion) {
    init_tracing();
    let serializer = serializer();
    let message = sample_message();
    let mut buffer = MemoryBuffer::with_capacity(256);

    c.bench_function("message_round_trip", |b| {
        b.iter(|| {
            buffer.clear();
            serializer
                .write_object_into("message", black_box(&message), &mut buffer)
                .expect("编码失败");
            let decoded = serializer.read_object(&mut buffer).expect("解码失败");
            black_box(decoded);
        })
    });
}

fn bench_compressed_integers(c: &mut Criterion) {
    let serializer = serializer();
    let mut buffer = MemoryBuffer::with_capacity(1024);

    c.bench_function("compressed_int64_batch", |b| {
        b.iter(|| {
            buffer.clear();
            {
                let mut encoder = serializer.retrieve_encoder(&mut buffer);
                for value in [-1_i64, 63, 1 << 20, -(1 << 40), i64::MAX] {
                    encoder
                        .write_compressed_int64("value", black_box(value))
                        .expect("编码失败");
                }
            }
            let mut decoder = serializer.retrieve_decoder(&mut buffer);
            for _ in 0..5 {
                black_box(decoder.read_compressed_int64().expect("解码失败"));
            }
        })
    });
}

criterion_group!(codec_benches, bench_message_round_trip, bench_compressed_integers);
criterion_main!(codec_benches);
