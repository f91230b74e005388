//! `protocol_dispatch` 集成测试：验证类型登记、Marshaller 选择与嵌套对象的线格式。
//!
//! # 测试目标（Why）
//! - 可编组类型、包、枚举与自定义 Marshaller 都能经由公开 API 往返；
//! - `AcceptedAndCache` 只触发一次过滤器，`Accepted` 每次都重新询问；
//! - 清单校验、未知标识与未知枚举常量都报告稳定的错误码。
//!
//! # 结构安排（How）
//! - 顶部定义一组演示类型，`serializer` 帮助函数按清单构建序列化器；
//! - 线格式断言只针对关键长度与标识，避免把压缩细节写死在多个用例里。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use courier_buffer::MemoryBuffer;
use courier_codecs::{
    Decoder, Encoder, Enumeration, FilterDecision, GenericPacket, Identifier, Marshallable,
    Marshaller, Message, Object, Packet, Protocol, ProtocolBuilder, Serializer, TypeCatalog,
    TypeFilter, TypeId, Typed, expect_type, type_ids,
};
use courier_core::error::codes;
use courier_core::{Result, SerializationConfig};

#[derive(Debug, Default, PartialEq)]
struct Point {
    x: i32,
    y: i64,
}

impl Typed for Point {
    const TYPE_NAME: &'static str = "demo::Point";
    const TYPE_ID: Option<TypeId> = Some(TypeId::new(1));
}

impl Marshallable for Point {
    fn marshall(&self, encoder: &mut Encoder<'_>, _protocol: &Protocol) -> Result<()> {
        encoder.write_compressed_int32("x", self.x)?;
        encoder.write_compressed_int64("y", self.y)
    }

    fn unmarshall(&mut self, decoder: &mut Decoder<'_>, _protocol: &Protocol) -> Result<()> {
        self.x = decoder.read_compressed_int32()?;
        self.y = decoder.read_compressed_int64()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Level {
    Low,
    High,
}

impl Typed for Level {
    const TYPE_NAME: &'static str = "demo::Level";
    const TYPE_ID: Option<TypeId> = Some(TypeId::new(2));
}

impl Enumeration for Level {
    fn constant_name(&self) -> &'static str {
        match self {
            Level::Low => "Low",
            Level::High => "High",
        }
    }

    fn from_constant_name(name: &str) -> Option<Self> {
        match name {
            "Low" => Some(Level::Low),
            "High" => Some(Level::High),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
struct Login {
    name: String,
    user: String,
    flags: Vec<bool>,
}

impl From<String> for Login {
    fn from(name: String) -> Self {
        Self {
            name,
            user: String::new(),
            flags: Vec::new(),
        }
    }
}

impl Typed for Login {
    const TYPE_NAME: &'static str = "demo::Login";
    const TYPE_ID: Option<TypeId> = Some(TypeId::new(3));
}

impl Packet for Login {
    fn packet_name(&self) -> &str {
        &self.name
    }

    fn marshall(&self, encoder: &mut Encoder<'_>, _protocol: &Protocol) -> Result<()> {
        encoder.write_string("user", &self.user)?;
        encoder.write_bit_set("flags", Some(&self.flags[..]))
    }

    fn unmarshall(&mut self, decoder: &mut Decoder<'_>, _protocol: &Protocol) -> Result<()> {
        self.user = decoder.read_string()?;
        self.flags = decoder.read_bit_set()?.unwrap_or_default();
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq)]
struct Ping {
    sequence: i16,
}

impl Typed for Ping {
    const TYPE_NAME: &'static str = "demo::Ping";
    const TYPE_ID: Option<TypeId> = Some(TypeId::new(4));
}

impl Packet for Ping {
    fn packet_name(&self) -> &str {
        "ping"
    }

    fn marshall(&self, encoder: &mut Encoder<'_>, _protocol: &Protocol) -> Result<()> {
        encoder.write_short("sequence", self.sequence)
    }

    fn unmarshall(&mut self, decoder: &mut Decoder<'_>, _protocol: &Protocol) -> Result<()> {
        self.sequence = decoder.read_short()?;
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
struct Celsius(f32);

impl Typed for Celsius {
    const TYPE_NAME: &'static str = "demo::Celsius";
    const TYPE_ID: Option<TypeId> = Some(TypeId::new(5));
}

#[derive(Debug, Default, PartialEq)]
struct Clash;

impl Typed for Clash {
    const TYPE_NAME: &'static str = "demo::Clash";
    const TYPE_ID: Option<TypeId> = Some(TypeId::new(1));
}

struct CelsiusMarshaller(i16);

impl Marshaller for CelsiusMarshaller {
    fn marshaller_id(&self) -> Option<TypeId> {
        Some(TypeId::new(self.0))
    }

    fn marshall(
        &self,
        _field: &str,
        value: &dyn Object,
        encoder: &mut Encoder<'_>,
        protocol: &Protocol,
    ) -> Result<()> {
        protocol.write_type_id(value, encoder)?;
        encoder.write_float("degrees", expect_type::<Celsius>(value)?.0)
    }

    fn unmarshall(
        &self,
        decoder: &mut Decoder<'_>,
        protocol: &Protocol,
    ) -> Result<Box<dyn Object>> {
        protocol.read_type_id(decoder)?;
        Ok(Box::new(Celsius(decoder.read_float()?)))
    }
}

const ALL_TYPES: [&str; 5] = [
    "demo::Point",
    "demo::Level",
    "demo::Login",
    "demo::Ping",
    "demo::Celsius",
];

fn catalog() -> TypeCatalog {
    let mut catalog = TypeCatalog::new();
    catalog
        .declare_marshallable::<Point>()
        .declare_enumeration::<Level>()
        .declare_packet::<Login>()
        .declare_default_packet::<Ping>()
        .declare::<Celsius>()
        .declare::<Clash>();
    catalog
}

fn config() -> SerializationConfig {
    SerializationConfig {
        types: ALL_TYPES.iter().map(|name| name.to_string()).collect(),
        ..SerializationConfig::default()
    }
}

fn serializer(builder: ProtocolBuilder) -> Serializer {
    Serializer::from_config(&config(), builder).expect("构建序列化器失败")
}

fn leading_id(buffer: &MemoryBuffer) -> i16 {
    let bytes = buffer.to_bytes().expect("导出失败");
    i16::from_be_bytes([bytes[0], bytes[1]])
}

#[test]
fn marshallable_round_trips_with_compressed_fields() {
    let serializer = serializer(ProtocolBuilder::new(catalog()));
    let point = Point { x: -5, y: 1 << 40 };

    let mut buffer = serializer.write_object("point", &point).expect("编码失败");
    assert_eq!(leading_id(&buffer), type_ids::MARSHALLABLE.get());
    // 标识 2 + 类型标识 2 + x 压缩 2 + y 压缩 9
    assert_eq!(buffer.writer_index(), 15);

    let decoded: Point = serializer.read_object_as(&mut buffer).expect("解码失败");
    assert_eq!(decoded, point);
}

#[test]
fn enumerations_round_trip_and_reject_unknown_constants() {
    let serializer = serializer(ProtocolBuilder::new(catalog()));
    let mut buffer = serializer.write_object("level", &Level::High).expect("编码失败");
    assert_eq!(
        serializer.read_object_as::<Level>(&mut buffer).expect("解码失败"),
        Level::High
    );

    let mut forged = MemoryBuffer::from_bytes(&[
        0xFF, 0xF6, 0x00, 0x02, 0, 0, 0, 3, 0, 0, 0, 3, 0, 3, b'M', b'i', b'd',
    ]);
    let err = serializer
        .read_object(&mut forged)
        .expect_err("未知常量必须失败");
    assert_eq!(err.code(), codes::UNKNOWN_TYPE);
}

#[test]
fn packets_travel_inside_messages() {
    let serializer = serializer(ProtocolBuilder::new(catalog()));
    let login = Login {
        name: "login".to_owned(),
        user: "ada".to_owned(),
        flags: vec![true, false, true, true],
    };
    let id = Identifier::from_u128(0xfeed_beef);
    let message = Message::new(id, login);

    let mut buffer = serializer.write_object("message", &message).expect("编码失败");
    assert_eq!(leading_id(&buffer), type_ids::MESSAGE.get());

    let decoded: Message = serializer.read_object_as(&mut buffer).expect("解码失败");
    assert_eq!(decoded.id(), id);
    let body = decoded.body().downcast_ref::<Login>().expect("正文类型不符");
    assert_eq!(body.name, "login");
    assert_eq!(body.user, "ada");
    assert_eq!(body.flags, [true, false, true, true]);
}

#[test]
fn default_constructed_packets_round_trip() {
    let serializer = serializer(ProtocolBuilder::new(catalog()));
    let mut buffer = serializer
        .write_object("ping", &Ping { sequence: 9 })
        .expect("编码失败");
    assert_eq!(
        serializer.read_object_as::<Ping>(&mut buffer).expect("解码失败"),
        Ping { sequence: 9 }
    );
}

#[test]
fn generic_packets_carry_heterogeneous_values() {
    let serializer = serializer(ProtocolBuilder::new(catalog()));
    let mut packet = GenericPacket::new("state");
    packet.insert("count", 3_i32);
    packet.insert("label", String::from("north"));
    packet.insert("raw", vec![1_u8, 2, 3]);
    packet.insert("origin", Point { x: 1, y: -1 });
    packet.insert("level", Level::Low);
    packet.insert("ratio", 0.25_f64);

    let mut buffer = serializer.write_object("packet", &packet).expect("编码失败");
    let decoded: GenericPacket = serializer.read_object_as(&mut buffer).expect("解码失败");

    assert_eq!(decoded.name(), "state");
    assert_eq!(decoded.len(), 6);
    assert_eq!(decoded.get_as::<i32>("count"), Some(&3));
    assert_eq!(
        decoded.get_as::<String>("label").map(String::as_str),
        Some("north")
    );
    assert_eq!(decoded.get_as::<Vec<u8>>("raw"), Some(&vec![1, 2, 3]));
    assert_eq!(decoded.get_as::<Point>("origin"), Some(&Point { x: 1, y: -1 }));
    assert_eq!(decoded.get_as::<Level>("level"), Some(&Level::Low));
    assert_eq!(decoded.get_as::<f64>("ratio"), Some(&0.25));
}

#[test]
fn cached_decisions_skip_the_filter_chain() {
    for (decision, expected_calls) in [
        (FilterDecision::AcceptedAndCache, 1),
        (FilterDecision::Accepted, 3),
    ] {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let builder = ProtocolBuilder::new(catalog()).marshaller(
            move |value: &dyn Object| {
                counter.fetch_add(1, Ordering::Relaxed);
                if value.is::<Celsius>() {
                    decision
                } else {
                    FilterDecision::Next
                }
            },
            CelsiusMarshaller(-200),
        );
        let serializer = serializer(builder);

        for _ in 0..3 {
            let mut buffer = serializer
                .write_object("temperature", &Celsius(21.5))
                .expect("编码失败");
            assert_eq!(
                serializer.read_object_as::<Celsius>(&mut buffer).expect("解码失败"),
                Celsius(21.5)
            );
        }
        assert_eq!(
            calls.load(Ordering::Relaxed),
            expected_calls,
            "判定 {decision:?} 的过滤器调用次数不符"
        );
    }
}

#[test]
fn first_accepting_filter_wins() {
    let builder = ProtocolBuilder::new(catalog())
        .marshaller(TypeFilter::<Celsius>::new(), CelsiusMarshaller(-300))
        .marshaller(TypeFilter::<Celsius>::new(), CelsiusMarshaller(-301));
    let serializer = serializer(builder);
    let buffer = serializer
        .write_object("temperature", &Celsius(-4.0))
        .expect("编码失败");
    assert_eq!(leading_id(&buffer), -300);
}

#[test]
fn plain_types_without_a_marshaller_are_unsuitable() {
    let serializer = serializer(ProtocolBuilder::new(catalog()));
    let err = serializer
        .write_object("temperature", &Celsius(1.0))
        .expect_err("没有 Marshaller 的类型必须失败");
    assert_eq!(err.code(), codes::UNSUITABLE_MARSHALLER);
}

#[test]
fn unknown_marshaller_ids_fail_decoding() {
    let serializer = serializer(ProtocolBuilder::new(catalog()));
    let mut buffer = MemoryBuffer::from_bytes(&[0x7F, 0x00]);
    let err = serializer.read_object(&mut buffer).expect_err("未知标识必须失败");
    assert_eq!(err.code(), codes::UNKNOWN_TYPE);
}

#[test]
fn duplicate_type_ids_are_rejected() {
    let err = ProtocolBuilder::new(catalog())
        .with_type("demo::Point")
        .with_type("demo::Clash")
        .build()
        .expect_err("重复类型标识必须失败");
    assert_eq!(err.code(), codes::CONFIG_DUPLICATE_TYPE_ID);
}

#[test]
fn types_outside_the_manifest_are_not_dispatched() {
    let protocol = ProtocolBuilder::new(catalog())
        .with_type("demo::Point")
        .build()
        .expect("构建失败");
    let err = protocol
        .marshaller_for(&Level::Low)
        .err()
        .expect("未进入清单的枚举不应被接受");
    assert_eq!(err.code(), codes::UNSUITABLE_MARSHALLER);
}
