use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use courier_core::Result;
use spin::Mutex;

use crate::error::BufferError;

/// 缓冲容量的硬上限，与 32 位长度前缀保持一致。
pub const DEFAULT_MAX_CAPACITY: usize = i32::MAX as usize;

/// 扩容时的最小步长，避免从极小容量开始逐字节扩张。
const MIN_GROWTH: usize = 64;

/// `Region` 是一组缓冲视图共享的底层存储与锁计数。
///
/// # 结构设计（How）
/// - `storage`：`Some(BytesMut)` 表示存储仍然有效，其长度即当前容量；释放后置为 `None`；
/// - `lock_count`：从 0 开始，`lock` 加一、`release` 减一，降到 −1 即释放存储；
/// - 所有 [`MemoryBuffer::duplicate`] 产生的视图共享同一个 `Region`，因此锁计数与内容都对彼此可见。
struct Region {
    storage: Mutex<Option<BytesMut>>,
    lock_count: AtomicI32,
}

impl Region {
    fn new(storage: BytesMut) -> Arc<Self> {
        Arc::new(Self {
            storage: Mutex::new(Some(storage)),
            lock_count: AtomicI32::new(0),
        })
    }

    /// 在持有自旋锁的情况下访问存储；存储已释放时返回 `buffer.released`。
    fn with<R>(&self, f: impl FnOnce(&mut BytesMut) -> R) -> Result<R> {
        let mut guard = self.storage.lock();
        match guard.as_mut() {
            Some(storage) => Ok(f(storage)),
            None => Err(BufferError::Released.into()),
        }
    }

    fn free(&self) {
        self.storage.lock().take();
    }
}

/// `MemoryBuffer` 是所有编码与解码操作落地的双游标字节容器。
///
/// # 设计背景（Why）
/// - 编码端顺序追加、解码端顺序消费，两个游标独立推进可以让同一块内存先写后读，
///   而无需在两个阶段之间复制；
/// - 传输层可能把同一份字节交给多个消费者，因此需要显式的锁计数协议决定何时真正释放存储。
///
/// # 逻辑解析（How）
/// - 内容存放在共享的 `Region` 中，视图自身只持有 `reader_index`、`writer_index` 与 `max_capacity`；
/// - 写入超出当前容量时按倍增策略扩容，上限为 `max_capacity`；超出上限直接报越界，绝不截断；
/// - 多字节原语一律使用大端序（网络序），读写两侧对称。
///
/// # 契约说明（What）
/// - 不变量：`0 ≤ reader_index ≤ writer_index ≤ capacity ≤ max_capacity`；
/// - `lock`/`release` 使用 CAS 更新共享计数，计数从 0 降到 −1 时释放存储且只释放一次；
///   对已释放的缓冲再次 `lock`/`release` 或访问内容都会返回 `buffer.released`；
/// - 逻辑上同一视图不应被多个线程同时读写；锁计数本身可以跨线程操作。
///
/// # 设计取舍与风险（Trade-offs）
/// - 存储由 `spin::Mutex` 保护，每个原语都会短暂持锁；换来的是 duplicate 视图之间无需 `unsafe` 共享。
pub struct MemoryBuffer {
    region: Arc<Region>,
    reader_index: usize,
    writer_index: usize,
    max_capacity: usize,
}

impl MemoryBuffer {
    /// 创建初始容量为 `initial_capacity`、上限为 [`DEFAULT_MAX_CAPACITY`] 的缓冲。
    pub fn with_capacity(initial_capacity: usize) -> Self {
        Self::with_max_capacity(initial_capacity, DEFAULT_MAX_CAPACITY)
    }

    /// 创建指定初始容量与容量上限的缓冲。
    ///
    /// `max_capacity` 会被限制在 [`DEFAULT_MAX_CAPACITY`] 以内，`initial_capacity` 会被限制在
    /// `max_capacity` 以内。
    pub fn with_max_capacity(initial_capacity: usize, max_capacity: usize) -> Self {
        let max_capacity = max_capacity.min(DEFAULT_MAX_CAPACITY);
        let initial_capacity = initial_capacity.min(max_capacity);
        Self {
            region: Region::new(BytesMut::zeroed(initial_capacity)),
            reader_index: 0,
            writer_index: 0,
            max_capacity,
        }
    }

    /// 以既有字节构造可读缓冲，写游标位于末尾。
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            region: Region::new(BytesMut::from(data)),
            reader_index: 0,
            writer_index: data.len(),
            max_capacity: DEFAULT_MAX_CAPACITY.max(data.len()),
        }
    }

    /// 当前已分配的容量；存储已释放时为 0。
    pub fn capacity(&self) -> usize {
        self.region.with(|storage| storage.len()).unwrap_or(0)
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn reader_index(&self) -> usize {
        self.reader_index
    }

    pub fn writer_index(&self) -> usize {
        self.writer_index
    }

    /// 移动读游标，合法范围为 `0..=writer_index`。
    pub fn set_reader_index(&mut self, index: usize) -> Result<()> {
        if index > self.writer_index {
            return Err(BufferError::InvalidIndex {
                operation: "set_reader_index",
                index,
                min: 0,
                max: self.writer_index,
            }
            .into());
        }
        self.reader_index = index;
        Ok(())
    }

    /// 移动写游标，合法范围为 `reader_index..=capacity`。
    pub fn set_writer_index(&mut self, index: usize) -> Result<()> {
        let capacity = self.region.with(|storage| storage.len())?;
        if index < self.reader_index || index > capacity {
            return Err(BufferError::InvalidIndex {
                operation: "set_writer_index",
                index,
                min: self.reader_index,
                max: capacity,
            }
            .into());
        }
        self.writer_index = index;
        Ok(())
    }

    pub fn readable_bytes(&self) -> usize {
        self.writer_index - self.reader_index
    }

    /// 距离容量上限还可写入的字节数。
    pub fn writable_bytes(&self) -> usize {
        self.max_capacity - self.writer_index
    }

    pub fn readable(&self) -> bool {
        self.reader_index < self.writer_index
    }

    pub fn writable(&self) -> bool {
        self.writer_index < self.max_capacity
    }

    /// 两个游标归零，存储保持不变。
    pub fn clear(&mut self) {
        self.reader_index = 0;
        self.writer_index = 0;
    }

    /// 创建共享存储与锁计数、但拥有独立游标的视图。
    pub fn duplicate(&self) -> MemoryBuffer {
        MemoryBuffer {
            region: Arc::clone(&self.region),
            reader_index: self.reader_index,
            writer_index: self.writer_index,
            max_capacity: self.max_capacity,
        }
    }

    /// 两个视图是否共享同一块存储。
    pub fn shares_region_with(&self, other: &MemoryBuffer) -> bool {
        Arc::ptr_eq(&self.region, &other.region)
    }

    /// 增加锁计数。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：存储尚未释放（计数不为 −1），否则返回 `buffer.released`；
    /// - **后置条件**：计数加一，之后需要多一次 [`release`](Self::release) 才能释放存储。
    pub fn lock(&self) -> Result<()> {
        let counter = &self.region.lock_count;
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current < 0 {
                return Err(BufferError::Released.into());
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// 减少锁计数，降到 −1 时释放存储。
    ///
    /// # 执行逻辑（How）
    /// 1. 读取当前计数，若已是 −1 则返回 `buffer.released`；
    /// 2. CAS 将计数减一，失败则以最新值重试；
    /// 3. 成功且新值为 −1 的那一次调用负责释放存储，因此释放恰好发生一次。
    pub fn release(&self) -> Result<()> {
        let counter = &self.region.lock_count;
        let mut current = counter.load(Ordering::Acquire);
        loop {
            if current < 0 {
                return Err(BufferError::Released.into());
            }
            let next = current - 1;
            match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    if next < 0 {
                        self.region.free();
                    }
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// 计数为 0：下一次 `release` 会释放存储。
    pub fn is_releasable(&self) -> bool {
        self.region.lock_count.load(Ordering::Acquire) == 0
    }

    pub fn is_released(&self) -> bool {
        self.region.lock_count.load(Ordering::Acquire) < 0
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.put("write_bool", &[u8::from(value)])
    }

    /// 读取布尔值，只接受 0 与 1。
    pub fn read_bool(&mut self) -> Result<bool> {
        let [byte] = self.take::<1>("read_bool")?;
        match byte {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(BufferError::Malformed {
                format: "boolean",
                detail: format!("expected 0 or 1, found {other:#04x}"),
            }
            .into()),
        }
    }

    pub fn write_byte(&mut self, value: i8) -> Result<()> {
        self.put("write_byte", &value.to_be_bytes())
    }

    pub fn read_byte(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.take("read_byte")?))
    }

    pub fn write_unsigned_byte(&mut self, value: u8) -> Result<()> {
        self.put("write_unsigned_byte", &[value])
    }

    pub fn read_unsigned_byte(&mut self) -> Result<u8> {
        let [byte] = self.take::<1>("read_unsigned_byte")?;
        Ok(byte)
    }

    /// 读取下一个字节但不移动读游标。
    pub fn peek_byte(&self) -> Result<u8> {
        if !self.readable() {
            return Err(self.underflow("peek_byte", 1));
        }
        let index = self.reader_index;
        self.region.with(|storage| storage[index])
    }

    pub fn write_short(&mut self, value: i16) -> Result<()> {
        self.put("write_short", &value.to_be_bytes())
    }

    pub fn read_short(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take("read_short")?))
    }

    /// 写入一个 UTF-16 码元。
    pub fn write_char(&mut self, value: u16) -> Result<()> {
        self.put("write_char", &value.to_be_bytes())
    }

    pub fn read_char(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take("read_char")?))
    }

    pub fn write_int(&mut self, value: i32) -> Result<()> {
        self.put("write_int", &value.to_be_bytes())
    }

    pub fn read_int(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take("read_int")?))
    }

    pub fn write_long(&mut self, value: i64) -> Result<()> {
        self.put("write_long", &value.to_be_bytes())
    }

    pub fn read_long(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take("read_long")?))
    }

    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.put("write_float", &value.to_bits().to_be_bytes())
    }

    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_bits(u32::from_be_bytes(self.take("read_float")?)))
    }

    pub fn write_double(&mut self, value: f64) -> Result<()> {
        self.put("write_double", &value.to_bits().to_be_bytes())
    }

    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.take("read_double")?)))
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.put("write_bytes", data)
    }

    /// 读满 `target`；可读字节不足时返回越界错误且不移动读游标。
    pub fn read_bytes(&mut self, target: &mut [u8]) -> Result<()> {
        let len = target.len();
        if len > self.readable_bytes() {
            return Err(self.underflow("read_bytes", len));
        }
        let start = self.reader_index;
        self.region
            .with(|storage| target.copy_from_slice(&storage[start..start + len]))?;
        self.reader_index += len;
        Ok(())
    }

    /// 从 `source` 的可读区域复制到本缓冲的写游标处。
    ///
    /// # 契约说明（What）
    /// - 复制 `min(source.readable_bytes(), self.writable_bytes())` 个字节，两侧游标同步推进；
    /// - 返回实际复制的字节数。
    ///
    /// # 执行逻辑（How）
    /// - 两个视图共享同一存储时，在一次持锁内做区间复制；
    /// - 否则逐字节经由两侧游标搬运，任一时刻只持有一把锁。
    pub fn write_buffer(&mut self, source: &mut MemoryBuffer) -> Result<usize> {
        let count = source.readable_bytes().min(self.writable_bytes());
        if count == 0 {
            return Ok(0);
        }
        if self.shares_region_with(source) {
            let from = source.reader_index;
            let to = self.writer_index;
            let max_capacity = self.max_capacity;
            self.region.with(|storage| -> Result<()> {
                grow(storage, "write_buffer", to, count, max_capacity)?;
                storage.copy_within(from..from + count, to);
                Ok(())
            })??;
            source.reader_index += count;
            self.writer_index += count;
        } else {
            for _ in 0..count {
                let byte = source.read_unsigned_byte()?;
                self.write_unsigned_byte(byte)?;
            }
        }
        Ok(count)
    }

    /// 将本缓冲的可读区域复制到 `target`，语义与 [`write_buffer`](Self::write_buffer) 对称。
    pub fn read_buffer(&mut self, target: &mut MemoryBuffer) -> Result<usize> {
        target.write_buffer(self)
    }

    /// 将可读字节复制到外部字节窗口，复制量受 `target.remaining_mut()` 限制。
    pub fn read_into<B: BufMut>(&mut self, target: &mut B) -> Result<usize> {
        let count = self.readable_bytes().min(target.remaining_mut());
        let start = self.reader_index;
        self.region
            .with(|storage| target.put_slice(&storage[start..start + count]))?;
        self.reader_index += count;
        Ok(count)
    }

    /// 从外部字节窗口追加数据，复制量受 [`writable_bytes`](Self::writable_bytes) 限制。
    pub fn write_from<B: Buf>(&mut self, source: &mut B) -> Result<usize> {
        let count = source.remaining().min(self.writable_bytes());
        let mut remaining = count;
        while remaining > 0 {
            let chunk = source.chunk();
            let len = chunk.len().min(remaining);
            self.put("write_from", &chunk[..len])?;
            source.advance(len);
            remaining -= len;
        }
        Ok(count)
    }

    /// 拷贝当前可读区域，交给传输层发送。
    pub fn to_bytes(&self) -> Result<Bytes> {
        let (start, end) = (self.reader_index, self.writer_index);
        self.region
            .with(|storage| Bytes::copy_from_slice(&storage[start..end]))
    }

    fn put(&mut self, operation: &'static str, data: &[u8]) -> Result<()> {
        let start = self.writer_index;
        let max_capacity = self.max_capacity;
        self.region.with(|storage| -> Result<()> {
            grow(storage, operation, start, data.len(), max_capacity)?;
            storage[start..start + data.len()].copy_from_slice(data);
            Ok(())
        })??;
        self.writer_index += data.len();
        Ok(())
    }

    fn take<const N: usize>(&mut self, operation: &'static str) -> Result<[u8; N]> {
        if N > self.readable_bytes() {
            return Err(self.underflow(operation, N));
        }
        let start = self.reader_index;
        let bytes = self.region.with(|storage| {
            let mut out = [0u8; N];
            out.copy_from_slice(&storage[start..start + N]);
            out
        })?;
        self.reader_index += N;
        Ok(bytes)
    }

    fn underflow(&self, operation: &'static str, requested: usize) -> courier_core::CoreError {
        BufferError::OutOfBounds {
            operation,
            index: self.reader_index,
            requested,
            available: self.readable_bytes(),
        }
        .into()
    }
}

/// 保证 `[start, start + len)` 落在存储内部，必要时按倍增策略扩容。
fn grow(
    storage: &mut BytesMut,
    operation: &'static str,
    start: usize,
    len: usize,
    max_capacity: usize,
) -> Result<()> {
    let required = start.saturating_add(len);
    if required > max_capacity {
        return Err(BufferError::OutOfBounds {
            operation,
            index: start,
            requested: len,
            available: max_capacity.saturating_sub(start),
        }
        .into());
    }
    if required > storage.len() {
        let doubled = storage.len().saturating_mul(2).max(MIN_GROWTH);
        storage.resize(required.max(doubled).min(max_capacity), 0);
    }
    Ok(())
}

impl fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("reader_index", &self.reader_index)
            .field("writer_index", &self.writer_index)
            .field("capacity", &self.capacity())
            .field("max_capacity", &self.max_capacity)
            .field("lock_count", &self.region.lock_count.load(Ordering::Relaxed))
            .finish()
    }
}
