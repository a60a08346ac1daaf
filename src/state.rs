use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use crate::{api::EventKind, change::ChangeSet, config::CoverReadPolicy};

/// 缓存的“正在播放”信息的完整快照。
///
/// 所有字段都在同一把锁下整体替换，读者不会看到来自两次不同更新的字段组合。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// 曲目标题。
    pub title: String,
    /// 艺术家。
    pub artist: String,
    /// 封面图片的原始字节。
    pub cover: Option<Vec<u8>>,
    /// 播放位置（100 纳秒刻度）。
    pub position: i64,
    /// 曲目总时长（100 纳秒刻度）。
    pub duration: i64,
    /// 是否正在播放。
    pub is_playing: bool,
    /// 自上次 `clear_dirty` 以来是否发生过变化。
    pub dirty: bool,
}

/// 将缓存数据复制进调用方缓冲区的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRead {
    /// 没有数据（或封面已经被读取过）。
    Empty,
    /// 已完整写入的字节数。
    Written(usize),
    /// 缓冲区太小，需要至少 `required` 字节。缓冲区内容保持不变。
    TooSmall {
        /// 完整数据所需的字节数。
        required: usize,
    },
}

impl BufferRead {
    /// 转换为宿主使用的整数约定：写入字节数、`0` 表示无数据、`-1` 表示缓冲区太小。
    ///
    /// 写入长度超出 `i32` 范围时同样返回 `-1`。
    pub fn as_raw(self) -> i32 {
        match self {
            BufferRead::Empty => 0,
            BufferRead::Written(len) => i32::try_from(len).unwrap_or(-1),
            BufferRead::TooSmall { .. } => -1,
        }
    }

    fn copy(data: &[u8], buffer: &mut [u8]) -> Self {
        if data.is_empty() {
            return BufferRead::Empty;
        }
        if buffer.len() < data.len() {
            return BufferRead::TooSmall {
                required: data.len(),
            };
        }
        buffer[..data.len()].copy_from_slice(data);
        BufferRead::Written(data.len())
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    snapshot: Snapshot,
    cover_consumed: bool,
}

/// 线程安全的状态缓存。
///
/// 只有工作线程写入；任何线程都可以读取，锁只在复制数据期间短暂持有。
pub struct StateCache {
    inner: Mutex<CacheInner>,
    dirty: AtomicBool,
    cover_policy: CoverReadPolicy,
}

impl StateCache {
    /// 创建一个空缓存。
    pub fn new(cover_policy: CoverReadPolicy) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            dirty: AtomicBool::new(false),
            cover_policy,
        }
    }

    // 写者在持锁期间 panic 不应让读者也失败，直接沿用被毒化的数据。
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 在一次加锁中比较并应用一组变更，返回发生了变化的事件分类（已去重）。
    ///
    /// 没有任何分组发生变化时既不会标记脏，也不会返回事件。
    pub fn apply(&self, changes: impl IntoIterator<Item = ChangeSet>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        let mut inner = self.lock();
        for change in changes {
            if !change.differs_from(&inner.snapshot) {
                continue;
            }
            let kind = change.event_kind();
            if matches!(change, ChangeSet::Cover(_)) {
                inner.cover_consumed = false;
            }
            change.apply_to(&mut inner.snapshot);
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        if !kinds.is_empty() {
            self.dirty.store(true, Ordering::Release);
        }
        kinds
    }

    /// 清空所有字段并标记为脏。在没有可跟踪的会话时使用。
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = CacheInner::default();
        self.dirty.store(true, Ordering::Release);
    }

    /// 清空所有字段和脏标记。在关闭时使用。
    pub fn clear(&self) {
        let mut inner = self.lock();
        *inner = CacheInner::default();
        self.dirty.store(false, Ordering::Release);
    }

    /// 标记为脏。
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// 清除脏标记。
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// 自上次清除以来是否至少发生过一次变化。
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// 返回当前快照的一份完整拷贝。
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            dirty: self.is_dirty(),
            ..inner.snapshot.clone()
        }
    }

    /// 将标题（UTF-8）复制进 `buffer`。
    pub fn read_title(&self, buffer: &mut [u8]) -> BufferRead {
        BufferRead::copy(self.lock().snapshot.title.as_bytes(), buffer)
    }

    /// 将艺术家（UTF-8）复制进 `buffer`。
    pub fn read_artist(&self, buffer: &mut [u8]) -> BufferRead {
        BufferRead::copy(self.lock().snapshot.artist.as_bytes(), buffer)
    }

    /// 将封面复制进 `buffer`。
    ///
    /// 在 `ReadOnce` 策略下，一次完整读取之后会返回 `Empty`，直到新封面到达。
    pub fn read_cover(&self, buffer: &mut [u8]) -> BufferRead {
        let mut inner = self.lock();
        if self.cover_policy == CoverReadPolicy::ReadOnce && inner.cover_consumed {
            return BufferRead::Empty;
        }
        let Some(cover) = inner.snapshot.cover.as_deref() else {
            return BufferRead::Empty;
        };
        let result = BufferRead::copy(cover, buffer);
        if let BufferRead::Written(_) = result {
            inner.cover_consumed = true;
        }
        result
    }

    /// 当前可读取的封面字节数；没有封面或已被读取过（`ReadOnce`）时为 0。
    pub fn cover_len(&self) -> usize {
        let inner = self.lock();
        if self.cover_policy == CoverReadPolicy::ReadOnce && inner.cover_consumed {
            return 0;
        }
        inner.snapshot.cover.as_ref().map_or(0, Vec::len)
    }

    /// 是否正在播放。
    pub fn is_playing(&self) -> bool {
        self.lock().snapshot.is_playing
    }

    /// 返回 `(播放位置, 总时长)`，单位为 100 纳秒刻度。
    pub fn timeline(&self) -> (i64, i64) {
        let inner = self.lock();
        (inner.snapshot.position, inner.snapshot.duration)
    }
}
