use serde::{Deserialize, Serialize};

/// 每秒包含的时间刻度数。时间轴数值均以 100 纳秒为单位。
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// 媒体会话报告的播放状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackStatus {
    /// 会话已关闭。
    Closed,
    /// 会话已打开但尚未开始播放。
    Opened,
    /// 正在切换曲目。
    Changing,
    #[default]
    /// 已停止
    Stopped,
    /// 播放中
    Playing,
    /// 已暂停
    Paused,
}

/// 推送给宿主回调的变更分类。
///
/// 它只用于告诉宿主“哪一类数据变了”，工作线程内部的任务并不使用它。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// 标题、艺术家或封面发生变化。
    MediaPropertiesChanged,
    /// 播放进度或总时长发生变化。
    TimelineChanged,
    /// 播放/暂停状态发生变化。
    PlaybackStatusChanged,
    /// 当前跟踪的媒体会话已被重新选择。
    SessionChanged,
}

/// 一次媒体属性获取的结果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaProperties {
    /// 曲目标题。
    pub title: String,
    /// 艺术家名称。
    pub artist: String,
    /// 封面图片的原始字节；`None` 表示会话没有提供封面。
    pub cover: Option<Vec<u8>>,
}

/// 会话的时间轴属性（100 纳秒刻度）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineProperties {
    /// 当前播放位置。
    pub position: i64,
    /// 结束时间，即曲目总时长。
    pub end_time: i64,
}

/// 会话的播放信息。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackInfo {
    /// 当前的播放状态。
    pub status: PlaybackStatus,
}

impl PlaybackInfo {
    /// 会话是否正在播放。
    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }
}

/// 提供者为每个会话对象分配的查找键。
///
/// 工作线程只保存这个键而不是会话本身，使用前总是通过提供者重新解析，
/// 解析失败即说明会话已经消失。
///
/// 同一个应用可以同时拥有多个会话（例如浏览器的多个标签页），
/// 所以键由应用身份和提供者分配的实例编号共同组成。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    app_id: String,
    instance: u64,
}

impl SessionKey {
    /// 用会话的应用身份和提供者分配的实例编号创建一个键。
    ///
    /// 提供者必须保证同一时刻存活的会话实例编号互不相同。
    pub fn new(app_id: impl Into<String>, instance: u64) -> Self {
        Self {
            app_id: app_id.into(),
            instance,
        }
    }

    /// 会话来源应用的身份。
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// 提供者分配的实例编号。
    pub fn instance(&self) -> u64 {
        self.instance
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.app_id, self.instance)
    }
}

/// 事件注册后由提供者返回的令牌，用于之后注销。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(pub i64);

/// 单个会话上可以订阅的事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    /// 媒体属性（标题、艺术家、封面）变化。
    MediaProperties,
    /// 时间轴变化。
    Timeline,
    /// 播放信息变化。
    PlaybackInfo,
}

impl SessionEvent {
    /// 一个订阅集合包含的全部事件，按注册顺序排列。
    pub const ALL: [SessionEvent; 3] = [
        SessionEvent::MediaProperties,
        SessionEvent::Timeline,
        SessionEvent::PlaybackInfo,
    ];
}

/// 对媒体会话执行的传输控制操作。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    /// 开始或恢复播放。
    Play,
    /// 暂停播放。
    Pause,
    /// 在播放和暂停之间切换。
    TogglePlayPause,
    /// 跳到下一首。
    SkipNext,
    /// 跳到上一首。
    SkipPrevious,
    /// 跳转到指定位置（100 纳秒刻度）。
    Seek(i64),
}

/// 音量调整请求。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeAction {
    /// 设置绝对音量（0.0 到 1.0，超出部分会被截断）。
    Set(f32),
    /// 在当前音量上增加一个差值（可以为负）。
    Adjust(f32),
}

impl VolumeAction {
    /// 根据当前音量计算新的音量，结果总在 `[0, 1]` 之内。
    pub fn resolve(self, current: f32) -> f32 {
        let target = match self {
            VolumeAction::Set(level) => level,
            VolumeAction::Adjust(delta) => current + delta,
        };
        if target.is_nan() {
            return current.clamp(0.0, 1.0);
        }
        target.clamp(0.0, 1.0)
    }
}

/// 工作线程的生命周期阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerState {
    /// 正在连接会话提供者。
    Starting,
    /// 正在处理任务队列。
    Running,
    /// 正在注销订阅并释放句柄。
    Draining,
    /// 没有运行中的工作线程。
    Stopped,
}

impl WorkerState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            WorkerState::Starting => 0,
            WorkerState::Running => 1,
            WorkerState::Draining => 2,
            WorkerState::Stopped => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Starting,
            1 => WorkerState::Running,
            2 => WorkerState::Draining,
            _ => WorkerState::Stopped,
        }
    }
}
