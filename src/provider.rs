//! 外部协作者的边界：媒体会话提供者与音频混音器。
//!
//! 这些 trait 的实现对象只会在工作线程上被调用。提供者注册的事件处理器
//! 可能在任意线程上被回调，处理器本身只负责把任务投递进队列。

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::{
    api::{
        MediaProperties, PlaybackInfo, SessionEvent, SessionKey, SubscriptionToken,
        TimelineProperties, TransportCommand,
    },
    error::{BridgeError, Result},
};

/// 提供者事件的处理器。可能在任意线程上被调用。
pub type EventHandler = Box<dyn Fn() + Send + Sync + 'static>;

/// 异步获取完成时的回调。可能在任意线程上被调用。
pub type Completion<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// 媒体会话提供者的入口，负责建立连接。
pub trait SessionProvider: Send {
    /// 开始异步连接，返回一个可轮询的挂起连接。
    fn connect(&mut self) -> Result<Connecting>;
}

/// 已连接的会话提供者。
pub trait SessionManager: Send {
    /// 按提供者报告的顺序列出当前所有活动会话。
    fn sessions(&self) -> Result<Vec<Arc<dyn MediaSession>>>;

    /// 提供者自己认为的“当前/焦点”会话。
    fn focused_session(&self) -> Result<Option<Arc<dyn MediaSession>>>;

    /// 注册“会话集合变化”事件。
    fn subscribe_sessions_changed(&self, handler: EventHandler) -> Result<SubscriptionToken>;

    /// 注销“会话集合变化”事件。
    fn unsubscribe_sessions_changed(&self, token: SubscriptionToken) -> Result<()>;

    /// 按键查找一个仍然存活的会话，这是使用会话之前的存活检查。
    fn find_session(&self, key: &SessionKey) -> Result<Option<Arc<dyn MediaSession>>> {
        Ok(self
            .sessions()?
            .into_iter()
            .find(|session| session.key() == *key))
    }
}

/// 一个可播放的媒体会话。
pub trait MediaSession: Send + Sync {
    /// 提供者为该会话分配的查找键。
    fn key(&self) -> SessionKey;

    /// 会话来源应用声明的身份（AUMID 或可执行文件路径）。
    fn source_app_id(&self) -> Result<String>;

    /// 读取当前播放信息。
    fn playback_info(&self) -> Result<PlaybackInfo>;

    /// 读取当前时间轴。
    fn timeline(&self) -> Result<TimelineProperties>;

    /// 异步获取媒体属性（含封面字节），完成后调用 `done`。
    fn fetch_media_properties(&self, done: Completion<MediaProperties>);

    /// 注册会话事件。
    fn subscribe(&self, event: SessionEvent, handler: EventHandler) -> Result<SubscriptionToken>;

    /// 注销会话事件。
    fn unsubscribe(&self, event: SessionEvent, token: SubscriptionToken) -> Result<()>;

    /// 发起一个传输控制操作，不等待其完成。
    fn control(&self, command: TransportCommand) -> Result<()>;
}

/// 一个正在进行中的提供者连接。
pub struct Connecting {
    rx: oneshot::Receiver<Result<Box<dyn SessionManager>>>,
}

/// `Connecting` 的完成端，由提供者在连接结束时调用。
pub struct ConnectCompleter {
    tx: oneshot::Sender<Result<Box<dyn SessionManager>>>,
}

/// 一次轮询的结果。
pub enum ConnectPoll {
    /// 连接仍在进行。
    Pending,
    /// 连接已结束。
    Ready(Result<Box<dyn SessionManager>>),
}

impl Connecting {
    /// 创建一对挂起连接与完成端。
    pub fn channel() -> (ConnectCompleter, Connecting) {
        let (tx, rx) = oneshot::channel();
        (ConnectCompleter { tx }, Connecting { rx })
    }

    /// 创建一个已经完成的连接。
    pub fn ready(result: Result<Box<dyn SessionManager>>) -> Self {
        let (completer, connecting) = Self::channel();
        completer.complete(result);
        connecting
    }

    /// 非阻塞地检查连接是否已经结束。
    ///
    /// 完成端被丢弃而没有给出结果时视为提供者不可用。
    pub fn poll(&mut self) -> ConnectPoll {
        match self.rx.try_recv() {
            Ok(result) => ConnectPoll::Ready(result),
            Err(oneshot::error::TryRecvError::Empty) => ConnectPoll::Pending,
            Err(oneshot::error::TryRecvError::Closed) => {
                ConnectPoll::Ready(Err(BridgeError::ProviderUnavailable))
            }
        }
    }
}

impl ConnectCompleter {
    /// 交付连接结果。等待方已经放弃时结果会被直接丢弃。
    pub fn complete(self, result: Result<Box<dyn SessionManager>>) {
        if self.tx.send(result).is_err() {
            log::debug!("[Provider] 连接结果到达时等待方已放弃，结果已丢弃。");
        }
    }
}

/// 音频混音器：枚举各应用的音频会话并调整音量。
pub trait AudioMixer: Send {
    /// 枚举当前活动的音频会话。
    fn sessions(&self) -> Result<Vec<Box<dyn MixerSession>>>;

    /// 通过进程 ID 查找可执行文件名（例如 `Spotify.exe`）。
    fn process_name(&self, pid: u32) -> Option<String>;

    /// 默认输出设备的主音量。
    fn master_volume(&self) -> Result<f32>;

    /// 设置默认输出设备的主音量。
    fn set_master_volume(&self, level: f32) -> Result<()>;
}

/// 混音器中的一个应用音频会话。
pub trait MixerSession {
    /// 会话实例标识符。
    fn instance_id(&self) -> Result<String>;

    /// 会话标识符。
    fn session_id(&self) -> Result<String>;

    /// 会话显示名称。
    fn display_name(&self) -> Result<String>;

    /// 所属进程 ID。
    fn process_id(&self) -> Result<u32>;

    /// 是否为系统声音会话。
    fn is_system_sounds(&self) -> bool;

    /// 当前音量。
    fn volume(&self) -> Result<f32>;

    /// 设置音量。
    fn set_volume(&self, level: f32) -> Result<()>;
}

/// 交给 `MediaBridge` 的全部后台组件。
///
/// 工作线程启动时取走它，退出时归还，所以同一个桥可以反复启动。
pub struct Backend {
    pub(crate) provider: Box<dyn SessionProvider>,
    pub(crate) mixer: Box<dyn AudioMixer>,
}

impl Backend {
    /// 用给定的提供者和混音器组装后台组件。
    pub fn new(provider: impl SessionProvider + 'static, mixer: impl AudioMixer + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            mixer: Box::new(mixer),
        }
    }
}
