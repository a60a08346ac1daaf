#![warn(missing_docs)]

//! 一个把 Windows 系统媒体控件 (SMTC) 的“正在播放”信息桥接给宿主程序的 Rust 库。
//!
//! `smtc-bridge` 在一个专用的后台线程中跟踪系统当前的媒体会话，把标题、艺术家、
//! 封面、进度和播放状态维护在一个线程安全的快照里，宿主可以在任何线程上
//! 随时读取，而不需要接触任何 WinRT/COM 对象。
//!
//! ## 核心功能
//!
//! * **会话跟踪**: 自动选择正在播放的会话，会话集合变化时重新选择。
//! * **变更检测**: 只有值真正改变时才通知宿主，并维护一个“脏”标志。
//! * **媒体播放控制**: 播放、暂停、切歌、跳转，全部非阻塞。
//! * **独立音量控制**: 在混音器中找到当前会话所属应用的音频会话并调整其音量，
//!   也可以改为调整主输出设备的音量。
//!
//! ## 使用方法
//!
//! 1.  用 [`BridgeConfig`] 和一组后台组件 ([`Backend`]) 创建 [`MediaBridge`]。
//!     在 Windows 上可以直接使用 [`MediaBridge::with_system_backend`]。
//! 2.  调用 [`MediaBridge::initialize`] 启动后台线程。
//! 3.  通过 [`MediaBridge::register_change_callback`] 接收变更通知，
//!     或者轮询 [`MediaBridge::is_dirty`]。
//! 4.  退出前调用 [`MediaBridge::shutdown`]；`MediaBridge` 被丢弃时也会自动关闭。
//!
//! ## 示例
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> smtc_bridge::Result<()> {
//! use smtc_bridge::{BridgeConfig, EventKind, MediaBridge};
//!
//! let bridge = MediaBridge::with_system_backend(BridgeConfig::default())?;
//! bridge.register_change_callback(|kind| {
//!     if kind == EventKind::MediaPropertiesChanged {
//!         println!("曲目信息已变化");
//!     }
//! });
//! bridge.initialize()?;
//!
//! let snapshot = bridge.snapshot();
//! println!("{} - {}", snapshot.artist, snapshot.title);
//!
//! bridge.toggle_play_pause();
//! bridge.volume_up();
//! bridge.shutdown();
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

mod api;
mod bridge;
mod change;
mod config;
mod dispatcher;
mod error;
mod provider;
mod queue;
mod selector;
mod state;
mod tasks;
mod utils;
mod volume_control;
mod worker;

#[cfg(windows)]
pub mod platform;

pub use api::{
    EventKind, MediaProperties, PlaybackInfo, PlaybackStatus, SessionEvent, SessionKey,
    SubscriptionToken, TICKS_PER_SECOND, TimelineProperties, TransportCommand, VolumeAction,
    WorkerState,
};
pub use bridge::MediaBridge;
pub use change::ChangeSet;
pub use config::{BridgeConfig, CoverReadPolicy, VolumeTarget};
pub use dispatcher::ControlDispatcher;
pub use error::{BridgeError, Result};
pub use provider::{
    AudioMixer, Backend, Completion, ConnectCompleter, ConnectPoll, Connecting, EventHandler,
    MediaSession, MixerSession, SessionManager, SessionProvider,
};
pub use queue::EventQueue;
pub use selector::select_session;
pub use state::{BufferRead, Snapshot, StateCache};
pub use utils::{PackagedAppId, display_name_from_app_id};
pub use volume_control::{MatchRule, VolumeOutcome, VolumeResolver, match_keywords};
pub use worker::ChangeCallback;
