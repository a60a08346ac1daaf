use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use crate::{
    api::{EventKind, WorkerState},
    config::BridgeConfig,
    dispatcher::ControlDispatcher,
    error::{BridgeError, Result},
    provider::Backend,
    state::{BufferRead, Snapshot},
    worker::{self, WorkerShared},
};

enum Lifecycle {
    /// 未运行。后台组件在上一次工作线程异常退出后可能已经丢失。
    Idle(Option<Backend>),
    Running(JoinHandle<Backend>),
    /// 另一个线程正在等待工作线程退出。
    Stopping,
}

/// 宿主与“正在播放”状态之间的唯一入口。
///
/// 读取方法只访问快照缓存，可以在任何线程上调用且不会阻塞在提供者上。
/// 控制方法只负责入队，真正的执行发生在后台工作线程。
///
/// `MediaBridge` 被丢弃时会自动调用 [`MediaBridge::shutdown`]。
pub struct MediaBridge {
    shared: Arc<WorkerShared>,
    config: BridgeConfig,
    dispatcher: ControlDispatcher,
    lifecycle: Mutex<Lifecycle>,
}

impl MediaBridge {
    /// 用给定的配置和后台组件创建一个尚未启动的桥。
    pub fn new(config: BridgeConfig, backend: Backend) -> Self {
        let shared = Arc::new(WorkerShared::new(&config));
        let dispatcher = ControlDispatcher::new(Arc::clone(&shared), config.volume_step);
        Self {
            shared,
            config,
            dispatcher,
            lifecycle: Mutex::new(Lifecycle::Idle(Some(backend))),
        }
    }

    /// 使用系统的 SMTC 与 WASAPI 后台组件创建桥。
    #[cfg(windows)]
    pub fn with_system_backend(config: BridgeConfig) -> Result<Self> {
        Ok(Self::new(config, crate::platform::system_backend()?))
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 启动后台工作线程。已经在运行时什么也不做。
    ///
    /// 提供者连接失败不会让这里返回错误，工作线程会以降级模式运行。
    ///
    /// # 错误
    /// - `ShutdownInProgress`: 另一个线程正在关闭工作线程。
    /// - `BackendUnavailable`: 上一次工作线程没有归还后台组件。
    /// - `WorkerThread`: 无法创建线程。
    pub fn initialize(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock()?;
        let backend = match &mut *lifecycle {
            Lifecycle::Running(_) => {
                log::debug!("[MediaBridge] 工作线程已在运行，忽略重复的初始化。");
                return Ok(());
            }
            Lifecycle::Stopping => return Err(BridgeError::ShutdownInProgress),
            Lifecycle::Idle(backend) => backend.take().ok_or(BridgeError::BackendUnavailable)?,
        };

        let run = self.shared.begin_run();
        match worker::spawn(Arc::clone(&self.shared), self.config.clone(), backend, run) {
            Ok(handle) => {
                *lifecycle = Lifecycle::Running(handle);
                log::info!("[MediaBridge] 工作线程已启动。");
                Ok(())
            }
            Err(e) => {
                self.shared.set_running(false);
                log::error!("[MediaBridge] 启动工作线程失败: {e}");
                Err(e)
            }
        }
    }

    /// 停止工作线程并清空快照。可以重复调用，也可以在 `initialize` 之前调用。
    ///
    /// 在工作线程内部（例如变更回调里）调用时不会等待线程退出。
    pub fn shutdown(&self) {
        let handle = {
            let mut lifecycle = self.lock_lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(handle) => handle,
                other => {
                    *lifecycle = other;
                    drop(lifecycle);
                    self.shared.cache.clear();
                    return;
                }
            }
        };

        log::info!("[MediaBridge] 正在关闭工作线程...");
        self.shared.set_running(false);
        self.shared.queue.wake();

        let backend = if handle.thread().id() == thread::current().id() {
            log::warn!("[MediaBridge] 在工作线程内部请求关闭，线程将在当前任务结束后自行退出。");
            None
        } else {
            match handle.join() {
                Ok(backend) => Some(backend),
                Err(_) => {
                    log::error!("[MediaBridge] 工作线程异常退出，后台组件已丢失。");
                    None
                }
            }
        };

        *self.lock_lifecycle() = Lifecycle::Idle(backend);
        self.shared.cache.clear();
        log::info!("[MediaBridge] 工作线程已关闭。");
    }

    /// 工作线程当前所处的阶段。
    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// 注册变更回调，替换之前注册的回调。
    ///
    /// 回调在工作线程上调用，调用时没有持有快照锁。
    pub fn register_change_callback(&self, callback: impl Fn(EventKind) + Send + Sync + 'static) {
        self.shared.set_callback(Some(Arc::new(callback)));
    }

    /// 移除变更回调。
    pub fn clear_change_callback(&self) {
        self.shared.set_callback(None);
    }

    /// 返回可以交给其他线程使用的控制句柄。
    pub fn controls(&self) -> ControlDispatcher {
        self.dispatcher.clone()
    }

    /// 当前快照的一致副本。
    pub fn snapshot(&self) -> Snapshot {
        self.shared.cache.snapshot()
    }

    /// 把标题的 UTF-8 字节复制到 `buffer`。
    pub fn title(&self, buffer: &mut [u8]) -> BufferRead {
        self.shared.cache.read_title(buffer)
    }

    /// 把艺术家的 UTF-8 字节复制到 `buffer`。
    pub fn artist(&self, buffer: &mut [u8]) -> BufferRead {
        self.shared.cache.read_artist(buffer)
    }

    /// 把封面字节复制到 `buffer`。
    pub fn cover_image(&self, buffer: &mut [u8]) -> BufferRead {
        self.shared.cache.read_cover(buffer)
    }

    /// 封面字节数，没有封面时为 0。
    pub fn cover_len(&self) -> usize {
        self.shared.cache.cover_len()
    }

    /// 当前是否正在播放。
    pub fn is_playing(&self) -> bool {
        self.shared.cache.is_playing()
    }

    /// `(position, duration)`，单位为 100 纳秒。
    pub fn timeline(&self) -> (i64, i64) {
        self.shared.cache.timeline()
    }

    /// 自上次 `clear_dirty` 之后快照是否发生过变化。
    pub fn is_dirty(&self) -> bool {
        self.shared.cache.is_dirty()
    }

    /// 清除脏标志。
    pub fn clear_dirty(&self) {
        self.shared.cache.clear_dirty();
    }

    /// 播放。
    pub fn play(&self) {
        self.dispatcher.play();
    }

    /// 暂停。
    pub fn pause(&self) {
        self.dispatcher.pause();
    }

    /// 在播放与暂停之间切换。
    pub fn toggle_play_pause(&self) {
        self.dispatcher.toggle_play_pause();
    }

    /// 下一首。
    pub fn next(&self) {
        self.dispatcher.next();
    }

    /// 上一首。
    pub fn previous(&self) {
        self.dispatcher.previous();
    }

    /// 跳转到指定位置（100 纳秒为单位）。
    pub fn seek(&self, position: i64) {
        self.dispatcher.seek(position);
    }

    /// 按配置的步长调高音量。
    pub fn volume_up(&self) {
        self.dispatcher.volume_up();
    }

    /// 按配置的步长调低音量。
    pub fn volume_down(&self) {
        self.dispatcher.volume_down();
    }

    /// 设置音量 (0.0 - 1.0)。
    pub fn set_volume(&self, level: f32) {
        self.dispatcher.set_volume(level);
    }
}

impl Drop for MediaBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
