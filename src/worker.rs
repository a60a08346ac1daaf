use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
    thread,
    time::Instant,
};

use crate::{
    api::{
        EventKind, MediaProperties, PlaybackStatus, SessionEvent, SessionKey, SubscriptionToken,
        TransportCommand, VolumeAction, WorkerState,
    },
    change::ChangeSet,
    config::{BridgeConfig, VolumeTarget},
    error::{BridgeError, Result},
    provider::{
        AudioMixer, Backend, ConnectPoll, EventHandler, MediaSession, SessionManager,
        SessionProvider,
    },
    queue::EventQueue,
    selector,
    state::StateCache,
    tasks::{self, Task},
    utils,
    volume_control::VolumeResolver,
};

/// 宿主注册的变更回调。
pub type ChangeCallback = Arc<dyn Fn(EventKind) + Send + Sync + 'static>;

/// 工作线程与宿主线程之间共享的全部状态。
pub(crate) struct WorkerShared {
    pub(crate) queue: EventQueue<Task>,
    pub(crate) cache: StateCache,
    running: AtomicBool,
    /// 每次 `initialize` 递增，宿主命令带着提交时的编号入队。
    run: AtomicU64,
    /// 会话切换已入队但尚未完成时为 `true`，期间到达的切换触发会被丢弃。
    switching: AtomicBool,
    state: AtomicU8,
    callback: Mutex<Option<ChangeCallback>>,
}

impl WorkerShared {
    pub(crate) fn new(config: &BridgeConfig) -> Self {
        Self {
            queue: EventQueue::new(),
            cache: StateCache::new(config.cover_read_policy),
            running: AtomicBool::new(false),
            run: AtomicU64::new(0),
            switching: AtomicBool::new(false),
            state: AtomicU8::new(WorkerState::Stopped.as_u8()),
            callback: Mutex::new(None),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// 开始新一轮运行：丢弃上一轮残留的任务，返回本轮编号并置为运行中。
    pub(crate) fn begin_run(&self) -> u64 {
        let dropped = self.queue.clear();
        if dropped > 0 {
            log::debug!("[MediaWorker] 启动前丢弃了 {dropped} 个残留任务。");
        }
        let run = self.run.fetch_add(1, Ordering::AcqRel) + 1;
        self.set_running(true);
        run
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        log::trace!("[MediaWorker] 状态 -> {state:?}");
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn set_callback(&self, callback: Option<ChangeCallback>) {
        *self.callback.lock().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    /// 在锁外调用回调，回调里可以安全地读取快照。
    fn notify(&self, kind: EventKind) {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(kind);
        }
    }

    /// 工作线程未运行时直接丢弃任务。
    pub(crate) fn submit(&self, task: Task) -> bool {
        let run = self.run.load(Ordering::Acquire);
        if !self.is_running() {
            log::debug!("[MediaWorker] 工作线程未运行，命令已丢弃。");
            return false;
        }
        self.queue.push(tasks::scoped(run, task));
        true
    }

    /// 会话集合变化的入口。已有切换在途时本次触发被丢弃。
    fn request_session_switch(&self) {
        if self.switching.swap(true, Ordering::AcqRel) {
            log::trace!("[会话切换] 已有切换在进行，本次触发被丢弃。");
            return;
        }
        self.queue.push(tasks::switch_session());
    }
}

/// 在作用域结束时清除切换标志，任务出错或 panic 时也一样。
struct SwitchGuard<'a>(&'a AtomicBool);

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 当前会话上已注册的一组事件订阅。
struct SubscriptionSet {
    key: SessionKey,
    tokens: Vec<(SessionEvent, SubscriptionToken)>,
}

impl SubscriptionSet {
    /// 注册全部三个会话事件。任一注册失败时撤销已经注册的部分。
    fn register(session: &dyn MediaSession, shared: &Arc<WorkerShared>) -> Result<Self> {
        let key = session.key();
        let mut set = Self {
            key: key.clone(),
            tokens: Vec::with_capacity(SessionEvent::ALL.len()),
        };

        for event in SessionEvent::ALL {
            let handler = refresh_handler(Arc::downgrade(shared), key.clone(), event);
            match session.subscribe(event, handler) {
                Ok(token) => set.tokens.push((event, token)),
                Err(e) => {
                    log::warn!("[会话切换] 注册 {event:?} 事件失败: {e}，撤销已注册的订阅。");
                    set.revoke_on(session);
                    return Err(e);
                }
            }
        }
        Ok(set)
    }

    fn revoke_on(self, session: &dyn MediaSession) {
        for (event, token) in self.tokens {
            if let Err(e) = session.unsubscribe(event, token) {
                log::warn!("[会话切换] 注销 {event:?} 事件失败: {e}");
            }
        }
    }
}

/// 提供者回调只负责把刷新任务投进队列。
fn refresh_handler(shared: Weak<WorkerShared>, key: SessionKey, event: SessionEvent) -> EventHandler {
    Box::new(move || {
        if let Some(shared) = shared.upgrade() {
            shared.queue.push(tasks::refresh(key.clone(), event));
        }
    })
}

/// 唯一允许调用提供者和混音器的线程上的状态。
///
/// 会话只以查找键的形式保存，每次使用前都重新向管理器确认其仍然存活。
pub(crate) struct MediaWorker {
    shared: Arc<WorkerShared>,
    config: BridgeConfig,
    mixer: Box<dyn AudioMixer>,
    manager: Option<Box<dyn SessionManager>>,
    sessions_token: Option<SubscriptionToken>,
    current: Option<SessionKey>,
    subscriptions: Option<SubscriptionSet>,
    /// 每次切换会话时递增，用来识别过期的异步获取结果。
    generation: u64,
    run: u64,
}

/// 启动工作线程。线程退出时归还后台组件。
pub(crate) fn spawn(
    shared: Arc<WorkerShared>,
    config: BridgeConfig,
    backend: Backend,
    run: u64,
) -> Result<thread::JoinHandle<Backend>> {
    thread::Builder::new()
        .name("smtc_bridge_worker".to_string())
        .spawn(move || MediaWorker::run(shared, config, backend, run))
        .map_err(|e| BridgeError::WorkerThread(e.to_string()))
}

impl MediaWorker {
    /// 工作线程的入口：连接提供者，驱动任务循环，最后释放所有订阅。
    fn run(shared: Arc<WorkerShared>, config: BridgeConfig, backend: Backend, run: u64) -> Backend {
        log::info!("[MediaWorker] Worker #{run} 正在启动...");
        shared.set_state(WorkerState::Starting);

        let Backend {
            mut provider,
            mixer,
        } = backend;
        let manager = connect_provider(provider.as_mut(), &shared, &config);

        let mut worker = MediaWorker {
            shared,
            config,
            mixer,
            manager: None,
            sessions_token: None,
            current: None,
            subscriptions: None,
            generation: 0,
            run,
        };

        if worker.shared.is_running() {
            match manager {
                Some(manager) => worker.attach(manager),
                None => log::warn!("[MediaWorker] 会话提供者不可用，以降级模式运行。"),
            }
            worker.shared.set_state(WorkerState::Running);
            worker.event_loop();
        }

        worker.shared.set_state(WorkerState::Draining);
        worker.teardown();
        worker.shared.set_state(WorkerState::Stopped);
        log::info!("[MediaWorker] Worker 已停止。");

        Backend {
            provider,
            mixer: worker.mixer,
        }
    }

    /// 订阅会话集合变化，然后触发一次启动时的会话选择。
    fn attach(&mut self, manager: Box<dyn SessionManager>) {
        let weak = Arc::downgrade(&self.shared);
        let handler: EventHandler = Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.request_session_switch();
            }
        });
        match manager.subscribe_sessions_changed(handler) {
            Ok(token) => self.sessions_token = Some(token),
            Err(e) => log::warn!("[MediaWorker] 注册会话变化事件失败，将无法感知会话切换: {e}"),
        }
        self.manager = Some(manager);
        self.shared.request_session_switch();
    }

    fn event_loop(&mut self) {
        log::debug!("[MediaWorker] 进入任务循环。");
        while self.shared.is_running() {
            let Some(task) = self.shared.queue.pop(self.config.queue_poll_interval) else {
                continue;
            };
            if !self.shared.is_running() {
                log::trace!("[MediaWorker] 收到关闭信号，丢弃刚取出的任务。");
                break;
            }
            self.execute(task);
        }
        log::debug!("[MediaWorker] 任务循环已退出。");
    }

    /// 单个任务的失败或 panic 不会终止循环。
    fn execute(&mut self, task: Task) {
        match panic::catch_unwind(AssertUnwindSafe(|| task(self))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("[MediaWorker] 任务执行失败: {e}"),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "未知错误".to_string());
                log::error!("[MediaWorker] 任务发生 panic，已跳过: {message}");
            }
        }
    }

    fn teardown(&mut self) {
        log::debug!("[MediaWorker] 正在注销订阅并释放会话句柄...");
        self.revoke_subscriptions();
        self.current = None;

        if let Some(token) = self.sessions_token.take()
            && let Some(manager) = self.manager.as_deref()
            && let Err(e) = manager.unsubscribe_sessions_changed(token)
        {
            log::warn!("[MediaWorker] 注销会话变化事件失败: {e}");
        }
        self.manager = None;

        let dropped = self.shared.queue.clear();
        if dropped > 0 {
            log::debug!("[MediaWorker] 丢弃了 {dropped} 个未执行的任务。");
        }
        self.shared.switching.store(false, Ordering::Release);

        // 变更回调里的关闭请求不会等待线程退出，最后一个任务可能在那之后写入过快照。
        self.shared.cache.clear();
    }

    pub(crate) fn run_id(&self) -> u64 {
        self.run
    }

    /// 撤销当前订阅集合、重新选择会话、为新会话注册订阅。
    pub(crate) fn switch_session(&mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let guard = SwitchGuard(&shared.switching);

        self.revoke_subscriptions();
        self.current = None;
        self.generation = self.generation.wrapping_add(1);

        match self.select_session()? {
            Some(session) => {
                let key = session.key();
                self.subscriptions = Some(SubscriptionSet::register(session.as_ref(), &shared)?);
                self.current = Some(key.clone());

                let app = session
                    .source_app_id()
                    .map(|id| utils::display_name_from_app_id(&id))
                    .unwrap_or_else(|_| key.to_string());
                log::info!("[会话切换] 当前会话: {app}");

                shared.queue.push(tasks::refresh_all(key));
            }
            None => {
                log::info!("[会话切换] 没有可用的会话。");
                shared.cache.reset();
            }
        }

        drop(guard);
        shared.cache.mark_dirty();
        shared.notify(EventKind::SessionChanged);
        Ok(())
    }

    fn select_session(&self) -> Result<Option<Arc<dyn MediaSession>>> {
        let Some(manager) = self.manager.as_deref() else {
            return Ok(None);
        };

        let candidates: Vec<_> = manager
            .sessions()?
            .into_iter()
            .map(|session| {
                let status = session.playback_info().map_or_else(
                    |e| {
                        log::trace!("[会话切换] 读取 {} 的播放状态失败: {e}", session.key());
                        PlaybackStatus::Closed
                    },
                    |info| info.status,
                );
                (session, status)
            })
            .collect();

        Ok(selector::select_session(&candidates, || {
            manager.focused_session().unwrap_or_else(|e| {
                log::warn!("[会话切换] 获取焦点会话失败: {e}");
                None
            })
        }))
    }

    fn revoke_subscriptions(&mut self) {
        let Some(set) = self.subscriptions.take() else {
            return;
        };
        let Some(manager) = self.manager.as_deref() else {
            return;
        };
        match manager.find_session(&set.key) {
            Ok(Some(session)) => set.revoke_on(session.as_ref()),
            Ok(None) => log::debug!("[会话切换] 会话 {} 已消失，无需注销。", set.key),
            Err(e) => log::warn!("[会话切换] 查找会话 {} 失败，无法注销订阅: {e}", set.key),
        }
    }

    /// 当前会话，只有在管理器确认它仍然存活时才返回。
    fn current_session(&self) -> Result<Option<Arc<dyn MediaSession>>> {
        let (Some(key), Some(manager)) = (self.current.as_ref(), self.manager.as_deref()) else {
            return Ok(None);
        };
        let session = manager.find_session(key)?;
        if session.is_none() {
            log::debug!("[MediaWorker] 会话 {key} 已不存在。");
        }
        Ok(session)
    }

    /// 只为仍是当前会话的键返回会话；旧会话的迟到事件在这里被过滤掉。
    fn live_session(&self, key: &SessionKey) -> Result<Option<Arc<dyn MediaSession>>> {
        if self.current.as_ref() != Some(key) {
            log::trace!("[MediaWorker] 忽略来自非当前会话 {key} 的事件。");
            return Ok(None);
        }
        self.current_session()
    }

    fn publish(&self, changes: impl IntoIterator<Item = ChangeSet>) {
        if !self.shared.is_running() {
            log::trace!("[MediaWorker] 已收到关闭请求，不再更新快照。");
            return;
        }
        for kind in self.shared.cache.apply(changes) {
            self.shared.notify(kind);
        }
    }

    pub(crate) fn refresh(&mut self, key: &SessionKey, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::MediaProperties => self.request_media_properties(key),
            SessionEvent::Timeline => self.refresh_timeline(key),
            SessionEvent::PlaybackInfo => self.refresh_playback(key),
        }
    }

    pub(crate) fn refresh_all(&mut self, key: &SessionKey) -> Result<()> {
        for event in SessionEvent::ALL {
            if let Err(e) = self.refresh(key, event) {
                log::warn!("[MediaWorker] 刷新 {event:?} 失败: {e}");
            }
        }
        Ok(())
    }

    fn refresh_timeline(&mut self, key: &SessionKey) -> Result<()> {
        let Some(session) = self.live_session(key)? else {
            return Ok(());
        };
        let timeline = session.timeline()?;
        self.publish([ChangeSet::from(timeline)]);
        Ok(())
    }

    fn refresh_playback(&mut self, key: &SessionKey) -> Result<()> {
        let Some(session) = self.live_session(key)? else {
            return Ok(());
        };
        let info = session.playback_info()?;
        self.publish([ChangeSet::from(info)]);
        Ok(())
    }

    /// 发起异步获取；结果作为新任务回到队列，在工作线程上应用。
    fn request_media_properties(&mut self, key: &SessionKey) -> Result<()> {
        let Some(session) = self.live_session(key)? else {
            return Ok(());
        };
        let shared = Arc::downgrade(&self.shared);
        let generation = self.generation;
        let key = key.clone();
        session.fetch_media_properties(Box::new(move |result| {
            if let Some(shared) = shared.upgrade() {
                shared
                    .queue
                    .push(tasks::apply_media_properties(key, generation, result));
            }
        }));
        Ok(())
    }

    pub(crate) fn apply_media_properties(
        &mut self,
        key: &SessionKey,
        generation: u64,
        result: Result<MediaProperties>,
    ) -> Result<()> {
        let props = result?;
        if self.config.discard_stale_fetches
            && (generation != self.generation || self.current.as_ref() != Some(key))
        {
            log::debug!("[MediaWorker] 会话已切换，丢弃来自 {key} 的过期媒体属性。");
            return Ok(());
        }
        log::trace!(
            "[MediaWorker] 收到媒体属性: '{}' - '{}'",
            props.title,
            props.artist
        );
        self.publish(ChangeSet::from_media_properties(
            props,
            self.config.max_cover_bytes,
        ));
        Ok(())
    }

    pub(crate) fn execute_control(&mut self, command: TransportCommand) -> Result<()> {
        let Some(session) = self.current_session()? else {
            log::debug!("[MediaWorker] 没有当前会话，忽略控制命令 {command:?}。");
            return Ok(());
        };
        log::debug!("[MediaWorker] 向 {} 发送 {command:?}", session.key());
        session.control(command)
    }

    pub(crate) fn adjust_volume(&mut self, action: VolumeAction) -> Result<()> {
        let Some(session) = self.current_session()? else {
            log::debug!("[音量控制] 没有当前会话，忽略 {action:?}。");
            return Ok(());
        };
        let resolver = VolumeResolver::new(self.mixer.as_ref());
        let outcome = match self.config.volume_target {
            VolumeTarget::Application => {
                resolver.apply_to_application(&session.source_app_id()?, action)?
            }
            VolumeTarget::MasterOutput => resolver.apply_to_master(action)?,
        };
        log::debug!("[音量控制] {action:?} -> {outcome:?}");
        Ok(())
    }
}

/// 轮询挂起的连接，直到成功、失败、超时或收到关闭请求。
fn connect_provider(
    provider: &mut dyn SessionProvider,
    shared: &WorkerShared,
    config: &BridgeConfig,
) -> Option<Box<dyn SessionManager>> {
    let mut connecting = match provider.connect() {
        Ok(connecting) => connecting,
        Err(e) => {
            log::error!("[MediaWorker] 无法请求会话管理器: {e}");
            return None;
        }
    };

    let deadline = Instant::now() + config.connect_timeout;
    loop {
        if !shared.is_running() {
            log::info!("[MediaWorker] 连接期间收到关闭请求，放弃连接。");
            return None;
        }
        match connecting.poll() {
            ConnectPoll::Ready(Ok(manager)) => {
                log::debug!("[MediaWorker] 会话管理器已就绪。");
                return Some(manager);
            }
            ConnectPoll::Ready(Err(e)) => {
                log::error!("[MediaWorker] 连接会话提供者失败: {e}");
                return None;
            }
            ConnectPoll::Pending => {}
        }
        if Instant::now() >= deadline {
            log::warn!(
                "[MediaWorker] 连接会话提供者超时 ({:?})。",
                config.connect_timeout
            );
            return None;
        }
        thread::sleep(config.connect_poll_interval);
    }
}
