#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use smtc_bridge::{
    AudioMixer, Backend, BridgeConfig, BridgeError, Completion, ConnectCompleter, Connecting,
    EventHandler, EventKind, MediaBridge, MediaProperties, MediaSession, MixerSession,
    PlaybackInfo, PlaybackStatus, Result, SessionEvent, SessionKey, SessionManager,
    SessionProvider, SubscriptionToken, TimelineProperties, TransportCommand,
};

pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .is_test(true)
        .try_init();
}

pub fn test_config() -> BridgeConfig {
    BridgeConfig::default()
        .with_queue_poll_interval(Duration::from_millis(20))
        .with_connect_timeout(Duration::from_millis(300))
}

/// 轮询直到条件成立或超时。
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub const WAIT: Duration = Duration::from_secs(3);

/// 记录变更回调收到的事件。
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<EventKind>>>);

impl EventLog {
    pub fn attach(bridge: &MediaBridge) -> Self {
        let log = Self::default();
        let sink = log.clone();
        bridge.register_change_callback(move |kind| sink.0.lock().unwrap().push(kind));
        log
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.0.lock().unwrap().iter().filter(|k| **k == kind).count()
    }

    pub fn all(&self) -> Vec<EventKind> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

struct SessionData {
    status: PlaybackStatus,
    timeline: TimelineProperties,
    media: MediaProperties,
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// 可由测试直接驱动的媒体会话。每个实例都有自己的键，应用身份可以重复。
pub struct FakeSession {
    key: SessionKey,
    app_id: String,
    data: Mutex<SessionData>,
    handlers: Mutex<HashMap<i64, (SessionEvent, Arc<EventHandler>)>>,
    next_token: AtomicI64,
    commands: Mutex<Vec<TransportCommand>>,
    defer_fetches: AtomicBool,
    pending: Mutex<Vec<(MediaProperties, Completion<MediaProperties>)>>,
    fetch_count: AtomicUsize,
    panic_on_control: AtomicBool,
}

impl FakeSession {
    pub fn new(app_id: &str, status: PlaybackStatus) -> Arc<Self> {
        Arc::new(Self {
            key: SessionKey::new(app_id, NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)),
            app_id: app_id.to_string(),
            data: Mutex::new(SessionData {
                status,
                timeline: TimelineProperties::default(),
                media: MediaProperties::default(),
            }),
            handlers: Mutex::new(HashMap::new()),
            next_token: AtomicI64::new(1),
            commands: Mutex::new(Vec::new()),
            defer_fetches: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            fetch_count: AtomicUsize::new(0),
            panic_on_control: AtomicBool::new(false),
        })
    }

    pub fn with_media(self: Arc<Self>, title: &str, artist: &str) -> Arc<Self> {
        {
            let mut data = self.data.lock().unwrap();
            data.media.title = title.to_string();
            data.media.artist = artist.to_string();
        }
        self
    }

    pub fn key(&self) -> SessionKey {
        self.key.clone()
    }

    fn fire(&self, event: SessionEvent) {
        let handlers: Vec<_> = self
            .handlers
            .lock()
            .unwrap()
            .values()
            .filter(|(e, _)| *e == event)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler();
        }
    }

    pub fn set_media(&self, title: &str, artist: &str, cover: Option<Vec<u8>>) {
        {
            let mut data = self.data.lock().unwrap();
            data.media = MediaProperties {
                title: title.to_string(),
                artist: artist.to_string(),
                cover,
            };
        }
        self.fire(SessionEvent::MediaProperties);
    }

    pub fn set_timeline(&self, position: i64, end_time: i64) {
        self.data.lock().unwrap().timeline = TimelineProperties { position, end_time };
        self.fire(SessionEvent::Timeline);
    }

    pub fn set_status(&self, status: PlaybackStatus) {
        self.data.lock().unwrap().status = status;
        self.fire(SessionEvent::PlaybackInfo);
    }

    pub fn subscription_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    pub fn commands(&self) -> Vec<TransportCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// 之后的属性获取不再立即完成，而是等待 `complete_pending`。
    pub fn defer_fetches(&self, defer: bool) {
        self.defer_fetches.store(defer, Ordering::SeqCst);
    }

    pub fn pending_fetches(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// 用发起获取时的数据完成所有挂起的获取。
    pub fn complete_pending(&self) -> usize {
        let pending: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
        let count = pending.len();
        for (props, done) in pending {
            done(Ok(props));
        }
        count
    }

    pub fn panic_on_control(&self, enabled: bool) {
        self.panic_on_control.store(enabled, Ordering::SeqCst);
    }
}

impl MediaSession for FakeSession {
    fn key(&self) -> SessionKey {
        self.key.clone()
    }

    fn source_app_id(&self) -> Result<String> {
        Ok(self.app_id.clone())
    }

    fn playback_info(&self) -> Result<PlaybackInfo> {
        Ok(PlaybackInfo {
            status: self.data.lock().unwrap().status,
        })
    }

    fn timeline(&self) -> Result<TimelineProperties> {
        Ok(self.data.lock().unwrap().timeline)
    }

    fn fetch_media_properties(&self, done: Completion<MediaProperties>) {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let props = self.data.lock().unwrap().media.clone();
        if self.defer_fetches.load(Ordering::SeqCst) {
            self.pending.lock().unwrap().push((props, done));
        } else {
            done(Ok(props));
        }
    }

    fn subscribe(&self, event: SessionEvent, handler: EventHandler) -> Result<SubscriptionToken> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .lock()
            .unwrap()
            .insert(token, (event, Arc::new(handler)));
        Ok(SubscriptionToken(token))
    }

    fn unsubscribe(&self, _event: SessionEvent, token: SubscriptionToken) -> Result<()> {
        self.handlers.lock().unwrap().remove(&token.0);
        Ok(())
    }

    fn control(&self, command: TransportCommand) -> Result<()> {
        if self.panic_on_control.load(Ordering::SeqCst) {
            panic!("control handler exploded");
        }
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

/// 混音器中的一个应用会话，音量与测试共享。
#[derive(Clone)]
pub struct MixerEntry {
    pub instance_id: String,
    pub session_id: String,
    pub display_name: String,
    pub pid: u32,
    pub process: String,
    pub volume: Arc<Mutex<f32>>,
}

impl MixerEntry {
    pub fn new(process: &str, pid: u32, volume: f32) -> Self {
        Self {
            instance_id: format!("{{0.0.0.00000000}}.{{guid}}|\\Device\\HarddiskVolume3\\Apps\\{process}%b{{guid}}|{pid}"),
            session_id: format!("{{0.0.0.00000000}}.{{guid}}|\\Device\\HarddiskVolume3\\Apps\\{process}%b{{guid}}"),
            display_name: String::new(),
            pid,
            process: process.to_string(),
            volume: Arc::new(Mutex::new(volume)),
        }
    }

    pub fn level(&self) -> f32 {
        *self.volume.lock().unwrap()
    }
}

impl MixerSession for MixerEntry {
    fn instance_id(&self) -> Result<String> {
        Ok(self.instance_id.clone())
    }

    fn session_id(&self) -> Result<String> {
        Ok(self.session_id.clone())
    }

    fn display_name(&self) -> Result<String> {
        Ok(self.display_name.clone())
    }

    fn process_id(&self) -> Result<u32> {
        Ok(self.pid)
    }

    fn is_system_sounds(&self) -> bool {
        false
    }

    fn volume(&self) -> Result<f32> {
        Ok(self.level())
    }

    fn set_volume(&self, level: f32) -> Result<()> {
        *self.volume.lock().unwrap() = level;
        Ok(())
    }
}

/// 提供者的连接方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Immediate,
    Fail,
    /// 永远不完成，用于测试超时。
    Never,
}

struct SystemState {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    focused: Mutex<Option<SessionKey>>,
    sessions_changed: Mutex<HashMap<i64, Arc<EventHandler>>>,
    next_token: AtomicI64,
    list_calls: AtomicUsize,
    list_gate: Mutex<()>,
    mixer: Mutex<Vec<MixerEntry>>,
    master: Mutex<f32>,
    connects: AtomicUsize,
}

/// 一个假的“系统”：会话集合、焦点会话和混音器，供测试在外部操纵。
#[derive(Clone)]
pub struct FakeSystem(Arc<SystemState>);

impl FakeSystem {
    pub fn new() -> Self {
        Self(Arc::new(SystemState {
            sessions: Mutex::new(Vec::new()),
            focused: Mutex::new(None),
            sessions_changed: Mutex::new(HashMap::new()),
            next_token: AtomicI64::new(1),
            list_calls: AtomicUsize::new(0),
            list_gate: Mutex::new(()),
            mixer: Mutex::new(Vec::new()),
            master: Mutex::new(0.5),
            connects: AtomicUsize::new(0),
        }))
    }

    pub fn with_sessions(sessions: Vec<Arc<FakeSession>>) -> Self {
        let system = Self::new();
        *system.0.sessions.lock().unwrap() = sessions;
        system
    }

    pub fn backend(&self, behavior: ConnectBehavior) -> Backend {
        Backend::new(
            FakeProvider {
                system: self.clone(),
                behavior,
                parked: Vec::new(),
            },
            FakeMixer {
                system: self.clone(),
            },
        )
    }

    pub fn bridge(&self, config: BridgeConfig) -> MediaBridge {
        MediaBridge::new(config, self.backend(ConnectBehavior::Immediate))
    }

    /// 替换会话集合，但不触发会话变化事件。
    pub fn set_sessions(&self, sessions: Vec<Arc<FakeSession>>) {
        *self.0.sessions.lock().unwrap() = sessions;
    }

    pub fn set_focused(&self, key: Option<SessionKey>) {
        *self.0.focused.lock().unwrap() = key;
    }

    pub fn fire_sessions_changed(&self) {
        let handlers: Vec<_> = self
            .0
            .sessions_changed
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        for handler in handlers {
            handler();
        }
    }

    pub fn sessions_changed_subscribers(&self) -> usize {
        self.0.sessions_changed.lock().unwrap().len()
    }

    /// 持有期间，工作线程列出会话时会被阻塞。
    pub fn hold_listing(&self) -> MutexGuard<'_, ()> {
        self.0.list_gate.lock().unwrap()
    }

    pub fn list_calls(&self) -> usize {
        self.0.list_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.0.connects.load(Ordering::SeqCst)
    }

    pub fn add_mixer_session(&self, entry: MixerEntry) {
        self.0.mixer.lock().unwrap().push(entry);
    }

    pub fn master(&self) -> f32 {
        *self.0.master.lock().unwrap()
    }
}

struct FakeProvider {
    system: FakeSystem,
    behavior: ConnectBehavior,
    parked: Vec<ConnectCompleter>,
}

impl SessionProvider for FakeProvider {
    fn connect(&mut self) -> Result<Connecting> {
        self.system.0.connects.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ConnectBehavior::Immediate => Ok(Connecting::ready(Ok(Box::new(FakeManager {
                system: self.system.clone(),
            })))),
            ConnectBehavior::Fail => Ok(Connecting::ready(Err(BridgeError::ProviderUnavailable))),
            ConnectBehavior::Never => {
                let (completer, connecting) = Connecting::channel();
                self.parked.push(completer);
                Ok(connecting)
            }
        }
    }
}

struct FakeManager {
    system: FakeSystem,
}

impl SessionManager for FakeManager {
    fn sessions(&self) -> Result<Vec<Arc<dyn MediaSession>>> {
        let state = &self.system.0;
        state.list_calls.fetch_add(1, Ordering::SeqCst);
        let _gate = state.list_gate.lock().unwrap();
        Ok(state
            .sessions
            .lock()
            .unwrap()
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn MediaSession>)
            .collect())
    }

    fn focused_session(&self) -> Result<Option<Arc<dyn MediaSession>>> {
        let state = &self.system.0;
        let Some(key) = state.focused.lock().unwrap().clone() else {
            return Ok(None);
        };
        Ok(state
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.key() == key)
            .map(|s| Arc::clone(s) as Arc<dyn MediaSession>))
    }

    fn subscribe_sessions_changed(&self, handler: EventHandler) -> Result<SubscriptionToken> {
        let state = &self.system.0;
        let token = state.next_token.fetch_add(1, Ordering::SeqCst);
        state
            .sessions_changed
            .lock()
            .unwrap()
            .insert(token, Arc::new(handler));
        Ok(SubscriptionToken(token))
    }

    fn unsubscribe_sessions_changed(&self, token: SubscriptionToken) -> Result<()> {
        self.system.0.sessions_changed.lock().unwrap().remove(&token.0);
        Ok(())
    }
}

struct FakeMixer {
    system: FakeSystem,
}

impl AudioMixer for FakeMixer {
    fn sessions(&self) -> Result<Vec<Box<dyn MixerSession>>> {
        Ok(self
            .system
            .0
            .mixer
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(|entry| Box::new(entry) as Box<dyn MixerSession>)
            .collect())
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        self.system
            .0
            .mixer
            .lock()
            .unwrap()
            .iter()
            .find(|entry| entry.pid == pid)
            .map(|entry| entry.process.clone())
    }

    fn master_volume(&self) -> Result<f32> {
        Ok(self.system.master())
    }

    fn set_master_volume(&self, level: f32) -> Result<()> {
        *self.system.0.master.lock().unwrap() = level;
        Ok(())
    }
}
