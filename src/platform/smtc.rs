use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::runtime::{Builder as RuntimeBuilder, Runtime};
use windows::{
    Foundation::TypedEventHandler,
    Media::Control::{
        GlobalSystemMediaTransportControlsSession as WinSession,
        GlobalSystemMediaTransportControlsSessionManager as WinSessionManager,
        GlobalSystemMediaTransportControlsSessionMediaProperties as WinMediaProperties,
        GlobalSystemMediaTransportControlsSessionPlaybackStatus as WinPlaybackStatus,
    },
    Storage::Streams::{Buffer, DataReader, IRandomAccessStreamReference, InputStreamOptions},
    core::{IUnknown, Interface},
};
use windows_future::{IAsyncInfo, IAsyncOperation};

use crate::{
    api::{
        MediaProperties, PlaybackInfo, PlaybackStatus, SessionEvent, SessionKey,
        SubscriptionToken, TimelineProperties, TransportCommand,
    },
    error::{BridgeError, Result},
    provider::{
        Completion, ConnectCompleter, Connecting, EventHandler, MediaSession, SessionManager,
        SessionProvider,
    },
};

use super::ensure_com;

/// 获取媒体属性（含封面）的最长等待时间。
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// 通过 `GlobalSystemMediaTransportControlsSessionManager` 连接系统媒体控件。
pub struct SmtcProvider {
    runtime: Arc<Runtime>,
}

impl SmtcProvider {
    /// 创建提供者以及用于异步获取的后台运行时。
    pub fn new() -> Result<Self> {
        let runtime = RuntimeBuilder::new_multi_thread()
            .worker_threads(1)
            .thread_name("smtc_bridge_fetch")
            .on_thread_start(ensure_com)
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Provider(format!("无法创建异步运行时: {e}")))?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

impl SessionProvider for SmtcProvider {
    fn connect(&mut self) -> Result<Connecting> {
        ensure_com();
        log::debug!("[SMTC] 正在请求 SMTC 管理器...");
        let operation = WinSessionManager::RequestAsync()?;
        let (completer, connecting) = Connecting::channel();
        let runtime = Arc::clone(&self.runtime);
        self.runtime
            .spawn_blocking(move || complete_connect(operation, completer, runtime));
        Ok(connecting)
    }
}

fn complete_connect(
    operation: IAsyncOperation<WinSessionManager>,
    completer: ConnectCompleter,
    runtime: Arc<Runtime>,
) {
    let result = operation
        .get()
        .map(|manager| Box::new(SmtcManager::new(manager, runtime)) as Box<dyn SessionManager>)
        .map_err(BridgeError::from);
    completer.complete(result);
}

/// 已连接的 SMTC 管理器。
pub struct SmtcManager {
    manager: WinSessionManager,
    runtime: Arc<Runtime>,
    instances: Mutex<InstanceRegistry>,
}

impl SmtcManager {
    fn new(manager: WinSessionManager, runtime: Arc<Runtime>) -> Self {
        Self {
            manager,
            runtime,
            instances: Mutex::new(InstanceRegistry::default()),
        }
    }

    /// 列出系统会话并为每个会话对象分配实例编号。
    fn list(&self) -> Result<Vec<(usize, Arc<SmtcSession>)>> {
        let list = self.manager.GetSessions()?;
        let mut listed = Vec::with_capacity(list.Size()? as usize);
        for index in 0..list.Size()? {
            match list.GetAt(index).map_err(BridgeError::from).and_then(|session| {
                let identity = com_identity(&session)?;
                let app_id = session.SourceAppUserModelId()?.to_string_lossy();
                Ok((identity, app_id, session))
            }) {
                Ok(entry) => listed.push(entry),
                Err(e) => log::warn!("[SMTC] 读取第 {index} 个会话失败，已跳过: {e}"),
            }
        }

        let instances = self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .assign(listed.iter().map(|(identity, app_id, _)| (*identity, app_id.as_str())));

        Ok(listed
            .into_iter()
            .zip(instances)
            .map(|((identity, app_id, session), instance)| {
                let key = SessionKey::new(app_id, instance);
                let session = SmtcSession {
                    session,
                    key,
                    runtime: Arc::clone(&self.runtime),
                };
                (identity, Arc::new(session))
            })
            .collect())
    }
}

impl SessionManager for SmtcManager {
    fn sessions(&self) -> Result<Vec<Arc<dyn MediaSession>>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|(_, session)| session as Arc<dyn MediaSession>)
            .collect())
    }

    /// 系统报告的当前会话，解析为列表中同一个会话对象，使其带有相同的键。
    fn focused_session(&self) -> Result<Option<Arc<dyn MediaSession>>> {
        let focused = match self.manager.GetCurrentSession() {
            Ok(session) => session,
            Err(e) => {
                log::trace!("[SMTC] 系统没有报告当前会话: {e}");
                return Ok(None);
            }
        };
        let identity = com_identity(&focused)?;
        let app_id = focused.SourceAppUserModelId()?.to_string_lossy();

        let listed = self.list()?;
        let found = listed
            .iter()
            .position(|(candidate, _)| *candidate == identity)
            .or_else(|| {
                listed
                    .iter()
                    .position(|(_, session)| session.key.app_id() == app_id)
            });
        Ok(found.map(|index| Arc::clone(&listed[index].1) as Arc<dyn MediaSession>))
    }

    fn subscribe_sessions_changed(&self, handler: EventHandler) -> Result<SubscriptionToken> {
        let token = self
            .manager
            .SessionsChanged(&TypedEventHandler::new(move |_, _| {
                handler();
                Ok(())
            }))?;
        Ok(SubscriptionToken(token))
    }

    fn unsubscribe_sessions_changed(&self, token: SubscriptionToken) -> Result<()> {
        self.manager.RemoveSessionsChanged(token.0)?;
        Ok(())
    }
}

/// 会话对象的 COM 身份，即其 `IUnknown` 指针。
fn com_identity(session: &WinSession) -> Result<usize> {
    Ok(session.cast::<IUnknown>()?.as_raw() as usize)
}

/// 为系统会话对象分配实例编号。
///
/// 只记住最近一次列表中的会话，不持有会话对象本身。
/// 先按 COM 身份匹配上一次的条目；身份对不上时，退回到同一 AUMID 下按出现顺序匹配。
#[derive(Debug, Default)]
struct InstanceRegistry {
    entries: Vec<InstanceEntry>,
    next: u64,
}

#[derive(Debug)]
struct InstanceEntry {
    identity: usize,
    app_id: String,
    instance: u64,
}

impl InstanceRegistry {
    fn assign<'a>(&mut self, listed: impl Iterator<Item = (usize, &'a str)>) -> Vec<u64> {
        let listed: Vec<_> = listed.collect();
        let mut previous = std::mem::take(&mut self.entries);

        let mut assigned: Vec<Option<u64>> = listed
            .iter()
            .map(|(identity, app_id)| {
                previous
                    .iter()
                    .position(|e| e.identity == *identity && e.app_id == *app_id)
                    .map(|index| previous.remove(index).instance)
            })
            .collect();

        for (slot, (_, app_id)) in assigned.iter_mut().zip(&listed) {
            if slot.is_none()
                && let Some(index) = previous.iter().position(|e| e.app_id == *app_id)
            {
                *slot = Some(previous.remove(index).instance);
            }
        }

        let mut instances = Vec::with_capacity(listed.len());
        for (slot, (identity, app_id)) in assigned.into_iter().zip(listed) {
            let instance = slot.unwrap_or_else(|| {
                self.next += 1;
                self.next
            });
            self.entries.push(InstanceEntry {
                identity,
                app_id: app_id.to_string(),
                instance,
            });
            instances.push(instance);
        }
        instances
    }
}

/// 一个 SMTC 媒体会话。查找键由 AUMID 和实例编号组成。
pub struct SmtcSession {
    session: WinSession,
    key: SessionKey,
    runtime: Arc<Runtime>,
}

impl MediaSession for SmtcSession {
    fn key(&self) -> SessionKey {
        self.key.clone()
    }

    fn source_app_id(&self) -> Result<String> {
        Ok(self.key.app_id().to_string())
    }

    fn playback_info(&self) -> Result<PlaybackInfo> {
        let status = match self.session.GetPlaybackInfo()?.PlaybackStatus()? {
            WinPlaybackStatus::Closed => PlaybackStatus::Closed,
            WinPlaybackStatus::Opened => PlaybackStatus::Opened,
            WinPlaybackStatus::Changing => PlaybackStatus::Changing,
            WinPlaybackStatus::Playing => PlaybackStatus::Playing,
            WinPlaybackStatus::Paused => PlaybackStatus::Paused,
            _ => PlaybackStatus::Stopped,
        };
        Ok(PlaybackInfo { status })
    }

    fn timeline(&self) -> Result<TimelineProperties> {
        let timeline = self.session.GetTimelineProperties()?;
        Ok(TimelineProperties {
            position: timeline.Position()?.Duration,
            end_time: timeline.EndTime()?.Duration,
        })
    }

    fn fetch_media_properties(&self, done: Completion<MediaProperties>) {
        let operation = match self.session.TryGetMediaPropertiesAsync() {
            Ok(operation) => operation,
            Err(e) => {
                done(Err(e.into()));
                return;
            }
        };

        self.runtime.spawn(async move {
            let pending = operation.clone();
            let fetch = tokio::task::spawn_blocking(move || read_media_properties(&operation));
            let result = match tokio::time::timeout(FETCH_TIMEOUT, fetch).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(BridgeError::Provider(format!("获取任务异常结束: {e}"))),
                Err(_) => {
                    log::warn!("[SMTC] 获取媒体属性超时 (>{FETCH_TIMEOUT:?})。");
                    if let Ok(info) = pending.cast::<IAsyncInfo>()
                        && let Err(e) = info.Cancel()
                    {
                        log::warn!("[SMTC] 取消 WinRT 异步操作失败: {e:?}");
                    }
                    Err(BridgeError::Timeout)
                }
            };
            done(result);
        });
    }

    fn subscribe(&self, event: SessionEvent, handler: EventHandler) -> Result<SubscriptionToken> {
        let token = match event {
            SessionEvent::MediaProperties => {
                self.session
                    .MediaPropertiesChanged(&TypedEventHandler::new(move |_, _| {
                        handler();
                        Ok(())
                    }))?
            }
            SessionEvent::Timeline => {
                self.session
                    .TimelinePropertiesChanged(&TypedEventHandler::new(move |_, _| {
                        handler();
                        Ok(())
                    }))?
            }
            SessionEvent::PlaybackInfo => {
                self.session
                    .PlaybackInfoChanged(&TypedEventHandler::new(move |_, _| {
                        handler();
                        Ok(())
                    }))?
            }
        };
        Ok(SubscriptionToken(token))
    }

    fn unsubscribe(&self, event: SessionEvent, token: SubscriptionToken) -> Result<()> {
        match event {
            SessionEvent::MediaProperties => self.session.RemoveMediaPropertiesChanged(token.0)?,
            SessionEvent::Timeline => self.session.RemoveTimelinePropertiesChanged(token.0)?,
            SessionEvent::PlaybackInfo => self.session.RemovePlaybackInfoChanged(token.0)?,
        }
        Ok(())
    }

    fn control(&self, command: TransportCommand) -> Result<()> {
        // 只发起请求，不等待应用的处理结果。
        let _operation = match command {
            TransportCommand::Play => self.session.TryPlayAsync()?,
            TransportCommand::Pause => self.session.TryPauseAsync()?,
            TransportCommand::TogglePlayPause => self.session.TryTogglePlayPauseAsync()?,
            TransportCommand::SkipNext => self.session.TrySkipNextAsync()?,
            TransportCommand::SkipPrevious => self.session.TrySkipPreviousAsync()?,
            TransportCommand::Seek(position) => {
                self.session.TryChangePlaybackPositionAsync(position)?
            }
        };
        Ok(())
    }
}

fn read_media_properties(
    operation: &IAsyncOperation<WinMediaProperties>,
) -> Result<MediaProperties> {
    let props = operation.get()?;
    let title = props.Title()?.to_string_lossy();
    let artist = props.Artist()?.to_string_lossy();
    let cover = match props.Thumbnail() {
        Ok(thumbnail) => read_thumbnail(&thumbnail)?,
        Err(_) => None,
    };
    Ok(MediaProperties {
        title,
        artist,
        cover,
    })
}

fn read_thumbnail(thumbnail: &IRandomAccessStreamReference) -> Result<Option<Vec<u8>>> {
    let stream = thumbnail.OpenReadAsync()?.get()?;
    let size = stream.Size()?;
    if size == 0 {
        log::debug!("[SMTC] 封面流为空。");
        return Ok(None);
    }
    let size = u32::try_from(size)
        .map_err(|_| BridgeError::Provider(format!("封面数据过大: {size} 字节")))?;

    let buffer = Buffer::Create(size)?;
    let filled = stream
        .ReadAsync(&buffer, size, InputStreamOptions::None)?
        .get()?;
    let reader = DataReader::FromBuffer(&filled)?;
    let mut bytes = vec![0u8; filled.Length()? as usize];
    reader.ReadBytes(&mut bytes)?;
    log::trace!("[SMTC] 读取到 {} 字节的封面数据。", bytes.len());
    Ok(Some(bytes))
}
