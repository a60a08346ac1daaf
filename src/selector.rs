use crate::api::PlaybackStatus;

/// 在活动会话中选择要跟踪的“当前”会话。
///
/// 按提供者给出的顺序取第一个正在播放的会话；没有则退回到提供者的焦点会话；
/// 焦点会话也不存在时不选择任何会话。焦点会话只在需要时才查询。
pub fn select_session<T: Clone>(
    candidates: &[(T, PlaybackStatus)],
    focused: impl FnOnce() -> Option<T>,
) -> Option<T> {
    candidates
        .iter()
        .find(|(_, status)| *status == PlaybackStatus::Playing)
        .map(|(session, _)| session.clone())
        .or_else(focused)
}
