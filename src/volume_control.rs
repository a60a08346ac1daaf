//! 将当前媒体会话映射到混音器中的应用音频会话，并调整其音量。

use crate::{
    api::VolumeAction,
    error::Result,
    provider::{AudioMixer, MixerSession},
    utils::{self, PackagedAppId},
};

/// 匹配命中的规则，按优先级从高到低排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRule {
    /// 会话实例标识符包含关键字。
    InstanceId,
    /// 会话标识符包含关键字。
    SessionId,
    /// 显示名称（含空格或去掉空格）包含关键字。
    DisplayName,
    /// 进程可执行文件名与关键字互相包含。
    ProcessName,
}

impl MatchRule {
    const PRECEDENCE: [MatchRule; 4] = [
        MatchRule::InstanceId,
        MatchRule::SessionId,
        MatchRule::DisplayName,
        MatchRule::ProcessName,
    ];
}

/// 一次音量调整的结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeOutcome {
    /// 已应用，附带新的音量。
    Applied {
        /// 调整后的音量 (0.0 - 1.0)。
        volume: f32,
    },
    /// 没有找到匹配的混音器会话，什么也没做。
    NoMatch,
}

/// 从会话的应用身份推导一组小写的匹配关键字。
///
/// ## 推导规则
/// 1.  完整的身份字符串。
/// 2.  对于打包应用 (`<package>_<suffix>!<entry>`)：包名、包名的最后一段、
///     去掉已知后缀后的最后一段，以及发布者前缀。
/// 3.  否则视为文件路径：可执行文件名，以及去掉扩展名后的名称。
pub fn match_keywords(app_id: &str) -> Vec<String> {
    let id = app_id.trim().to_lowercase();
    if id.is_empty() {
        return Vec::new();
    }

    let mut keywords = vec![id.clone()];
    if let Some(packaged) = PackagedAppId::parse(&id) {
        let app_name = packaged.app_name();
        keywords.push(packaged.package.to_string());
        keywords.push(app_name.to_string());
        if let Some(stripped) = utils::strip_known_suffix(app_name) {
            keywords.push(stripped.to_string());
        }
        if let Some(publisher) = packaged.publisher() {
            keywords.push(publisher.to_string());
        }
    } else {
        let file = utils::file_name(&id);
        keywords.push(file.to_string());
        if let Some(stem) = utils::file_stem(file) {
            keywords.push(stem.to_string());
        }
    }

    let mut unique = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        if !keyword.is_empty() && !unique.contains(&keyword) {
            unique.push(keyword);
        }
    }
    unique
}

/// 参与匹配的混音器会话及其预先读取的小写属性。
struct Candidate {
    session: Box<dyn MixerSession>,
    instance_id: String,
    session_id: String,
    display_name: String,
    process_name: Option<String>,
}

impl Candidate {
    fn matches(&self, rule: MatchRule, keywords: &[String]) -> bool {
        match rule {
            MatchRule::InstanceId => contains_any(&self.instance_id, keywords),
            MatchRule::SessionId => contains_any(&self.session_id, keywords),
            MatchRule::DisplayName => {
                if self.display_name.is_empty() {
                    return false;
                }
                let compact: String = self.display_name.split_whitespace().collect();
                contains_any(&self.display_name, keywords) || contains_any(&compact, keywords)
            }
            MatchRule::ProcessName => {
                let Some(exe) = self.process_name.as_deref().filter(|s| !s.is_empty()) else {
                    return false;
                };
                // 反向匹配时也尝试不带扩展名的进程名，过短的名称不参与以免误配。
                let stem = utils::file_stem(exe).filter(|stem| stem.len() >= 3);
                keywords.iter().any(|keyword| {
                    exe.contains(keyword.as_str())
                        || keyword.contains(exe)
                        || stem.is_some_and(|stem| keyword.contains(stem))
                })
            }
        }
    }
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    !haystack.is_empty() && keywords.iter().any(|k| haystack.contains(k.as_str()))
}

/// 在混音器中为媒体会话寻找对应的应用音频会话并调整音量。
pub struct VolumeResolver<'a> {
    mixer: &'a dyn AudioMixer,
}

impl<'a> VolumeResolver<'a> {
    /// 基于给定的混音器创建解析器。
    pub fn new(mixer: &'a dyn AudioMixer) -> Self {
        Self { mixer }
    }

    /// 查找与关键字匹配的混音器会话。
    ///
    /// 按枚举顺序逐个检查会话（系统声音会话总是被跳过），每个会话依次尝试
    /// 各条规则，第一个命中任意规则的会话胜出。
    pub fn find_session(
        &self,
        keywords: &[String],
    ) -> Result<Option<(Box<dyn MixerSession>, MatchRule)>> {
        if keywords.is_empty() {
            return Ok(None);
        }

        let sessions = self.mixer.sessions()?;
        log::trace!("[音量控制] 混音器中的音频会话数: {}", sessions.len());

        for session in sessions {
            if session.is_system_sounds() {
                continue;
            }
            let candidate = self.candidate(session);
            if let Some(rule) = MatchRule::PRECEDENCE
                .into_iter()
                .find(|rule| candidate.matches(*rule, keywords))
            {
                return Ok(Some((candidate.session, rule)));
            }
        }
        Ok(None)
    }

    fn candidate(&self, session: Box<dyn MixerSession>) -> Candidate {
        let process_name = session
            .process_id()
            .ok()
            .filter(|pid| *pid != 0)
            .and_then(|pid| self.mixer.process_name(pid))
            .map(|name| name.to_lowercase());
        Candidate {
            instance_id: session.instance_id().unwrap_or_default().to_lowercase(),
            session_id: session.session_id().unwrap_or_default().to_lowercase(),
            display_name: session.display_name().unwrap_or_default().to_lowercase(),
            process_name,
            session,
        }
    }

    /// 调整与应用身份 `app_id` 匹配的应用音量。
    ///
    /// 没有匹配的会话时返回 `NoMatch`，不会改动主输出设备。
    pub fn apply_to_application(&self, app_id: &str, action: VolumeAction) -> Result<VolumeOutcome> {
        let keywords = match_keywords(app_id);
        log::debug!("[音量控制] 应用 '{app_id}' 的匹配关键字: {keywords:?}");

        let Some((session, rule)) = self.find_session(&keywords)? else {
            log::info!("[音量控制] 没有找到与 '{app_id}' 匹配的音频会话，未做任何调整。");
            return Ok(VolumeOutcome::NoMatch);
        };

        let current = session.volume()?;
        let volume = action.resolve(current);
        session.set_volume(volume)?;
        log::debug!("[音量控制] 通过 {rule:?} 匹配到会话，音量 {current:.2} -> {volume:.2}");
        Ok(VolumeOutcome::Applied { volume })
    }

    /// 调整默认输出设备的主音量。
    pub fn apply_to_master(&self, action: VolumeAction) -> Result<VolumeOutcome> {
        let current = self.mixer.master_volume()?;
        let volume = action.resolve(current);
        self.mixer.set_master_volume(volume)?;
        log::debug!("[音量控制] 主音量 {current:.2} -> {volume:.2}");
        Ok(VolumeOutcome::Applied { volume })
    }
}
