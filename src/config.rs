use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 音量命令作用的目标。
///
/// 两种策略互斥：选择了应用音量时，找不到匹配的混音器会话就不做任何调整，
/// 不会退回去修改主输出设备的音量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VolumeTarget {
    #[default]
    /// 调整当前媒体会话对应的应用音量。
    Application,
    /// 调整默认输出设备的主音量。
    MasterOutput,
}

/// 封面读取策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoverReadPolicy {
    #[default]
    /// 每次读取都返回缓存的封面。
    Always,
    /// 一张封面只完整读取一次，之后返回 0，直到新的封面到达。
    ReadOnce,
}

/// `MediaBridge` 的配置项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// 工作线程每次等待任务队列的最长时间，同时决定关闭请求的最大响应延迟。
    pub queue_poll_interval: Duration,
    /// 连接提供者时的轮询间隔。
    pub connect_poll_interval: Duration,
    /// 连接提供者的最长等待时间，超时后进入降级模式。
    pub connect_timeout: Duration,
    /// 音量命令的作用目标。
    pub volume_target: VolumeTarget,
    /// `volume_up` / `volume_down` 每次调整的幅度。
    pub volume_step: f32,
    /// 封面读取策略。
    pub cover_read_policy: CoverReadPolicy,
    /// 允许缓存的封面图片最大字节数，超出时视为没有封面。
    pub max_cover_bytes: usize,
    /// 是否丢弃在会话切换之后才完成的属性获取结果。
    pub discard_stale_fetches: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_poll_interval: Duration::from_millis(200),
            connect_poll_interval: Duration::from_millis(10),
            connect_timeout: Duration::from_secs(5),
            volume_target: VolumeTarget::default(),
            volume_step: 0.02,
            cover_read_policy: CoverReadPolicy::default(),
            max_cover_bytes: 20_971_520, // 20 MB
            discard_stale_fetches: true,
        }
    }
}

impl BridgeConfig {
    /// 设置任务队列的等待间隔。
    pub fn with_queue_poll_interval(mut self, interval: Duration) -> Self {
        self.queue_poll_interval = interval;
        self
    }

    /// 设置连接提供者的超时时间。
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// 设置音量命令的作用目标。
    pub fn with_volume_target(mut self, target: VolumeTarget) -> Self {
        self.volume_target = target;
        self
    }

    /// 设置音量步进，负数会被取绝对值。
    pub fn with_volume_step(mut self, step: f32) -> Self {
        self.volume_step = step.abs();
        self
    }

    /// 设置封面读取策略。
    pub fn with_cover_read_policy(mut self, policy: CoverReadPolicy) -> Self {
        self.cover_read_policy = policy;
        self
    }

    /// 设置封面大小上限。
    pub fn with_max_cover_bytes(mut self, max: usize) -> Self {
        self.max_cover_bytes = max;
        self
    }

    /// 设置是否丢弃过期的属性获取结果。
    pub fn with_discard_stale_fetches(mut self, discard: bool) -> Self {
        self.discard_stale_fetches = discard;
        self
    }
}
