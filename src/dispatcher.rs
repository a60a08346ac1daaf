use std::sync::Arc;

use crate::{
    api::{TransportCommand, VolumeAction},
    tasks::{self, Task},
    worker::WorkerShared,
};

/// 把宿主的控制请求转换成队列中的任务。
///
/// 所有方法都不会阻塞，也不会返回错误：工作线程未运行时命令被直接丢弃，
/// 执行时没有当前会话则什么也不做。可以克隆后交给其他线程使用。
#[derive(Clone)]
pub struct ControlDispatcher {
    shared: Arc<WorkerShared>,
    volume_step: f32,
}

impl ControlDispatcher {
    pub(crate) fn new(shared: Arc<WorkerShared>, volume_step: f32) -> Self {
        Self {
            shared,
            volume_step,
        }
    }

    /// 播放。
    pub fn play(&self) {
        self.transport(TransportCommand::Play);
    }

    /// 暂停。
    pub fn pause(&self) {
        self.transport(TransportCommand::Pause);
    }

    /// 在播放与暂停之间切换。
    pub fn toggle_play_pause(&self) {
        self.transport(TransportCommand::TogglePlayPause);
    }

    /// 下一首。
    pub fn next(&self) {
        self.transport(TransportCommand::SkipNext);
    }

    /// 上一首。
    pub fn previous(&self) {
        self.transport(TransportCommand::SkipPrevious);
    }

    /// 跳转到指定位置（100 纳秒为单位）。
    pub fn seek(&self, position: i64) {
        self.transport(TransportCommand::Seek(position));
    }

    /// 按配置的步长调高音量。
    pub fn volume_up(&self) {
        self.volume(VolumeAction::Adjust(self.volume_step));
    }

    /// 按配置的步长调低音量。
    pub fn volume_down(&self) {
        self.volume(VolumeAction::Adjust(-self.volume_step));
    }

    /// 设置音量，超出 0.0 - 1.0 的值会被截断。
    pub fn set_volume(&self, level: f32) {
        self.volume(VolumeAction::Set(level));
    }

    fn transport(&self, command: TransportCommand) {
        self.submit(tasks::control(command));
    }

    fn volume(&self, action: VolumeAction) {
        self.submit(tasks::volume(action));
    }

    fn submit(&self, task: Task) {
        self.shared.submit(task);
    }
}
