//! 投递给工作线程的任务。
//!
//! 任务可以在任何线程上创建，但只会在工作线程上按入队顺序执行。
//! 任务最多只捕获会话的查找键，从不持有会话本身。

use crate::{
    api::{MediaProperties, SessionEvent, SessionKey, TransportCommand, VolumeAction},
    error::Result,
    worker::MediaWorker,
};

/// 一个延迟执行的工作单元。
pub(crate) type Task = Box<dyn FnOnce(&mut MediaWorker) -> Result<()> + Send + 'static>;

/// 重新选择当前会话（会话集合变化时、以及启动时各一次）。
pub(crate) fn switch_session() -> Task {
    Box::new(|worker| worker.switch_session())
}

/// 会话事件触发后刷新对应的字段分组。
pub(crate) fn refresh(key: SessionKey, event: SessionEvent) -> Task {
    Box::new(move |worker| worker.refresh(&key, event))
}

/// 切换会话后一次性刷新全部三个字段分组。
pub(crate) fn refresh_all(key: SessionKey) -> Task {
    Box::new(move |worker| worker.refresh_all(&key))
}

/// 异步获取的媒体属性回到工作线程后再应用。
pub(crate) fn apply_media_properties(
    key: SessionKey,
    generation: u64,
    result: Result<MediaProperties>,
) -> Task {
    Box::new(move |worker| worker.apply_media_properties(&key, generation, result))
}

/// 在执行时的当前会话上发起传输控制。
pub(crate) fn control(command: TransportCommand) -> Task {
    Box::new(move |worker| worker.execute_control(command))
}

/// 在执行时的当前会话上调整音量。
pub(crate) fn volume(action: VolumeAction) -> Task {
    Box::new(move |worker| worker.adjust_volume(action))
}

/// 把宿主提交的命令限定在提交时的那一轮运行里。
///
/// 关闭与重新启动之间残留在队列里的命令在新一轮中被丢弃。
pub(crate) fn scoped(run: u64, task: Task) -> Task {
    Box::new(move |worker| {
        if worker.run_id() != run {
            log::debug!("[MediaWorker] 丢弃上一轮运行 (#{run}) 遗留的命令。");
            return Ok(());
        }
        task(worker)
    })
}
