//! 基于 Windows SMTC 与 WASAPI 的后台组件。

mod smtc;
mod wasapi;

pub use smtc::{SmtcManager, SmtcProvider, SmtcSession};
pub use wasapi::{WasapiMixer, WasapiSession};

use windows::Win32::System::Com::{COINIT_MULTITHREADED, CoInitializeEx, CoUninitialize};

use crate::{error::Result, provider::Backend};

/// 创建使用系统 SMTC 与默认音频输出设备的后台组件。
pub fn system_backend() -> Result<Backend> {
    Ok(Backend::new(SmtcProvider::new()?, WasapiMixer))
}

/// 当前线程的 COM 初始化状态，线程退出时自动反初始化。
struct ComApartment {
    initialized: bool,
}

impl ComApartment {
    fn enter() -> Self {
        // 线程已经以其他模式初始化时 (RPC_E_CHANGED_MODE) 直接沿用，不负责反初始化。
        let initialized = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }.is_ok();
        if !initialized {
            log::trace!("[COM] 当前线程已使用其他模式初始化 COM，沿用现有设置。");
        }
        Self { initialized }
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.initialized {
            unsafe { CoUninitialize() };
            log::trace!("[COM] 线程退出，COM 已反初始化。");
        }
    }
}

thread_local! {
    static APARTMENT: ComApartment = ComApartment::enter();
}

/// 确保当前线程已经初始化 COM。每个线程只会真正初始化一次。
pub(crate) fn ensure_com() {
    APARTMENT.with(|_| {});
}
