use std::{ffi::c_void, os::windows::ffi::OsStringExt};

use windows::{
    Win32::{
        Foundation::{CloseHandle, HANDLE, S_OK},
        Media::Audio::{
            Endpoints::IAudioEndpointVolume, IAudioSessionControl2, IAudioSessionManager2,
            IMMDevice, IMMDeviceEnumerator, ISimpleAudioVolume, MMDeviceEnumerator, eConsole,
            eRender,
        },
        System::{
            Com::{CLSCTX_ALL, CoCreateInstance, CoTaskMemFree},
            Diagnostics::ToolHelp::{
                CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW,
                TH32CS_SNAPPROCESS,
            },
        },
    },
    core::{Interface, PWSTR},
};

use crate::{
    error::{BridgeError, Result},
    provider::{AudioMixer, MixerSession},
};

use super::ensure_com;

/// 默认音频输出设备上的混音器。
#[derive(Debug, Default, Clone, Copy)]
pub struct WasapiMixer;

fn default_render_device() -> Result<IMMDevice> {
    ensure_com();
    unsafe {
        let enumerator: IMMDeviceEnumerator =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)?;
        Ok(enumerator.GetDefaultAudioEndpoint(eRender, eConsole)?)
    }
}

fn endpoint_volume() -> Result<IAudioEndpointVolume> {
    let device = default_render_device()?;
    Ok(unsafe { device.Activate(CLSCTX_ALL, None)? })
}

impl AudioMixer for WasapiMixer {
    fn sessions(&self) -> Result<Vec<Box<dyn MixerSession>>> {
        let device = default_render_device()?;
        let mut sessions: Vec<Box<dyn MixerSession>> = Vec::new();
        unsafe {
            let manager: IAudioSessionManager2 = device.Activate(CLSCTX_ALL, None)?;
            let enumerator = manager.GetSessionEnumerator()?;
            let count = enumerator.GetCount()?;
            log::trace!("[音量控制] 默认输出设备上有 {count} 个音频会话。");

            for index in 0..count {
                let control = match enumerator
                    .GetSession(index)
                    .and_then(|control| control.cast::<IAudioSessionControl2>())
                {
                    Ok(control) => control,
                    Err(e) => {
                        log::warn!("[音量控制] 读取音频会话 {index} 失败: {e:?}，已跳过。");
                        continue;
                    }
                };
                sessions.push(Box::new(WasapiSession { control }));
            }
        }
        Ok(sessions)
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        executable_name_by_pid(pid)
    }

    fn master_volume(&self) -> Result<f32> {
        Ok(unsafe { endpoint_volume()?.GetMasterVolumeLevelScalar()? })
    }

    fn set_master_volume(&self, level: f32) -> Result<()> {
        unsafe { endpoint_volume()?.SetMasterVolumeLevelScalar(level, std::ptr::null())? };
        Ok(())
    }
}

/// 一个 WASAPI 应用音频会话。
pub struct WasapiSession {
    control: IAudioSessionControl2,
}

impl MixerSession for WasapiSession {
    fn instance_id(&self) -> Result<String> {
        unsafe { take_pwstr(self.control.GetSessionInstanceIdentifier()?) }
    }

    fn session_id(&self) -> Result<String> {
        unsafe { take_pwstr(self.control.GetSessionIdentifier()?) }
    }

    fn display_name(&self) -> Result<String> {
        unsafe { take_pwstr(self.control.GetDisplayName()?) }
    }

    fn process_id(&self) -> Result<u32> {
        Ok(unsafe { self.control.GetProcessId()? })
    }

    fn is_system_sounds(&self) -> bool {
        unsafe { self.control.IsSystemSoundsSession() == S_OK }
    }

    fn volume(&self) -> Result<f32> {
        let volume: ISimpleAudioVolume = self.control.cast()?;
        Ok(unsafe { volume.GetMasterVolume()? })
    }

    fn set_volume(&self, level: f32) -> Result<()> {
        let volume: ISimpleAudioVolume = self.control.cast()?;
        unsafe { volume.SetMasterVolume(level, std::ptr::null())? };
        Ok(())
    }
}

/// 读取 COM 分配的字符串并释放其内存。
unsafe fn take_pwstr(value: PWSTR) -> Result<String> {
    if value.is_null() {
        return Ok(String::new());
    }
    let text = unsafe { value.to_string() };
    unsafe { CoTaskMemFree(Some(value.0 as *const c_void)) };
    text.map_err(|e| BridgeError::Mixer(format!("无法解码会话字符串: {e}")))
}

struct SnapshotGuard(HANDLE);

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe { CloseHandle(self.0).ok() };
        }
    }
}

/// 使用 Tool Help 快照遍历进程，按 PID 查找可执行文件名。
fn executable_name_by_pid(pid: u32) -> Option<String> {
    let snapshot = match unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) } {
        Ok(handle) if !handle.is_invalid() => SnapshotGuard(handle),
        Ok(_) => return None,
        Err(e) => {
            log::warn!("[音量控制] CreateToolhelp32Snapshot 调用失败: {e:?}");
            return None;
        }
    };

    let mut entry = PROCESSENTRY32W {
        dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    if unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_err() {
        return None;
    }
    loop {
        if entry.th32ProcessID == pid {
            let len = entry.szExeFile.iter().take_while(|&&c| c != 0).count();
            let name = std::ffi::OsString::from_wide(&entry.szExeFile[..len]);
            return name.into_string().ok();
        }
        if unsafe { Process32NextW(snapshot.0, &mut entry) }.is_err() {
            log::trace!("[音量控制] 没有找到 PID {pid} 对应的进程。");
            return None;
        }
    }
}
