//! Real Linux `/dev/uinput` backend, following the raw `libc::ioctl`
//! wrapping style used for `/dev/vfio` device setup elsewhere in this
//! codebase's source corpus: numeric ioctl constants, `#[repr(C)]` request
//! structs, and explicit `-1` error checks rather than a higher-level
//! ioctl crate.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;

use crate::protocol::agent::ScreenRect;

use super::error::TabletError;
use super::TabletSink;

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_ABS: u16 = 0x03;

const BTN_LEFT: u16 = 0x110;
const BTN_RIGHT: u16 = 0x111;
const BTN_MIDDLE: u16 = 0x112;

const ABS_X: u16 = 0x00;
const ABS_Y: u16 = 0x01;

const UI_SET_EVBIT: libc::c_ulong = 0x4004_5564;
const UI_SET_KEYBIT: libc::c_ulong = 0x4004_5565;
const UI_SET_ABSBIT: libc::c_ulong = 0x4004_5567;
const UI_DEV_SETUP: libc::c_ulong = 0x4053_5501;
const UI_ABS_SETUP: libc::c_ulong = 0x401c_5503;
const UI_DEV_CREATE: libc::c_ulong = 0x5501;
const UI_DEV_DESTROY: libc::c_ulong = 0x5502;

const UINPUT_MAX_NAME_SIZE: usize = 80;
const BUS_VIRTUAL: u16 = 0x06;

#[repr(C)]
#[derive(Clone, Copy)]
struct InputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

#[repr(C)]
struct UinputSetup {
    id: InputId,
    name: [u8; UINPUT_MAX_NAME_SIZE],
    ff_effects_max: u32,
}

#[repr(C)]
struct InputAbsinfo {
    value: i32,
    minimum: i32,
    maximum: i32,
    fuzz: i32,
    flat: i32,
    resolution: i32,
}

#[repr(C)]
struct UinputAbsSetup {
    code: u16,
    _pad: u16,
    absinfo: InputAbsinfo,
}

#[repr(C)]
struct InputEvent {
    time: libc::timeval,
    kind: u16,
    code: u16,
    value: i32,
}

fn ioctl0(fd: libc::c_int, request: libc::c_ulong, name: &'static str) -> Result<(), TabletError> {
    let rc = unsafe { libc::ioctl(fd, request as _) };
    if rc < 0 {
        return Err(TabletError::Ioctl(name, std::io::Error::last_os_error()));
    }
    Ok(())
}

fn ioctl_arg<T>(fd: libc::c_int, request: libc::c_ulong, arg: &T, name: &'static str) -> Result<(), TabletError> {
    let rc = unsafe { libc::ioctl(fd, request as _, arg as *const T) };
    if rc < 0 {
        return Err(TabletError::Ioctl(name, std::io::Error::last_os_error()));
    }
    Ok(())
}

/// A real synthetic absolute pointer created through `/dev/uinput`.
pub struct UinputTablet {
    device_path: std::path::PathBuf,
    file: Option<File>,
    width: u32,
    height: u32,
}

impl UinputTablet {
    pub fn new(device_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            device_path: device_path.into(),
            file: None,
            width: 0,
            height: 0,
        }
    }

    fn create(&mut self, width: u32, height: u32) -> Result<(), TabletError> {
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.device_path)
            .map_err(TabletError::Open)?;
        let fd = file.as_raw_fd();

        ioctl0(fd, UI_SET_EVBIT, "UI_SET_EVBIT(EV_KEY)")?;
        let _ = unsafe { libc::ioctl(fd, UI_SET_EVBIT as _, EV_KEY as libc::c_ulong) };
        let _ = unsafe { libc::ioctl(fd, UI_SET_EVBIT as _, EV_ABS as libc::c_ulong) };
        for key in [BTN_LEFT, BTN_RIGHT, BTN_MIDDLE] {
            let rc = unsafe { libc::ioctl(fd, UI_SET_KEYBIT as _, key as libc::c_ulong) };
            if rc < 0 {
                return Err(TabletError::Ioctl("UI_SET_KEYBIT", std::io::Error::last_os_error()));
            }
        }
        for axis in [ABS_X, ABS_Y] {
            let rc = unsafe { libc::ioctl(fd, UI_SET_ABSBIT as _, axis as libc::c_ulong) };
            if rc < 0 {
                return Err(TabletError::Ioctl("UI_SET_ABSBIT", std::io::Error::last_os_error()));
            }
        }

        let mut name = [0u8; UINPUT_MAX_NAME_SIZE];
        let c_name = CString::new("guestrelayd tablet").expect("static name has no NUL bytes");
        let bytes = c_name.as_bytes_with_nul();
        name[..bytes.len()].copy_from_slice(bytes);

        let setup = UinputSetup {
            id: InputId {
                bustype: BUS_VIRTUAL,
                vendor: 0,
                product: 0,
                version: 1,
            },
            name,
            ff_effects_max: 0,
        };
        ioctl_arg(fd, UI_DEV_SETUP, &setup, "UI_DEV_SETUP")?;

        for (axis, max) in [(ABS_X, width), (ABS_Y, height)] {
            let abs_setup = UinputAbsSetup {
                code: axis,
                _pad: 0,
                absinfo: InputAbsinfo {
                    value: 0,
                    minimum: 0,
                    maximum: max.max(1) as i32,
                    fuzz: 0,
                    flat: 0,
                    resolution: 0,
                },
            };
            ioctl_arg(fd, UI_ABS_SETUP, &abs_setup, "UI_ABS_SETUP")?;
        }

        ioctl0(fd, UI_DEV_CREATE, "UI_DEV_CREATE")?;

        self.file = Some(file);
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn write_event(&mut self, kind: u16, code: u16, value: i32) -> Result<(), TabletError> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let event = InputEvent {
            time: libc::timeval { tv_sec: 0, tv_usec: 0 },
            kind,
            code,
            value,
        };
        let buf = unsafe {
            std::slice::from_raw_parts(
                &event as *const InputEvent as *const u8,
                std::mem::size_of::<InputEvent>(),
            )
        };
        std::io::Write::write_all(file, buf).map_err(TabletError::Write)
    }
}

impl TabletSink for UinputTablet {
    fn open_or_resize(&mut self, width: u32, height: u32, _screens: &[ScreenRect]) -> Result<(), TabletError> {
        if self.is_open() && (self.width, self.height) == (width, height) {
            return Ok(());
        }
        self.close();
        self.create(width, height)
    }

    fn send_mouse_state(&mut self, x: i32, y: i32, buttons: u32, _display_id: u32) -> Result<(), TabletError> {
        self.write_event(EV_ABS, ABS_X, x)?;
        self.write_event(EV_ABS, ABS_Y, y)?;
        for (bit, code) in [(0, BTN_LEFT), (1, BTN_MIDDLE), (2, BTN_RIGHT)] {
            self.write_event(EV_KEY, code, ((buttons >> bit) & 1) as i32)?;
        }
        self.write_event(EV_SYN, 0, 0)
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            let fd = file.as_raw_fd();
            let _ = unsafe { libc::ioctl(fd, UI_DEV_DESTROY as _) };
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}
