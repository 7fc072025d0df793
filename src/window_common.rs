/*
 * Win32 implementation of `NativeSystem`.
 *
 * Every custom class shares one window procedure, `custom_class_wnd_proc`.
 * On `WM_NCCREATE` it runs the pre-creation hook so the handle is attached to
 * its wrapper before any message it cares about arrives; afterwards each
 * message is decoded into a `Message`, dispatched through
 * `custom_window::deliver` (which never unwinds), and anything left at
 * `Reply::Default` goes to `DefWindowProcW`.
 *
 * Window classes are process-wide on Win32, so the name-to-atom map is too.
 */
use crate::custom_window;
use crate::error::{PlatformError, Result as PlatformResult};
use crate::geometry::{AcceleratorHandle, ClassToken, Dimension, Point, Rect, WindowHandle};
use crate::message::{
    Fetched, Message, NotifyHeader, QueuedMessage, RawMessage, Reply, ScrollBar, SizingEdge,
};
use crate::native::{CreateParams, NativeSystem, ScrollInfo, WindowStyle};

use windows::{
    Win32::{
        Foundation::{
            ERROR_CLASS_ALREADY_EXISTS, GetLastError, HINSTANCE, HWND, LPARAM, LRESULT, POINT,
            RECT, WPARAM,
        },
        Graphics::Gdi::*,
        System::LibraryLoader::GetModuleHandleW,
        UI::Controls::*, // Scrollbar setters and NMHDR live here.
        UI::WindowsAndMessaging::*, // This list is massive, just import all of them.
    },
    core::{HSTRING, PCWSTR},
};

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::{Mutex, OnceLock};

fn class_atoms() -> &'static Mutex<HashMap<String, ClassToken>> {
    static ATOMS: OnceLock<Mutex<HashMap<String, ClassToken>>> = OnceLock::new();
    ATOMS.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) struct Win32System {
    instance: HINSTANCE,
}

impl Win32System {
    pub(crate) fn new() -> Self {
        let instance = unsafe { GetModuleHandleW(None) }
            .map(HINSTANCE::from)
            .unwrap_or_default();
        Self { instance }
    }
}

const fn scroll_bar_constant(bar: ScrollBar) -> SCROLLBAR_CONSTANTS {
    match bar {
        ScrollBar::Horizontal => SB_HORZ,
        ScrollBar::Vertical => SB_VERT,
    }
}

fn hwnd(handle: WindowHandle) -> HWND {
    HWND::from(handle)
}

fn to_native_msg(message: &QueuedMessage) -> MSG {
    MSG {
        hwnd: message.target.map(HWND::from).unwrap_or_default(),
        message: message.raw.msg,
        wParam: WPARAM(message.raw.wparam),
        lParam: LPARAM(message.raw.lparam),
        time: message.time,
        pt: message.point.into(),
        ..Default::default()
    }
}

fn from_native_msg(msg: &MSG) -> QueuedMessage {
    QueuedMessage {
        target: WindowHandle::from_hwnd(msg.hwnd),
        raw: RawMessage::new(msg.message, msg.wParam.0, msg.lParam.0),
        time: msg.time,
        point: msg.pt.into(),
    }
}

fn read_notify_header(address: isize) -> Option<NotifyHeader> {
    if address == 0 {
        return None;
    }
    // WM_NOTIFY guarantees lParam points at an NMHDR for the duration of the call.
    let header = unsafe { &*(address as *const NMHDR) };
    Some(NotifyHeader {
        source: WindowHandle::from_hwnd(header.hwndFrom)?,
        id: header.idFrom,
        code: header.code,
        payload: address,
    })
}

// `WM_SIZING` lParam points at the proposed window RECT, writable by the handler.
fn decode_sizing(wparam: usize, lparam: isize) -> Option<Message> {
    if lparam == 0 {
        return None;
    }
    let edge = SizingEdge::from_code(wparam)?;
    let rect = unsafe { *(lparam as *const RECT) };
    Some(Message::Sizing {
        edge,
        rect: rect.into(),
    })
}

// Reads a UTF-16 string through injected length/getter calls.
fn read_text_with<FLen, FGet>(get_len: FLen, get_text: FGet) -> PlatformResult<String>
where
    FLen: Fn() -> i32,
    FGet: Fn(&mut [u16]) -> i32,
{
    let len = get_len();
    if len < 0 {
        return Err(PlatformError::OperationFailed(
            "text length query returned a negative length".into(),
        ));
    }

    let mut buffer = vec![0u16; len as usize + 1];
    let copied = get_text(&mut buffer);
    if copied < 0 {
        return Err(PlatformError::OperationFailed(
            "text query returned a negative length".into(),
        ));
    }

    buffer.truncate(copied as usize);
    Ok(String::from_utf16_lossy(&buffer))
}

// Class names are limited to 256 characters.
const MAX_CLASS_NAME: i32 = 256;

fn class_name_of(window: HWND) -> PlatformResult<String> {
    read_text_with(
        || MAX_CLASS_NAME,
        |buf| unsafe { GetClassNameW(window, buf) },
    )
}

/*
 * Shared window procedure of every class registered through this backend.
 * Runs the creation hook on `WM_NCCREATE`, then routes every message to the
 * owner of the handle and falls back to `DefWindowProcW`.
 */
unsafe extern "system" fn custom_class_wnd_proc(
    window: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let Some(handle) = WindowHandle::from_hwnd(window) else {
        return unsafe { DefWindowProcW(window, msg, wparam, lparam) };
    };

    if msg == WM_NCCREATE {
        match class_name_of(window) {
            Ok(class_name) => custom_window::attach_on_create(handle, &class_name),
            Err(e) => log::error!("Platform: cannot read class of new window {handle:?}: {e}"),
        }
        return unsafe { DefWindowProcW(window, msg, wparam, lparam) };
    }

    let raw = RawMessage::new(msg, wparam.0, lparam.0);
    let message = match msg {
        WM_SIZING => decode_sizing(wparam.0, lparam.0).unwrap_or(Message::Other(raw)),
        _ => Message::decode(raw, read_notify_header),
    };
    match custom_window::deliver(handle, &message) {
        Reply::Handled(result) => LRESULT(result),
        Reply::Resized(rect) if msg == WM_SIZING && lparam.0 != 0 => {
            unsafe { *(lparam.0 as *mut RECT) = RECT::from(rect) };
            LRESULT(1)
        }
        Reply::Resized(_) | Reply::Default => unsafe {
            DefWindowProcW(window, msg, wparam, lparam)
        },
    }
}

impl NativeSystem for Win32System {
    fn register_class(&self, name: &str) -> PlatformResult<ClassToken> {
        let mut atoms = class_atoms()
            .lock()
            .map_err(|_| PlatformError::OperationFailed("class atom table poisoned".into()))?;
        if let Some(token) = atoms.get(name) {
            log::debug!("Platform: Window class '{name}' already registered.");
            return Ok(*token);
        }

        let class_name = HSTRING::from(name);
        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(custom_class_wnd_proc),
            cbClsExtra: 0,
            cbWndExtra: 0,
            hInstance: self.instance,
            hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }?,
            hbrBackground: HBRUSH((COLOR_WINDOW.0 + 1) as *mut c_void),
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };

        let atom = unsafe { RegisterClassExW(&wc) };
        if atom == 0 {
            let error = unsafe { GetLastError() };
            log::error!("Platform: RegisterClassExW('{name}') failed: {error:?}");
            let reason = if error == ERROR_CLASS_ALREADY_EXISTS {
                "class name is already taken by another module".to_string()
            } else {
                format!("RegisterClassExW failed: {error:?}")
            };
            return Err(PlatformError::ClassRegistrationFailed(format!(
                "'{name}': {reason}"
            )));
        }

        let token = ClassToken(u32::from(atom));
        atoms.insert(name.to_string(), token);
        log::debug!("Platform: Window class '{name}' registered successfully.");
        Ok(token)
    }

    fn create_window(
        &self,
        class_name: &str,
        params: &CreateParams,
    ) -> PlatformResult<WindowHandle> {
        let (x, y, w, h) = match (params.rect, params.parent) {
            (Some(r), _) => (r.position.x, r.position.y, r.size.w, r.size.h),
            (None, Some(_)) => (0, 0, 0, 0),
            (None, None) => (CW_USEDEFAULT, CW_USEDEFAULT, CW_USEDEFAULT, CW_USEDEFAULT),
        };

        let created = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(params.ex_style),
                &HSTRING::from(class_name),
                &HSTRING::from(params.text.as_str()),
                WINDOW_STYLE(params.style.bits()),
                x,
                y,
                w,
                h,
                params.parent.map(HWND::from),
                None,
                Some(self.instance),
                None,
            )
        };
        let window = created.map_err(|e| {
            log::error!("Platform: CreateWindowExW('{class_name}') failed: {e:?}");
            PlatformError::WindowCreationFailed(format!("'{class_name}': {e}"))
        })?;
        WindowHandle::from_hwnd(window).ok_or_else(|| {
            PlatformError::WindowCreationFailed(format!("'{class_name}': null window handle"))
        })
    }

    fn destroy_window(&self, handle: WindowHandle) -> PlatformResult<()> {
        unsafe { DestroyWindow(hwnd(handle)) }.map_err(|e| {
            PlatformError::InvalidHandle(format!("DestroyWindow({handle:?}) failed: {e}"))
        })
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        unsafe { IsWindow(Some(hwnd(handle))) }.as_bool()
    }

    fn parent(&self, handle: WindowHandle) -> Option<WindowHandle> {
        unsafe { GetParent(hwnd(handle)) }
            .ok()
            .and_then(WindowHandle::from_hwnd)
    }

    fn children(&self, handle: WindowHandle) -> Vec<WindowHandle> {
        let mut children = Vec::new();
        let mut cursor = unsafe { GetWindow(hwnd(handle), GW_CHILD) }.ok();
        while let Some(child) = cursor.and_then(WindowHandle::from_hwnd) {
            children.push(child);
            cursor = unsafe { GetWindow(hwnd(child), GW_HWNDNEXT) }.ok();
        }
        children
    }

    fn window_rect(&self, handle: WindowHandle) -> Rect {
        let mut rect = RECT::default();
        if let Err(e) = unsafe { GetWindowRect(hwnd(handle), &mut rect) } {
            log::warn!("Platform: GetWindowRect({handle:?}) failed: {e:?}");
        }
        rect.into()
    }

    fn client_size(&self, handle: WindowHandle) -> Dimension {
        let mut rect = RECT::default();
        if let Err(e) = unsafe { GetClientRect(hwnd(handle), &mut rect) } {
            log::warn!("Platform: GetClientRect({handle:?}) failed: {e:?}");
        }
        rect.into()
    }

    fn screen_to_client(&self, handle: WindowHandle, point: Point) -> Point {
        let mut native = POINT::from(point);
        if !unsafe { ScreenToClient(hwnd(handle), &mut native) }.as_bool() {
            log::warn!("Platform: ScreenToClient({handle:?}) failed");
        }
        native.into()
    }

    fn move_window(&self, handle: WindowHandle, position: Option<Point>, size: Option<Dimension>) {
        let mut flags = SWP_NOZORDER | SWP_NOACTIVATE;
        if position.is_none() {
            flags |= SWP_NOMOVE;
        }
        if size.is_none() {
            flags |= SWP_NOSIZE;
        }
        let position = position.unwrap_or_default();
        let size = size.unwrap_or_default();
        if let Err(e) = unsafe {
            SetWindowPos(
                hwnd(handle),
                None,
                position.x,
                position.y,
                size.w,
                size.h,
                flags,
            )
        } {
            log::warn!("Platform: SetWindowPos({handle:?}) failed: {e:?}");
        }
    }

    fn outer_size_for_client(&self, handle: WindowHandle, client: Dimension) -> Dimension {
        let style = self.style(handle) - WindowStyle::HSCROLL - WindowStyle::VSCROLL;
        let has_menu =
            !style.contains(WindowStyle::CHILD) && !unsafe { GetMenu(hwnd(handle)) }.is_invalid();
        let mut rect = RECT::from(client);
        if let Err(e) = unsafe {
            AdjustWindowRectEx(
                &mut rect,
                WINDOW_STYLE(style.bits()),
                has_menu,
                WINDOW_EX_STYLE(self.ex_style(handle)),
            )
        } {
            log::warn!("Platform: AdjustWindowRectEx({handle:?}) failed: {e:?}");
        }
        rect.into()
    }

    fn style(&self, handle: WindowHandle) -> WindowStyle {
        let bits = unsafe { GetWindowLongW(hwnd(handle), GWL_STYLE) } as u32;
        WindowStyle::from_bits_retain(bits)
    }

    fn ex_style(&self, handle: WindowHandle) -> u32 {
        unsafe { GetWindowLongW(hwnd(handle), GWL_EXSTYLE) as u32 }
    }

    fn class_name(&self, handle: WindowHandle) -> String {
        class_name_of(hwnd(handle)).unwrap_or_else(|e| {
            log::warn!("Platform: GetClassNameW({handle:?}) failed: {e}");
            String::new()
        })
    }

    fn text(&self, handle: WindowHandle) -> String {
        let window = hwnd(handle);
        read_text_with(
            || unsafe { GetWindowTextLengthW(window) },
            |buf| unsafe { GetWindowTextW(window, buf) },
        )
        .unwrap_or_else(|e| {
            log::warn!("Platform: reading text of {handle:?} failed: {e}");
            String::new()
        })
    }

    fn set_text(&self, handle: WindowHandle, text: &str) {
        if let Err(e) = unsafe { SetWindowTextW(hwnd(handle), &HSTRING::from(text)) } {
            log::warn!("Platform: SetWindowTextW({handle:?}) failed: {e:?}");
        }
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        unsafe { IsWindowVisible(hwnd(handle)) }.as_bool()
    }

    fn set_visible(&self, handle: WindowHandle, visible: bool) {
        let command = if visible { SW_SHOW } else { SW_HIDE };
        let _ = unsafe { ShowWindow(hwnd(handle), command) };
    }

    fn send_message(&self, handle: WindowHandle, message: &Message) -> isize {
        let raw = message.encode();
        unsafe {
            SendMessageW(
                hwnd(handle),
                raw.msg,
                Some(WPARAM(raw.wparam)),
                Some(LPARAM(raw.lparam)),
            )
        }
        .0
    }

    fn scroll_bar_metrics(&self) -> Dimension {
        unsafe { Dimension::new(GetSystemMetrics(SM_CXVSCROLL), GetSystemMetrics(SM_CYHSCROLL)) }
    }

    fn show_scroll_bar(&self, handle: WindowHandle, bar: ScrollBar, show: bool) {
        if let Err(e) = unsafe { ShowScrollBar(hwnd(handle), scroll_bar_constant(bar), show) } {
            log::warn!("Platform: ShowScrollBar({handle:?}, {bar:?}) failed: {e:?}");
        }
    }

    fn scroll_info(&self, handle: WindowHandle, bar: ScrollBar) -> ScrollInfo {
        let mut scroll_info = SCROLLINFO {
            cbSize: std::mem::size_of::<SCROLLINFO>() as u32,
            fMask: SIF_RANGE | SIF_PAGE | SIF_POS | SIF_TRACKPOS,
            ..Default::default()
        };
        if let Err(err) =
            unsafe { GetScrollInfo(hwnd(handle), scroll_bar_constant(bar), &mut scroll_info) }
        {
            log::trace!("Platform: GetScrollInfo unavailable for {bar:?} on {handle:?}: {err:?}");
            return ScrollInfo::default();
        }
        ScrollInfo {
            min: scroll_info.nMin,
            max: scroll_info.nMax,
            page: scroll_info.nPage as i32,
            pos: scroll_info.nPos,
            track_pos: scroll_info.nTrackPos,
        }
    }

    fn set_scroll_range(&self, handle: WindowHandle, bar: ScrollBar, max: i32, page: i32) {
        let scroll_info = SCROLLINFO {
            cbSize: std::mem::size_of::<SCROLLINFO>() as u32,
            fMask: SIF_RANGE | SIF_PAGE,
            nMin: 0,
            nMax: max,
            nPage: page.max(0) as u32,
            ..Default::default()
        };
        unsafe { SetScrollInfo(hwnd(handle), scroll_bar_constant(bar), &scroll_info, true) };
    }

    fn set_scroll_position(&self, handle: WindowHandle, bar: ScrollBar, position: i32) -> i32 {
        let scroll_info = SCROLLINFO {
            cbSize: std::mem::size_of::<SCROLLINFO>() as u32,
            fMask: SIF_POS,
            nPos: position,
            ..Default::default()
        };
        // SetScrollInfo returns the position the scrollbar settled on.
        unsafe { SetScrollInfo(hwnd(handle), scroll_bar_constant(bar), &scroll_info, true) }
    }

    fn scroll_window(&self, handle: WindowHandle, delta: Point) {
        if !unsafe { ScrollWindow(hwnd(handle), delta.x, delta.y, None, None) }.as_bool() {
            log::warn!("Platform: ScrollWindow({handle:?}) failed");
        }
    }

    fn update_window(&self, handle: WindowHandle) {
        let _ = unsafe { UpdateWindow(hwnd(handle)) };
    }

    fn get_message(&self) -> PlatformResult<Fetched> {
        let mut msg = MSG::default();
        let result = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        match result.0 {
            -1 => {
                let error = unsafe { GetLastError() };
                log::error!("Platform: GetMessageW failed: {error:?}");
                Err(PlatformError::MessageLoop(format!(
                    "GetMessageW failed: {error:?}"
                )))
            }
            0 => Ok(Fetched::Quit(msg.wParam.0 as i32)),
            _ => Ok(Fetched::Message(from_native_msg(&msg))),
        }
    }

    fn is_dialog_message(&self, dialog: WindowHandle, message: &QueuedMessage) -> bool {
        let msg = to_native_msg(message);
        unsafe { IsDialogMessageW(hwnd(dialog), &msg) }.as_bool()
    }

    fn translate_accelerator(&self, table: AcceleratorHandle, message: &QueuedMessage) -> bool {
        let msg = to_native_msg(message);
        let accelerators = HACCEL(table.raw() as *mut c_void);
        unsafe { TranslateAcceleratorW(msg.hwnd, accelerators, &msg) != 0 }
    }

    fn translate_and_dispatch(&self, message: &QueuedMessage) {
        let msg = to_native_msg(message);
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    fn post_quit(&self, exit_code: i32) {
        unsafe { PostQuitMessage(exit_code) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_text_with_truncates_to_copied_length() {
        // Arrange
        let text: Vec<u16> = "ctlwrap".encode_utf16().collect();
        // Act
        let result = read_text_with(
            || 16,
            |buf| {
                buf[..text.len()].copy_from_slice(&text);
                text.len() as i32
            },
        );
        // Assert
        assert_eq!(result.unwrap(), "ctlwrap");
    }

    #[test]
    fn read_text_with_rejects_negative_lengths() {
        assert!(read_text_with(|| -1, |_| 0).is_err());
        assert!(read_text_with(|| 4, |_| -1).is_err());
    }

    #[test]
    fn queued_message_survives_native_conversion() {
        // Arrange
        let queued = QueuedMessage {
            target: WindowHandle::from_raw(0x1234),
            raw: RawMessage::new(WM_KEYDOWN, 0x41, 0x001E_0001),
            time: 99,
            point: Point::new(5, 6),
        };
        // Act
        let native = to_native_msg(&queued);
        // Assert
        assert_eq!(native.hwnd, HWND(0x1234 as *mut c_void));
        assert_eq!(from_native_msg(&native), queued);
    }

    #[test]
    fn sizing_rect_is_read_from_lparam_address() {
        let proposed = RECT {
            left: 10,
            top: 20,
            right: 410,
            bottom: 320,
        };
        let address = &proposed as *const RECT as isize;
        assert_eq!(
            decode_sizing(8, address),
            Some(Message::Sizing {
                edge: SizingEdge::BottomRight,
                rect: Rect::new(10, 20, 400, 300),
            })
        );
        assert_eq!(decode_sizing(8, 0), None);
        assert_eq!(decode_sizing(0, address), None);
    }

    #[test]
    fn notify_header_is_read_from_lparam_address() {
        let header = NMHDR {
            hwndFrom: HWND(0x5678 as *mut c_void),
            idFrom: 12,
            code: 0xFFFF_FFFE,
        };
        let address = &header as *const NMHDR as isize;
        let decoded = read_notify_header(address).unwrap();
        assert_eq!(decoded.source.raw(), 0x5678);
        assert_eq!(decoded.id, 12);
        assert_eq!(decoded.payload, address);
        assert!(read_notify_header(0).is_none());
    }
}
