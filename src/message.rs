/*
 * Typed view of the window messages the core cares about.
 *
 * Backends translate the raw `(msg, wparam, lparam)` triple into a `Message`
 * before handing it to toolkit code and translate a `Reply` back into the
 * native result. `Reply::Default` is the "not handled" sentinel: whoever sees
 * it must apply default platform processing. Message codes follow the Win32
 * numbering so the headless backend and the Win32 backend agree on raw values.
 */

use crate::geometry::{Dimension, Point, Rect, WindowHandle};

pub const WM_CREATE: u32 = 0x0001;
pub const WM_DESTROY: u32 = 0x0002;
pub const WM_SIZE: u32 = 0x0005;
pub const WM_CLOSE: u32 = 0x0010;
pub const WM_QUIT: u32 = 0x0012;
pub const WM_NOTIFY: u32 = 0x004E;
pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_CHAR: u32 = 0x0102;
pub const WM_COMMAND: u32 = 0x0111;
pub const WM_HSCROLL: u32 = 0x0114;
pub const WM_VSCROLL: u32 = 0x0115;
pub const WM_SIZING: u32 = 0x0214;

/// A message exactly as the native queue or window procedure delivered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage {
    pub msg: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl RawMessage {
    pub const fn new(msg: u32, wparam: usize, lparam: isize) -> Self {
        Self {
            msg,
            wparam,
            lparam,
        }
    }
}

/// Header common to every generic notification (`NMHDR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyHeader {
    pub source: WindowHandle,
    pub id: usize,
    pub code: u32,
    /// Address of the full notification structure; passed through untouched.
    pub payload: isize,
}

/// Window edge being dragged during an interactive resize (`WMSZ_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingEdge {
    Left,
    Right,
    Top,
    TopLeft,
    TopRight,
    Bottom,
    BottomLeft,
    BottomRight,
}

impl SizingEdge {
    pub const fn from_code(code: usize) -> Option<Self> {
        Some(match code {
            1 => SizingEdge::Left,
            2 => SizingEdge::Right,
            3 => SizingEdge::Top,
            4 => SizingEdge::TopLeft,
            5 => SizingEdge::TopRight,
            6 => SizingEdge::Bottom,
            7 => SizingEdge::BottomLeft,
            8 => SizingEdge::BottomRight,
            _ => return None,
        })
    }

    pub const fn code(self) -> usize {
        match self {
            SizingEdge::Left => 1,
            SizingEdge::Right => 2,
            SizingEdge::Top => 3,
            SizingEdge::TopLeft => 4,
            SizingEdge::TopRight => 5,
            SizingEdge::Bottom => 6,
            SizingEdge::BottomLeft => 7,
            SizingEdge::BottomRight => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBar {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAction {
    LineUp,
    LineDown,
    PageUp,
    PageDown,
    ThumbPosition,
    ThumbTrack,
    Top,
    Bottom,
    EndScroll,
    Other(u16),
}

impl ScrollAction {
    pub const fn from_code(code: u16) -> Self {
        match code {
            0 => ScrollAction::LineUp,
            1 => ScrollAction::LineDown,
            2 => ScrollAction::PageUp,
            3 => ScrollAction::PageDown,
            4 => ScrollAction::ThumbPosition,
            5 => ScrollAction::ThumbTrack,
            6 => ScrollAction::Top,
            7 => ScrollAction::Bottom,
            8 => ScrollAction::EndScroll,
            other => ScrollAction::Other(other),
        }
    }

    pub const fn code(self) -> u16 {
        match self {
            ScrollAction::LineUp => 0,
            ScrollAction::LineDown => 1,
            ScrollAction::PageUp => 2,
            ScrollAction::PageDown => 3,
            ScrollAction::ThumbPosition => 4,
            ScrollAction::ThumbTrack => 5,
            ScrollAction::Top => 6,
            ScrollAction::Bottom => 7,
            ScrollAction::EndScroll => 8,
            ScrollAction::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Create,
    Destroy,
    Close,
    Size {
        kind: u32,
        size: Dimension,
    },
    Command {
        id: u16,
        code: u16,
        source: Option<WindowHandle>,
    },
    Notify(NotifyHeader),
    HScroll {
        action: ScrollAction,
        position: i32,
        source: Option<WindowHandle>,
    },
    VScroll {
        action: ScrollAction,
        position: i32,
        source: Option<WindowHandle>,
    },
    /// Interactive resize in progress; `rect` is the proposed outer rectangle.
    /// Answer with `Reply::Resized` to replace it.
    Sizing {
        edge: SizingEdge,
        rect: Rect,
    },
    Other(RawMessage),
}

impl Message {
    /*
     * Decodes a raw triple. `WM_NOTIFY` carries a pointer to its header, so the
     * caller supplies `read_header` to dereference it; when that yields `None`
     * the message stays `Other`. `WM_SIZING` points at a rectangle the
     * handler may rewrite, so backends build `Message::Sizing` themselves and
     * it decodes as `Other` here.
     */
    pub fn decode(
        raw: RawMessage,
        read_header: impl FnOnce(isize) -> Option<NotifyHeader>,
    ) -> Message {
        let RawMessage {
            msg,
            wparam,
            lparam,
        } = raw;
        match msg {
            WM_CREATE => Message::Create,
            WM_DESTROY => Message::Destroy,
            WM_CLOSE => Message::Close,
            WM_SIZE => Message::Size {
                kind: wparam as u32,
                size: Dimension::new(loword(lparam as usize) as i32, hiword(lparam as usize) as i32),
            },
            WM_COMMAND => Message::Command {
                id: loword(wparam),
                code: hiword(wparam),
                source: WindowHandle::from_raw(lparam as usize),
            },
            WM_NOTIFY => match read_header(lparam) {
                Some(header) => Message::Notify(header),
                None => Message::Other(raw),
            },
            WM_HSCROLL => Message::HScroll {
                action: ScrollAction::from_code(loword(wparam)),
                position: hiword(wparam) as i32,
                source: WindowHandle::from_raw(lparam as usize),
            },
            WM_VSCROLL => Message::VScroll {
                action: ScrollAction::from_code(loword(wparam)),
                position: hiword(wparam) as i32,
                source: WindowHandle::from_raw(lparam as usize),
            },
            _ => Message::Other(raw),
        }
    }

    pub fn encode(&self) -> RawMessage {
        match *self {
            Message::Create => RawMessage::new(WM_CREATE, 0, 0),
            Message::Destroy => RawMessage::new(WM_DESTROY, 0, 0),
            Message::Close => RawMessage::new(WM_CLOSE, 0, 0),
            Message::Size { kind, size } => RawMessage::new(
                WM_SIZE,
                kind as usize,
                make_long(size.w as u16, size.h as u16) as isize,
            ),
            Message::Command { id, code, source } => {
                RawMessage::new(WM_COMMAND, make_long(id, code), raw_source(source))
            }
            Message::Notify(header) => {
                RawMessage::new(WM_NOTIFY, header.id, header.payload)
            }
            Message::HScroll {
                action,
                position,
                source,
            } => RawMessage::new(
                WM_HSCROLL,
                make_long(action.code(), position as u16),
                raw_source(source),
            ),
            Message::VScroll {
                action,
                position,
                source,
            } => RawMessage::new(
                WM_VSCROLL,
                make_long(action.code(), position as u16),
                raw_source(source),
            ),
            // The rectangle travels by pointer and is not part of the triple.
            Message::Sizing { edge, .. } => RawMessage::new(WM_SIZING, edge.code(), 0),
            Message::Other(raw) => raw,
        }
    }

    /// Whether `reflection::reflect_message` accepts this message category.
    pub fn is_reflectable(&self) -> bool {
        matches!(
            self,
            Message::Command { .. }
                | Message::Notify(_)
                | Message::HScroll { .. }
                | Message::VScroll { .. }
        )
    }
}

/// Outcome of handling a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Not handled: the caller applies default platform processing.
    Default,
    Handled(isize),
    /// Handled a `Message::Sizing` by replacing the proposed rectangle.
    Resized(Rect),
}

impl Reply {
    pub fn is_handled(self) -> bool {
        matches!(self, Reply::Handled(_) | Reply::Resized(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Menu,
    Accelerator,
    Control,
}

/// A `WM_COMMAND` classified by origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEvent {
    pub kind: CommandKind,
    pub id: u16,
    pub code: u16,
    pub source: Option<WindowHandle>,
}

impl CommandEvent {
    /*
     * Controls always name themselves in lParam, even for notification code 0
     * (`BN_CLICKED`), so the source decides first. Without a source, code 1
     * marks an accelerator and anything else a menu.
     */
    pub fn from_message(message: &Message) -> Option<CommandEvent> {
        let Message::Command { id, code, source } = *message else {
            return None;
        };
        let kind = match (source, code) {
            (Some(_), _) => CommandKind::Control,
            (None, 1) => CommandKind::Accelerator,
            (None, _) => CommandKind::Menu,
        };
        Some(CommandEvent {
            kind,
            id,
            code,
            source,
        })
    }
}

/// A message pulled from the thread queue, addressed to `target` (or to the thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedMessage {
    pub target: Option<WindowHandle>,
    pub raw: RawMessage,
    pub time: u32,
    pub point: Point,
}

impl QueuedMessage {
    pub const fn new(target: Option<WindowHandle>, raw: RawMessage) -> Self {
        Self {
            target,
            raw,
            time: 0,
            point: Point::ORIGIN,
        }
    }
}

/// Result of one blocking retrieval from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    Message(QueuedMessage),
    Quit(i32),
}

#[inline]
pub(crate) fn loword(value: usize) -> u16 {
    (value & 0xFFFF) as u16
}

#[inline]
pub(crate) fn hiword(value: usize) -> u16 {
    ((value >> 16) & 0xFFFF) as u16
}

#[inline]
pub(crate) fn make_long(low: u16, high: u16) -> usize {
    (low as usize) | ((high as usize) << 16)
}

fn raw_source(source: Option<WindowHandle>) -> isize {
    source.map_or(0, |h| h.raw() as isize)
}
