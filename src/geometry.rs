/*
 * Plain value types shared by every wrapper: sizes, points, rectangles and the
 * opaque identifiers handed out by the native windowing system. None of these
 * carry behavior beyond construction and conversion; on Windows they convert
 * losslessly to and from the corresponding Win32 structures.
 */

use std::fmt;

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub w: i32,
    pub h: i32,
}

impl Dimension {
    pub const fn new(w: i32, h: i32) -> Self {
        Self { w, h }
    }

    /// Size of the box spanned by two corners.
    pub const fn between(top_left: Point, bottom_right: Point) -> Self {
        Self {
            w: bottom_right.x - top_left.x,
            h: bottom_right.y - top_left.y,
        }
    }
}

/// A position in pixels. Whose coordinate space it lives in depends on the call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl std::ops::Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

/// Top-left corner plus size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub position: Point,
    pub size: Dimension,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self {
            position: Point::new(x, y),
            size: Dimension::new(w, h),
        }
    }

    pub const fn from_parts(position: Point, size: Dimension) -> Self {
        Self { position, size }
    }

    /// Builds a rectangle from the native edge form `(left, top, right, bottom)`.
    pub const fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    /// The native edge form `(left, top, right, bottom)`.
    pub const fn edges(&self) -> (i32, i32, i32, i32) {
        (
            self.position.x,
            self.position.y,
            self.right(),
            self.bottom(),
        )
    }

    pub const fn right(&self) -> i32 {
        self.position.x + self.size.w
    }

    pub const fn bottom(&self) -> i32 {
        self.position.y + self.size.h
    }

    pub const fn bottom_right(&self) -> Point {
        Point::new(self.right(), self.bottom())
    }
}

/// Opaque identifier of one live native window. Never null.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub(crate) usize);

impl WindowHandle {
    /// Returns `None` for the null handle.
    pub const fn from_raw(raw: usize) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WindowHandle({:#x})", self.0)
    }
}

/// Opaque identifier of a native accelerator table.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AcceleratorHandle(pub(crate) usize);

impl AcceleratorHandle {
    pub const fn from_raw(raw: usize) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Debug for AcceleratorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AcceleratorHandle({:#x})", self.0)
    }
}

/// Identity of a registered window class (the class atom on Win32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassToken(pub(crate) u32);

impl ClassToken {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[cfg(target_os = "windows")]
mod win32_conversions {
    use super::{Dimension, Point, Rect, WindowHandle};
    use windows::Win32::Foundation::{HWND, POINT, RECT, SIZE};

    impl From<RECT> for Rect {
        fn from(r: RECT) -> Self {
            Rect::from_edges(r.left, r.top, r.right, r.bottom)
        }
    }

    impl From<Rect> for RECT {
        fn from(r: Rect) -> Self {
            let (left, top, right, bottom) = r.edges();
            RECT {
                left,
                top,
                right,
                bottom,
            }
        }
    }

    impl From<RECT> for Dimension {
        fn from(r: RECT) -> Self {
            Dimension::new(r.right - r.left, r.bottom - r.top)
        }
    }

    impl From<Dimension> for RECT {
        fn from(d: Dimension) -> Self {
            RECT {
                left: 0,
                top: 0,
                right: d.w,
                bottom: d.h,
            }
        }
    }

    impl From<SIZE> for Dimension {
        fn from(s: SIZE) -> Self {
            Dimension::new(s.cx, s.cy)
        }
    }

    impl From<POINT> for Point {
        fn from(p: POINT) -> Self {
            Point::new(p.x, p.y)
        }
    }

    impl From<Point> for POINT {
        fn from(p: Point) -> Self {
            POINT { x: p.x, y: p.y }
        }
    }

    impl From<WindowHandle> for HWND {
        fn from(h: WindowHandle) -> Self {
            HWND(h.raw() as *mut std::ffi::c_void)
        }
    }

    impl WindowHandle {
        pub(crate) fn from_hwnd(hwnd: HWND) -> Option<Self> {
            WindowHandle::from_raw(hwnd.0 as usize)
        }
    }
}
