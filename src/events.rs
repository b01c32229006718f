//! Events flowing into and out of a VNC session.

/// Local input delivered to the session while it waits on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A key was pressed.
    KeyPress(u32),
    /// A key was released.
    KeyRelease(u32),
    /// The pointer moved by a relative amount.
    PointerMove {
        /// Horizontal movement in pixels.
        dx: i32,
        /// Vertical movement in pixels.
        dy: i32,
    },
    /// The pointer button state changed to the given mask
    /// (bit 0 = left, bit 1 = middle, bit 2 = right).
    ButtonChange(u8),
}

/// Events emitted by a session after handling one server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A framebuffer update was applied to the surface.
    FramebufferUpdated {
        /// Number of rectangles drawn, pseudo-encodings included.
        rects: u16,
    },

    /// Colour map entries arrived and were discarded.
    ColourMapEntries {
        /// First colour index.
        first: u16,
        /// Number of entries.
        count: u16,
    },

    /// The server rang the bell.
    Bell,

    /// Clipboard text received from the server.
    CutText(String),
}
