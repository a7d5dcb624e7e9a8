mod app;
mod error;
mod inputmap;
mod render;
mod window;

pub use self::{
    app::Chip8App,
    error::{AppError, ErrorKind},
    inputmap::{InputEvent, InputKind, InputMap, DEFAULT_KEYMAP},
};

pub type EventLoop = winit::event_loop::EventLoop<()>;

/// Named application actions, as used in input map files.
pub mod actions {
    pub const EXIT: &str = "exit";
}
