//! Application errors
use std::fmt;

#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
}

impl std::error::Error for AppError {}

#[derive(Debug)]
pub enum ErrorKind {
    /// The virtual machine faulted.
    Chip8(chip8::Chip8Error),
    Io(std::io::Error),
    Window(winit::error::OsError),
    /// OpenGL context, surface or resource creation failed.
    Graphics(String),
    /// Input map file could not be parsed.
    Config(serde_yaml::Error),
}

impl AppError {
    pub fn graphics(err: impl ToString) -> Self {
        Self {
            kind: ErrorKind::Graphics(err.to_string()),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "application error: {}", self.kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chip8(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Window(err) => write!(f, "{err}"),
            Self::Graphics(msg) => write!(f, "graphics: {msg}"),
            Self::Config(err) => write!(f, "input map: {err}"),
        }
    }
}

impl From<chip8::Chip8Error> for AppError {
    fn from(err: chip8::Chip8Error) -> Self {
        Self {
            kind: ErrorKind::Chip8(err),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::Io(err),
        }
    }
}

impl From<winit::error::OsError> for AppError {
    fn from(err: winit::error::OsError) -> Self {
        Self {
            kind: ErrorKind::Window(err),
        }
    }
}

impl From<glutin::error::Error> for AppError {
    fn from(err: glutin::error::Error) -> Self {
        Self::graphics(err)
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self {
            kind: ErrorKind::Config(err),
        }
    }
}
