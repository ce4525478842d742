//! One colored status line per event type.

use std::io::IsTerminal;

const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    fn color(self) -> &'static str {
        match self {
            Self::Info => "\x1b[34m",
            Self::Success => "\x1b[32m",
            Self::Warning => "\x1b[33m",
            Self::Error => "\x1b[31m",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "ok",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

/// Render a status line, colored or plain.
pub fn render(level: Level, message: &str, color: bool) -> String {
    if color {
        format!("{}[{}]{RESET} {message}", level.color(), level.tag())
    } else {
        format!("[{}] {message}", level.tag())
    }
}

fn use_color(is_terminal: bool) -> bool {
    is_terminal && std::env::var_os("NO_COLOR").is_none()
}

pub fn info(message: impl AsRef<str>) {
    let color = use_color(std::io::stdout().is_terminal());
    println!("{}", render(Level::Info, message.as_ref(), color));
}

pub fn success(message: impl AsRef<str>) {
    let color = use_color(std::io::stdout().is_terminal());
    println!("{}", render(Level::Success, message.as_ref(), color));
}

pub fn warning(message: impl AsRef<str>) {
    let color = use_color(std::io::stderr().is_terminal());
    eprintln!("{}", render(Level::Warning, message.as_ref(), color));
}

pub fn error(message: impl AsRef<str>) {
    let color = use_color(std::io::stderr().is_terminal());
    eprintln!("{}", render(Level::Error, message.as_ref(), color));
}
