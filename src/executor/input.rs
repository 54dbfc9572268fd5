// Physical input simulation through enigo. Each call opens its own
// connection on a blocking thread; enigo handles are not shared.
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::actions::ScrollDirection;

async fn with_enigo<F>(label: &'static str, f: F) -> DeskPilotResult<()>
where
    F: FnOnce(&mut Enigo) -> Result<(), String> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| DeskPilotError::Executor(format!("input connection: {e}")))?;
        f(&mut enigo).map_err(|e| DeskPilotError::Executor(format!("{label}: {e}")))
    })
    .await
    .map_err(|e| DeskPilotError::Executor(format!("join: {e}")))?
}

pub async fn mouse_move(x: i32, y: i32) -> DeskPilotResult<()> {
    with_enigo("move", move |enigo| {
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(|e| e.to_string())
    })
    .await
}

pub async fn mouse_click(x: i32, y: i32) -> DeskPilotResult<()> {
    with_enigo("click", move |enigo| {
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(|e| e.to_string())?;
        enigo.button(Button::Left, Direction::Click).map_err(|e| e.to_string())
    })
    .await
}

pub async fn mouse_double_click(x: i32, y: i32) -> DeskPilotResult<()> {
    with_enigo("double click", move |enigo| {
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(|e| e.to_string())?;
        enigo.button(Button::Left, Direction::Click).map_err(|e| e.to_string())?;
        enigo.button(Button::Left, Direction::Click).map_err(|e| e.to_string())
    })
    .await
}

pub async fn mouse_right_click(x: i32, y: i32) -> DeskPilotResult<()> {
    with_enigo("right click", move |enigo| {
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(|e| e.to_string())?;
        enigo.button(Button::Right, Direction::Click).map_err(|e| e.to_string())
    })
    .await
}

pub async fn scroll(direction: ScrollDirection, amount: i32) -> DeskPilotResult<()> {
    let (axis, length) = match direction {
        ScrollDirection::Up => (Axis::Vertical, -amount),
        ScrollDirection::Down => (Axis::Vertical, amount),
        ScrollDirection::Left => (Axis::Horizontal, -amount),
        ScrollDirection::Right => (Axis::Horizontal, amount),
    };
    with_enigo("scroll", move |enigo| enigo.scroll(length, axis).map_err(|e| e.to_string())).await
}

pub async fn type_text(text: String) -> DeskPilotResult<()> {
    with_enigo("type", move |enigo| enigo.text(&text).map_err(|e| e.to_string())).await
}

/// Press a key or chord such as `enter`, `cmd+l`, `ctrl+shift+t`.
pub async fn press_keys(chord: String) -> DeskPilotResult<()> {
    let (modifiers, key) = parse_chord(&chord)
        .map_err(|e| DeskPilotError::Executor(format!("press key `{chord}`: {e}")))?;
    with_enigo("press key", move |enigo| {
        for m in &modifiers {
            enigo.key(*m, Direction::Press).map_err(|e| e.to_string())?;
        }
        let result = enigo.key(key, Direction::Click).map_err(|e| e.to_string());
        for m in modifiers.iter().rev() {
            enigo.key(*m, Direction::Release).map_err(|e| e.to_string())?;
        }
        result
    })
    .await
}

/// Split a chord into held modifiers and the final key.
pub fn parse_chord(chord: &str) -> Result<(Vec<Key>, Key), String> {
    let parts: Vec<&str> = chord
        .split('+')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let Some((last, mods)) = parts.split_last() else {
        return Err("empty key".into());
    };
    let modifiers = mods
        .iter()
        .map(|m| key_from_name(m))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((modifiers, key_from_name(last)?))
}

fn key_from_name(name: &str) -> Result<Key, String> {
    let lower = name.to_lowercase();
    let key = match lower.as_str() {
        "cmd" | "command" | "meta" | "super" | "win" => Key::Meta,
        "ctrl" | "control" => Key::Control,
        "alt" | "option" | "opt" => Key::Alt,
        "shift" => Key::Shift,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = lower.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return Err(format!("unknown key name `{name}`")),
            }
        }
    };
    Ok(key)
}
