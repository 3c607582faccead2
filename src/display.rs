//! Window surfaces and input polling
//!
//! Thin wrapper over minifb: each surface owns one fixed-size window and a
//! packed framebuffer. Presenting a frame is also the event pump; key and
//! pointer state are read afterwards. Pointer events are synthesized by edge
//! detection against the previous poll, so the interaction handlers see
//! proper down/move/up transitions.

use anyhow::{Context, Result};
use image::RgbImage;
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};

use crate::interact::{PointerButton, PointerEvent};

/// A keyboard command recognized by the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Quit,
    Reset,
    ExposureUp,
    ExposureDown,
}

pub struct Surface {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    primary_down: bool,
    secondary_down: bool,
    last_pos: Option<(i32, i32)>,
}

impl Surface {
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let mut window = Window::new(
            title,
            width as usize,
            height as usize,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )
        .with_context(|| format!("Failed to create window {:?}", title))?;
        window.set_target_fps(60);

        Ok(Self {
            window,
            buffer: vec![0u32; (width * height) as usize],
            width: width as usize,
            height: height as usize,
            primary_down: false,
            secondary_down: false,
            last_pos: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// Pack the frame into the 0RGB framebuffer and update the window. This
    /// is the only place window events get pumped.
    pub fn present(&mut self, frame: &RgbImage) -> Result<()> {
        let pixels = (frame.width() as usize * frame.height() as usize).min(self.buffer.len());
        let raw = frame.as_raw();
        for i in 0..pixels {
            let off = i * 3;
            self.buffer[i] = (raw[off] as u32) << 16 | (raw[off + 1] as u32) << 8
                | raw[off + 2] as u32;
        }
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .context("Failed to update window")
    }

    /// Keyboard commands pressed since the last poll (no key repeat).
    pub fn key_commands(&self) -> Vec<KeyCommand> {
        self.window
            .get_keys_pressed(KeyRepeat::No)
            .into_iter()
            .filter_map(map_key)
            .collect()
    }

    /// Pointer transitions since the last poll, in down/move/up order.
    pub fn pointer_events(&mut self) -> Vec<PointerEvent> {
        let mut events = Vec::new();

        let pos = self
            .window
            .get_mouse_pos(MouseMode::Clamp)
            .map(|(x, y)| (x as i32, y as i32));
        let primary = self.window.get_mouse_down(MouseButton::Left);
        let secondary = self.window.get_mouse_down(MouseButton::Right);

        if let Some((x, y)) = pos {
            if primary && !self.primary_down {
                events.push(PointerEvent::Down {
                    button: PointerButton::Primary,
                    x,
                    y,
                });
            }
            if secondary && !self.secondary_down {
                events.push(PointerEvent::Down {
                    button: PointerButton::Secondary,
                    x,
                    y,
                });
            }
            if self.last_pos != pos {
                events.push(PointerEvent::Moved { x, y });
            }
        }
        if !primary && self.primary_down {
            events.push(PointerEvent::Up {
                button: PointerButton::Primary,
            });
        }
        if !secondary && self.secondary_down {
            events.push(PointerEvent::Up {
                button: PointerButton::Secondary,
            });
        }

        self.primary_down = primary;
        self.secondary_down = secondary;
        self.last_pos = pos;
        events
    }
}

fn map_key(key: Key) -> Option<KeyCommand> {
    match key {
        Key::Q => Some(KeyCommand::Quit),
        Key::R => Some(KeyCommand::Reset),
        // '+' arrives as the '=' key on most layouts.
        Key::Equal | Key::NumPadPlus => Some(KeyCommand::ExposureUp),
        Key::Minus | Key::NumPadMinus => Some(KeyCommand::ExposureDown),
        _ => None,
    }
}
