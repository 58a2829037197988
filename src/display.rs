// display.rs

use log::*;
use tokio::time::{sleep, Duration};

use crate::StatsSnapshot;

pub const LCD_COLS: usize = 16;
pub const LCD_ROWS: usize = 2;

pub const FRAME_HOLD: Duration = Duration::from_millis(350);
pub const PHASE_PAUSE: Duration = Duration::from_secs(1);
pub const STATIC_HOLD: Duration = Duration::from_secs(1);

pub trait CharDisplay {
    fn clear(&mut self) -> anyhow::Result<()>;
    fn set_cursor(&mut self, col: u8, row: u8) -> anyhow::Result<()>;
    fn print(&mut self, s: &str) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Static,
    Scroll,
}

impl RenderMode {
    pub fn for_text(text: &str) -> Self {
        if text.chars().count() <= LCD_COLS {
            RenderMode::Static
        } else {
            RenderMode::Scroll
        }
    }
}

pub fn center_padding(len: usize) -> usize {
    LCD_COLS.saturating_sub(len) / 2
}

/// Text sliding in from the right edge: `16 - i` spaces and the first `i` characters.
pub fn entrance_frames(text: &str) -> impl Iterator<Item = String> + '_ {
    (0..LCD_COLS).map(move |i| {
        let head: String = text.chars().take(i).collect();
        format!("{:>width$}", head, width = LCD_COLS)
    })
}

/// One 16 character window for every start position, space padded at the tail.
pub fn scroll_frames(text: &str) -> impl Iterator<Item = String> + '_ {
    (0..text.chars().count()).map(move |i| {
        let window: String = text.chars().skip(i).take(LCD_COLS).collect();
        format!("{:<width$}", window, width = LCD_COLS)
    })
}

pub struct DisplayScheduler<D> {
    lcd: D,
    static_frame: Option<(String, u64)>,
    value_shown: Option<u64>,
}

impl<D: CharDisplay> DisplayScheduler<D> {
    pub fn new(lcd: D) -> Self {
        Self {
            lcd,
            static_frame: None,
            value_shown: None,
        }
    }

    pub fn lcd(&self) -> &D {
        &self.lcd
    }

    pub fn show_status(&mut self, line1: &str, line2: &str) -> anyhow::Result<()> {
        self.static_frame = None;
        self.value_shown = None;

        self.lcd.clear()?;
        self.lcd.print(line1)?;
        if !line2.is_empty() {
            self.lcd.set_cursor(0, 1)?;
            self.lcd.print(line2)?;
        }
        Ok(())
    }

    pub async fn render_cycle(
        &mut self,
        text: &str,
        snapshot: Option<&StatsSnapshot>,
    ) -> anyhow::Result<()> {
        match RenderMode::for_text(text) {
            RenderMode::Static => {
                if let Some(snap) = snapshot {
                    self.draw_static(text, snap.value)?;
                }
                sleep(STATIC_HOLD).await;
                Ok(())
            }
            RenderMode::Scroll => {
                self.static_frame = None;
                if let Some(snap) = snapshot {
                    self.draw_value_row(snap.value)?;
                }
                Box::pin(self.scroll(text)).await
            }
        }
    }

    fn draw_static(&mut self, text: &str, value: u64) -> anyhow::Result<()> {
        if self
            .static_frame
            .as_ref()
            .is_some_and(|(t, v)| t == text && *v == value)
        {
            return Ok(());
        }
        info!("Display: {text:?} / {value}");

        let value_s = value.to_string();
        self.lcd.clear()?;
        self.lcd.set_cursor(center_padding(text.chars().count()) as u8, 0)?;
        self.lcd.print(text)?;
        self.lcd.set_cursor(center_padding(value_s.len()) as u8, 1)?;
        self.lcd.print(&value_s)?;

        self.static_frame = Some((text.to_string(), value));
        self.value_shown = Some(value);
        Ok(())
    }

    fn draw_value_row(&mut self, value: u64) -> anyhow::Result<()> {
        if self.value_shown == Some(value) {
            return Ok(());
        }

        let value_s = value.to_string();
        self.lcd.set_cursor(0, 1)?;
        self.lcd.print(&" ".repeat(LCD_COLS))?;
        self.lcd.set_cursor(center_padding(value_s.len()) as u8, 1)?;
        self.lcd.print(&value_s)?;

        self.value_shown = Some(value);
        Ok(())
    }

    async fn scroll(&mut self, text: &str) -> anyhow::Result<()> {
        for frame in entrance_frames(text) {
            self.lcd.set_cursor(0, 0)?;
            self.lcd.print(&frame)?;
            sleep(FRAME_HOLD).await;
        }
        sleep(PHASE_PAUSE).await;

        for frame in scroll_frames(text) {
            self.lcd.set_cursor(0, 0)?;
            self.lcd.print(&frame)?;
            sleep(FRAME_HOLD).await;
        }
        sleep(PHASE_PAUSE).await;
        Ok(())
    }
}


// EOF
