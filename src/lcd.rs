// lcd.rs
//
// HD44780 16x2 character LCD behind a PCF8574 I2C backpack, 4-bit mode.
// Backpack wiring: P0=RS P1=RW P2=EN P3=backlight P4..P7=D4..D7

use anyhow::anyhow;
use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::*;

pub const LCD_I2C_ADDR: u8 = 0x27;

const RS: u8 = 0x01;
const EN: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE: u8 = 0x06; // increment, no shift
const CMD_DISPLAY_ON: u8 = 0x0C; // display on, cursor off, blink off
const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

const ROW_OFFSETS: [u8; LCD_ROWS] = [0x00, 0x40];

pub struct Lcd1602<I, D> {
    i2c: I,
    delay: D,
    addr: u8,
}

impl<I: I2c, D: DelayNs> Lcd1602<I, D> {
    pub fn new(i2c: I, delay: D, addr: u8) -> Self {
        Self { i2c, delay, addr }
    }

    pub fn init(&mut self) -> anyhow::Result<()> {
        // power-on wait, then the datasheet's reset-by-instruction dance
        self.delay.delay_ms(50);
        self.write_nibble(0x30, false)?;
        self.delay.delay_us(4500);
        self.write_nibble(0x30, false)?;
        self.delay.delay_us(4500);
        self.write_nibble(0x30, false)?;
        self.delay.delay_us(150);
        self.write_nibble(0x20, false)?;

        self.command(CMD_FUNCTION_4BIT_2LINE)?;
        self.command(CMD_DISPLAY_ON)?;
        self.clear()?;
        self.command(CMD_ENTRY_MODE)?;
        Ok(())
    }

    pub fn release(self) -> I {
        self.i2c
    }

    fn expander_write(&mut self, byte: u8) -> anyhow::Result<()> {
        self.i2c
            .write(self.addr, &[byte | BACKLIGHT])
            .map_err(|e| anyhow!("LCD i2c write failed: {e:?}"))
    }

    fn write_nibble(&mut self, nibble: u8, data: bool) -> anyhow::Result<()> {
        let bits = (nibble & 0xF0) | if data { RS } else { 0 };
        self.expander_write(bits)?;
        self.expander_write(bits | EN)?;
        self.delay.delay_us(1);
        self.expander_write(bits)?;
        self.delay.delay_us(50);
        Ok(())
    }

    fn send(&mut self, byte: u8, data: bool) -> anyhow::Result<()> {
        self.write_nibble(byte & 0xF0, data)?;
        self.write_nibble(byte << 4, data)
    }

    fn command(&mut self, cmd: u8) -> anyhow::Result<()> {
        self.send(cmd, false)
    }
}

impl<I: I2c, D: DelayNs> CharDisplay for Lcd1602<I, D> {
    fn clear(&mut self) -> anyhow::Result<()> {
        self.command(CMD_CLEAR)?;
        self.delay.delay_ms(2);
        Ok(())
    }

    fn set_cursor(&mut self, col: u8, row: u8) -> anyhow::Result<()> {
        let row = (row as usize).min(LCD_ROWS - 1);
        let col = col.min(LCD_COLS as u8 - 1);
        self.command(CMD_SET_DDRAM | (ROW_OFFSETS[row] + col))
    }

    fn print(&mut self, s: &str) -> anyhow::Result<()> {
        for c in s.chars() {
            let b = if c.is_ascii() && !c.is_ascii_control() {
                c as u8
            } else {
                b'?'
            };
            self.send(b, true)?;
        }
        Ok(())
    }
}


// EOF
