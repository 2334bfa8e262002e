//! # RGB Matrix Backend
//!
//! Drives a physical LED matrix panel (default 32x64) through the
//! `rpi-led-matrix` bindings to the hzeller driver. This is the preferred
//! backend when the hardware is present; every failure mode at
//! initialization (driver refused, font missing, bad GPIO mapping) is
//! reported as a [`BackendInitError`] so the selector can fall through to
//! a software backend instead of crashing the process.
//!
//! Panel layout: row 0 carries the stop name (truncated to the panel
//! width, suffixed with `!` while the data is stale), the remaining rows
//! show up to `display.matrix.max_arrivals` arrivals as route label plus
//! countdown. When the set holds more records than fit, a [`ViewCycle`]
//! rotates the visible slice one step per refresh cycle.

use crate::config::MatrixConfig;
use crate::render::{
    format_countdown, truncate, BackendInitError, RenderBackend, RenderError, ViewCycle,
};
use crate::{ArrivalSet, IMMINENT_MINUTES};
use chrono::{DateTime, Local};
use rpi_led_matrix::{LedCanvas, LedColor, LedFont, LedMatrix, LedMatrixOptions, LedRuntimeOptions};
use std::path::PathBuf;

/// Default font location, resolved against the working directory. The
/// 7x13 BDF from the hzeller distribution is expected to be installed
/// there; when it is absent, init fails and the selector falls through.
const DEFAULT_FONT: &str = "fonts/7x13.bdf";

/// Vertical stride per text row; fits three rows on a 32-pixel panel with
/// the 13-pixel font's baseline at the bottom of each stride.
const LINE_HEIGHT: i32 = 10;

/// Approximate glyph width of the default font, used for truncation.
const GLYPH_WIDTH: u32 = 7;

const WARNING_COLOR: LedColor = LedColor {
    red: 255,
    green: 165,
    blue: 0,
};
const URGENT_COLOR: LedColor = LedColor {
    red: 255,
    green: 0,
    blue: 0,
};

pub struct MatrixBackend {
    matrix: LedMatrix,
    canvas: Option<LedCanvas>,
    font: LedFont,
    cols: u32,
    text_color: LedColor,
    header_color: LedColor,
    cycle: ViewCycle,
}

fn led_color(rgb: [u8; 3]) -> LedColor {
    LedColor {
        red: rgb[0],
        green: rgb[1],
        blue: rgb[2],
    }
}

impl MatrixBackend {
    /// Bring up the panel. Requires the driver, the configured dimensions
    /// and the BDF font to all check out; any failure is non-fatal to the
    /// process and reported for fallback.
    pub fn new(config: &MatrixConfig) -> Result<Self, BackendInitError> {
        let font_path = config
            .font_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FONT));
        if !font_path.exists() {
            return Err(BackendInitError::Font {
                path: font_path,
                reason: "file not found".to_string(),
            });
        }
        let font = LedFont::new(&font_path).map_err(|e| BackendInitError::Font {
            path: font_path,
            reason: e.to_string(),
        })?;

        let mut options = LedMatrixOptions::new();
        options.set_rows(config.rows);
        options.set_cols(config.cols);
        options.set_chain_length(config.chain_length);
        options.set_parallel(config.parallel);
        options.set_hardware_mapping(&config.hardware_mapping);
        options
            .set_brightness(config.brightness)
            .map_err(|e| BackendInitError::Driver(e.to_string()))?;

        let mut runtime = LedRuntimeOptions::new();
        runtime.set_gpio_slowdown(config.gpio_slowdown);

        let matrix = LedMatrix::new(Some(options), Some(runtime))
            .map_err(|e| BackendInitError::Driver(e.to_string()))?;
        let canvas = matrix.offscreen_canvas();

        Ok(MatrixBackend {
            matrix,
            canvas: Some(canvas),
            font,
            cols: config.cols,
            text_color: led_color(config.text_color),
            header_color: led_color(config.header_color),
            cycle: ViewCycle::new(config.max_arrivals),
        })
    }

    fn max_chars(&self) -> usize {
        (self.cols / GLYPH_WIDTH).max(1) as usize
    }

    fn countdown_color(&self, minutes: u32) -> LedColor {
        if minutes == 0 {
            URGENT_COLOR
        } else if minutes <= IMMINENT_MINUTES {
            WARNING_COLOR
        } else {
            self.text_color
        }
    }
}

impl RenderBackend for MatrixBackend {
    fn draw(
        &mut self,
        set: &ArrivalSet,
        stop_name: &str,
        now: DateTime<Local>,
    ) -> Result<(), RenderError> {
        let mut canvas = self
            .canvas
            .take()
            .ok_or_else(|| RenderError::Driver("canvas already released".to_string()))?;
        canvas.clear();

        // Header row: truncated stop name, flagged while stale
        let mut header = truncate(stop_name, self.max_chars());
        if set.stale {
            header.pop();
            header.push('!');
        }
        canvas.draw_text(
            &self.font,
            &header,
            1,
            LINE_HEIGHT - 1,
            &self.header_color,
            0,
            false,
        );

        // Arrival rows: rotate through the set when it holds more records
        // than the panel fits
        for (row, index) in self.cycle.indices(set.records.len()).into_iter().enumerate() {
            let record = &set.records[index];
            let minutes = record.countdown_minutes(now);
            let y = (row as i32 + 2) * LINE_HEIGHT - 1;

            let route = truncate(&record.route_label, 4);
            canvas.draw_text(&self.font, &route, 1, y, &self.text_color, 0, false);

            let countdown = format_countdown(minutes);
            let x = self.cols as i32 - (countdown.chars().count() as i32 * GLYPH_WIDTH as i32) - 1;
            canvas.draw_text(
                &self.font,
                &countdown,
                x.max(1),
                y,
                &self.countdown_color(minutes),
                0,
                false,
            );
        }

        self.canvas = Some(self.matrix.swap(canvas));
        self.cycle.advance(set.records.len());
        Ok(())
    }

    fn shutdown(&mut self) {
        // Blank the panel and let the driver release the GPIO on drop.
        if let Some(mut canvas) = self.canvas.take() {
            canvas.clear();
            let _ = self.matrix.swap(canvas);
        }
    }
}
