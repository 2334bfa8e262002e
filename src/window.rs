//! # Windowed Backend
//!
//! Renders the arrival board into a desktop window, mainly for developing
//! layout changes without a panel on the desk. The pixel layout is shared
//! through [`draw_board`], which draws onto any
//! [`embedded_graphics::draw_target::DrawTarget`]; the real window only
//! supplies the surface, so tests can render into a `MockDisplay` instead.
//!
//! The actual window (feature `window`) uses the embedded-graphics
//! simulator, which needs SDL2 and a display server; a headless host is
//! detected up front and reported as an init failure so the selector can
//! fall through to the console.

use crate::render::{format_clock, format_countdown};
use crate::{ArrivalSet, IMMINENT_MINUTES};
use chrono::{DateTime, Local};
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_8X13},
        MonoTextStyle,
    },
    pixelcolor::Rgb888,
    prelude::*,
    text::Text,
};

/// Board surface size in pixels; the simulator scales it up for the
/// desktop.
pub const BOARD_WIDTH: u32 = 320;
pub const BOARD_HEIGHT: u32 = 160;

const HEADER_COLOR: Rgb888 = Rgb888::new(255, 255, 255);
const TEXT_COLOR: Rgb888 = Rgb888::new(255, 255, 0);
const ARRIVAL_COLOR: Rgb888 = Rgb888::new(0, 255, 0);
const WARNING_COLOR: Rgb888 = Rgb888::new(255, 165, 0);
const URGENT_COLOR: Rgb888 = Rgb888::new(255, 0, 0);

/// Countdown color by urgency: red when due, orange when imminent,
/// green otherwise.
fn countdown_color(minutes: u32) -> Rgb888 {
    if minutes == 0 {
        URGENT_COLOR
    } else if minutes <= IMMINENT_MINUTES {
        WARNING_COLOR
    } else {
        ARRIVAL_COLOR
    }
}

/// Draw the full board onto `target`. Deterministic for a given
/// (set, stop name, now) triple.
pub fn draw_board<D>(
    target: &mut D,
    set: &ArrivalSet,
    stop_name: &str,
    now: DateTime<Local>,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb888>,
{
    let header_style = MonoTextStyle::new(&FONT_10X20, HEADER_COLOR);
    let label_style = MonoTextStyle::new(&FONT_8X13, TEXT_COLOR);

    Text::new(stop_name, Point::new(6, 20), header_style).draw(target)?;

    let updated = format!("updated {}", format_clock(set.fetched_at));
    Text::new(&updated, Point::new(6, 38), label_style).draw(target)?;
    if set.stale {
        let stale_style = MonoTextStyle::new(&FONT_8X13, WARNING_COLOR);
        Text::new("stale", Point::new(BOARD_WIDTH as i32 - 46, 38), stale_style).draw(target)?;
    }

    if set.is_empty() {
        let style = MonoTextStyle::new(&FONT_8X13, WARNING_COLOR);
        Text::new("no arrivals reported", Point::new(6, 70), style).draw(target)?;
        return Ok(());
    }

    let mut y = 62;
    for record in &set.records {
        let minutes = record.countdown_minutes(now);

        let route_style = MonoTextStyle::new(&FONT_8X13, HEADER_COLOR);
        Text::new(&record.route_label, Point::new(6, y), route_style).draw(target)?;

        let clock = format_clock(record.scheduled_time);
        Text::new(&clock, Point::new(70, y), label_style).draw(target)?;

        let countdown = format_countdown(minutes);
        let countdown_style = MonoTextStyle::new(&FONT_8X13, countdown_color(minutes));
        Text::new(&countdown, Point::new(170, y), countdown_style).draw(target)?;

        y += 16;
        if y >= BOARD_HEIGHT as i32 {
            break;
        }
    }

    Ok(())
}

#[cfg(feature = "window")]
pub use simulator::WindowBackend;

#[cfg(feature = "window")]
mod simulator {
    use super::*;
    use crate::render::{BackendInitError, RenderBackend, RenderError};
    use embedded_graphics_simulator::{
        OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window,
    };

    pub struct WindowBackend {
        display: SimulatorDisplay<Rgb888>,
        window: Window,
    }

    impl WindowBackend {
        /// Open the board window. Fails on hosts with no display surface
        /// so the selector can fall through.
        pub fn new() -> Result<Self, BackendInitError> {
            if std::env::var_os("DISPLAY").is_none()
                && std::env::var_os("WAYLAND_DISPLAY").is_none()
            {
                return Err(BackendInitError::Headless);
            }

            let display =
                SimulatorDisplay::<Rgb888>::new(Size::new(BOARD_WIDTH, BOARD_HEIGHT));
            let settings = OutputSettingsBuilder::new().scale(2).build();
            let window = Window::new("Live Arrivals", &settings);

            Ok(WindowBackend { display, window })
        }
    }

    impl RenderBackend for WindowBackend {
        fn draw(
            &mut self,
            set: &ArrivalSet,
            stop_name: &str,
            now: DateTime<Local>,
        ) -> Result<(), RenderError> {
            // SimulatorDisplay drawing is infallible; surface loss shows up
            // through the event queue below.
            let _ = self.display.clear(Rgb888::BLACK);
            let _ = draw_board(&mut self.display, set, stop_name, now);

            self.window.update(&self.display);

            for event in self.window.events() {
                if let SimulatorEvent::Quit = event {
                    return Err(RenderError::SurfaceLost(
                        "window closed by user".to_string(),
                    ));
                }
            }
            Ok(())
        }

        fn shutdown(&mut self) {
            // The window closes when the backend is dropped; nothing else
            // holds the surface.
        }
    }
}
