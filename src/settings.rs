use std::str::FromStr;

use crate::audio::DEFAULT_CAPACITY;
use crate::render::RenderSettings;

/// Prefix of every environment override, e.g. `XY_SCOPE_FPS=120`
const ENV_PREFIX: &str = "XY_SCOPE_";

/// Runtime settings.
///
/// Built from defaults, then overridden field by field from
/// `XY_SCOPE_*` environment variables. Nothing is read from or written to
/// disk.
#[derive(Clone, Debug)]
pub struct ScopeSettings {
    // Window
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub show_menu: bool,

    // Capture
    pub default_device: usize,
    /// Scalars per capture buffer half, a power of two
    pub buffer_capacity: usize,

    // Display
    pub render: RenderSettings,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            fps: 60,
            show_menu: true,

            default_device: 0,
            buffer_capacity: DEFAULT_CAPACITY,

            render: RenderSettings::default(),
        }
    }
}

impl ScopeSettings {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides looked up by key (`WIDTH`, `FPS`, ...).
    ///
    /// Values that do not parse or are out of range are logged and skipped.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let positive = |v: &u32| *v > 0;

        if let Some(v) = parse(&lookup, "WIDTH", positive) {
            self.width = v;
        }
        if let Some(v) = parse(&lookup, "HEIGHT", positive) {
            self.height = v;
        }
        if let Some(v) = parse(&lookup, "FPS", positive) {
            self.fps = v;
        }
        if let Some(v) = parse(&lookup, "DEVICE", |_: &usize| true) {
            self.default_device = v;
        }
        if let Some(v) = parse(&lookup, "BUFFER", |v: &usize| v.is_power_of_two() && *v >= 2) {
            self.buffer_capacity = v;
        }
        if let Some(v) = parse(&lookup, "INTENSITY", |v: &f32| v.is_finite() && *v > 0.0) {
            self.render.intensity_gain = v;
        }
        if let Some(v) = parse(&lookup, "LINE_WIDTH", |v: &f32| v.is_finite() && *v > 0.0) {
            self.render.line_width_ratio = v;
        }
        self
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    valid: impl Fn(&T) -> bool,
) -> Option<T>
where
    T: FromStr + std::fmt::Debug,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => {
            log::debug!("Setting {}{} = {:?}", ENV_PREFIX, key, value);
            Some(value)
        }
        Ok(value) => {
            log::warn!("Ignoring {}{}: {:?} is out of range", ENV_PREFIX, key, value);
            None
        }
        Err(_) => {
            log::warn!("Ignoring {}{}: cannot parse {:?}", ENV_PREFIX, key, raw);
            None
        }
    }
}
