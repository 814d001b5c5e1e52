/// Colourspace view shown on the main surface. Exactly one is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EffectMode {
    #[default]
    Original,
    Grayscale,
    Hsv,
    Hsl,
}

impl EffectMode {
    pub const ALL: [EffectMode; 4] = [
        EffectMode::Original,
        EffectMode::Grayscale,
        EffectMode::Hsv,
        EffectMode::Hsl,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EffectMode::Original => "Original",
            EffectMode::Grayscale => "Grayscale",
            EffectMode::Hsv => "HSV",
            EffectMode::Hsl => "HSL",
        }
    }
}

/// A stage of the filter pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Sobel,
    Canny,
    Laplacian,
    Blur,
}

impl Filter {
    pub fn label(self) -> &'static str {
        match self {
            Filter::Sobel => "Sobel",
            Filter::Canny => "Canny",
            Filter::Laplacian => "Laplacian",
            Filter::Blur => "Blur",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Independent on/off flags for each filter stage.
pub struct FilterToggleSet {
    pub sobel: bool,
    pub canny: bool,
    pub laplacian: bool,
    pub blur: bool,
}

impl FilterToggleSet {
    pub fn is_active(&self, filter: Filter) -> bool {
        match filter {
            Filter::Sobel => self.sobel,
            Filter::Canny => self.canny,
            Filter::Laplacian => self.laplacian,
            Filter::Blur => self.blur,
        }
    }

    pub fn set(&mut self, filter: Filter, on: bool) {
        let flag = match filter {
            Filter::Sobel => &mut self.sobel,
            Filter::Canny => &mut self.canny,
            Filter::Laplacian => &mut self.laplacian,
            Filter::Blur => &mut self.blur,
        };
        *flag = on;
    }

    pub fn toggle(&mut self, filter: Filter) {
        let on = self.is_active(filter);
        self.set(filter, !on);
    }
}

/// Slider position that maps to the identity contrast multiplier.
pub const SLIDER_DEFAULT: u8 = 50;
pub const SLIDER_MAX: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
/// Contrast multiplier and brightness offset applied to the normalized source.
pub struct AdjustmentParams {
    pub contrast: f32,
    pub brightness: f32,
}

impl Default for AdjustmentParams {
    fn default() -> Self {
        Self {
            contrast: 1.0,
            brightness: 0.0,
        }
    }
}

impl AdjustmentParams {
    pub fn set_contrast_slider(&mut self, raw: u8) {
        self.contrast = contrast_from_slider(raw);
    }

    pub fn set_brightness_slider(&mut self, raw: u8) {
        self.brightness = brightness_from_slider(raw);
    }
}

/// Maps a 0..=100 slider to a multiplier; 50 is identity.
pub fn contrast_from_slider(raw: u8) -> f32 {
    raw.min(SLIDER_MAX) as f32 / 50.0
}

/// Maps a 0..=100 slider to a normalized offset; 0 is identity.
pub fn brightness_from_slider(raw: u8) -> f32 {
    raw.min(SLIDER_MAX) as f32 / 200.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
/// Everything a render depends on besides the source image.
pub struct EffectState {
    pub mode: EffectMode,
    pub filters: FilterToggleSet,
    pub adjust: AdjustmentParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_original_unfiltered_identity() {
        let s = EffectState::default();
        assert_eq!(s.mode, EffectMode::Original);
        assert_eq!(s.filters, FilterToggleSet::default());
        assert_eq!(s.adjust.contrast, 1.0);
        assert_eq!(s.adjust.brightness, 0.0);
    }

    #[test]
    fn slider_mappings_hit_documented_points() {
        assert_eq!(contrast_from_slider(50), 1.0);
        assert_eq!(contrast_from_slider(100), 2.0);
        assert_eq!(contrast_from_slider(0), 0.0);
        assert_eq!(brightness_from_slider(0), 0.0);
        assert_eq!(brightness_from_slider(100), 0.5);
    }

    #[test]
    fn slider_values_above_range_are_clamped() {
        assert_eq!(contrast_from_slider(250), 2.0);
        assert_eq!(brightness_from_slider(101), 0.5);
    }

    #[test]
    fn toggle_flips_only_the_named_flag() {
        let mut set = FilterToggleSet::default();
        set.toggle(Filter::Canny);
        assert!(set.canny);
        assert!(!set.sobel && !set.laplacian && !set.blur);
        set.toggle(Filter::Canny);
        assert_eq!(set, FilterToggleSet::default());
    }
}
