use crate::model::config::ColorMap;

impl ColorMap {
    pub fn name(self) -> &'static str {
        match self {
            ColorMap::Jet => "jet",
            ColorMap::Viridis => "viridis",
            ColorMap::Hot => "hot",
            ColorMap::Gray => "gray",
        }
    }

    /// RGB in `[0, 1]` for `t` in `[0, 1]`.
    pub fn rgb(self, t: f64) -> [f64; 3] {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            ColorMap::Jet => [
                (1.5 - 4.0 * (t - 0.75).abs()).clamp(0.0, 1.0),
                (1.5 - 4.0 * (t - 0.5).abs()).clamp(0.0, 1.0),
                (1.5 - 4.0 * (t - 0.25).abs()).clamp(0.0, 1.0),
            ],
            // linear approximation of the perceptual map
            ColorMap::Viridis => [
                (0.267004 + t * (0.993248 - 0.267004)).clamp(0.0, 1.0),
                (0.004874 + t * (0.906157 - 0.004874)).clamp(0.0, 1.0),
                (0.329415 + t * (0.143936 - 0.329415) + t * t * 0.5).clamp(0.0, 1.0),
            ],
            ColorMap::Hot => {
                if t < 1.0 / 3.0 {
                    [3.0 * t, 0.0, 0.0]
                } else if t < 2.0 / 3.0 {
                    [1.0, 3.0 * t - 1.0, 0.0]
                } else {
                    [1.0, 1.0, 3.0 * t - 2.0]
                }
            }
            ColorMap::Gray => [t, t, t],
        }
    }

    pub fn rgb8(self, t: f64) -> [u8; 3] {
        self.rgb(t).map(|c| (c * 255.0).round() as u8)
    }

    /// Black on light backgrounds, white on dark ones.
    pub fn contrasting_rgb8(self) -> [u8; 3] {
        let bg = self.rgb(0.0);
        if (bg[0] + bg[1] + bg[2]) / 3.0 < 0.5 {
            [255, 255, 255]
        } else {
            [0, 0, 0]
        }
    }
}
