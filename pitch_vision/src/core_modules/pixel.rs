// THEORY (Single-Pixel Color Transforms):
// The `Pixel` module is the most fundamental unit of the color layer. It is a
// "dumb" data container for one RGB pixel plus the two transforms the team layer
// needs, both computable from this pixel alone:
//
// - HSV on the 8-bit OpenCV scale (H in 0..180, S and V in 0..255). This is the
//   space in which the pitch-grass band is defined, so background masking is a
//   simple inclusive range check.
// - CIE L*a*b* (D65 white, 2 degree observer). This is the perceptually uniform
//   space used to compare jersey colors: Euclidean distance there tracks how
//   different two colors look, and L* alone orders teams from dark to light.
//
// The sRGB -> linear conversion behind L*a*b* uses a 256-entry `OnceLock` LUT;
// the hot path is a table lookup rather than a `powf` per pixel.

pub mod pixel {
    use std::sync::OnceLock;

    pub type Channel = u8;
    pub type NormalizedChannel = f32;

    // D65 reference white, 2 degree observer.
    const WHITE_X: f64 = 0.95047;
    const WHITE_Y: f64 = 1.0;
    const WHITE_Z: f64 = 1.08883;

    static SRGB_TO_LINEAR_LUT: OnceLock<[NormalizedChannel; 256]> = OnceLock::new();

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
    }

    /// HSV on the 8-bit OpenCV scale.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hsv {
        /// Hue in half-degrees, 0..180.
        pub hue: u8,
        pub saturation: u8,
        pub value: u8,
    }

    impl Hsv {
        /// Inclusive per-channel range check.
        pub fn within(&self, lower: [u8; 3], upper: [u8; 3]) -> bool {
            let channels = [self.hue, self.saturation, self.value];
            channels
                .iter()
                .zip(lower.iter().zip(upper.iter()))
                .all(|(c, (lo, hi))| c >= lo && c <= hi)
        }
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        #[inline]
        fn srgb_to_linear(srgb_value: Channel) -> NormalizedChannel {
            let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
                let mut table = [0.0f32; 256];
                for (i, entry) in table.iter_mut().enumerate() {
                    let srgb_normalized = i as NormalizedChannel / 255.0;
                    *entry = if srgb_normalized <= 0.04045 {
                        srgb_normalized / 12.92
                    } else {
                        ((srgb_normalized + 0.055) / 1.055).powf(2.4)
                    };
                }
                table
            });
            table[srgb_value as usize]
        }

        /// HSV with OpenCV's 8-bit conventions: V = max, S = 255 * chroma / V,
        /// H = hue degrees / 2, each rounded to the nearest integer.
        pub fn hsv(&self) -> Hsv {
            let r = self.red as f32;
            let g = self.green as f32;
            let b = self.blue as f32;
            let max = r.max(g.max(b));
            let min = r.min(g.min(b));
            let chroma = max - min;

            let saturation = if max > 0.0 { 255.0 * chroma / max } else { 0.0 };

            let hue_degrees = if chroma <= 0.0 {
                0.0
            } else if max == r {
                60.0 * (g - b) / chroma
            } else if max == g {
                120.0 + 60.0 * (b - r) / chroma
            } else {
                240.0 + 60.0 * (r - g) / chroma
            };
            let hue_degrees = if hue_degrees < 0.0 { hue_degrees + 360.0 } else { hue_degrees };
            // 360 degrees wraps back onto 0 after halving and rounding.
            let hue = ((hue_degrees / 2.0).round() as u32 % 180) as u8;

            Hsv {
                hue,
                saturation: saturation.round() as u8,
                value: max as u8,
            }
        }

        /// CIE L*a*b* coordinates `(L*, a*, b*)`.
        pub fn lab(&self) -> (f64, f64, f64) {
            let r = Self::srgb_to_linear(self.red) as f64;
            let g = Self::srgb_to_linear(self.green) as f64;
            let b = Self::srgb_to_linear(self.blue) as f64;

            let x = 0.412453 * r + 0.357580 * g + 0.180423 * b;
            let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
            let z = 0.019334 * r + 0.119193 * g + 0.950227 * b;

            let fx = lab_f(x / WHITE_X);
            let fy = lab_f(y / WHITE_Y);
            let fz = lab_f(z / WHITE_Z);

            let lightness = if y / WHITE_Y > 0.008856 {
                116.0 * fy - 16.0
            } else {
                903.3 * (y / WHITE_Y)
            };
            (lightness, 500.0 * (fx - fy), 200.0 * (fy - fz))
        }
    }

    fn lab_f(t: f64) -> f64 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    impl From<image::Rgb<u8>> for Pixel {
        fn from(rgb: image::Rgb<u8>) -> Self {
            let [red, green, blue] = rgb.0;
            Pixel::new(red, green, blue)
        }
    }
}
