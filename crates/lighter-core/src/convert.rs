// ── Color temperature conversions ──
//
// Maps a Kelvin color temperature into each of the gateway's native color
// representations: mired for `ct`, 16-bit hue plus 8-bit saturation for
// `hs`, and CIE 1931 chromaticity for `xy`.

/// Valid input range of the Planckian locus approximation.
const LOCUS_MIN_KELVIN: f64 = 1667.0;
const LOCUS_MAX_KELVIN: f64 = 25000.0;

/// `round(1e6 / K)`, saturating at the `u16` range.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn kelvin_to_mired(kelvin: u32) -> u16 {
    let mired = (1_000_000.0 / f64::from(kelvin.max(1))).round();
    mired.clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Approximate sRGB color of a blackbody at `kelvin`, channels in `0.0..=1.0`.
fn kelvin_to_rgb(kelvin: u32) -> (f64, f64, f64) {
    let t = f64::from(kelvin.clamp(1000, 40000)) / 100.0;

    let red = if t <= 66.0 {
        255.0
    } else {
        329.698_727_446 * (t - 60.0).powf(-0.133_204_759_2)
    };

    let green = if t <= 66.0 {
        99.470_802_586_1 * t.ln() - 161.119_568_166_1
    } else {
        288.122_169_528_3 * (t - 60.0).powf(-0.075_514_849_2)
    };

    let blue = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_731_223_1 * (t - 10.0).ln() - 305.044_792_730_7
    };

    let unit = |c: f64| c.clamp(0.0, 255.0) / 255.0;
    (unit(red), unit(green), unit(blue))
}

/// Hue in degrees (`0.0..360.0`) and saturation (`0.0..=1.0`).
fn rgb_to_hs(red: f64, green: f64, blue: f64) -> (f64, f64) {
    let max = red.max(green).max(blue);
    let min = red.min(green).min(blue);
    let delta = max - min;

    let hue = if delta <= f64::EPSILON {
        0.0
    } else if (max - red).abs() < f64::EPSILON {
        60.0 * ((green - blue) / delta).rem_euclid(6.0)
    } else if (max - green).abs() < f64::EPSILON {
        60.0 * ((blue - red) / delta + 2.0)
    } else {
        60.0 * ((red - green) / delta + 4.0)
    };
    let saturation = if max <= f64::EPSILON { 0.0 } else { delta / max };

    (hue, saturation)
}

/// Gateway `hue` (`0..=65535`) and `sat` (`0..=255`) for `kelvin`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn kelvin_to_hue_sat(kelvin: u32) -> (u16, u8) {
    let (red, green, blue) = kelvin_to_rgb(kelvin);
    let (hue, saturation) = rgb_to_hs(red, green, blue);
    (
        (hue / 360.0 * 65535.0).round().clamp(0.0, 65535.0) as u16,
        (saturation * 255.0).round().clamp(0.0, 255.0) as u8,
    )
}

/// CIE xy of the Planckian locus at `kelvin`, rounded to four decimals.
///
/// Cubic spline of Kim et al.; inputs outside 1667K..=25000K are clamped.
pub fn kelvin_to_xy(kelvin: u32) -> [f64; 2] {
    let t = f64::from(kelvin).clamp(LOCUS_MIN_KELVIN, LOCUS_MAX_KELVIN);
    let (t2, t3) = (t * t, t * t * t);

    let x = if t <= 4000.0 {
        -0.266_123_9e9 / t3 - 0.234_358_9e6 / t2 + 0.877_695_6e3 / t + 0.179_910
    } else {
        -3.025_846_9e9 / t3 + 2.107_037_9e6 / t2 + 0.222_634_7e3 / t + 0.240_390
    };
    let (x2, x3) = (x * x, x * x * x);

    let y = if t <= 2222.0 {
        -1.106_381_4 * x3 - 1.348_110_20 * x2 + 2.185_558_32 * x - 0.202_196_83
    } else if t <= 4000.0 {
        -0.954_947_6 * x3 - 1.374_185_93 * x2 + 2.091_370_15 * x - 0.167_488_67
    } else {
        3.081_758_0 * x3 - 5.873_386_70 * x2 + 3.751_129_97 * x - 0.370_014_83
    };

    let round4 = |v: f64| (v * 10_000.0).round() / 10_000.0;
    [round4(x), round4(y)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mired_is_the_reciprocal() {
        assert_eq!(kelvin_to_mired(2000), 500);
        assert_eq!(kelvin_to_mired(6500), 154);
        assert_eq!(kelvin_to_mired(4000), 250);
        assert_eq!(kelvin_to_mired(3700), 270);
    }

    #[test]
    fn warm_white_is_orange_and_saturated() {
        let (hue, sat) = kelvin_to_hue_sat(2700);
        // Roughly 30 degrees.
        assert!((4000..7000).contains(&hue), "hue {hue}");
        assert!(sat > 100, "sat {sat}");
    }

    #[test]
    fn daylight_is_nearly_white() {
        let (_, sat) = kelvin_to_hue_sat(6500);
        assert!(sat < 20, "sat {sat}");
    }

    #[test]
    fn xy_follows_the_planckian_locus() {
        let [x, y] = kelvin_to_xy(6500);
        assert!((x - 0.3135).abs() < 0.002, "x {x}");
        assert!((y - 0.3237).abs() < 0.002, "y {y}");

        let [x, y] = kelvin_to_xy(2700);
        assert!((x - 0.46).abs() < 0.005, "x {x}");
        assert!((y - 0.41).abs() < 0.005, "y {y}");
    }

    #[test]
    fn xy_clamps_outside_the_locus_range() {
        assert_eq!(kelvin_to_xy(1000), kelvin_to_xy(1667));
        assert_eq!(kelvin_to_xy(40000), kelvin_to_xy(25000));
    }

    #[test]
    fn xy_is_rounded_to_four_decimals() {
        let [x, y] = kelvin_to_xy(3500);
        assert!(((x * 10_000.0).round() - x * 10_000.0).abs() < 1e-6);
        assert!(((y * 10_000.0).round() - y * 10_000.0).abs() < 1e-6);
    }
}
