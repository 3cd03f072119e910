use std::f64::consts::{E, PI};

use crate::number::Number;

const GAMMA_G: f64 = 4.7421875;
#[allow(clippy::excessive_precision)]
const GAMMA_P: [f64; 15] = [
    0.999_999_999_999_997_091_82,
    57.156_235_665_862_923_517,
    -59.597_960_355_475_491_248,
    14.136_097_974_741_747_174,
    -0.491_913_816_097_620_199_78,
    0.339_946_499_848_118_886_99e-4,
    0.465_236_289_270_485_756_65e-4,
    -0.983_744_753_048_795_646_77e-4,
    0.158_088_703_224_912_488_84e-3,
    -0.210_264_441_724_104_883_19e-3,
    0.217_439_618_115_212_643_20e-3,
    -0.164_318_106_536_763_890_22e-3,
    0.844_182_239_838_527_432_93e-4,
    -0.261_908_384_015_814_086_70e-4,
    0.368_991_826_595_316_227_04e-5,
];

fn is_integer(n: f64) -> bool {
    n.is_finite() && n == Number::new(n).round().value()
}

pub fn gamma(n: f64) -> f64 {
    if is_integer(n) {
        if n <= 0.0 {
            return if n.is_finite() { f64::INFINITY } else { f64::NAN };
        }

        if n > 171.0 {
            return f64::INFINITY;
        }

        let mut value = n - 2.0;
        let mut res = n - 1.0;
        while value > 1.0 {
            res *= value;
            value -= 1.0;
        }

        return if res == 0.0 { 1.0 } else { res };
    }

    if n < 0.5 {
        return PI / ((PI * n).sin() * gamma(1.0 - n));
    }

    if n >= 171.35 {
        return f64::INFINITY;
    }

    if n > 85.0 {
        let two_n = n * n;
        let three_n = two_n * n;
        let four_n = three_n * n;
        let five_n = four_n * n;
        return (2.0 * PI / n).sqrt()
            * (n / E).powf(n)
            * (1.0 + 1.0 / (12.0 * n) + 1.0 / (288.0 * two_n)
                - 139.0 / (51840.0 * three_n)
                - 571.0 / (2_488_320.0 * four_n)
                + 163_879.0 / (209_018_880.0 * five_n)
                + 5_246_819.0 / (75_246_796_800.0 * five_n * n));
    }

    let n = n - 1.0;
    let x = GAMMA_P
        .iter()
        .enumerate()
        .skip(1)
        .fold(GAMMA_P[0], |x, (i, p)| x + p / (n + i as f64));
    let t = n + GAMMA_G + 0.5;

    (2.0 * PI).sqrt() * t.powf(n + 0.5) * (-t).exp() * x
}

/// Power with the edge cases of `Math.pow`.
pub fn pow(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        f64::NAN
    } else {
        base.powf(exponent)
    }
}

pub fn sign(n: f64) -> f64 {
    if n.is_nan() || n == 0.0 { n } else { n.signum() }
}

pub fn hypot(values: &[f64]) -> f64 {
    if values.iter().any(|v| v.is_infinite()) {
        f64::INFINITY
    } else {
        values.iter().fold(0.0, |acc, v| acc.hypot(*v))
    }
}

/// Rounds `value` to `exp` decimal places by shifting the decimal exponent of its string
/// form, so `roundTo(1.005, 2)` is `1.01`. A negative `exp` rounds to tens, hundreds, ...
pub fn round_to(value: f64, exp: f64) -> f64 {
    let exp = -exp;

    if value.is_nan() || !is_integer(exp) {
        return f64::NAN;
    }

    let shift = |n: Number, by: f64| -> Number {
        let text = n.to_string();
        let (mantissa, exponent) = match text.split_once('e') {
            Some((mantissa, exponent)) => (mantissa.to_string(), Number::parse(exponent).value() + by),
            None => (text, by),
        };
        Number::parse(&format!("{}e{}", mantissa, Number::new(exponent)))
    };

    let shifted = shift(Number::new(value), -exp).round();
    shift(shifted, exp).value()
}

/// ECMAScript `ToInt32`.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc().rem_euclid(4_294_967_296.0) as u32) as i32
}

/// A uniform value in `[0, 1)`.
pub fn random() -> Result<f64, getrandom::Error> {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes)?;
    Ok((u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64)
}
