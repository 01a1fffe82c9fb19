/// Places ticks at every integer multiple of `base` inside the view interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultipleLocator {
    pub base: f64,
}

impl MultipleLocator {
    pub fn new(base: f64) -> Self {
        Self { base }
    }

    pub fn tick_values(&self, vmin: f64, vmax: f64) -> Vec<f64> {
        if !(self.base > 0.0) || !vmin.is_finite() || !vmax.is_finite() {
            return Vec::new();
        }
        let (lo, hi) = if vmin <= vmax { (vmin, vmax) } else { (vmax, vmin) };

        // Tolerate float noise at the interval edges
        let eps = 1e-9;
        let first = (lo / self.base - eps).ceil() as i64;
        let last = (hi / self.base + eps).floor() as i64;

        (first..=last)
            .map(|k| {
                let v = k as f64 * self.base;
                if v == 0.0 { 0.0 } else { v }
            })
            .collect()
    }
}

/// Formats like printf `%g`: six significant digits, trailing zeros dropped,
/// scientific notation below 1e-4 and from 1e6 up.
pub fn format_g(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_owned();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    // Round to six significant digits first so the exponent reflects carries
    let sci = format!("{:.5e}", x);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    if (-4..6).contains(&exp) {
        let decimals = (5 - exp).max(0) as usize;
        trim_fraction(format!("{:.*}", decimals, x))
    } else {
        let mantissa = trim_fraction(mantissa.to_owned());
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    }
}

fn trim_fraction(s: String) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_owned()
    } else {
        s
    }
}

/// Tick label text for the x axis.
///
/// Values strictly between -1 and 1 (other than zero) lose their leading
/// "0", so 0.7 becomes ".7" and -0.4 becomes "-.4". Everything else is
/// plain `%g` output.
pub fn format_tick(x: f64) -> String {
    let val = format_g(x);
    if x.abs() > 0.0 && x.abs() < 1.0 {
        val.replacen('0', "", 1)
    } else {
        val
    }
}
