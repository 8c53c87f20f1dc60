//! `name = value` rendering of offset parameters for PRM files, with the
//! `%g` numeric convention GMTSAR tools write.

use crate::types::OffsetParameters;
use std::fmt;

/// Significant digits of the general (`%g`) format
const GENERAL_PRECISION: usize = 6;

/// Round to the precision of the general (`%g`) format, 6 significant digits
pub fn round_general(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{:.*e}", GENERAL_PRECISION - 1, value)
        .parse()
        .unwrap_or(value)
}

/// Format a value like C `%g`: 6 significant digits, trailing zeros
/// removed, exponent notation outside `1e-4 <= |v| < 1e6`
pub fn format_general(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let sci = format!("{:.*e}", GENERAL_PRECISION - 1, value);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exponent < -4 || exponent >= GENERAL_PRECISION as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    } else {
        let decimals = (GENERAL_PRECISION as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

impl OffsetParameters {
    /// PRM keys in the order GMTSAR writes them
    pub const KEYS: [&'static str; 8] = [
        "rshift",
        "sub_int_r",
        "stretch_r",
        "a_stretch_r",
        "ashift",
        "sub_int_a",
        "stretch_a",
        "a_stretch_a",
    ];

    /// `(key, value)` pairs for merging into a parameter store
    pub fn entries(&self) -> [(&'static str, f64); 8] {
        let values = [
            self.rshift as f64,
            self.sub_int_r,
            self.stretch_r,
            self.a_stretch_r,
            self.ashift as f64,
            self.sub_int_a,
            self.stretch_a,
            self.a_stretch_a,
        ];
        let mut entries = [("", 0.0); 8];
        for (entry, (key, value)) in entries.iter_mut().zip(Self::KEYS.iter().zip(values)) {
            *entry = (*key, value);
        }
        entries
    }

    /// Value of a single PRM key
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries()
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    }

    /// Render as PRM `name = value` lines
    pub fn to_prm_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OffsetParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rshift = {}", self.rshift)?;
        writeln!(f, "sub_int_r = {}", format_general(self.sub_int_r))?;
        writeln!(f, "stretch_r = {}", format_general(self.stretch_r))?;
        writeln!(f, "a_stretch_r = {}", format_general(self.a_stretch_r))?;
        writeln!(f, "ashift = {}", self.ashift)?;
        writeln!(f, "sub_int_a = {}", format_general(self.sub_int_a))?;
        writeln!(f, "stretch_a = {}", format_general(self.stretch_a))?;
        writeln!(f, "a_stretch_a = {}", format_general(self.a_stretch_a))
    }
}
