//! Exact Kubernetes resource quantities.
//!
//! `k8s_openapi` models a quantity as an opaque string. Deciding whether a
//! storage request exceeds a restore size needs numeric comparison, so this
//! module parses the serialized form into an arbitrary-precision decimal
//! and renders it back in the API server's canonical form.
//!
//! Supported grammar (same as the API server):
//!
//! ```text
//! <quantity> ::= <sign><number><suffix>
//! <suffix>   ::= Ki | Mi | Gi | Ti | Pi | Ei
//!              | n | u | m | "" | k | M | G | T | P | E
//!              | e<signed-int> | E<signed-int>
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

/// Binary SI suffixes, indexed by power of 1024.
const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

/// Smallest decimal exponent the canonical form keeps (nano).
const MIN_CANONICAL_EXPONENT: i64 = -9;

/// Largest decimal exponent with a named SI suffix (exa).
const MAX_SI_EXPONENT: i64 = 18;

/// Errors produced while parsing a quantity string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Input was empty
    #[error("quantity is empty")]
    Empty,

    /// The numeric part is missing or malformed
    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),

    /// The suffix is not one of the recognised forms
    #[error("unknown suffix in quantity {0:?}")]
    UnknownSuffix(String),
}

/// Notation family a quantity was written in. The canonical form keeps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Powers of 1024 (`Ki`, `Mi`, ...)
    BinarySI,
    /// Powers of 1000 (`k`, `M`, ...) or no suffix
    #[default]
    DecimalSI,
    /// Scientific notation (`1e3`)
    DecimalExponent,
}

/// A parsed quantity: `(-1)^negative * digits * 10^exponent`.
///
/// `digits` holds the significant decimal digits, most significant first,
/// with no leading or trailing zeros. Zero is represented by empty `digits`.
#[derive(Debug, Clone)]
pub struct ParsedQuantity {
    negative: bool,
    digits: Vec<u8>,
    exponent: i64,
    format: Format,
}

impl ParsedQuantity {
    /// Parse a quantity string.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        if input.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, rest) = if let Some(rest) = input.strip_prefix('-') {
            (true, rest)
        } else {
            (false, input.strip_prefix('+').unwrap_or(input))
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(QuantityError::InvalidNumber(input.to_string()));
        }

        let mut digits: Vec<u8> = whole
            .bytes()
            .chain(fraction.bytes())
            .map(|b| b - b'0')
            .collect();
        let mut exponent = -(fraction.len() as i64);

        let (format, scale) = parse_suffix(suffix)
            .ok_or_else(|| QuantityError::UnknownSuffix(input.to_string()))?;
        match scale {
            Scale::Decimal(e) => exponent += e,
            Scale::Binary(power) => {
                for _ in 0..power {
                    digits = mul_small(&digits, 1024);
                }
            }
        }

        Ok(Self::normalized(negative, digits, exponent, format))
    }

    /// Whether this quantity is exactly zero
    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    /// Notation family the quantity was parsed from
    pub fn format(&self) -> Format {
        self.format
    }

    /// Render the quantity in the API server's canonical form.
    ///
    /// `20Gi` stays `20Gi`, `1.5Gi` becomes `1536Mi`, `1500M` stays `1500M`,
    /// `1000M` becomes `1G`, values below 1024 written in binary notation fall
    /// back to decimal (`0.5Ki` becomes `512`).
    pub fn canonical(&self) -> String {
        if self.is_zero() {
            return "0".to_string();
        }

        let rounded = self.round_up_to_nano();
        let sign = if rounded.negative { "-" } else { "" };

        let mut format = rounded.format;
        if format == Format::BinarySI {
            let below_1024 = rounded.digits.len() as i64 + rounded.exponent <= 4
                && rounded.integer_digits().is_none_or(|d| digits_lt(&d, &[1, 0, 2, 4]));
            if rounded.exponent < 0 || below_1024 {
                format = Format::DecimalSI;
            }
        }

        match format {
            Format::BinarySI => {
                // Integral and >= 1024 here.
                let mut value = rounded.integer_digits().unwrap_or_default();
                let mut power = 0;
                while power + 1 < BINARY_SUFFIXES.len() {
                    match div_small_exact(&value, 1024) {
                        Some(quotient) => {
                            value = quotient;
                            power += 1;
                        }
                        None => break,
                    }
                }
                let suffix = BINARY_SUFFIXES.get(power).copied().unwrap_or_default();
                format!("{sign}{}{suffix}", digits_to_string(&value))
            }
            Format::DecimalSI | Format::DecimalExponent => {
                let mut target = rounded.exponent.div_euclid(3) * 3;
                if format == Format::DecimalSI {
                    target = target.min(MAX_SI_EXPONENT);
                }
                let mut mantissa = rounded.digits.clone();
                mantissa.extend(std::iter::repeat_n(0, (rounded.exponent - target) as usize));
                let suffix = match format {
                    Format::DecimalSI => decimal_suffix(target).to_string(),
                    _ if target == 0 => String::new(),
                    _ => format!("e{target}"),
                };
                format!("{sign}{}{suffix}", digits_to_string(&mantissa))
            }
        }
    }

    fn normalized(negative: bool, mut digits: Vec<u8>, mut exponent: i64, format: Format) -> Self {
        let leading = digits.iter().take_while(|d| **d == 0).count();
        digits.drain(..leading);
        while digits.last() == Some(&0) {
            digits.pop();
            exponent += 1;
        }
        if digits.is_empty() {
            return Self {
                negative: false,
                digits,
                exponent: 0,
                format,
            };
        }
        Self {
            negative,
            digits,
            exponent,
            format,
        }
    }

    /// Sub-nano precision is rounded away from zero.
    fn round_up_to_nano(&self) -> Self {
        if self.exponent >= MIN_CANONICAL_EXPONENT {
            return self.clone();
        }
        let drop = (MIN_CANONICAL_EXPONENT - self.exponent) as usize;
        let keep = self.digits.len().saturating_sub(drop);
        let kept = add_one(self.digits.get(..keep).unwrap_or_default());
        Self::normalized(self.negative, kept, MIN_CANONICAL_EXPONENT, self.format)
    }

    /// The full integer digits, if the value has no fractional part.
    fn integer_digits(&self) -> Option<Vec<u8>> {
        if self.exponent < 0 {
            return None;
        }
        let mut digits = self.digits.clone();
        digits.extend(std::iter::repeat_n(0, self.exponent as usize));
        Some(digits)
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        match (self.is_zero(), other.is_zero()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        let self_order = self.digits.len() as i64 + self.exponent;
        let other_order = other.digits.len() as i64 + other.exponent;
        // Same order of magnitude and no trailing zeros: digit-wise comparison
        // is exact, a strict prefix being the smaller value.
        self_order
            .cmp(&other_order)
            .then_with(|| self.digits.cmp(&other.digits))
    }
}

impl PartialEq for ParsedQuantity {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ParsedQuantity {}

impl PartialOrd for ParsedQuantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ParsedQuantity {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.cmp_magnitude(other),
            (true, true) => other.cmp_magnitude(self),
        }
    }
}

impl FromStr for ParsedQuantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&Quantity> for ParsedQuantity {
    type Error = QuantityError;

    fn try_from(quantity: &Quantity) -> Result<Self, Self::Error> {
        Self::parse(&quantity.0)
    }
}

impl fmt::Display for ParsedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

enum Scale {
    Decimal(i64),
    Binary(u32),
}

fn parse_suffix(suffix: &str) -> Option<(Format, Scale)> {
    let decimal = |e| Some((Format::DecimalSI, Scale::Decimal(e)));
    let binary = |p| Some((Format::BinarySI, Scale::Binary(p)));
    match suffix {
        "" => decimal(0),
        "n" => decimal(-9),
        "u" => decimal(-6),
        "m" => decimal(-3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        _ => {
            let exponent = suffix.strip_prefix(['e', 'E'])?;
            let unsigned = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            // i32 keeps every later exponent computation far from i64 overflow.
            let e = exponent.parse::<i32>().ok()?;
            Some((Format::DecimalExponent, Scale::Decimal(i64::from(e))))
        }
    }
}

fn decimal_suffix(exponent: i64) -> &'static str {
    match exponent {
        -9 => "n",
        -6 => "u",
        -3 => "m",
        3 => "k",
        6 => "M",
        9 => "G",
        12 => "T",
        15 => "P",
        18 => "E",
        _ => "",
    }
}

fn digits_to_string(digits: &[u8]) -> String {
    if digits.is_empty() {
        return "0".to_string();
    }
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

/// Compare two integers given as digit vectors without leading zeros.
fn digits_lt(a: &[u8], b: &[u8]) -> bool {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b)) == Ordering::Less
}

fn mul_small(digits: &[u8], factor: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(digits.len() + 4);
    let mut carry = 0u32;
    for d in digits.iter().rev() {
        let v = u32::from(*d) * factor + carry;
        out.push((v % 10) as u8);
        carry = v / 10;
    }
    while carry > 0 {
        out.push((carry % 10) as u8);
        carry /= 10;
    }
    out.reverse();
    out
}

/// Divide by `divisor`, returning `None` when there is a remainder.
fn div_small_exact(digits: &[u8], divisor: u32) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(digits.len());
    let mut remainder = 0u32;
    for d in digits {
        let v = remainder * 10 + u32::from(*d);
        out.push((v / divisor) as u8);
        remainder = v % divisor;
    }
    if remainder != 0 {
        return None;
    }
    let leading = out.iter().take_while(|d| **d == 0).count();
    out.drain(..leading);
    Some(out)
}

fn add_one(digits: &[u8]) -> Vec<u8> {
    let mut out = digits.to_vec();
    for d in out.iter_mut().rev() {
        if *d == 9 {
            *d = 0;
        } else {
            *d += 1;
            return out;
        }
    }
    out.insert(0, 1);
    out
}
