//! Pin values.
//!
//! A one-bit pin carries [`Signal::Bit`], a wider pin carries
//! [`Signal::Bits`] of exactly its width, and any pin may carry
//! [`Signal::Unknown`] when its value could not be resolved this tick.

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The value on a single pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Signal {
    /// Not resolvable this tick. Propagates through computation.
    #[default]
    Unknown,
    /// A one-bit value.
    Bit(bool),
    /// A multi-bit value, most significant bit first.
    Bits(Vec<bool>),
}

impl Signal {
    /// The zero value for a pin of `width` bits.
    pub fn zero(width: usize) -> Self {
        if width == 1 {
            Signal::Bit(false)
        } else {
            Signal::Bits(vec![false; width])
        }
    }

    /// Build a value from bits, using the one-bit form when `bits.len() == 1`.
    pub fn from_bits(bits: Vec<bool>) -> Self {
        match bits.as_slice() {
            [bit] => Signal::Bit(*bit),
            _ => Signal::Bits(bits),
        }
    }

    /// Width of the value, or `None` for [`Signal::Unknown`].
    pub fn width(&self) -> Option<usize> {
        match self {
            Signal::Unknown => None,
            Signal::Bit(_) => Some(1),
            Signal::Bits(bits) => Some(bits.len()),
        }
    }

    /// Whether the value may sit on a pin of `width` bits.
    pub fn fits(&self, width: usize) -> bool {
        match self {
            Signal::Unknown => true,
            Signal::Bit(_) => width == 1,
            Signal::Bits(bits) => width != 1 && bits.len() == width,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Signal::Unknown)
    }

    /// The value as a single bit, if it is one.
    pub fn as_bit(&self) -> Option<bool> {
        match self {
            Signal::Bit(bit) => Some(*bit),
            _ => None,
        }
    }

    /// Append this value's bits to `out`, or return `false` if unknown.
    pub(crate) fn flatten_into(&self, out: &mut Vec<bool>) -> bool {
        match self {
            Signal::Unknown => false,
            Signal::Bit(bit) => {
                out.push(*bit);
                true
            }
            Signal::Bits(bits) => {
                out.extend_from_slice(bits);
                true
            }
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Unknown => write!(f, "?"),
            Signal::Bit(bit) => write!(f, "{}", u8::from(*bit)),
            Signal::Bits(bits) => bits.iter().try_for_each(|bit| write!(f, "{}", u8::from(*bit))),
        }
    }
}

impl From<bool> for Signal {
    fn from(bit: bool) -> Self {
        Signal::Bit(bit)
    }
}

/// Zero values for a list of pin widths.
pub fn zeros(widths: &[usize]) -> Vec<Signal> {
    widths.iter().map(|&width| Signal::zero(width)).collect()
}

/// Reshape `values` to `widths`, zeroing every slot that is missing or whose
/// width no longer matches.
pub fn conform(values: &[Signal], widths: &[usize]) -> Vec<Signal> {
    widths
        .iter()
        .enumerate()
        .map(|(i, &width)| match values.get(i) {
            Some(value) if value.fits(width) => value.clone(),
            _ => Signal::zero(width),
        })
        .collect()
}

/// Whether every value fits its pin and the counts agree.
pub fn matches_widths(values: &[Signal], widths: &[usize]) -> bool {
    values.len() == widths.len() && values.iter().zip(widths).all(|(v, &w)| v.fits(w))
}

// Signals persist as `0`/`1`, arrays of bits, or `null`.
impl Serialize for Signal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Signal::Unknown => serializer.serialize_none(),
            Signal::Bit(bit) => serializer.serialize_u8(u8::from(*bit)),
            Signal::Bits(bits) => {
                let raw: Vec<u8> = bits.iter().map(|b| u8::from(*b)).collect();
                raw.serialize(serializer)
            }
        }
    }
}

struct SignalVisitor;

impl<'de> Visitor<'de> for SignalVisitor {
    type Value = Signal;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0, 1, an array of bits, or null")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Signal, E> {
        Ok(Signal::Unknown)
    }

    fn visit_none<E: de::Error>(self) -> Result<Signal, E> {
        Ok(Signal::Unknown)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Signal, D::Error> {
        deserializer.deserialize_any(SignalVisitor)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Signal, E> {
        Ok(Signal::Bit(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Signal, E> {
        match v {
            0 => Ok(Signal::Bit(false)),
            1 => Ok(Signal::Bit(true)),
            _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Signal, E> {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
        }
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Signal, A::Error> {
        let mut bits = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(raw) = seq.next_element::<u8>()? {
            match raw {
                0 => bits.push(false),
                1 => bits.push(true),
                other => {
                    return Err(de::Error::invalid_value(
                        de::Unexpected::Unsigned(other.into()),
                        &"a bit",
                    ))
                }
            }
        }
        Ok(Signal::Bits(bits))
    }
}

impl<'de> Deserialize<'de> for Signal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SignalVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_uses_scalar_form_for_single_bits() {
        assert_eq!(Signal::zero(1), Signal::Bit(false));
        assert_eq!(Signal::zero(3), Signal::Bits(vec![false; 3]));
    }

    #[test]
    fn fits_is_strict_about_form() {
        assert!(Signal::Bit(true).fits(1));
        assert!(!Signal::Bit(true).fits(2));
        assert!(!Signal::Bits(vec![true]).fits(1));
        assert!(Signal::Bits(vec![true, false]).fits(2));
        assert!(Signal::Unknown.fits(8));
    }

    #[test]
    fn conform_zeroes_mismatched_slots() {
        let values = vec![Signal::Bit(true), Signal::Bits(vec![true, true])];
        let conformed = conform(&values, &[1, 3, 1]);
        assert_eq!(
            conformed,
            vec![Signal::Bit(true), Signal::zero(3), Signal::Bit(false)]
        );
    }

    #[test]
    fn json_form() {
        let values = vec![Signal::Bit(true), Signal::Bits(vec![false, true]), Signal::Unknown];
        let text = serde_json::to_string(&values).unwrap();
        assert_eq!(text, "[1,[0,1],null]");
        let back: Vec<Signal> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, values);
        assert!(serde_json::from_str::<Signal>("2").is_err());
    }

    #[test]
    fn display_prints_bits() {
        assert_eq!(Signal::Bits(vec![true, false, true]).to_string(), "101");
        assert_eq!(Signal::Unknown.to_string(), "?");
    }
}
