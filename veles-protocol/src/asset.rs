//! Symbol-tagged fixed-point asset values
//!
//! An [`Asset`] is a signed 64-bit amount tagged with a [`Symbol`] that
//! encodes its decimal precision. Arithmetic between assets of different
//! symbols fails with [`Error::SymbolMismatch`]; there is no implicit
//! conversion between symbols. Ratio multiplication widens to i128 before
//! narrowing back so intermediate products cannot overflow silently.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Currency tag: packed u64, low byte is the decimal precision, bytes 1..7
/// hold the ASCII ticker (NUL-padded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub u64);

/// Core liquid token, 3 decimal places
pub const VLS: Symbol = Symbol(3 | (b'V' as u64) << 8 | (b'L' as u64) << 16 | (b'S' as u64) << 24);

/// Debt token, 3 decimal places
pub const VBD: Symbol = Symbol(3 | (b'V' as u64) << 8 | (b'B' as u64) << 16 | (b'D' as u64) << 24);

impl Symbol {
    /// Build a symbol from a ticker (1..=6 uppercase ASCII letters) and precision
    pub fn new(ticker: &str, precision: u8) -> Result<Self> {
        if ticker.is_empty()
            || ticker.len() > 6
            || !ticker.bytes().all(|b| b.is_ascii_uppercase())
        {
            return Err(Error::InvalidValue(format!("Bad asset ticker: {ticker}")));
        }
        if precision > 12 {
            return Err(Error::InvalidValue(format!(
                "Asset precision too large: {precision}"
            )));
        }
        let mut packed = precision as u64;
        for (i, b) in ticker.bytes().enumerate() {
            packed |= (b as u64) << (8 * (i + 1));
        }
        Ok(Symbol(packed))
    }

    /// Decimal precision (digits after the point)
    pub fn precision(&self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// `10^precision`, the scale of one whole unit
    pub fn unit(&self) -> i64 {
        10i64.pow(self.precision() as u32)
    }

    /// Ticker string
    pub fn ticker(&self) -> String {
        let mut out = String::new();
        let mut rest = self.0 >> 8;
        while rest > 0 {
            let b = (rest & 0xff) as u8;
            if b == 0 {
                break;
            }
            out.push(b as char);
            rest >>= 8;
        }
        out
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ticker())
    }
}

/// Fixed-point quantity of a single symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    /// Raw amount in `10^-precision` units
    pub amount: i64,
    /// Currency tag
    pub symbol: Symbol,
}

impl Asset {
    /// Create from a raw (already scaled) amount
    pub fn new(amount: i64, symbol: Symbol) -> Self {
        Self { amount, symbol }
    }

    /// Zero of the given symbol
    pub fn zero(symbol: Symbol) -> Self {
        Self { amount: 0, symbol }
    }

    /// True if the amount is exactly zero
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    fn check_symbol(&self, other: &Asset) -> Result<()> {
        if self.symbol != other.symbol {
            return Err(Error::SymbolMismatch {
                expected: self.symbol,
                actual: other.symbol,
            });
        }
        Ok(())
    }

    /// Checked addition; fails on symbol mismatch or i64 overflow
    pub fn checked_add(&self, other: &Asset) -> Result<Asset> {
        self.check_symbol(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(Error::Overflow("asset add"))?;
        Ok(Asset::new(amount, self.symbol))
    }

    /// Checked subtraction; fails on symbol mismatch or i64 overflow
    pub fn checked_sub(&self, other: &Asset) -> Result<Asset> {
        self.check_symbol(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(Error::Overflow("asset sub"))?;
        Ok(Asset::new(amount, self.symbol))
    }

    /// Truncating scalar multiply
    pub fn checked_mul(&self, scalar: i64) -> Result<Asset> {
        let amount = self
            .amount
            .checked_mul(scalar)
            .ok_or(Error::Overflow("asset mul"))?;
        Ok(Asset::new(amount, self.symbol))
    }

    /// Truncating scalar divide
    pub fn checked_div(&self, scalar: i64) -> Result<Asset> {
        let amount = self
            .amount
            .checked_div(scalar)
            .ok_or(Error::Overflow("asset div"))?;
        Ok(Asset::new(amount, self.symbol))
    }

    /// `amount * num / den` through an i128 intermediate, truncating
    pub fn mul_ratio(&self, num: i64, den: i64) -> Result<Asset> {
        if den == 0 {
            return Err(Error::Overflow("asset ratio div by zero"));
        }
        let wide = (self.amount as i128) * (num as i128) / (den as i128);
        let amount = i64::try_from(wide).map_err(|_| Error::Overflow("asset ratio"))?;
        Ok(Asset::new(amount, self.symbol))
    }

    /// Smaller of two same-symbol assets
    pub fn min(&self, other: &Asset) -> Result<Asset> {
        self.check_symbol(other)?;
        Ok(Asset::new(self.amount.min(other.amount), self.symbol))
    }
}

impl PartialOrd for Asset {
    /// Ordering is only defined between identical symbols
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.symbol != other.symbol {
            return None;
        }
        Some(self.amount.cmp(&other.amount))
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.symbol.unit();
        let whole = self.amount / unit;
        let frac = (self.amount % unit).unsigned_abs();
        let sign = if self.amount < 0 && whole == 0 { "-" } else { "" };
        write!(
            f,
            "{}{}.{:0width$} {}",
            sign,
            whole,
            frac,
            self.symbol,
            width = self.symbol.precision() as usize
        )
    }
}

impl FromStr for Asset {
    type Err = Error;

    /// Parse `"1.000 VLS"` fixed-point form
    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::InvalidValue(format!("Cannot parse asset: {s}"));
        let (num, ticker) = s.split_once(' ').ok_or_else(bad)?;
        let (whole_s, frac_s) = num.split_once('.').ok_or_else(bad)?;
        let precision = u8::try_from(frac_s.len()).map_err(|_| bad())?;
        let symbol = Symbol::new(ticker, precision)?;
        let negative = whole_s.starts_with('-');
        let whole: i64 = whole_s.parse().map_err(|_| bad())?;
        let frac: i64 = frac_s.parse().map_err(|_| bad())?;
        if frac < 0 {
            return Err(bad());
        }
        let unit = symbol.unit();
        let magnitude = whole
            .unsigned_abs()
            .checked_mul(unit as u64)
            .and_then(|v| v.checked_add(frac as u64))
            .ok_or(Error::Overflow("asset parse"))?;
        let amount = i64::try_from(magnitude).map_err(|_| Error::Overflow("asset parse"))?;
        Ok(Asset::new(if negative { -amount } else { amount }, symbol))
    }
}
