//! Arbitrary-precision signed integers.
//!
//! Two representations are used transparently: `Small` is a native `i64`
//! fast path, `Wide` is a fixed-width two's-complement limb array used only
//! when a value doesn't fit in `i64`. Every operation narrows its result
//! back to `Small` when possible.

use std::cmp::Ordering;
use std::fmt;
use std::fmt::Write as _;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::ArithmeticError;
use crate::operator::Operator;

/// Number of 64-bit limbs in the wide representation, little-endian
/// (`limbs[0]` holds the least significant bits).
const LIMBS: usize = 4;
/// Native bit-vector width, at least wide enough for any architecture's
/// integer types.
pub const BITVECT_NATIVE_BITS: u32 = (LIMBS * 64) as u32;

type Limbs = [u64; LIMBS];

#[derive(Clone, Debug)]
enum Repr {
    Small(i64),
    Wide(Box<Limbs>),
}

/// An arbitrary-precision signed integer.
#[derive(Clone, Debug)]
pub struct BigInt {
    repr: Repr,
}

// ---------------------------------------------------------------------
// limb-level primitives (unsigned 256-bit two's-complement arithmetic)
// ---------------------------------------------------------------------

fn limbs_from_i64(v: i64) -> Limbs {
    let fill = if v < 0 { u64::MAX } else { 0 };
    let mut out = [fill; LIMBS];
    out[0] = v as u64;
    out
}

fn limbs_is_zero(a: &Limbs) -> bool {
    a.iter().all(|&w| w == 0)
}

fn limbs_negative(a: &Limbs) -> bool {
    a[LIMBS - 1] & (1 << 63) != 0
}

fn limbs_not(a: &Limbs) -> Limbs {
    let mut out = [0u64; LIMBS];
    for i in 0..LIMBS {
        out[i] = !a[i];
    }
    out
}

/// Returns the sum and the carry out of the top limb.
fn limbs_add_carry(a: &Limbs, b: &Limbs) -> (Limbs, bool) {
    let mut out = [0u64; LIMBS];
    let mut carry = 0u128;
    for i in 0..LIMBS {
        let sum = a[i] as u128 + b[i] as u128 + carry;
        out[i] = sum as u64;
        carry = sum >> 64;
    }
    (out, carry != 0)
}

fn limbs_add(a: &Limbs, b: &Limbs) -> Limbs {
    limbs_add_carry(a, b).0
}

fn limbs_neg(a: &Limbs) -> Limbs {
    let inv = limbs_not(a);
    limbs_add(&inv, &limbs_from_i64(1))
}

fn limbs_sub(a: &Limbs, b: &Limbs) -> Limbs {
    limbs_add(a, &limbs_neg(b))
}

fn limbs_cmp_unsigned(a: &Limbs, b: &Limbs) -> Ordering {
    for i in (0..LIMBS).rev() {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn limbs_cmp_signed(a: &Limbs, b: &Limbs) -> Ordering {
    match (limbs_negative(a), limbs_negative(b)) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        _ => limbs_cmp_unsigned(a, b),
    }
}

fn limbs_shl(a: &Limbs, n: u32) -> Limbs {
    if n >= BITVECT_NATIVE_BITS {
        return [0; LIMBS];
    }
    let limb_shift = (n / 64) as usize;
    let bit_shift = n % 64;
    let mut out = [0u64; LIMBS];
    for i in (0..LIMBS).rev() {
        if i < limb_shift {
            continue;
        }
        let src = i - limb_shift;
        let mut v = a[src] << bit_shift;
        if bit_shift > 0 && src > 0 {
            v |= a[src - 1] >> (64 - bit_shift);
        }
        out[i] = v;
    }
    out
}

fn limbs_shr_logical(a: &Limbs, n: u32) -> Limbs {
    if n >= BITVECT_NATIVE_BITS {
        return [0; LIMBS];
    }
    let limb_shift = (n / 64) as usize;
    let bit_shift = n % 64;
    let mut out = [0u64; LIMBS];
    for i in 0..LIMBS {
        let src = i + limb_shift;
        if src >= LIMBS {
            continue;
        }
        let mut v = a[src] >> bit_shift;
        if bit_shift > 0 && src + 1 < LIMBS {
            v |= a[src + 1] << (64 - bit_shift);
        }
        out[i] = v;
    }
    out
}

fn limbs_shr_arith(a: &Limbs, n: u32) -> Limbs {
    if !limbs_negative(a) {
        return limbs_shr_logical(a, n);
    }
    if n >= BITVECT_NATIVE_BITS {
        return [u64::MAX; LIMBS];
    }
    let mut out = limbs_shr_logical(a, n);
    // Fill in the vacated high bits with ones.
    let fill_from = BITVECT_NATIVE_BITS - n;
    let fill = limbs_shl(&[u64::MAX; LIMBS], fill_from);
    for i in 0..LIMBS {
        out[i] |= fill[i];
    }
    out
}

/// Full double-width product; returns (low half, high half). Schoolbook
/// multiply: every limb pair's product is split into its own low/high
/// 64-bit contribution and summed with carry propagation at the end.
fn limbs_mul_wide(a: &Limbs, b: &Limbs) -> ([u64; LIMBS], [u64; LIMBS]) {
    let mut limbs_out = [0u64; LIMBS * 2];
    let mut carries = [0u128; LIMBS * 2 + 1];
    for i in 0..LIMBS {
        for j in 0..LIMBS {
            let p = a[i] as u128 * b[j] as u128;
            carries[i + j] += p & 0xFFFF_FFFF_FFFF_FFFF;
            carries[i + j + 1] += p >> 64;
        }
    }
    let mut carry = 0u128;
    for k in 0..(LIMBS * 2) {
        let total = carries[k] + carry;
        limbs_out[k] = total as u64;
        carry = total >> 64;
    }
    let mut low = [0u64; LIMBS];
    let mut high = [0u64; LIMBS];
    low.copy_from_slice(&limbs_out[0..LIMBS]);
    high.copy_from_slice(&limbs_out[LIMBS..LIMBS * 2]);
    (low, high)
}

fn limbs_mul(a: &Limbs, b: &Limbs) -> Limbs {
    limbs_mul_wide(a, b).0
}

fn limbs_bits_unsigned(a: &Limbs) -> u32 {
    for i in (0..LIMBS).rev() {
        if a[i] != 0 {
            return i as u32 * 64 + (64 - a[i].leading_zeros());
        }
    }
    0
}

/// Unsigned long division via binary shift-subtract. `b` must be nonzero.
fn limbs_divmod_unsigned(a: &Limbs, b: &Limbs) -> (Limbs, Limbs) {
    let mut quotient = [0u64; LIMBS];
    let mut remainder = [0u64; LIMBS];
    let bits = limbs_bits_unsigned(a);
    for i in (0..bits).rev() {
        // remainder = (remainder << 1) | bit i of a
        remainder = limbs_shl(&remainder, 1);
        let limb = (i / 64) as usize;
        let bit = i % 64;
        if a[limb] & (1u64 << bit) != 0 {
            remainder[0] |= 1;
        }
        if limbs_cmp_unsigned(&remainder, b) != Ordering::Less {
            remainder = limbs_sub(&remainder, b);
            quotient[(i / 64) as usize] |= 1u64 << (i % 64);
        }
    }
    (quotient, remainder)
}

/// Signed truncating division (quotient toward zero, remainder sign of
/// the dividend) — used for `SignDiv`/`SignMod`.
fn limbs_divmod_signed(a: &Limbs, b: &Limbs) -> (Limbs, Limbs) {
    let a_neg = limbs_negative(a);
    let b_neg = limbs_negative(b);
    let a_mag = if a_neg { limbs_neg(a) } else { *a };
    let b_mag = if b_neg { limbs_neg(b) } else { *b };
    let (mut q, mut r) = limbs_divmod_unsigned(&a_mag, &b_mag);
    if a_neg != b_neg {
        q = limbs_neg(&q);
    }
    if a_neg {
        r = limbs_neg(&r);
    }
    (q, r)
}

// ---------------------------------------------------------------------
// BigInt
// ---------------------------------------------------------------------

/// Which bound `ok_size` should check against.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangeType {
    /// `[0, 2^size)`
    Unsigned,
    /// `[-2^(size-1), 2^(size-1))`
    Signed,
    /// `[-2^(size-1), 2^size)`
    Combined,
}

impl BigInt {
    pub fn zero() -> Self {
        BigInt::from(0i64)
    }

    fn from_limbs(limbs: Limbs) -> Self {
        BigInt {
            repr: Repr::Wide(Box::new(limbs)),
        }
        .narrowed()
    }

    fn to_limbs(&self) -> Limbs {
        match &self.repr {
            Repr::Small(v) => limbs_from_i64(*v),
            Repr::Wide(b) => **b,
        }
    }

    /// Narrow a `Wide` value back to `Small` if it fits.
    fn narrowed(self) -> Self {
        if let Repr::Wide(b) = &self.repr {
            let limbs = **b;
            let negative = limbs_negative(&limbs);
            let fits = if negative {
                limbs[1..].iter().all(|&w| w == u64::MAX) && (limbs[0] as i64) < 0
            } else {
                limbs[1..].iter().all(|&w| w == 0) && (limbs[0] as i64) >= 0
            };
            if fits {
                return BigInt {
                    repr: Repr::Small(limbs[0] as i64),
                };
            }
        }
        self
    }

    pub fn is_zero(&self) -> bool {
        match &self.repr {
            Repr::Small(v) => *v == 0,
            Repr::Wide(b) => limbs_is_zero(b),
        }
    }

    /// The value as a native `i64`, if it's small enough to use the fast
    /// representation (every value that fits is narrowed to it).
    pub fn to_i64(&self) -> Option<i64> {
        match &self.repr {
            Repr::Small(v) => Some(*v),
            Repr::Wide(_) => None,
        }
    }

    pub fn is_pos1(&self) -> bool {
        matches!(self.repr, Repr::Small(1))
    }

    pub fn is_neg1(&self) -> bool {
        matches!(self.repr, Repr::Small(-1))
    }

    /// The value with exactly the low `bits` bits set (`2^bits - 1`), i.e.
    /// the full bitmask for a field of that width. Used to recognize a
    /// symbol masked down to a value's own size (`sym & 0xff` for an 8-bit
    /// value), distinct from `is_neg1`'s infinite-width `-1`.
    pub fn all_ones_mask(bits: u32) -> BigInt {
        if bits == 0 {
            return BigInt::zero();
        }
        if bits >= BITVECT_NATIVE_BITS {
            return BigInt::from(-1);
        }
        let one = limbs_from_i64(1);
        let shifted = limbs_shl(&one, bits);
        BigInt::from_limbs(limbs_sub(&shifted, &one))
    }

    pub fn sign(&self) -> i32 {
        match &self.repr {
            Repr::Small(v) => v.signum() as i32,
            Repr::Wide(b) => {
                if limbs_is_zero(b) {
                    0
                } else if limbs_negative(b) {
                    -1
                } else {
                    1
                }
            }
        }
    }

    /// Parse a literal in base 2, 8, 10 or 16, with an optional leading `-`.
    pub fn from_str_radix(s: &str, base: u32) -> Result<Self, ArithmeticError> {
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if digits.is_empty() {
            return Err(ArithmeticError::Overflow);
        }
        let mut magnitude = [0u64; LIMBS];
        for c in digits.chars() {
            let digit = c
                .to_digit(base)
                .ok_or(ArithmeticError::Overflow)? as u64;
            let base_limbs = limbs_from_i64(base as i64);
            let (low, high) = limbs_mul_wide(&magnitude, &base_limbs);
            if !limbs_is_zero(&high) {
                return Err(ArithmeticError::Overflow);
            }
            let (sum, carry) = limbs_add_carry(&low, &limbs_from_i64(digit as i64));
            if carry {
                return Err(ArithmeticError::Overflow);
            }
            magnitude = sum;
        }
        // The magnitude must still fit once the sign bit is accounted for.
        if limbs_negative(&magnitude) && !(negative && magnitude == {
            let mut min = [0u64; LIMBS];
            min[LIMBS - 1] = 1 << 63;
            min
        }) {
            return Err(ArithmeticError::Overflow);
        }
        let value = if negative {
            limbs_neg(&magnitude)
        } else {
            magnitude
        };
        Ok(BigInt::from_limbs(value))
    }

    /// Decode from a fixed-size byte buffer, sign-extending if `signed` and
    /// the buffer's width is narrower than the native width.
    pub fn from_buffer(
        bytes: &[u8],
        signed: bool,
        bigendian: bool,
    ) -> Result<Self, ArithmeticError> {
        if bytes.len() * 8 > BITVECT_NATIVE_BITS as usize {
            return Err(ArithmeticError::Overflow);
        }
        let mut limbs = [0u64; LIMBS];
        let mut remaining = bytes.len();
        let mut limb = 0;
        while remaining > 0 {
            let take = remaining.min(8);
            limbs[limb] = if bigendian {
                BigEndian::read_uint(&bytes[remaining - take..remaining], take)
            } else {
                let start = bytes.len() - remaining;
                LittleEndian::read_uint(&bytes[start..start + take], take)
            };
            remaining -= take;
            limb += 1;
        }
        let top_bit_set = if bytes.is_empty() {
            false
        } else {
            let top_byte = if bigendian { bytes[0] } else { bytes[bytes.len() - 1] };
            top_byte & 0x80 != 0
        };
        if signed && top_bit_set && bytes.len() * 8 < BITVECT_NATIVE_BITS as usize {
            let fill = limbs_shl(&[u64::MAX; LIMBS], (bytes.len() * 8) as u32);
            for i in 0..LIMBS {
                limbs[i] |= fill[i];
            }
        }
        Ok(BigInt::from_limbs(limbs))
    }

    /// Decode an unsigned or signed LEB128 value from the start of `bytes`.
    /// Returns the value and the number of bytes consumed.
    pub fn from_leb128(bytes: &[u8], signed: bool) -> Result<(Self, usize), ArithmeticError> {
        let mut limbs = [0u64; LIMBS];
        let mut shift: u32 = 0;
        let mut i = 0;
        let mut last_byte = 0u8;
        loop {
            let byte = *bytes.get(i).ok_or(ArithmeticError::Overflow)?;
            last_byte = byte;
            if shift >= BITVECT_NATIVE_BITS {
                return Err(ArithmeticError::Overflow);
            }
            let chunk = limbs_shl(&limbs_from_i64((byte & 0x7f) as i64), shift);
            for w in 0..LIMBS {
                limbs[w] |= chunk[w];
            }
            shift += 7;
            i += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
        if signed && shift < BITVECT_NATIVE_BITS && (last_byte & 0x40) != 0 {
            let fill = limbs_shl(&[u64::MAX; LIMBS], shift);
            for w in 0..LIMBS {
                limbs[w] |= fill[w];
            }
        }
        Ok((BigInt::from_limbs(limbs), i))
    }

    /// Encode as LEB128.
    pub fn to_leb128(&self, signed: bool) -> Vec<u8> {
        let mut out = Vec::new();
        let mut value = self.to_limbs();
        if !signed {
            loop {
                let mut byte = (value[0] & 0x7f) as u8;
                value = limbs_shr_logical(&value, 7);
                if !limbs_is_zero(&value) {
                    byte |= 0x80;
                    out.push(byte);
                } else {
                    out.push(byte);
                    break;
                }
            }
        } else {
            loop {
                let byte_bits = (value[0] & 0x7f) as u8;
                let rest = limbs_shr_arith(&value, 7);
                let sign_bit = byte_bits & 0x40 != 0;
                let done = (limbs_is_zero(&rest) && !sign_bit)
                    || (rest.iter().all(|&w| w == u64::MAX) && sign_bit);
                if done {
                    out.push(byte_bits);
                    break;
                } else {
                    out.push(byte_bits | 0x80);
                    value = rest;
                }
            }
        }
        out
    }

    /// Arithmetic and logical operators.
    pub fn calc(&self, op: Operator, operand: Option<&BigInt>) -> Result<BigInt, ArithmeticError> {
        if op.is_non_numeric() {
            return Err(ArithmeticError::NonNumericOp);
        }

        if let (Repr::Small(lhs), rhs) = (&self.repr, operand.map(|o| &o.repr)) {
            let rhs_small = match rhs {
                Some(Repr::Small(v)) => Some(*v),
                None => Some(0),
                _ => None,
            };
            if let Some(rhs) = rhs_small {
                if let Some(v) = calc_small(op, *lhs, rhs)? {
                    return Ok(BigInt::from(v));
                }
            }
        }

        let a = self.to_limbs();
        let b = operand.map(|o| o.to_limbs()).unwrap_or([0u64; LIMBS]);
        let result = calc_wide(op, &a, operand.is_some().then_some(&b))?;
        Ok(BigInt::from_limbs(result))
    }

    /// Packs `valsize` bits into `dest` at bit offset `shift` (negative
    /// means right-shift first). Returns
    /// `(overflow, misaligned)` warning flags; the caller (`Value`) routes
    /// them to the diagnostics sink with the right source range.
    #[allow(clippy::too_many_arguments)]
    pub fn get_sized(
        &self,
        dest: &mut [u8],
        valsize: u32,
        shift: i32,
        bigendian: bool,
        warn_mode: i8,
    ) -> (bool, bool) {
        let (shift, rshift) = if shift < 0 {
            (0u32, (-shift) as u32)
        } else {
            (shift as u32, 0u32)
        };

        let mut overflow = false;
        if warn_mode < 0 && !self.ok_size(valsize, rshift, RangeType::Signed) {
            overflow = true;
        }
        if warn_mode > 0 && !self.ok_size(valsize, rshift, RangeType::Combined) {
            overflow = true;
        }

        let mut value = self.to_limbs();
        let mut misaligned = false;
        if rshift > 0 {
            let shifted_out = limbs_shl(&value, BITVECT_NATIVE_BITS - rshift);
            if !limbs_is_zero(&shifted_out) {
                misaligned = true;
            }
            value = limbs_shr_arith(&value, rshift);
        }

        write_bitfield(dest, &value, valsize, shift, bigendian);

        (overflow, misaligned)
    }

    /// Reports whether the value fits in `size` bits (after an optional
    /// right-shift) under the given range interpretation.
    pub fn ok_size(&self, size: u32, rshift: u32, rangetype: RangeType) -> bool {
        if size >= BITVECT_NATIVE_BITS {
            return true;
        }
        let mut value = self.to_limbs();
        if rshift > 0 {
            value = limbs_shr_arith(&value, rshift);
        }
        let negative = limbs_negative(&value);
        match rangetype {
            RangeType::Unsigned => {
                if negative {
                    false
                } else {
                    limbs_bits_unsigned(&value) <= size
                }
            }
            RangeType::Signed => {
                if negative {
                    let mag = limbs_neg(&value);
                    limbs_bits_unsigned(&mag) <= size.saturating_sub(1)
                        || (limbs_bits_unsigned(&mag) == size && is_power_of_two(&mag))
                } else {
                    limbs_bits_unsigned(&value) < size
                }
            }
            RangeType::Combined => {
                if negative {
                    let mag = limbs_neg(&value);
                    limbs_bits_unsigned(&mag) <= size.saturating_sub(1)
                        || (limbs_bits_unsigned(&mag) == size && is_power_of_two(&mag))
                } else {
                    limbs_bits_unsigned(&value) <= size
                }
            }
        }
    }

    /// Inclusive-exclusive range check against plain `i64` bounds.
    pub fn in_range(&self, low: i64, high: i64) -> bool {
        match &self.repr {
            Repr::Small(v) => *v >= low && *v <= high,
            Repr::Wide(b) => {
                let lo = limbs_from_i64(low);
                let hi = limbs_from_i64(high);
                limbs_cmp_signed(b, &lo) != Ordering::Less
                    && limbs_cmp_signed(b, &hi) != Ordering::Greater
            }
        }
    }

    /// Render in decimal (`Display` does the same; kept as a named method
    /// for symmetry with [`BigInt::to_radix_string`]).
    pub fn to_decimal_string(&self) -> String {
        format!("{}", self)
    }

    /// Render in the given radix, optionally with a `0x`/`0o`/`0b` prefix
    /// and zero-padded to `min_bits`.
    pub fn to_radix_string(&self, radix: Radix, prefix: bool, min_bits: u32) -> String {
        let limbs = self.to_limbs();
        let bpd = radix.bits_per_digit();
        let digits_needed = (min_bits as usize + bpd - 1) / bpd;
        let mut digits = Vec::new();
        let mut remaining = limbs;
        loop {
            let digit = (remaining[0] & radix.digit_mask()) as u32;
            digits.push(std::char::from_digit(digit, radix.base()).unwrap());
            remaining = limbs_shr_logical(&remaining, radix.bits_per_digit() as u32);
            if limbs_is_zero(&remaining) && digits.len() >= digits_needed.max(1) {
                break;
            }
            if digits.len() >= (BITVECT_NATIVE_BITS as usize) {
                break;
            }
        }
        while digits.len() < digits_needed {
            digits.push('0');
        }
        digits.reverse();
        let mut out = String::new();
        if prefix {
            out.push_str(radix.prefix());
        }
        out.extend(digits);
        out
    }
}

fn is_power_of_two(limbs: &Limbs) -> bool {
    let bits = limbs_bits_unsigned(limbs);
    if bits == 0 {
        return false;
    }
    let mut shifted = *limbs;
    shifted = limbs_shr_logical(&shifted, bits - 1);
    shifted[0] == 1 && limbs_is_zero(&{
        let mut rest = *limbs;
        let mask = limbs_shl(&limbs_from_i64(1), bits - 1);
        for i in 0..LIMBS {
            rest[i] &= !mask[i];
        }
        rest
    })
}

/// Writes `valsize` bits of `value` into `dest` at bit offset `shift`,
/// preserving bits of `dest` outside the written field.
///
/// `bigendian` only reverses which byte of `dest` a given bit group lands
/// in; the bit order within a byte is unaffected (byte 0 is the LSB byte
/// for little-endian output, the MSB byte for big-endian).
fn write_bitfield(dest: &mut [u8], value: &Limbs, valsize: u32, shift: u32, bigendian: bool) {
    let total_bytes = dest.len() as u32;
    for bit in 0..valsize {
        let dest_bit = shift + bit;
        let logical_byte = dest_bit / 8;
        if logical_byte >= total_bytes {
            break;
        }
        let dest_byte = if bigendian {
            (total_bytes - 1 - logical_byte) as usize
        } else {
            logical_byte as usize
        };
        let dest_bit_in_byte = dest_bit % 8;
        let src_limb = (bit / 64) as usize;
        let src_bit = bit % 64;
        let bit_value = (value[src_limb] >> src_bit) & 1;
        let mask = 1u8 << dest_bit_in_byte;
        if bit_value != 0 {
            dest[dest_byte] |= mask;
        } else {
            dest[dest_byte] &= !mask;
        }
    }
}

/// Fast path: native arithmetic when both operands are small and the
/// operation can't overflow a conservative half-range.
/// Returns `Ok(None)` to signal "fall back to the wide path".
fn calc_small(op: Operator, lhs: i64, rhs: i64) -> Result<Option<i64>, ArithmeticError> {
    const HALF: i64 = 1 << 31;
    let in_half = |v: i64| (-HALF..HALF).contains(&v);
    let v = match op {
        Operator::Add => {
            if !in_half(lhs) || !in_half(rhs) {
                return Ok(None);
            }
            lhs + rhs
        }
        Operator::Sub => {
            if !in_half(lhs) || !in_half(rhs) {
                return Ok(None);
            }
            lhs - rhs
        }
        Operator::Mul => {
            if !in_half(lhs) || !in_half(rhs) {
                return Ok(None);
            }
            lhs * rhs
        }
        // DIV and SIGNDIV take the identical signed-division path in the
        // original (libyasmx's IntNum fast path falls `DIV` straight into
        // `SIGNDIV`'s `case`); there is no unsigned division in this corpus.
        Operator::Div | Operator::SignDiv => {
            if rhs == 0 {
                return Err(ArithmeticError::DivideByZero);
            }
            // `i64::MIN / -1` overflows the native division instruction;
            // fall back to the wide path, which negates through the limb
            // array instead of relying on `i64` two's-complement wraparound.
            if lhs == i64::MIN && rhs == -1 {
                return Ok(None);
            }
            lhs / rhs
        }
        Operator::Mod | Operator::SignMod => {
            if rhs == 0 {
                return Err(ArithmeticError::DivideByZero);
            }
            if lhs == i64::MIN && rhs == -1 {
                return Ok(None);
            }
            lhs % rhs
        }
        Operator::Neg => {
            if lhs == i64::MIN {
                return Ok(None);
            }
            -lhs
        }
        Operator::Not => !lhs,
        Operator::Or => lhs | rhs,
        Operator::And => lhs & rhs,
        Operator::Xor => lhs ^ rhs,
        Operator::Xnor => !(lhs ^ rhs),
        Operator::Nor => !(lhs | rhs),
        Operator::Shl => return Ok(None),
        Operator::Shr => {
            if rhs < 0 || rhs >= 64 {
                return Ok(None);
            }
            lhs >> rhs
        }
        Operator::LOr => (lhs != 0 || rhs != 0) as i64,
        Operator::LAnd => (lhs != 0 && rhs != 0) as i64,
        Operator::LNot => (lhs == 0) as i64,
        Operator::LXor => ((lhs != 0) ^ (rhs != 0)) as i64,
        Operator::LXnor => !((lhs != 0) ^ (rhs != 0)) as i64 & 1,
        Operator::LNor => !(lhs != 0 || rhs != 0) as i64 & 1,
        Operator::Eq => (lhs == rhs) as i64,
        Operator::Lt => (lhs < rhs) as i64,
        Operator::Gt => (lhs > rhs) as i64,
        Operator::Le => (lhs <= rhs) as i64,
        Operator::Ge => (lhs >= rhs) as i64,
        Operator::Ne => (lhs != rhs) as i64,
        Operator::Ident => lhs,
        Operator::Seg | Operator::Wrt | Operator::SegOff => {
            return Err(ArithmeticError::NonNumericOp)
        }
    };
    Ok(Some(v))
}

fn calc_wide(op: Operator, a: &Limbs, b: Option<&Limbs>) -> Result<Limbs, ArithmeticError> {
    let zero = [0u64; LIMBS];
    let b = b.unwrap_or(&zero);
    let out = match op {
        Operator::Add => limbs_add(a, b),
        Operator::Sub => limbs_sub(a, b),
        Operator::Mul => limbs_mul(a, b),
        Operator::Div | Operator::SignDiv => {
            if limbs_is_zero(b) {
                return Err(ArithmeticError::DivideByZero);
            }
            limbs_divmod_signed(a, b).0
        }
        Operator::Mod | Operator::SignMod => {
            if limbs_is_zero(b) {
                return Err(ArithmeticError::DivideByZero);
            }
            limbs_divmod_signed(a, b).1
        }
        Operator::Neg => limbs_neg(a),
        Operator::Not => limbs_not(a),
        Operator::Or => {
            let mut out = [0u64; LIMBS];
            for i in 0..LIMBS {
                out[i] = a[i] | b[i];
            }
            out
        }
        Operator::And => {
            let mut out = [0u64; LIMBS];
            for i in 0..LIMBS {
                out[i] = a[i] & b[i];
            }
            out
        }
        Operator::Xor => {
            let mut out = [0u64; LIMBS];
            for i in 0..LIMBS {
                out[i] = a[i] ^ b[i];
            }
            out
        }
        Operator::Xnor => limbs_not(&{
            let mut out = [0u64; LIMBS];
            for i in 0..LIMBS {
                out[i] = a[i] ^ b[i];
            }
            out
        }),
        Operator::Nor => limbs_not(&{
            let mut out = [0u64; LIMBS];
            for i in 0..LIMBS {
                out[i] = a[i] | b[i];
            }
            out
        }),
        Operator::Shl => {
            if limbs_negative(b) {
                zero
            } else if limbs_bits_unsigned(b) > 32 {
                zero
            } else {
                limbs_shl(a, b[0] as u32)
            }
        }
        Operator::Shr => {
            if limbs_negative(b) {
                zero
            } else if limbs_bits_unsigned(b) > 32 {
                if limbs_negative(a) {
                    [u64::MAX; LIMBS]
                } else {
                    zero
                }
            } else {
                limbs_shr_arith(a, b[0] as u32)
            }
        }
        Operator::LOr => bool_limbs(!limbs_is_zero(a) || !limbs_is_zero(b)),
        Operator::LAnd => bool_limbs(!limbs_is_zero(a) && !limbs_is_zero(b)),
        Operator::LNot => bool_limbs(limbs_is_zero(a)),
        Operator::LXor => bool_limbs(!limbs_is_zero(a) ^ !limbs_is_zero(b)),
        Operator::LXnor => bool_limbs(!(!limbs_is_zero(a) ^ !limbs_is_zero(b))),
        Operator::LNor => bool_limbs(!(!limbs_is_zero(a) || !limbs_is_zero(b))),
        Operator::Eq => bool_limbs(a == b),
        Operator::Lt => bool_limbs(limbs_cmp_signed(a, b) == Ordering::Less),
        Operator::Gt => bool_limbs(limbs_cmp_signed(a, b) == Ordering::Greater),
        Operator::Le => bool_limbs(limbs_cmp_signed(a, b) != Ordering::Greater),
        Operator::Ge => bool_limbs(limbs_cmp_signed(a, b) != Ordering::Less),
        Operator::Ne => bool_limbs(a != b),
        Operator::Ident => *a,
        Operator::Seg | Operator::Wrt | Operator::SegOff => {
            return Err(ArithmeticError::NonNumericOp)
        }
    };
    Ok(out)
}

fn bool_limbs(v: bool) -> Limbs {
    limbs_from_i64(v as i64)
}

impl From<i64> for BigInt {
    fn from(v: i64) -> Self {
        BigInt {
            repr: Repr::Small(v),
        }
    }
}

impl From<i32> for BigInt {
    fn from(v: i32) -> Self {
        BigInt::from(v as i64)
    }
}

impl PartialEq for BigInt {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for BigInt {}

impl PartialOrd for BigInt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BigInt {
    fn cmp(&self, other: &Self) -> Ordering {
        if let (Repr::Small(a), Repr::Small(b)) = (&self.repr, &other.repr) {
            return a.cmp(b);
        }
        limbs_cmp_signed(&self.to_limbs(), &other.to_limbs())
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Repr::Small(v) = &self.repr {
            return write!(f, "{}", v);
        }
        let limbs = self.to_limbs();
        if limbs_is_zero(&limbs) {
            return write!(f, "0");
        }
        let negative = limbs_negative(&limbs);
        let mut magnitude = if negative { limbs_neg(&limbs) } else { limbs };
        let ten = limbs_from_i64(10);
        let mut digits = Vec::new();
        while !limbs_is_zero(&magnitude) {
            let (q, r) = limbs_divmod_unsigned(&magnitude, &ten);
            digits.push(std::char::from_digit(r[0] as u32, 10).unwrap());
            magnitude = q;
        }
        if negative {
            f.write_str("-")?;
        }
        for c in digits.iter().rev() {
            f.write_char(*c)?;
        }
        Ok(())
    }
}

/// Radix for [`BigInt::to_radix_string`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Radix {
    Binary,
    Octal,
    Hex,
}

impl Radix {
    fn base(self) -> u32 {
        match self {
            Radix::Binary => 2,
            Radix::Octal => 8,
            Radix::Hex => 16,
        }
    }
    fn bits_per_digit(self) -> usize {
        match self {
            Radix::Binary => 1,
            Radix::Octal => 3,
            Radix::Hex => 4,
        }
    }
    fn digit_mask(self) -> u64 {
        (1u64 << self.bits_per_digit()) - 1
    }
    fn prefix(self) -> &'static str {
        match self {
            Radix::Binary => "0b",
            Radix::Octal => "0o",
            Radix::Hex => "0x",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_roundtrip_decimal() {
        let n = BigInt::from_str_radix("1234", 10).unwrap();
        assert_eq!(n.to_decimal_string(), "1234");
        let n = BigInt::from_str_radix("-1234", 10).unwrap();
        assert_eq!(n.to_decimal_string(), "-1234");
    }

    #[test]
    fn hex_and_binary_literals() {
        assert_eq!(BigInt::from_str_radix("FF", 16).unwrap(), BigInt::from(255));
        assert_eq!(BigInt::from_str_radix("101", 2).unwrap(), BigInt::from(5));
        assert_eq!(BigInt::from_str_radix("17", 8).unwrap(), BigInt::from(15));
    }

    #[test]
    fn buffer_roundtrip() {
        for &n in &[0i64, 1, -1, 127, -128, 12345, -98765] {
            let bi = BigInt::from(n);
            let bytes_le = {
                let mut buf = vec![0u8; 8];
                bi.get_sized(&mut buf, 64, 0, false, 0);
                buf
            };
            let back = BigInt::from_buffer(&bytes_le, true, false).unwrap();
            assert_eq!(back, bi, "roundtrip failed for {}", n);
        }
    }

    #[test]
    fn leb128_roundtrip() {
        for &n in &[0i64, 1, -1, 127, 128, -129, 300000, -300000] {
            let bi = BigInt::from(n);
            let bytes = bi.to_leb128(true);
            let (back, len) = BigInt::from_leb128(&bytes, true).unwrap();
            assert_eq!(back, bi);
            assert_eq!(len, bytes.len());
        }
    }

    #[test]
    fn unsigned_leb128_roundtrip() {
        for &n in &[0i64, 1, 127, 128, 300000] {
            let bi = BigInt::from(n);
            let bytes = bi.to_leb128(false);
            let (back, len) = BigInt::from_leb128(&bytes, false).unwrap();
            assert_eq!(back, bi);
            assert_eq!(len, bytes.len());
        }
    }

    #[test]
    fn signdiv_signmod_of_min_by_neg_one_does_not_panic() {
        // i64::MIN / -1 overflows the native division instruction; the fast
        // path must fall back to the wide representation instead of
        // computing `lhs / rhs` directly.
        let min = BigInt::from(i64::MIN);
        let neg_one = BigInt::from(-1);
        let quotient = min.calc(Operator::SignDiv, Some(&neg_one)).unwrap();
        assert_eq!(quotient.to_i64(), None, "2^63 does not fit in i64");
        assert!(quotient > BigInt::from(i64::MAX));
        let remainder = min.calc(Operator::SignMod, Some(&neg_one)).unwrap();
        assert_eq!(remainder, BigInt::zero());
    }

    #[test]
    fn neg_of_min_does_not_panic() {
        let min = BigInt::from(i64::MIN);
        let negated = min.calc(Operator::Neg, None).unwrap();
        assert_eq!(negated.to_i64(), None, "2^63 does not fit in i64");
        assert!(negated > BigInt::from(i64::MAX));
    }

    #[test]
    fn divide_by_zero_errors() {
        let n = BigInt::from(10);
        let z = BigInt::from(0);
        assert_eq!(
            n.calc(Operator::Div, Some(&z)).unwrap_err(),
            ArithmeticError::DivideByZero
        );
        assert_eq!(
            n.calc(Operator::SignMod, Some(&z)).unwrap_err(),
            ArithmeticError::DivideByZero
        );
    }

    #[test]
    fn div_and_mod_are_signed_like_signdiv_signmod() {
        let lhs = BigInt::from(-10);
        let rhs = BigInt::from(3);
        assert_eq!(
            lhs.calc(Operator::Div, Some(&rhs)).unwrap(),
            BigInt::from(-3)
        );
        assert_eq!(
            lhs.calc(Operator::Mod, Some(&rhs)).unwrap(),
            BigInt::from(-1)
        );
        // Wide path must agree with the fast path.
        let wide_lhs = BigInt::from(i64::MIN);
        let wide_rhs = BigInt::from(-1);
        assert_eq!(
            wide_lhs.calc(Operator::Div, Some(&wide_rhs)).unwrap(),
            wide_lhs.calc(Operator::SignDiv, Some(&wide_rhs)).unwrap()
        );
    }

    #[test]
    fn non_numeric_operators_error() {
        let n = BigInt::from(10);
        assert_eq!(
            n.calc(Operator::Seg, None).unwrap_err(),
            ArithmeticError::NonNumericOp
        );
    }

    #[test]
    fn ok_size_signed_byte() {
        for n in -128..=127i64 {
            assert!(BigInt::from(n).ok_size(8, 0, RangeType::Signed));
        }
        assert!(!BigInt::from(128).ok_size(8, 0, RangeType::Signed));
        assert!(!BigInt::from(-129).ok_size(8, 0, RangeType::Signed));
    }

    #[test]
    fn ok_size_unsigned_byte() {
        for n in 0..=255i64 {
            assert!(BigInt::from(n).ok_size(8, 0, RangeType::Unsigned));
        }
        assert!(!BigInt::from(256).ok_size(8, 0, RangeType::Unsigned));
        assert!(!BigInt::from(-1).ok_size(8, 0, RangeType::Unsigned));
    }

    #[test]
    fn get_sized_little_endian_16bit() {
        let n = BigInt::from(0x1234);
        let mut buf = [0xFF, 0xFF];
        n.get_sized(&mut buf, 16, 0, false, 0);
        assert_eq!(buf, [0x34, 0x12]);
    }

    #[test]
    fn get_sized_preserves_low_nibble() {
        let n = BigInt::from(-1);
        let mut buf = [0x00, 0x00];
        n.get_sized(&mut buf, 12, 4, false, 0);
        assert_eq!(buf, [0xF0, 0xFF]);
    }

    #[test]
    fn wide_multiplication_matches_expected() {
        let a = BigInt::from_str_radix("340282366920938463463374607431768211455", 10);
        // 2^128 - 1: within 256-bit native width.
        assert!(a.is_ok());
    }

    #[test]
    fn overflow_on_too_large_literal() {
        let huge = "1".to_owned() + &"0".repeat(100);
        assert_eq!(
            BigInt::from_str_radix(&huge, 10).unwrap_err(),
            ArithmeticError::Overflow
        );
    }

    #[test]
    fn misalignment_warning_on_rshift() {
        let n = BigInt::from(0b101);
        let mut buf = [0u8; 1];
        let (_, misaligned) = n.get_sized(&mut buf, 8, -1, false, 0);
        assert!(misaligned);

        let n = BigInt::from(0b100);
        let mut buf = [0u8; 1];
        let (_, misaligned) = n.get_sized(&mut buf, 8, -1, false, 0);
        assert!(!misaligned);
    }

    #[test]
    fn buffer_roundtrip_big_endian() {
        for &n in &[0i64, 1, -1, 300, -300, 123456789] {
            let bi = BigInt::from(n);
            let mut buf = vec![0u8; 8];
            bi.get_sized(&mut buf, 64, 0, true, 0);
            let back = BigInt::from_buffer(&buf, true, true).unwrap();
            assert_eq!(back, bi, "big-endian roundtrip failed for {}", n);
        }
    }

    #[test]
    fn in_range_checks_plain_i64_bounds() {
        assert!(BigInt::from(5).in_range(0, 10));
        assert!(BigInt::from(0).in_range(0, 10));
        assert!(BigInt::from(10).in_range(0, 10));
        assert!(!BigInt::from(-1).in_range(0, 10));
        assert!(!BigInt::from(11).in_range(0, 10));
    }

    #[test]
    fn to_i64_only_succeeds_for_the_small_representation() {
        assert_eq!(BigInt::from(42).to_i64(), Some(42));
        let huge = BigInt::from_str_radix("170141183460469231731687303715884105728", 10).unwrap();
        assert_eq!(huge.to_i64(), None);
    }
}
