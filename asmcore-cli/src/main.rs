//! Scratchpad binary for exercising `asmcore`'s integer parsing and
//! field-packing routines from the command line.
//!
//! This is deliberately not an assembler front end: it owns no parser, no
//! architecture backend, no object-format writer. It parses one integer
//! literal, optionally renders it in another radix, and packs it into a
//! field of a given bit width the way a `Value::output_basic` call would,
//! printing the resulting bytes and any overflow/misalignment warnings.

#[macro_use]
extern crate clap;

use asmcore::bigint::{BigInt, RangeType};
use clap::Arg;

#[derive(Debug)]
enum Error {
    Literal(String),
    Clap(clap::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Literal(msg) => write!(f, "invalid integer literal: {}", msg),
            Error::Clap(err) => write!(f, "{}", err),
        }
    }
}

/// Splits off an optional `0x`/`0o`/`0b` prefix (or decimal, absent one)
/// and an optional leading `-`, then delegates to `BigInt::from_str_radix`.
fn parse_literal(text: &str) -> Result<BigInt, Error> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (base, digits) = if let Some(d) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        (16, d)
    } else if let Some(d) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
        (8, d)
    } else if let Some(d) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        (2, d)
    } else {
        (10, rest)
    };
    let signed = if negative {
        format!("-{}", digits)
    } else {
        digits.to_owned()
    };
    BigInt::from_str_radix(&signed, base).map_err(|e| Error::Literal(e.to_string()))
}

fn run() -> Result<(), Error> {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("VALUE")
                .help("Integer literal: decimal, or 0x/0o/0b prefixed, optionally negative")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("bits")
                .short("b")
                .long("bits")
                .takes_value(true)
                .default_value("32")
                .help("Field width in bits to pack the value into"),
        )
        .arg(
            Arg::with_name("rshift")
                .long("rshift")
                .takes_value(true)
                .default_value("0")
                .help("Right-shift applied to the value before packing"),
        )
        .arg(
            Arg::with_name("big-endian")
                .long("be")
                .help("Pack the field big-endian instead of little-endian"),
        )
        .arg(
            Arg::with_name("signed")
                .long("signed")
                .help("Check the signed range instead of the combined range"),
        )
        .get_matches();

    let bits = value_t!(matches.value_of("bits"), u32).map_err(Error::Clap)?;
    let rshift = value_t!(matches.value_of("rshift"), u32).map_err(Error::Clap)?;
    let bigendian = matches.is_present("big-endian");
    let signed = matches.is_present("signed");

    let value = parse_literal(matches.value_of("VALUE").unwrap())?;
    println!("decimal: {}", value);

    let dest_bytes = ((bits as usize) + 7) / 8;
    let mut dest = vec![0u8; dest_bytes];
    let warn_mode: i8 = if signed { -1 } else { 1 };
    let (overflow, misaligned) =
        value.get_sized(&mut dest, bits, -(rshift as i32), bigendian, warn_mode);

    print!("packed ({} bits, {}-endian): ", bits, if bigendian { "big" } else { "little" });
    for byte in &dest {
        print!("{:02x}", byte);
    }
    println!();

    let rangetype = if signed {
        RangeType::Signed
    } else {
        RangeType::Combined
    };
    if overflow {
        println!(
            "warning: value does not fit in {} bits ({})",
            bits,
            if value.ok_size(bits, rshift, rangetype) {
                "fits after shift, masked on write"
            } else {
                "magnitude exceeds field"
            }
        );
    }
    if misaligned {
        println!("warning: rshift {} discarded nonzero low bits", rshift);
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
