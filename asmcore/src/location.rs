//! A point inside emitted output, and the arithmetic of distances between
//! two such points.

use crate::bigint::BigInt;
use crate::bytecode::{BytecodeRef, BytecodeSink};

/// A `(bytecode, offset_within_bytecode)` pair. The absolute offset is
/// `bytecode.offset + offset` once the optimizer has assigned bytecode
/// offsets; before that, only same-bytecode distances are known.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Location {
    pub bytecode: BytecodeRef,
    pub offset: u64,
}

impl Location {
    pub fn new(bytecode: BytecodeRef, offset: u64) -> Self {
        Location { bytecode, offset }
    }
}

/// The signed distance `loc2 - loc1`, valid only once both bytecodes have
/// assigned absolute offsets.
pub fn calc_dist(bc: &dyn BytecodeSink, loc1: Location, loc2: Location) -> Option<BigInt> {
    let off1 = bc.offset(loc1.bytecode)?;
    let off2 = bc.offset(loc2.bytecode)?;
    let abs1 = off1 as i64 + loc1.offset as i64;
    let abs2 = off2 as i64 + loc2.offset as i64;
    Some(BigInt::from(abs2 - abs1))
}

/// `calc_dist_no_bc`: distance known pre-optimization only when both
/// locations share the same bytecode.
pub fn calc_dist_no_bc(bc: &dyn BytecodeSink, loc1: Location, loc2: Location) -> Option<BigInt> {
    if !bc.same_bytecode(loc1.bytecode, loc2.bytecode) {
        return None;
    }
    Some(BigInt::from(loc2.offset as i64 - loc1.offset as i64))
}
