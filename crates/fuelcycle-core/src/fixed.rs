use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Material quantity (mass). All inventory arithmetic uses this type so a
/// simulation replays identically on every platform.
pub type Qty = Fixed64;

/// Steps are the atomic unit of simulation time.
pub type Step = u64;

/// Convert an f64 to a quantity. Use only for configuration and test
/// fixtures, never in the step loop.
#[inline]
pub fn f64_to_qty(v: f64) -> Qty {
    Qty::from_num(v)
}

/// Convert a quantity to f64. Use only for display, never in the step loop.
#[inline]
pub fn qty_to_f64(v: Qty) -> f64 {
    v.to_num::<f64>()
}
