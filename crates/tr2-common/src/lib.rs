// Shared fixed-point math, configuration variables and the PCX picture
// format used by the output layer.

pub mod phd_math;
pub mod cvar;
pub mod pcx;
