//! Video buffer preparation

pub mod convert;

pub use convert::{swab, swab_sliced, v210_row_bytes};
