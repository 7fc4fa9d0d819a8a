#[cfg(feature = "mtx")]
pub mod mtx;
