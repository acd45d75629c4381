#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use cpd_core as core;

#[doc(inline)]
pub use cpd_registration as registration;
