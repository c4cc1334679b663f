pub mod id;
pub mod money;

pub use money::Money;
