pub mod check;
pub mod driver;
pub mod ir;
