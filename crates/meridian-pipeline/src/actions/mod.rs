pub mod mention;
pub mod relocation;
pub mod time_convert;

pub use mention::MentionHandler;
pub use relocation::RelocationHandler;
pub use time_convert::TimeConversionHandler;
