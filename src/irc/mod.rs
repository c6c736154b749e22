pub mod capabilities;
pub mod formatter;
pub mod listener;
pub mod numerics;
pub mod parser;
pub mod session;
