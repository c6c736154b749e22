//! Translation of upstream chat events into IRC lines.

pub mod body;
pub mod notification;
pub mod registry;
pub mod timestamps;
pub mod translator;

pub use translator::Bridge;
