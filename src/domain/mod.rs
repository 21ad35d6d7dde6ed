pub mod alert;
pub mod broker;
pub mod health;
pub mod validation;

pub use alert::*;
pub use broker::*;
pub use health::*;
pub use validation::*;
