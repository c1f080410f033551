mod answer;
mod balance;
mod charge;
mod question;
mod subscription;
mod transaction;
mod user;

pub use answer::*;
pub use balance::*;
pub use charge::*;
pub use question::*;
pub use subscription::*;
pub use transaction::*;
pub use user::*;
