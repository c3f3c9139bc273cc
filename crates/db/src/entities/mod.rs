//! Database entities.

pub mod comment;
pub mod download;
pub mod file;
pub mod payment;
pub mod user;

pub use comment::Entity as Comment;
pub use download::Entity as Download;
pub use file::Entity as File;
pub use payment::{Entity as Payment, PaymentStatus};
pub use user::Entity as User;
