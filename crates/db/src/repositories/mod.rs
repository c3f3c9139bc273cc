//! Repositories over the ledger tables.

mod comment;
mod download;
mod file;
mod payment;
mod user;

pub use comment::CommentRepository;
pub use download::DownloadRepository;
pub use file::FileRepository;
pub use payment::PaymentRepository;
pub use user::UserRepository;
