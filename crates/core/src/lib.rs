//! Core ledger logic for favisend.
//!
//! The [`LedgerStore`] trait is the single place where download counters,
//! running ratings and account balances change. Two implementations exist:
//!
//! - [`MemoryLedger`]: process-local, per-row locking
//! - [`DatabaseLedger`]: sea-orm, row locks inside transactions
//!
//! [`open_ledger`] picks one from [`favisend_common::Config`].

pub mod ledger;
pub mod password;

pub use ledger::{
    DatabaseLedger, FileChanges, LedgerStore, MemoryLedger, NewComment, NewDownload, NewFile,
    NewPayment, NewUser, PaymentTransition, next_rating, open_ledger, plan_payment_transition,
};
pub use password::{hash_password, verify_password};
