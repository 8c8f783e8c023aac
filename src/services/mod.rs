pub mod account;
pub mod auth;
pub mod tax;
pub mod transfer;
pub mod withdrawal;

pub use account::AccountService;
pub use auth::AuthService;
pub use tax::TaxCalculator;
pub use transfer::TransferService;
pub use withdrawal::WithdrawalService;
