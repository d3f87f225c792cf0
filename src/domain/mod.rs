mod account;
mod entry;
mod integrity;
mod ledger;
mod report;

pub use account::*;
pub use entry::*;
pub use integrity::*;
pub use ledger::*;
pub use report::*;
