//! Payment provider integration: callback authentication, the support ledger,
//! and the webhook pipeline that ties them to the live hub.

pub mod duitku;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod signature;
pub mod webhook;
