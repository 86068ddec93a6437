pub mod delivery_ledger;

pub use delivery_ledger::DeliveryLedger;
