pub mod directory;
pub mod messaging;
pub mod purchase;

pub use directory::RestDirectoryAdapter;
pub use messaging::BridgeMessagingClient;
pub use purchase::LicensePurchaseAdapter;
