pub mod domain;
pub mod matching;
pub mod ports;

pub use domain::{DirectoryContact, LifecycleEvent, MatchResult, MessagingIndex, SyncOptions};
pub use matching::match_contact;
pub use ports::{DirectoryService, MessagingService, PortError, PortResult, PurchaseService};
