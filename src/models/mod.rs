pub mod asset;
pub mod candidate;
pub mod import_result;
pub mod parsed_row;
pub mod position;
pub mod resolved;
pub mod transaction;

pub use asset::{Asset, AssetDraft, AssetType, Portfolio};
pub use candidate::SymbolCandidate;
pub use import_result::ImportResult;
pub use parsed_row::ParsedRow;
pub use position::{CLOSED_EPSILON, Position, is_effectively_zero};
pub use resolved::{ExistingAsset, ImportAction, InstrumentEdit, MatchSource, ResolvedInstrument};
pub use transaction::{LedgerEntry, NewLedgerEntry, ParsedTransaction, TransactionType};
